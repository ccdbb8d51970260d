// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Trace classes: the root of the schema graph.

use super::stream_class::{ConstStreamClass, StreamClass, StreamClassInner};
use super::trace::Trace;
use crate::error::Result;
use crate::object::{read, write, FreezeState, UserAttributes};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, RwLock};

pub(crate) struct TraceClassData {
    user_attributes: UserAttributes,
    assigns_automatic_stream_class_id: bool,
    pub(crate) stream_classes: Vec<Arc<StreamClassInner>>,
    next_stream_class_id: u64,
}

pub(crate) struct TraceClassInner {
    pub(crate) frozen: FreezeState,
    pub(crate) data: RwLock<TraceClassData>,
}

/// Read-only view of a trace class.
#[derive(Clone)]
pub struct ConstTraceClass(pub(crate) Arc<TraceClassInner>);

/// Read-write view of a trace class.
#[derive(Clone)]
pub struct TraceClass(ConstTraceClass);

impl Deref for TraceClass {
    type Target = ConstTraceClass;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ConstTraceClass {
    pub fn assigns_automatic_stream_class_id(&self) -> bool {
        read(&self.0.data).assigns_automatic_stream_class_id
    }

    pub fn user_attributes(&self) -> UserAttributes {
        read(&self.0.data).user_attributes.clone()
    }

    pub fn stream_class_count(&self) -> usize {
        read(&self.0.data).stream_classes.len()
    }

    /// Stream class at `index`, in creation order.
    pub fn stream_class(&self, index: usize) -> Option<ConstStreamClass> {
        let inner = read(&self.0.data).stream_classes.get(index).cloned()?;
        Some(ConstStreamClass::from_parts(inner, self.clone()))
    }

    pub fn stream_class_by_id(&self, id: u64) -> Option<ConstStreamClass> {
        let inner = read(&self.0.data).stream_classes.iter().find(|sc| sc.id == id).cloned()?;
        Some(ConstStreamClass::from_parts(inner, self.clone()))
    }

    pub fn stream_classes(&self) -> Vec<ConstStreamClass> {
        let inners = read(&self.0.data).stream_classes.clone();
        inners.into_iter().map(|inner| ConstStreamClass::from_parts(inner, self.clone())).collect()
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.is_frozen()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn freeze(&self) {
        self.0.frozen.freeze();
    }
}

impl PartialEq for ConstTraceClass {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ConstTraceClass {}

impl fmt::Debug for ConstTraceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = read(&self.0.data);
        f.debug_struct("TraceClass")
            .field("assigns_automatic_stream_class_id", &data.assigns_automatic_stream_class_id)
            .field("stream_class_count", &data.stream_classes.len())
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for TraceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Default for TraceClass {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceClass {
    /// Creates an empty trace class assigning stream class IDs automatically.
    pub fn new() -> Self {
        Self(ConstTraceClass(Arc::new(TraceClassInner {
            frozen: FreezeState::new(),
            data: RwLock::new(TraceClassData {
                user_attributes: UserAttributes::new(),
                assigns_automatic_stream_class_id: true,
                stream_classes: Vec::new(),
                next_stream_class_id: 0,
            }),
        })))
    }

    pub fn as_const(&self) -> ConstTraceClass {
        self.0.clone()
    }

    /// Switching this after stream classes exist is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_assigns_automatic_stream_class_id(&self, value: bool) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Trace class")?;
        write(&self.0 .0.data).assigns_automatic_stream_class_id = value;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_user_attributes(&self, attributes: UserAttributes) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Trace class")?;
        write(&self.0 .0.data).user_attributes = attributes;
        Ok(())
    }

    /// Creates a stream class with the next automatic ID.
    ///
    /// # Errors
    ///
    /// Fails with the `assigns-automatic-stream-class-id` precondition when the
    /// trace class expects explicit IDs.
    pub fn create_stream_class(&self) -> Result<StreamClass> {
        let mut data = write(&self.0 .0.data);
        ensure_pre!(
            data.assigns_automatic_stream_class_id,
            "assigns-automatic-stream-class-id",
            "Trace class does not automatically assign stream class IDs"
        );
        let id = data.next_stream_class_id;
        data.next_stream_class_id += 1;
        Ok(self.push_stream_class(&mut data, id))
    }

    /// Creates a stream class with the caller-supplied `id`.
    ///
    /// # Errors
    ///
    /// Fails when the trace class assigns IDs automatically
    /// (`not-assigns-automatic-stream-class-id`) or when `id` is already used
    /// (`unique-stream-class-id`).
    pub fn create_stream_class_with_id(&self, id: u64) -> Result<StreamClass> {
        let mut data = write(&self.0 .0.data);
        ensure_pre!(
            !data.assigns_automatic_stream_class_id,
            "not-assigns-automatic-stream-class-id",
            "Trace class automatically assigns stream class IDs"
        );
        ensure_pre!(
            !data.stream_classes.iter().any(|sc| sc.id == id),
            "unique-stream-class-id",
            "Duplicate stream class ID: {id}"
        );
        Ok(self.push_stream_class(&mut data, id))
    }

    fn push_stream_class(&self, data: &mut TraceClassData, id: u64) -> StreamClass {
        let inner = StreamClassInner::new(id);
        data.stream_classes.push(Arc::clone(&inner));
        tracing::trace!(id, "Created stream class");
        StreamClass::from_parts(inner, self.as_const())
    }

    /// Read-write view of the stream class at `index`.
    pub fn stream_class_mut(&self, index: usize) -> Option<StreamClass> {
        let inner = read(&self.0 .0.data).stream_classes.get(index).cloned()?;
        Some(StreamClass::from_parts(inner, self.as_const()))
    }

    pub fn stream_class_by_id_mut(&self, id: u64) -> Option<StreamClass> {
        let inner = read(&self.0 .0.data).stream_classes.iter().find(|sc| sc.id == id).cloned()?;
        Some(StreamClass::from_parts(inner, self.as_const()))
    }

    /// Creates a trace conforming to this class.
    pub fn instantiate(&self) -> Trace {
        Trace::new(self.as_const())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn automatic_ids_are_sequential_and_stable() {
        let tc = TraceClass::new();
        let a = tc.create_stream_class().unwrap();
        let b = tc.create_stream_class().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!((a.id(), b.id()), (0, 1));
        assert_eq!(tc.stream_class_count(), 2);
        assert_eq!(tc.stream_class(0).map(|sc| sc.id()), Some(0));
        assert_eq!(tc.stream_class(1).map(|sc| sc.id()), Some(1));
        assert_eq!(tc.stream_class_by_id(1).map(|sc| sc.id()), Some(1));
        assert!(tc.stream_class_by_id(7).is_none());
    }

    #[test]
    fn explicit_ids_require_explicit_mode() {
        let tc = TraceClass::new();
        let err = tc.create_stream_class_with_id(5).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("not-assigns-automatic-stream-class-id"));

        tc.set_assigns_automatic_stream_class_id(false).unwrap();
        let sc = tc.create_stream_class_with_id(5).unwrap();
        assert_eq!(sc.id(), 5);
        let err = tc.create_stream_class_with_id(5).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("unique-stream-class-id"));
        assert!(tc.create_stream_class().is_err());
    }

    #[test]
    fn child_keeps_parent_alive() {
        let sc = {
            let tc = TraceClass::new();
            tc.create_stream_class().unwrap()
        };
        assert_eq!(sc.trace_class().stream_class_count(), 1);
    }
}
