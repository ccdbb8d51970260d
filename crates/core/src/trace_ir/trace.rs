// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Traces: runtime instances of a trace class, owning streams.

use super::stream::{ConstStream, Stream, StreamInner};
use super::stream_class::ConstStreamClass;
use super::trace_class::ConstTraceClass;
use crate::error::Result;
use crate::object::{lock, read, try_string, write, FreezeState, UserAttributes};
use crate::precondition::{violation, CheckTier};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// Value of a trace environment entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvironmentValue {
    Integer(i64),
    String(String),
}

/// Identifier returned by [`ConstTrace::add_destruction_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestructionListenerId(u64);

type DestructionListener = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TraceData {
    name: Option<String>,
    uuid: Option<Uuid>,
    user_attributes: UserAttributes,
    environment: IndexMap<String, EnvironmentValue>,
    streams: Vec<Arc<StreamInner>>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(DestructionListenerId, DestructionListener)>,
}

pub(crate) struct TraceInner {
    class: ConstTraceClass,
    frozen: FreezeState,
    data: RwLock<TraceData>,
    listeners: Mutex<Listeners>,
}

impl Drop for TraceInner {
    fn drop(&mut self) {
        let entries = std::mem::take(&mut lock(&self.listeners).entries);
        for (_, listener) in entries {
            listener();
        }
    }
}

/// Read-only view of a trace.
#[derive(Clone)]
pub struct ConstTrace(pub(crate) Arc<TraceInner>);

/// Read-write view of a trace.
#[derive(Clone)]
pub struct Trace(ConstTrace);

impl Deref for Trace {
    type Target = ConstTrace;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ConstTrace {
    pub fn class(&self) -> &ConstTraceClass {
        &self.0.class
    }

    pub fn name(&self) -> Option<String> {
        read(&self.0.data).name.clone()
    }

    pub fn uuid(&self) -> Option<Uuid> {
        read(&self.0.data).uuid
    }

    pub fn user_attributes(&self) -> UserAttributes {
        read(&self.0.data).user_attributes.clone()
    }

    pub fn environment_entry_count(&self) -> usize {
        read(&self.0.data).environment.len()
    }

    /// Environment entry at `index`, in insertion order.
    pub fn environment_entry(&self, index: usize) -> Option<(String, EnvironmentValue)> {
        read(&self.0.data)
            .environment
            .get_index(index)
            .map(|(name, value)| (name.clone(), value.clone()))
    }

    pub fn environment_entry_by_name(&self, name: &str) -> Option<EnvironmentValue> {
        read(&self.0.data).environment.get(name).cloned()
    }

    pub fn stream_count(&self) -> usize {
        read(&self.0.data).streams.len()
    }

    pub fn stream(&self, index: usize) -> Option<ConstStream> {
        let inner = read(&self.0.data).streams.get(index).cloned()?;
        Some(ConstStream::from_parts(inner, self.clone()))
    }

    /// First stream with ID `id`, whatever its class.
    pub fn stream_by_id(&self, id: u64) -> Option<ConstStream> {
        let inner = read(&self.0.data).streams.iter().find(|s| s.id == id).cloned()?;
        Some(ConstStream::from_parts(inner, self.clone()))
    }

    /// Registers `listener` to run once, when the last handle on this trace drops.
    pub fn add_destruction_listener(
        &self,
        listener: impl FnOnce() + Send + 'static,
    ) -> DestructionListenerId {
        let mut listeners = lock(&self.0.listeners);
        let id = DestructionListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, Box::new(listener)));
        id
    }

    /// Returns whether a listener with this ID was registered.
    pub fn remove_destruction_listener(&self, id: DestructionListenerId) -> bool {
        let mut listeners = lock(&self.0.listeners);
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry_id, _)| *entry_id != id);
        listeners.entries.len() != before
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.is_frozen()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn freeze(&self) {
        if self.0.frozen.is_frozen() {
            return;
        }
        self.0.frozen.freeze();
        self.0.class.freeze();
    }
}

impl PartialEq for ConstTrace {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ConstTrace {}

impl fmt::Debug for ConstTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = read(&self.0.data);
        f.debug_struct("Trace")
            .field("name", &data.name)
            .field("uuid", &data.uuid)
            .field("stream_count", &data.streams.len())
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Trace {
    pub(crate) fn new(class: ConstTraceClass) -> Self {
        Self(ConstTrace(Arc::new(TraceInner {
            class,
            frozen: FreezeState::new(),
            data: RwLock::default(),
            listeners: Mutex::default(),
        })))
    }

    pub fn as_const(&self) -> ConstTrace {
        self.0.clone()
    }

    fn ensure_mutable(&self) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Trace")
    }

    /// # Errors
    ///
    /// Fails with [`crate::TraceError::Memory`] if the name cannot be copied.
    pub fn set_name(&self, name: &str) -> Result<()> {
        self.ensure_mutable()?;
        let name = try_string(name)?;
        write(&self.0 .0.data).name = Some(name);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_uuid(&self, uuid: Uuid) -> Result<()> {
        self.ensure_mutable()?;
        write(&self.0 .0.data).uuid = Some(uuid);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_user_attributes(&self, attributes: UserAttributes) -> Result<()> {
        self.ensure_mutable()?;
        write(&self.0 .0.data).user_attributes = attributes;
        Ok(())
    }

    /// Sets an environment entry, replacing any entry with the same name in place.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::TraceError::Memory`] if the name cannot be copied.
    pub fn set_environment_entry(&self, name: &str, value: EnvironmentValue) -> Result<()> {
        self.ensure_mutable()?;
        let name = try_string(name)?;
        write(&self.0 .0.data).environment.insert(name, value);
        Ok(())
    }

    /// # Errors
    ///
    /// See [`Trace::set_environment_entry`].
    pub fn set_environment_entry_integer(&self, name: &str, value: i64) -> Result<()> {
        self.set_environment_entry(name, EnvironmentValue::Integer(value))
    }

    /// # Errors
    ///
    /// See [`Trace::set_environment_entry`].
    pub fn set_environment_entry_string(&self, name: &str, value: &str) -> Result<()> {
        let value = try_string(value)?;
        self.set_environment_entry(name, EnvironmentValue::String(value))
    }

    pub fn stream_mut(&self, index: usize) -> Option<Stream> {
        let inner = read(&self.0 .0.data).streams.get(index).cloned()?;
        Some(Stream::from_parts(inner, self.as_const()))
    }

    /// Adds a stream of `class`. With `id == None` the ID is one past the greatest
    /// ID among the streams of that class, or 0.
    pub(crate) fn add_stream(&self, class: ConstStreamClass, id: Option<u64>) -> Result<Stream> {
        ensure_pre!(
            class.trace_class().ptr_eq(self.class()),
            "stream-class-trace-class-is-trace-class",
            "Stream class does not belong to the trace's class"
        );
        let mut data = write(&self.0 .0.data);
        let mut same_class = data.streams.iter().filter(|s| s.class.ptr_eq(&class));
        let id = match id {
            Some(id) => {
                ensure_pre!(
                    !same_class.any(|s| s.id == id),
                    "unique-stream-id",
                    "Duplicate stream ID {id} for stream class {}",
                    class.id()
                );
                id
            },
            None => {
                let next = same_class.map(|s| s.id).max().map_or(Some(0), |last| last.checked_add(1));
                let Some(next) = next else {
                    return Err(violation(
                        CheckTier::Pre,
                        "stream-id-is-available",
                        format!("No stream ID left after {} for stream class {}", u64::MAX, class.id()),
                    )
                    .into());
                };
                next
            },
        };
        let inner = StreamInner::new(id, class);
        data.streams.push(Arc::clone(&inner));
        tracing::trace!(id, "Created stream");
        Ok(Stream::from_parts(inner, self.as_const()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::trace_ir::TraceClass;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn environment_replaces_in_place() {
        let trace = TraceClass::new().instantiate();
        trace.set_environment_entry_string("hostname", "node-1").unwrap();
        trace.set_environment_entry_integer("tracer_major", 2).unwrap();
        trace.set_environment_entry_string("hostname", "node-2").unwrap();

        assert_eq!(trace.environment_entry_count(), 2);
        assert_eq!(
            trace.environment_entry(0),
            Some(("hostname".to_string(), EnvironmentValue::String("node-2".to_string())))
        );
        assert_eq!(
            trace.environment_entry_by_name("tracer_major"),
            Some(EnvironmentValue::Integer(2))
        );
    }

    #[test]
    fn streams_get_per_class_ids() {
        let tc = TraceClass::new();
        let sc_a = tc.create_stream_class().unwrap();
        let sc_b = tc.create_stream_class().unwrap();
        let trace = tc.instantiate();

        let a0 = sc_a.instantiate(&trace).unwrap();
        let a1 = sc_a.instantiate(&trace).unwrap();
        let b0 = sc_b.instantiate(&trace).unwrap();
        assert_eq!((a0.id(), a1.id(), b0.id()), (0, 1, 0));
        assert_eq!(trace.stream_count(), 3);
        assert!(trace.stream(1).unwrap().class().ptr_eq(&sc_a));
    }

    #[test]
    fn automatic_stream_ids_do_not_wrap() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let trace = tc.instantiate();
        sc.set_assigns_automatic_stream_id(false).unwrap();
        sc.instantiate_with_id(&trace, u64::MAX).unwrap();
        sc.instantiate_with_id(&trace, 3).unwrap();
        sc.set_assigns_automatic_stream_id(true).unwrap();

        let err = sc.instantiate(&trace).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("stream-id-is-available"));
        assert_eq!(trace.stream_count(), 2);
    }

    #[test]
    fn explicit_stream_ids_are_unique_per_class() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_assigns_automatic_stream_id(false).unwrap();
        let trace = tc.instantiate();
        sc.instantiate_with_id(&trace, 9).unwrap();
        let err = sc.instantiate_with_id(&trace, 9).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("unique-stream-id"));
        assert!(sc.instantiate(&trace).is_err());
    }

    #[test]
    fn stream_class_must_belong_to_trace_class() {
        let sc = TraceClass::new().create_stream_class().unwrap();
        let other = TraceClass::new().instantiate();
        let err = sc.instantiate(&other).unwrap_err();
        assert_eq!(
            err.precondition().map(|v| v.id),
            Some("stream-class-trace-class-is-trace-class")
        );
    }

    #[test]
    fn destruction_listeners_fire_once_on_last_drop() {
        let fired = Arc::new(AtomicUsize::new(0));
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let trace = tc.instantiate();

        let counter = Arc::clone(&fired);
        trace.add_destruction_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let removed = trace.add_destruction_listener(|| panic!("removed listener ran"));
        assert!(trace.remove_destruction_listener(removed));

        let stream = sc.instantiate(&trace).unwrap();
        drop(trace);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        drop(stream);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
