// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Event classes.

use super::field_class::FieldClass;
use super::stream_class::ConstStreamClass;
use crate::error::Result;
use crate::object::{read, try_string, write, FreezeState, UserAttributes};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, RwLock};

/// Severity attached to an event class, from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClassLogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    DebugSystem,
    DebugProgram,
    DebugProcess,
    DebugModule,
    DebugUnit,
    DebugFunction,
    DebugLine,
    Debug,
}

#[derive(Default)]
struct EventClassData {
    name: Option<String>,
    user_attributes: UserAttributes,
    log_level: Option<EventClassLogLevel>,
    emf_uri: Option<String>,
    specific_context_field_class: Option<FieldClass>,
    payload_field_class: Option<FieldClass>,
}

pub(crate) struct EventClassInner {
    pub(crate) id: u64,
    frozen: FreezeState,
    data: RwLock<EventClassData>,
}

impl EventClassInner {
    pub(crate) fn new(id: u64) -> Arc<Self> {
        Arc::new(Self { id, frozen: FreezeState::new(), data: RwLock::default() })
    }
}

/// Read-only view of an event class.
#[derive(Clone)]
pub struct ConstEventClass {
    inner: Arc<EventClassInner>,
    stream_class: ConstStreamClass,
}

/// Read-write view of an event class.
#[derive(Clone)]
pub struct EventClass(ConstEventClass);

impl Deref for EventClass {
    type Target = ConstEventClass;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ConstEventClass {
    pub(crate) const fn from_parts(
        inner: Arc<EventClassInner>,
        stream_class: ConstStreamClass,
    ) -> Self {
        Self { inner, stream_class }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub const fn stream_class(&self) -> &ConstStreamClass {
        &self.stream_class
    }

    pub fn name(&self) -> Option<String> {
        read(&self.inner.data).name.clone()
    }

    pub fn user_attributes(&self) -> UserAttributes {
        read(&self.inner.data).user_attributes.clone()
    }

    pub fn log_level(&self) -> Option<EventClassLogLevel> {
        read(&self.inner.data).log_level
    }

    pub fn emf_uri(&self) -> Option<String> {
        read(&self.inner.data).emf_uri.clone()
    }

    pub fn specific_context_field_class(&self) -> Option<FieldClass> {
        read(&self.inner.data).specific_context_field_class.clone()
    }

    pub fn payload_field_class(&self) -> Option<FieldClass> {
        read(&self.inner.data).payload_field_class.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.is_frozen()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn freeze(&self) {
        if self.inner.frozen.is_frozen() {
            return;
        }
        self.inner.frozen.freeze();
        self.stream_class.freeze();
    }
}

impl PartialEq for ConstEventClass {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ConstEventClass {}

impl fmt::Debug for ConstEventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = read(&self.inner.data);
        f.debug_struct("EventClass")
            .field("id", &self.inner.id)
            .field("name", &data.name)
            .field("log_level", &data.log_level)
            .field("stream_class_id", &self.stream_class.id())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl EventClass {
    pub(crate) const fn from_parts(
        inner: Arc<EventClassInner>,
        stream_class: ConstStreamClass,
    ) -> Self {
        Self(ConstEventClass::from_parts(inner, stream_class))
    }

    pub fn as_const(&self) -> ConstEventClass {
        self.0.clone()
    }

    fn ensure_mutable(&self) -> Result<()> {
        self.0.inner.frozen.ensure_mutable("Event class")
    }

    /// # Errors
    ///
    /// Fails with [`crate::TraceError::Memory`] if the name cannot be copied.
    pub fn set_name(&self, name: &str) -> Result<()> {
        self.ensure_mutable()?;
        let name = try_string(name)?;
        write(&self.0.inner.data).name = Some(name);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_user_attributes(&self, attributes: UserAttributes) -> Result<()> {
        self.ensure_mutable()?;
        write(&self.0.inner.data).user_attributes = attributes;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_log_level(&self, log_level: EventClassLogLevel) -> Result<()> {
        self.ensure_mutable()?;
        write(&self.0.inner.data).log_level = Some(log_level);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with [`crate::TraceError::Memory`] if the URI cannot be copied.
    pub fn set_emf_uri(&self, emf_uri: &str) -> Result<()> {
        self.ensure_mutable()?;
        let emf_uri = try_string(emf_uri)?;
        write(&self.0.inner.data).emf_uri = Some(emf_uri);
        Ok(())
    }

    /// # Errors
    ///
    /// Requires a structure field class.
    pub fn set_specific_context_field_class(&self, field_class: FieldClass) -> Result<()> {
        self.ensure_mutable()?;
        ensure_pre!(
            field_class.is_structure(),
            "is-structure-field-class",
            "Specific context field class is not a structure field class"
        );
        write(&self.0.inner.data).specific_context_field_class = Some(field_class);
        Ok(())
    }

    /// # Errors
    ///
    /// Requires a structure field class.
    pub fn set_payload_field_class(&self, field_class: FieldClass) -> Result<()> {
        self.ensure_mutable()?;
        ensure_pre!(
            field_class.is_structure(),
            "is-structure-field-class",
            "Payload field class is not a structure field class"
        );
        write(&self.0.inner.data).payload_field_class = Some(field_class);
        Ok(())
    }
}
