// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::packet::Packet;
use super::stream_class::ConstStreamClass;
use super::trace::ConstTrace;
use crate::error::Result;
use crate::object::{read, try_string, write, FreezeState, UserAttributes};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, RwLock, Weak};

#[derive(Default)]
struct StreamData {
    name: Option<String>,
    user_attributes: UserAttributes,
}

pub(crate) struct StreamInner {
    pub(crate) id: u64,
    pub(crate) class: ConstStreamClass,
    frozen: FreezeState,
    data: RwLock<StreamData>,
}

impl StreamInner {
    pub(crate) fn new(id: u64, class: ConstStreamClass) -> Arc<Self> {
        Arc::new(Self { id, class, frozen: FreezeState::new(), data: RwLock::default() })
    }
}

/// Read-only view of a stream. Holds its trace alive.
#[derive(Clone)]
pub struct ConstStream {
    inner: Arc<StreamInner>,
    trace: ConstTrace,
}

/// Read-write view of a stream.
#[derive(Clone)]
pub struct Stream(ConstStream);

impl Deref for Stream {
    type Target = ConstStream;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ConstStream {
    pub(crate) const fn from_parts(inner: Arc<StreamInner>, trace: ConstTrace) -> Self {
        Self { inner, trace }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn class(&self) -> &ConstStreamClass {
        &self.inner.class
    }

    pub const fn trace(&self) -> &ConstTrace {
        &self.trace
    }

    pub fn name(&self) -> Option<String> {
        read(&self.inner.data).name.clone()
    }

    pub fn user_attributes(&self) -> UserAttributes {
        read(&self.inner.data).user_attributes.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.is_frozen()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address of the shared object; stable for the stream's lifetime.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Keeps the allocation, and so [`Self::addr`], without keeping the stream.
    pub(crate) fn downgrade(&self) -> Weak<StreamInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn freeze(&self) {
        if self.inner.frozen.is_frozen() {
            return;
        }
        self.inner.frozen.freeze();
        self.inner.class.freeze();
        self.trace.freeze();
    }
}

impl PartialEq for ConstStream {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ConstStream {}

impl fmt::Debug for ConstStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id)
            .field("class_id", &self.inner.class.id())
            .field("name", &read(&self.inner.data).name)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Stream {
    pub(crate) const fn from_parts(inner: Arc<StreamInner>, trace: ConstTrace) -> Self {
        Self(ConstStream::from_parts(inner, trace))
    }

    pub fn as_const(&self) -> ConstStream {
        self.0.clone()
    }

    /// # Errors
    ///
    /// Fails with [`crate::TraceError::Memory`] if the name cannot be copied.
    pub fn set_name(&self, name: &str) -> Result<()> {
        self.0.inner.frozen.ensure_mutable("Stream")?;
        let name = try_string(name)?;
        write(&self.0.inner.data).name = Some(name);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_user_attributes(&self, attributes: UserAttributes) -> Result<()> {
        self.0.inner.frozen.ensure_mutable("Stream")?;
        write(&self.0.inner.data).user_attributes = attributes;
        Ok(())
    }

    /// Creates a packet in this stream. The stream keeps no reference to it.
    ///
    /// # Errors
    ///
    /// Fails with the `supports-packets` violation if the stream class does not
    /// support packets.
    pub fn create_packet(&self) -> Result<Packet> {
        ensure_pre!(
            self.class().supports_packets(),
            "supports-packets",
            "Stream class {} does not support packets",
            self.class().id()
        );
        Ok(Packet::new(self.as_const()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::trace_ir::{FieldClass, TraceClass};

    #[test]
    fn packets_need_packet_support() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let trace = tc.instantiate();
        let stream = sc.instantiate(&trace).unwrap();
        let err = stream.create_packet().unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("supports-packets"));
    }

    #[test]
    fn packet_context_is_instantiated_from_class() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_supports_packets(true, false, false).unwrap();
        let ctx = FieldClass::structure()
            .member("seq_num", FieldClass::unsigned_integer(64).unwrap())
            .build()
            .unwrap();
        sc.set_packet_context_field_class(ctx).unwrap();
        let trace = tc.instantiate();
        let stream = sc.instantiate(&trace).unwrap();
        stream.set_name("cpu0").unwrap();

        let packet = stream.create_packet().unwrap();
        assert!(packet.stream().ptr_eq(&stream));
        let ctx = packet.context_field().unwrap();
        assert_eq!(ctx.member("seq_num").and_then(|f| f.as_unsigned()), Some(0));
        assert_eq!(stream.name().as_deref(), Some("cpu0"));
    }
}
