// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::field_class::Field;
use super::stream::ConstStream;
use crate::error::Result;
use crate::object::{read, write, FreezeState};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, RwLock};

pub(crate) struct PacketInner {
    stream: ConstStream,
    frozen: FreezeState,
    context_field: RwLock<Option<Field>>,
}

/// Read-only view of a packet.
#[derive(Clone)]
pub struct ConstPacket(Arc<PacketInner>);

/// Read-write view of a packet.
#[derive(Clone)]
pub struct Packet(ConstPacket);

impl Deref for Packet {
    type Target = ConstPacket;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ConstPacket {
    pub fn stream(&self) -> &ConstStream {
        &self.0.stream
    }

    /// Copy of the context field, present when the stream class has a packet
    /// context field class.
    pub fn context_field(&self) -> Option<Field> {
        read(&self.0.context_field).clone()
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
        self.0.stream.freeze();
    }
}

impl PartialEq for ConstPacket {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ConstPacket {}

impl fmt::Debug for ConstPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("stream_id", &self.0.stream.id())
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Packet {
    pub(crate) fn new(stream: ConstStream) -> Self {
        let context_field =
            stream.class().packet_context_field_class().map(|fc| Field::from_class(&fc));
        Self(ConstPacket(Arc::new(PacketInner {
            stream,
            frozen: FreezeState::new(),
            context_field: RwLock::new(context_field),
        })))
    }

    pub fn as_const(&self) -> ConstPacket {
        self.0.clone()
    }

    /// Runs `f` on the context field, if any, and returns its result.
    ///
    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn with_context_field_mut<R>(&self, f: impl FnOnce(&mut Field) -> R) -> Result<Option<R>> {
        self.0 .0.frozen.ensure_mutable("Packet")?;
        Ok(write(&self.0 .0.context_field).as_mut().map(f))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::trace_ir::{Field, FieldClass, TraceClass};

    #[test]
    fn context_field_is_mutable_until_frozen() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_supports_packets(true, false, false).unwrap();
        sc.set_packet_context_field_class(
            FieldClass::structure().member("cpu", FieldClass::unsigned_integer(8).unwrap()).build().unwrap(),
        )
        .unwrap();
        let trace = tc.instantiate();
        let stream = sc.instantiate(&trace).unwrap();
        let packet = stream.create_packet().unwrap();

        let updated = packet
            .with_context_field_mut(|ctx| {
                *ctx.member_mut("cpu").unwrap() = Field::UnsignedInteger(3);
            })
            .unwrap();
        assert!(updated.is_some());
        let ctx = packet.context_field().unwrap();
        assert_eq!(ctx.member("cpu").and_then(Field::as_unsigned), Some(3));

        packet.freeze();
        assert!(stream.is_frozen());
        assert!(trace.is_frozen());
        if crate::precondition::DEV_CHECKS_ENABLED {
            assert!(packet.with_context_field_mut(|_| ()).is_err());
        }
    }
}
