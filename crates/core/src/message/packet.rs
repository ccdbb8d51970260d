// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::Message;
use crate::error::Result;
use crate::trace_ir::{ClockSnapshot, ConstPacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketMessageKind {
    Beginning,
    End,
}

/// Packet beginning or packet end.
///
/// Whether a default clock snapshot is mandatory or forbidden follows the
/// stream class's `packets_have_{beginning,end}_default_clock_snapshot` flags.
#[derive(Debug)]
pub struct PacketMessage {
    kind: PacketMessageKind,
    packet: ConstPacket,
    default_clock_snapshot: Option<ClockSnapshot>,
}

impl PacketMessage {
    /// # Errors
    ///
    /// Fails with `without-default-clock-snapshot` if the stream class requires
    /// a snapshot on packet beginning messages.
    pub fn beginning(packet: &ConstPacket) -> Result<Self> {
        Self::create(PacketMessageKind::Beginning, packet, None)
    }

    /// # Errors
    ///
    /// Fails with `with-default-clock-snapshot` if the stream class does not
    /// expect a snapshot on packet beginning messages.
    pub fn beginning_with_default_clock_snapshot(packet: &ConstPacket, value: u64) -> Result<Self> {
        Self::create(PacketMessageKind::Beginning, packet, Some(value))
    }

    /// # Errors
    ///
    /// See [`PacketMessage::beginning`].
    pub fn end(packet: &ConstPacket) -> Result<Self> {
        Self::create(PacketMessageKind::End, packet, None)
    }

    /// # Errors
    ///
    /// See [`PacketMessage::beginning_with_default_clock_snapshot`].
    pub fn end_with_default_clock_snapshot(packet: &ConstPacket, value: u64) -> Result<Self> {
        Self::create(PacketMessageKind::End, packet, Some(value))
    }

    fn create(kind: PacketMessageKind, packet: &ConstPacket, value: Option<u64>) -> Result<Self> {
        let stream_class = packet.stream().class();
        let with_snapshot = match kind {
            PacketMessageKind::Beginning => stream_class.packets_have_beginning_default_clock_snapshot(),
            PacketMessageKind::End => stream_class.packets_have_end_default_clock_snapshot(),
        };
        ensure_pre!(
            stream_class.supports_packets(),
            "stream-class-supports-packets",
            "Stream class {} does not support packets",
            stream_class.id()
        );
        let default_clock_snapshot = match value {
            Some(value) => {
                ensure_pre!(
                    with_snapshot,
                    "with-default-clock-snapshot",
                    "Packet {kind:?} messages of stream class {} have no default clock snapshot",
                    stream_class.id()
                );
                stream_class.default_clock_class().map(|cc| cc.create_snapshot(value))
            },
            None => {
                ensure_pre!(
                    !with_snapshot,
                    "without-default-clock-snapshot",
                    "Packet {kind:?} messages of stream class {} need a default clock snapshot",
                    stream_class.id()
                );
                None
            },
        };
        Ok(Self { kind, packet: packet.clone(), default_clock_snapshot })
    }

    pub const fn kind(&self) -> PacketMessageKind {
        self.kind
    }

    pub const fn packet(&self) -> &ConstPacket {
        &self.packet
    }

    pub const fn default_clock_snapshot(&self) -> Option<&ClockSnapshot> {
        self.default_clock_snapshot.as_ref()
    }
}

impl From<PacketMessage> for Message {
    fn from(msg: PacketMessage) -> Self {
        match msg.kind {
            PacketMessageKind::Beginning => Self::PacketBeginning(msg),
            PacketMessageKind::End => Self::PacketEnd(msg),
        }
    }
}
