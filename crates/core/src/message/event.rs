// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::Message;
use crate::error::Result;
use crate::trace_ir::{ClockSnapshot, ConstEventClass, ConstPacket, ConstStream, Event};

/// Message carrying one [`Event`].
///
/// The raw default clock value is required exactly when the stream class has
/// a default clock class.
#[derive(Debug)]
pub struct EventMessage {
    event: Event,
    default_clock_snapshot: Option<ClockSnapshot>,
}

impl EventMessage {
    /// Event in a stream whose class does not support packets.
    ///
    /// # Errors
    ///
    /// Fails if the event class belongs to another stream class, if the stream
    /// class supports packets or if it has a default clock class.
    pub fn new(class: &ConstEventClass, stream: &ConstStream) -> Result<Self> {
        Self::create(class, stream, None, None)
    }

    /// # Errors
    ///
    /// Like [`EventMessage::new`], but the stream class must have a default
    /// clock class.
    pub fn with_default_clock_snapshot(
        class: &ConstEventClass,
        stream: &ConstStream,
        value: u64,
    ) -> Result<Self> {
        Self::create(class, stream, None, Some(value))
    }

    /// Event in `packet`.
    ///
    /// # Errors
    ///
    /// Fails if the event class belongs to another stream class or if the
    /// stream class has a default clock class.
    pub fn new_in_packet(class: &ConstEventClass, packet: &ConstPacket) -> Result<Self> {
        Self::create(class, packet.stream(), Some(packet), None)
    }

    /// # Errors
    ///
    /// Like [`EventMessage::new_in_packet`], but the stream class must have a
    /// default clock class.
    pub fn in_packet_with_default_clock_snapshot(
        class: &ConstEventClass,
        packet: &ConstPacket,
        value: u64,
    ) -> Result<Self> {
        Self::create(class, packet.stream(), Some(packet), Some(value))
    }

    fn create(
        class: &ConstEventClass,
        stream: &ConstStream,
        packet: Option<&ConstPacket>,
        value: Option<u64>,
    ) -> Result<Self> {
        let stream_class = stream.class();
        ensure_pre!(
            class.stream_class().ptr_eq(stream_class),
            "event-class-stream-class-is-stream-class",
            "Event class {} does not belong to stream class {}",
            class.id(),
            stream_class.id()
        );
        ensure_pre!(
            stream_class.supports_packets() == packet.is_some(),
            "stream-class-supports-packets",
            "Stream class {} {} packets",
            stream_class.id(),
            if stream_class.supports_packets() { "requires" } else { "does not support" }
        );
        let clock_class = stream_class.default_clock_class();
        let default_clock_snapshot = match value {
            Some(value) => {
                ensure_pre!(
                    clock_class.is_some(),
                    "has-default-clock-class",
                    "Stream class {} has no default clock class",
                    stream_class.id()
                );
                clock_class.map(|cc| cc.create_snapshot(value))
            },
            None => {
                ensure_pre!(
                    clock_class.is_none(),
                    "no-default-clock-class",
                    "Stream class {} has a default clock class: a clock value is required",
                    stream_class.id()
                );
                None
            },
        };
        let event = Event::new(class.clone(), stream.clone(), packet.cloned());
        Ok(Self { event, default_clock_snapshot })
    }

    pub const fn event(&self) -> &Event {
        &self.event
    }

    /// Mutable access to the event's fields, only possible before the message
    /// is shared.
    pub fn event_mut(&mut self) -> &mut Event {
        &mut self.event
    }

    pub const fn default_clock_snapshot(&self) -> Option<&ClockSnapshot> {
        self.default_clock_snapshot.as_ref()
    }
}

impl From<EventMessage> for Message {
    fn from(msg: EventMessage) -> Self {
        Self::Event(msg)
    }
}
