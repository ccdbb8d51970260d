// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The message protocol.
//!
//! A [`Message`] is built and filled by its producer, then shared downstream as
//! a [`SharedMessage`]. Once shared it can no longer be mutated, and the trace
//! IR objects it references are frozen.

mod discarded;
mod event;
mod inactivity;
mod packet;
mod stream;

pub use discarded::{DiscardedItemsKind, DiscardedItemsMessage};
pub use event::EventMessage;
pub use inactivity::InactivityMessage;
pub use packet::{PacketMessage, PacketMessageKind};
pub use stream::{StreamMessage, StreamMessageKind};

use crate::trace_ir::{ClockSnapshot, ConstStream};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A message as handed between iterators.
pub type SharedMessage = Arc<Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    StreamBeginning,
    StreamEnd,
    Event,
    PacketBeginning,
    PacketEnd,
    DiscardedEvents,
    DiscardedPackets,
    MessageIteratorInactivity,
}

impl MessageType {
    pub const ALL: [Self; 8] = [
        Self::StreamBeginning,
        Self::StreamEnd,
        Self::Event,
        Self::PacketBeginning,
        Self::PacketEnd,
        Self::DiscardedEvents,
        Self::DiscardedPackets,
        Self::MessageIteratorInactivity,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StreamBeginning => "stream-beginning",
            Self::StreamEnd => "stream-end",
            Self::Event => "event",
            Self::PacketBeginning => "packet-beginning",
            Self::PacketEnd => "packet-end",
            Self::DiscardedEvents => "discarded-events",
            Self::DiscardedPackets => "discarded-packets",
            Self::MessageIteratorInactivity => "message-iterator-inactivity",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum Message {
    StreamBeginning(StreamMessage),
    StreamEnd(StreamMessage),
    Event(EventMessage),
    PacketBeginning(PacketMessage),
    PacketEnd(PacketMessage),
    DiscardedEvents(DiscardedItemsMessage),
    DiscardedPackets(DiscardedItemsMessage),
    MessageIteratorInactivity(InactivityMessage),
}

impl Message {
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::StreamBeginning(_) => MessageType::StreamBeginning,
            Self::StreamEnd(_) => MessageType::StreamEnd,
            Self::Event(_) => MessageType::Event,
            Self::PacketBeginning(_) => MessageType::PacketBeginning,
            Self::PacketEnd(_) => MessageType::PacketEnd,
            Self::DiscardedEvents(_) => MessageType::DiscardedEvents,
            Self::DiscardedPackets(_) => MessageType::DiscardedPackets,
            Self::MessageIteratorInactivity(_) => MessageType::MessageIteratorInactivity,
        }
    }

    pub const fn as_stream_beginning(&self) -> Option<&StreamMessage> {
        match self {
            Self::StreamBeginning(msg) => Some(msg),
            _ => None,
        }
    }

    pub const fn as_stream_end(&self) -> Option<&StreamMessage> {
        match self {
            Self::StreamEnd(msg) => Some(msg),
            _ => None,
        }
    }

    pub const fn as_event(&self) -> Option<&EventMessage> {
        match self {
            Self::Event(msg) => Some(msg),
            _ => None,
        }
    }

    pub const fn as_packet_beginning(&self) -> Option<&PacketMessage> {
        match self {
            Self::PacketBeginning(msg) => Some(msg),
            _ => None,
        }
    }

    pub const fn as_packet_end(&self) -> Option<&PacketMessage> {
        match self {
            Self::PacketEnd(msg) => Some(msg),
            _ => None,
        }
    }

    pub const fn as_discarded_events(&self) -> Option<&DiscardedItemsMessage> {
        match self {
            Self::DiscardedEvents(msg) => Some(msg),
            _ => None,
        }
    }

    pub const fn as_discarded_packets(&self) -> Option<&DiscardedItemsMessage> {
        match self {
            Self::DiscardedPackets(msg) => Some(msg),
            _ => None,
        }
    }

    pub const fn as_inactivity(&self) -> Option<&InactivityMessage> {
        match self {
            Self::MessageIteratorInactivity(msg) => Some(msg),
            _ => None,
        }
    }

    /// The stream this message belongs to; `None` for inactivity messages.
    pub fn stream(&self) -> Option<&ConstStream> {
        match self {
            Self::StreamBeginning(msg) | Self::StreamEnd(msg) => Some(msg.stream()),
            Self::Event(msg) => Some(msg.event().stream()),
            Self::PacketBeginning(msg) | Self::PacketEnd(msg) => Some(msg.packet().stream()),
            Self::DiscardedEvents(msg) | Self::DiscardedPackets(msg) => Some(msg.stream()),
            Self::MessageIteratorInactivity(_) => None,
        }
    }

    /// The snapshot that orders this message in time.
    ///
    /// Discarded-items messages report their beginning snapshot and inactivity
    /// messages their only one.
    pub const fn default_clock_snapshot(&self) -> Option<&ClockSnapshot> {
        match self {
            Self::StreamBeginning(msg) | Self::StreamEnd(msg) => msg.default_clock_snapshot(),
            Self::Event(msg) => msg.default_clock_snapshot(),
            Self::PacketBeginning(msg) | Self::PacketEnd(msg) => msg.default_clock_snapshot(),
            Self::DiscardedEvents(msg) | Self::DiscardedPackets(msg) => {
                msg.beginning_default_clock_snapshot()
            },
            Self::MessageIteratorInactivity(msg) => Some(msg.clock_snapshot()),
        }
    }

    /// Freezes every trace IR object this message references.
    pub(crate) fn freeze(&self) {
        match self {
            Self::Event(msg) => msg.event().freeze(),
            Self::PacketBeginning(msg) | Self::PacketEnd(msg) => msg.packet().freeze(),
            Self::MessageIteratorInactivity(msg) => msg.clock_snapshot().clock_class().freeze(),
            _ => {
                if let Some(stream) = self.stream() {
                    stream.freeze();
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::trace_ir::{ClockClass, StreamClass, Trace, TraceClass};

    fn stream_class_with_clock() -> (TraceClass, StreamClass) {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_default_clock_class(ClockClass::new()).unwrap();
        (tc, sc)
    }

    fn stream_of(tc: &TraceClass, sc: &StreamClass) -> (Trace, ConstStream) {
        let trace = tc.instantiate();
        let stream = sc.instantiate(&trace).unwrap().as_const();
        (trace, stream)
    }

    #[test]
    fn discarded_events_beginning_must_not_exceed_end() {
        let (tc, sc) = stream_class_with_clock();
        sc.set_supports_discarded_events(true, true).unwrap();
        let (_trace, stream) = stream_of(&tc, &sc);

        let err = DiscardedItemsMessage::events_with_default_clock_snapshots(&stream, 10, 5)
            .unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("beginning-le-end"));

        let msg =
            DiscardedItemsMessage::events_with_default_clock_snapshots(&stream, 5, 10).unwrap();
        assert_eq!(msg.beginning_default_clock_snapshot().map(ClockSnapshot::value), Some(5));
        assert_eq!(msg.end_default_clock_snapshot().map(ClockSnapshot::value), Some(10));

        let err = DiscardedItemsMessage::events(&stream).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("without-default-clock-snapshots"));
    }

    #[test]
    fn discarded_events_without_clock_snapshots() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_supports_discarded_events(true, false).unwrap();
        let (_trace, stream) = stream_of(&tc, &sc);

        let err = DiscardedItemsMessage::events_with_default_clock_snapshots(&stream, 1, 2)
            .unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("with-default-clock-snapshots"));

        let msg = DiscardedItemsMessage::events(&stream).unwrap();
        assert_eq!(msg.count(), None);
        assert!(msg.beginning_default_clock_snapshot().is_none());
    }

    #[test]
    fn discarded_count_must_be_positive() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_supports_packets(true, false, false).unwrap();
        sc.set_supports_discarded_packets(true, false).unwrap();
        let (_trace, stream) = stream_of(&tc, &sc);

        let mut msg = DiscardedItemsMessage::packets(&stream).unwrap();
        let err = msg.set_count(0).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("count-gt-0"));
        msg.set_count(42).unwrap();
        assert_eq!(msg.count(), Some(42));

        let msg = Message::from(msg);
        assert_eq!(msg.message_type(), MessageType::DiscardedPackets);
        assert!(msg.as_discarded_events().is_none());
        assert_eq!(msg.as_discarded_packets().and_then(DiscardedItemsMessage::count), Some(42));
    }

    #[test]
    fn discarded_events_need_support() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let (_trace, stream) = stream_of(&tc, &sc);
        let err = DiscardedItemsMessage::events(&stream).unwrap_err();
        assert_eq!(
            err.precondition().map(|v| v.id),
            Some("stream-class-supports-discarded-events")
        );
    }

    #[test]
    fn stream_snapshot_needs_default_clock_class() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let (_trace, stream) = stream_of(&tc, &sc);
        let mut msg = StreamMessage::beginning(&stream);
        let err = msg.set_default_clock_snapshot(3).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("has-default-clock-class"));

        // The class is still mutable: adding a clock class makes it legal.
        sc.set_default_clock_class(ClockClass::new()).unwrap();
        msg.set_default_clock_snapshot(3).unwrap();
        let msg = Message::from(msg);
        assert_eq!(msg.default_clock_snapshot().map(ClockSnapshot::value), Some(3));
        assert!(msg.as_stream_beginning().is_some());
    }

    #[test]
    fn event_clock_value_follows_default_clock_class() {
        let (tc, sc) = stream_class_with_clock();
        let ec = sc.create_event_class().unwrap();
        let (_trace, stream) = stream_of(&tc, &sc);

        let err = EventMessage::new(&ec, &stream).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("no-default-clock-class"));
        let msg = EventMessage::with_default_clock_snapshot(&ec, &stream, 77).unwrap();
        assert_eq!(msg.default_clock_snapshot().map(ClockSnapshot::value), Some(77));
        assert!(msg.event().packet().is_none());
    }

    #[test]
    fn packet_messages_follow_class_flags() {
        let (tc, sc) = stream_class_with_clock();
        sc.set_supports_packets(true, true, false).unwrap();
        let ec = sc.create_event_class().unwrap();
        let trace = tc.instantiate();
        let stream = sc.instantiate(&trace).unwrap();
        let packet = stream.create_packet().unwrap();

        let err = PacketMessage::beginning(&packet).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("without-default-clock-snapshot"));
        let begin = PacketMessage::beginning_with_default_clock_snapshot(&packet, 1).unwrap();
        let err = PacketMessage::end_with_default_clock_snapshot(&packet, 2).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("with-default-clock-snapshot"));
        let end = PacketMessage::end(&packet).unwrap();
        assert!(end.default_clock_snapshot().is_none());

        let err = EventMessage::with_default_clock_snapshot(&ec, &stream, 1).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("stream-class-supports-packets"));
        let event = EventMessage::in_packet_with_default_clock_snapshot(&ec, &packet, 1).unwrap();
        assert!(event.event().packet().is_some_and(|p| p.ptr_eq(&packet)));

        let begin = Message::from(begin);
        begin.freeze();
        assert!(packet.is_frozen());
        assert!(sc.is_frozen());
    }

    #[test]
    fn inactivity_carries_one_snapshot() {
        let cc = ClockClass::new();
        let msg = Message::from(InactivityMessage::new(&cc, 500));
        assert_eq!(msg.message_type(), MessageType::MessageIteratorInactivity);
        assert!(msg.stream().is_none());
        assert_eq!(msg.default_clock_snapshot().map(ClockSnapshot::value), Some(500));
    }
}
