// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-stream message sequence checks applied to what iterators return.

use crate::error::Result;
use crate::message::{Message, MessageType};
use crate::trace_ir::{ConstPacket, ConstStream, StreamInner};
use std::collections::HashMap;
use std::sync::Weak;

#[derive(Debug)]
struct StreamState {
    /// Pins the address while tracked. Outlives the stream itself.
    _allocation: Weak<StreamInner>,
    /// `None` once the stream ended.
    active: Option<ConstStream>,
    open_packet: Option<ConstPacket>,
    last_clock_value: Option<u64>,
}

/// Tracks the state of every stream seen on one message iterator.
///
/// Checks are `post`-tier: they only run when developer checks are enabled.
#[derive(Debug, Default)]
pub struct MessageSequenceValidator {
    streams: HashMap<usize, StreamState>,
}

impl MessageSequenceValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every stream, as after a seek.
    pub fn reset(&mut self) {
        self.streams.clear();
    }

    /// Checks `msg` against what this iterator returned before.
    ///
    /// # Errors
    ///
    /// Returns a `post`-tier [`crate::TraceError::Precondition`] naming the
    /// broken ordering rule.
    pub fn check(&mut self, msg: &Message) -> Result<()> {
        if !crate::precondition::DEV_CHECKS_ENABLED {
            return Ok(());
        }
        let Some(stream) = msg.stream() else {
            return Ok(());
        };
        let msg_type = msg.message_type();
        let key = stream.addr();

        if msg_type == MessageType::StreamBeginning {
            ensure_post!(
                !self.streams.contains_key(&key),
                "stream-beginning-once",
                "Stream {} already began",
                stream.id()
            );
            self.streams.insert(
                key,
                StreamState {
                    _allocation: stream.downgrade(),
                    active: Some(stream.clone()),
                    open_packet: None,
                    last_clock_value: None,
                },
            );
        }

        let Some(state) = self.streams.get_mut(&key) else {
            ensure_post!(
                false,
                "stream-beginning-first",
                "{msg_type} message for stream {} before its stream beginning",
                stream.id()
            );
            return Ok(());
        };
        ensure_post!(
            state.active.is_some(),
            "no-message-after-stream-end",
            "{msg_type} message for stream {} after its stream end",
            stream.id()
        );

        if let Some(snapshot) = msg.default_clock_snapshot() {
            let value = snapshot.value();
            ensure_post!(
                state.last_clock_value.is_none_or(|last| value >= last),
                "clock-snapshots-monotonic",
                "Clock value {value} of {msg_type} message for stream {} goes back in time",
                stream.id()
            );
            state.last_clock_value = Some(value);
        }

        match msg {
            Message::PacketBeginning(packet_msg) => {
                ensure_post!(
                    state.open_packet.is_none(),
                    "no-open-packet",
                    "Packet beginning for stream {} while a packet is open",
                    stream.id()
                );
                state.open_packet = Some(packet_msg.packet().clone());
            },
            Message::PacketEnd(packet_msg) => {
                ensure_post!(
                    state.open_packet.as_ref().is_some_and(|open| open.ptr_eq(packet_msg.packet())),
                    "packet-end-matches-beginning",
                    "Packet end for stream {} does not close the open packet",
                    stream.id()
                );
                state.open_packet = None;
            },
            Message::Event(event_msg) => {
                if let Some(packet) = event_msg.event().packet() {
                    ensure_post!(
                        state.open_packet.as_ref().is_some_and(|open| open.ptr_eq(packet)),
                        "event-in-open-packet",
                        "Event for stream {} outside of its packet",
                        stream.id()
                    );
                }
            },
            Message::StreamEnd(_) => {
                ensure_post!(
                    state.open_packet.is_none(),
                    "no-open-packet-at-stream-end",
                    "Stream {} ends while a packet is open",
                    stream.id()
                );
                // Only a tombstone stays, so the stream and its trace can be released.
                state.active = None;
                state.last_clock_value = None;
            },
            _ => {},
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::{EventMessage, PacketMessage, StreamMessage};
    use crate::trace_ir::{ClockClass, TraceClass};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn violation_id(result: Result<()>) -> Option<&'static str> {
        result.err().and_then(|err| err.precondition().map(|v| v.id))
    }

    #[test]
    fn well_formed_sequence_passes() {
        if !crate::precondition::DEV_CHECKS_ENABLED {
            return;
        }
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_default_clock_class(ClockClass::new()).unwrap();
        sc.set_supports_packets(true, true, true).unwrap();
        let ec = sc.create_event_class().unwrap();
        let trace = tc.instantiate();
        let stream = sc.instantiate(&trace).unwrap();
        let packet = stream.create_packet().unwrap();

        let mut validator = MessageSequenceValidator::new();
        let sequence: Vec<Message> = vec![
            StreamMessage::beginning(&stream).into(),
            PacketMessage::beginning_with_default_clock_snapshot(&packet, 10).unwrap().into(),
            EventMessage::in_packet_with_default_clock_snapshot(&ec, &packet, 12).unwrap().into(),
            PacketMessage::end_with_default_clock_snapshot(&packet, 20).unwrap().into(),
            StreamMessage::end(&stream).into(),
        ];
        for msg in &sequence {
            validator.check(msg).unwrap();
        }

        let late = Message::from(StreamMessage::end(&stream));
        assert_eq!(violation_id(validator.check(&late)), Some("no-message-after-stream-end"));
    }

    #[test]
    fn ended_stream_is_not_kept_alive() {
        if !crate::precondition::DEV_CHECKS_ENABLED {
            return;
        }
        let released = Arc::new(AtomicBool::new(false));
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let trace = tc.instantiate();
        let flag = Arc::clone(&released);
        trace.add_destruction_listener(move || flag.store(true, Ordering::SeqCst));
        let stream = sc.instantiate(&trace).unwrap();

        let mut validator = MessageSequenceValidator::new();
        let beginning = Message::from(StreamMessage::beginning(&stream));
        let end = Message::from(StreamMessage::end(&stream));
        validator.check(&beginning).unwrap();
        validator.check(&end).unwrap();
        assert_eq!(violation_id(validator.check(&end)), Some("no-message-after-stream-end"));

        drop((beginning, end, stream, trace));
        assert!(released.load(Ordering::SeqCst));
        let state = validator.streams.values().next().unwrap();
        assert!(state.active.is_none());
        assert_eq!(state._allocation.strong_count(), 0);

        // The tombstone holds the old address, so a new stream is tracked apart.
        let trace = tc.instantiate();
        let next = sc.instantiate(&trace).unwrap();
        validator.check(&StreamMessage::beginning(&next).into()).unwrap();
        validator.check(&StreamMessage::end(&next).into()).unwrap();
        assert_eq!(validator.streams.len(), 2);
    }

    #[test]
    fn ordering_violations_are_named() {
        if !crate::precondition::DEV_CHECKS_ENABLED {
            return;
        }
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_default_clock_class(ClockClass::new()).unwrap();
        let ec = sc.create_event_class().unwrap();
        let trace = tc.instantiate();
        let stream = sc.instantiate(&trace).unwrap();

        let mut validator = MessageSequenceValidator::new();
        let early = Message::from(EventMessage::with_default_clock_snapshot(&ec, &stream, 1).unwrap());
        assert_eq!(violation_id(validator.check(&early)), Some("stream-beginning-first"));

        validator.check(&StreamMessage::beginning(&stream).into()).unwrap();
        let later = Message::from(EventMessage::with_default_clock_snapshot(&ec, &stream, 50).unwrap());
        validator.check(&later).unwrap();
        let back = Message::from(EventMessage::with_default_clock_snapshot(&ec, &stream, 49).unwrap());
        assert_eq!(violation_id(validator.check(&back)), Some("clock-snapshots-monotonic"));
    }
}
