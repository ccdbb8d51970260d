// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Muxer filter: merges its upstream message sequences by time.
//!
//! Each pull picks the youngest message among the heads of the upstream
//! queues. Messages without a usable timestamp take the timestamp of the
//! last returned message. All clock classes seen must be compatible with
//! the first one: either all absolute, all sharing one UUID, or one and the
//! same clock class.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;
use tracegraph_core::component::{PortInfo, SelfComponent};
use tracegraph_core::component_class::{IteratorStatus, SeekStatus};
use tracegraph_core::error::{ErrorContext, Result, TraceError};
use tracegraph_core::iterator::{
    IteratorConfiguration, IteratorNext, MessageBatch, MessageIterator, SeekOutcome,
    SelfMessageIterator,
};
use tracegraph_core::message::{Message, SharedMessage};
use tracegraph_core::plugin::descriptor::{
    ComponentClassAttribute, ComponentClassDescriptorKind, DescriptorTables,
};
use tracegraph_core::trace_ir::ConstClockClass;
use uuid::Uuid;

pub const CLASS_NAME: &str = "muxer";
const OUTPUT_PORT: &str = "out";

fn input_port_name(index: usize) -> String {
    format!("in{index}")
}

/// What the muxer expects from the next clock class it sees.
#[derive(Debug, Clone)]
enum ClockExpectation {
    /// Nothing seen yet.
    Any,
    /// Messages carry no clock class.
    None,
    Absolute,
    NotAbsoluteWithUuid(Uuid),
    NotAbsoluteWithoutUuid(ConstClockClass),
}

impl ClockExpectation {
    fn from_clock_class(clock_class: Option<&ConstClockClass>) -> Self {
        match clock_class {
            None => Self::None,
            Some(cc) if cc.origin_is_unix_epoch() => Self::Absolute,
            Some(cc) => cc
                .uuid()
                .map_or_else(|| Self::NotAbsoluteWithoutUuid(cc.clone()), Self::NotAbsoluteWithUuid),
        }
    }

    /// Checks `clock_class` against the expectation, setting it on first use.
    fn validate(&mut self, clock_class: Option<&ConstClockClass>) -> Result<()> {
        let describe = |cc: Option<&ConstClockClass>| {
            cc.map_or_else(
                || "no clock class".to_string(),
                |cc| {
                    format!(
                        "clock class `{}` (origin is Unix epoch: {}, UUID: {})",
                        cc.name().unwrap_or_default(),
                        cc.origin_is_unix_epoch(),
                        cc.uuid().map_or_else(|| "none".to_string(), |u| u.to_string())
                    )
                },
            )
        };
        if matches!(self, Self::Any) {
            *self = Self::from_clock_class(clock_class);
            return Ok(());
        }
        let compatible = match (&*self, clock_class) {
            (Self::None, None) => true,
            (Self::Absolute, Some(cc)) => cc.origin_is_unix_epoch(),
            (Self::NotAbsoluteWithUuid(expected), Some(cc)) => {
                !cc.origin_is_unix_epoch() && cc.uuid().as_ref() == Some(expected)
            },
            (Self::NotAbsoluteWithoutUuid(expected), Some(cc)) => {
                !cc.origin_is_unix_epoch() && cc.uuid().is_none() && cc.ptr_eq(expected)
            },
            _ => false,
        };
        if compatible {
            Ok(())
        } else {
            Err(TraceError::Component(format!(
                "Unexpected {} while expecting {}",
                describe(clock_class),
                self.describe_expected()
            )))
        }
    }

    fn describe_expected(&self) -> String {
        match self {
            Self::Any => "any clock class".to_string(),
            Self::None => "no clock class".to_string(),
            Self::Absolute => "an absolute clock class".to_string(),
            Self::NotAbsoluteWithUuid(uuid) => format!("a non-absolute clock class with UUID {uuid}"),
            Self::NotAbsoluteWithoutUuid(cc) => format!(
                "the non-absolute clock class `{}` without UUID",
                cc.name().unwrap_or_default()
            ),
        }
    }
}

/// Deterministic order between two messages with the same timestamp.
fn type_rank(message: &Message) -> u8 {
    match message {
        Message::StreamBeginning(_) => 0,
        Message::PacketBeginning(_) => 1,
        Message::Event(_) => 2,
        Message::DiscardedEvents(_) => 3,
        Message::DiscardedPackets(_) => 4,
        Message::MessageIteratorInactivity(_) => 5,
        Message::PacketEnd(_) => 6,
        Message::StreamEnd(_) => 7,
    }
}

fn compare_same_timestamp(a: &Message, b: &Message) -> Ordering {
    type_rank(a)
        .cmp(&type_rank(b))
        .then_with(|| a.stream().map(|s| s.id()).cmp(&b.stream().map(|s| s.id())))
}

struct Upstream {
    port: String,
    iterator: MessageIterator,
    queue: VecDeque<SharedMessage>,
    ended: bool,
}

enum Pick {
    Message(SharedMessage),
    Again,
    End,
}

struct MuxerIterator {
    upstreams: Vec<Upstream>,
    expectation: ClockExpectation,
    last_returned_ns: i64,
    /// Error raised after some messages were already put in a batch.
    saved_error: Option<TraceError>,
}

impl MuxerIterator {
    fn timestamp(&mut self, message: &Message) -> Result<i64> {
        match message {
            Message::StreamBeginning(msg) => {
                let clock_class = msg.stream().class().default_clock_class();
                self.expectation.validate(clock_class.as_ref())?;
            },
            Message::MessageIteratorInactivity(msg) => {
                self.expectation.validate(Some(msg.clock_snapshot().clock_class()))?;
            },
            _ => {},
        }
        if matches!(self.expectation, ClockExpectation::None) {
            return Ok(self.last_returned_ns);
        }
        match message.default_clock_snapshot() {
            Some(snapshot) => snapshot
                .ns_from_origin()
                .cause("Cannot get nanoseconds from origin of clock snapshot"),
            None => Ok(self.last_returned_ns),
        }
    }

    /// Refills every empty queue of a live upstream.
    fn refill(&mut self) -> Result<bool> {
        for upstream in self.upstreams.iter_mut().filter(|u| !u.ended && u.queue.is_empty()) {
            match upstream.iterator.next()? {
                IteratorNext::Messages(batch) => upstream.queue.extend(batch.into_vec()),
                IteratorNext::Again => return Ok(false),
                IteratorNext::End => {
                    tracing::debug!(port = %upstream.port, "Upstream message iterator ended");
                    upstream.ended = true;
                },
            }
        }
        Ok(true)
    }

    fn next_one(&mut self) -> Result<Pick> {
        if !self.refill()? {
            return Ok(Pick::Again);
        }

        let mut youngest: Option<(usize, i64)> = None;
        for index in 0..self.upstreams.len() {
            let Some(head) = self.upstreams[index].queue.front().cloned() else {
                continue;
            };
            let ts = self.timestamp(&head)?;
            let replace = match youngest {
                None => true,
                Some((selected, youngest_ts)) => {
                    ts < youngest_ts
                        || (ts == youngest_ts
                            && self.upstreams[selected].queue.front().is_some_and(|selected| {
                                compare_same_timestamp(&head, selected) == Ordering::Less
                            }))
                },
            };
            if replace {
                youngest = Some((index, ts));
            }
        }

        let Some((index, ts)) = youngest else {
            return Ok(Pick::End);
        };
        if ts < self.last_returned_ns {
            return Err(TraceError::Component(format!(
                "Youngest upstream message goes back in time: {ts} ns < {} ns (last returned)",
                self.last_returned_ns
            )));
        }
        let Some(message) = self.upstreams[index].queue.pop_front() else {
            return Ok(Pick::End);
        };
        tracing::trace!(port = %self.upstreams[index].port, ts, "Picked youngest message");
        self.last_returned_ns = ts;
        Ok(Pick::Message(message))
    }

    fn fill(&mut self, batch: &mut MessageBatch) -> Result<IteratorStatus> {
        if let Some(err) = self.saved_error.take() {
            return Err(err);
        }
        while !batch.is_full() {
            match self.next_one() {
                Ok(Pick::Message(message)) => batch.push_shared(message)?,
                Ok(Pick::Again) if batch.is_empty() => return Ok(IteratorStatus::Again),
                Ok(Pick::End) if batch.is_empty() => return Ok(IteratorStatus::End),
                Ok(Pick::Again | Pick::End) => break,
                Err(err) if batch.is_empty() => return Err(err),
                Err(err) => {
                    // Hand out what is ready; the error comes with the next call.
                    self.saved_error = Some(err);
                    break;
                },
            }
        }
        Ok(IteratorStatus::Ok)
    }

    fn can_seek_beginning(&mut self) -> Result<bool> {
        for upstream in &mut self.upstreams {
            if !upstream.iterator.can_seek_beginning()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn seek_beginning(&mut self) -> Result<SeekStatus> {
        for upstream in &mut self.upstreams {
            match upstream.iterator.seek_beginning()? {
                SeekOutcome::Ok => {},
                SeekOutcome::Again => return Ok(SeekStatus::Again),
                SeekOutcome::NotSupported => {
                    return Err(TraceError::Component(format!(
                        "Upstream message iterator on port `{}` cannot seek its beginning",
                        upstream.port
                    )));
                },
            }
            upstream.queue.clear();
            upstream.ended = false;
        }
        self.expectation = ClockExpectation::Any;
        self.last_returned_ns = i64::MIN;
        self.saved_error = None;
        Ok(SeekStatus::Ok)
    }
}

fn missing_state() -> TraceError {
    TraceError::Component("Muxer iterator lost its state".to_string())
}

fn initialize(comp: &mut SelfComponent, _params: Option<&serde_json::Value>) -> Result<()> {
    comp.add_input_port(&input_port_name(0))?;
    comp.add_output_port(OUTPUT_PORT)
}

/// Keeps one free input port available.
fn input_port_connected(comp: &mut SelfComponent, port: &str, other: &PortInfo) -> Result<()> {
    tracing::debug!(
        component = %comp.name(),
        port = %port,
        upstream = %format!("{}.{}", other.component_name, other.port_name),
        "Muxer input port connected"
    );
    let next = input_port_name(comp.component().input_port_count());
    comp.add_input_port(&next).cause(format!("Cannot add input port `{next}`"))
}

fn iterator_initialize(it: &mut SelfMessageIterator, config: &mut IteratorConfiguration, _port: &str) -> Result<()> {
    let component = it.component().clone();
    let mut upstreams = Vec::new();
    for port in component.input_port_names() {
        if !component.is_input_port_connected(&port) {
            continue;
        }
        let iterator = it.create_message_iterator(&port)?;
        upstreams.push(Upstream { port, iterator, queue: VecDeque::new(), ended: false });
    }
    config.set_can_seek_forward(upstreams.iter().all(|u| u.iterator.can_seek_forward()));
    tracing::debug!(component = %component.name(), upstreams = upstreams.len(), "Muxer iterator created");
    it.set_data(MuxerIterator {
        upstreams,
        expectation: ClockExpectation::Any,
        last_returned_ns: i64::MIN,
        saved_error: None,
    });
    Ok(())
}

fn next(it: &mut SelfMessageIterator, batch: &mut MessageBatch) -> Result<IteratorStatus> {
    it.data_mut::<MuxerIterator>().ok_or_else(missing_state)?.fill(batch)
}

fn can_seek_beginning(it: &mut SelfMessageIterator) -> Result<bool> {
    it.data_mut::<MuxerIterator>().ok_or_else(missing_state)?.can_seek_beginning()
}

fn seek_beginning(it: &mut SelfMessageIterator) -> Result<SeekStatus> {
    it.data_mut::<MuxerIterator>().ok_or_else(missing_state)?.seek_beginning()
}

pub(crate) fn describe(tables: &mut DescriptorTables, plugin: usize) {
    let class = tables.add_component_class(
        plugin,
        CLASS_NAME,
        ComponentClassDescriptorKind::Filter(Arc::new(next)),
    );
    tables
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::Description("Sort messages from multiple input ports by time.".into()),
        )
        .add_component_class_attribute(class, ComponentClassAttribute::Initialize(Arc::new(initialize)))
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::InputPortConnected(Arc::new(input_port_connected)),
        )
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::MsgIterInitialize(Arc::new(iterator_initialize)),
        )
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::MsgIterSeekBeginning(Arc::new(seek_beginning)),
        )
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::MsgIterCanSeekBeginning(Arc::new(can_seek_beginning)),
        );
}
