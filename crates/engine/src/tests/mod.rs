// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Scenario tests for the engine crate.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod faulty;
mod interrupt;
mod query;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracegraph_core::component_class::{ComponentClass, ConsumeStatus, IteratorStatus, MessageIteratorClass};
use tracegraph_core::error::{Result, TraceError};
use tracegraph_core::iterator::{IteratorNext, MessageBatch};
use tracegraph_core::message::{EventMessage, Message, MessageType, StreamMessage};
use tracegraph_core::trace_ir::{ClockClass, EventClass, Stream, TraceClass};

use crate::graph::Graph;

/// Emits a stream beginning, `events` timestamped events and a stream end.
/// With `fail_at`, the `next` call that would emit that position fails.
struct Ticks {
    stream: Stream,
    event_class: EventClass,
    position: u64,
    events: u64,
    fail_at: Option<u64>,
}

impl Ticks {
    fn new(events: u64, fail_at: Option<u64>) -> Result<Self> {
        let trace_class = TraceClass::new();
        let stream_class = trace_class.create_stream_class()?;
        stream_class.set_default_clock_class(ClockClass::new())?;
        let event_class = stream_class.create_event_class()?;
        let trace = trace_class.instantiate();
        let stream = stream_class.instantiate(&trace)?;
        Ok(Self { stream, event_class, position: 0, events, fail_at })
    }

    fn fill(&mut self, batch: &mut MessageBatch) -> Result<IteratorStatus> {
        if self.position > self.events + 1 {
            return Ok(IteratorStatus::End);
        }
        if self.fail_at == Some(self.position) {
            return Err(TraceError::Component(format!("tick {} went missing", self.position)));
        }
        let msg: Message = if self.position == 0 {
            StreamMessage::beginning(&self.stream).into()
        } else if self.position <= self.events {
            EventMessage::with_default_clock_snapshot(&self.event_class, &self.stream, self.position * 100)?
                .into()
        } else {
            StreamMessage::end(&self.stream).into()
        };
        batch.push(msg)?;
        self.position += 1;
        Ok(IteratorStatus::Ok)
    }
}

pub(super) fn ticks_class(events: u64, fail_at: Option<u64>) -> ComponentClass {
    let mut iterator_class = MessageIteratorClass::new(Arc::new(|it, batch| {
        it.data_mut::<Ticks>().ok_or_else(|| TraceError::Component("missing ticks".into()))?.fill(batch)
    }));
    iterator_class.set_initialize_method(Arc::new(move |it, _, _| {
        it.set_data(Ticks::new(events, fail_at)?);
        Ok(())
    }));
    let mut class = ComponentClass::source("ticks", iterator_class).unwrap();
    class.set_initialize_method(Arc::new(|comp, _| comp.add_output_port("out")));
    class
}

pub(super) fn ticks_source(events: u64) -> Arc<ComponentClass> {
    Arc::new(ticks_class(events, None))
}

/// What a collecting simple sink saw.
#[derive(Default)]
pub(super) struct Collected {
    pub types: Mutex<Vec<MessageType>>,
    pub finalized: AtomicBool,
}

impl Collected {
    pub fn types(&self) -> Vec<MessageType> {
        self.types.lock().unwrap().clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }
}

/// Adds a simple sink that records the type of every message it consumes.
pub(super) fn add_collecting_sink(graph: &mut Graph, name: &str) -> Arc<Collected> {
    let collected = Arc::new(Collected::default());
    let seen = Arc::clone(&collected);
    let done = Arc::clone(&collected);
    graph
        .add_simple_sink_component(
            name,
            None,
            Box::new(move |iterator| match iterator.next()? {
                IteratorNext::Messages(batch) => {
                    seen.types.lock().unwrap().extend(batch.iter().map(|m| m.message_type()));
                    Ok(ConsumeStatus::Ok)
                },
                IteratorNext::End => Ok(ConsumeStatus::End),
                IteratorNext::Again => Ok(ConsumeStatus::Again),
            }),
            Some(Box::new(move || done.finalized.store(true, Ordering::SeqCst))),
        )
        .unwrap();
    collected
}

/// A sink with one `in` port that pulls nothing and ends at once.
pub(super) fn idle_sink_class() -> ComponentClass {
    let mut class = ComponentClass::sink("idle", Arc::new(|_| Ok(ConsumeStatus::End))).unwrap();
    class.set_initialize_method(Arc::new(|comp, _| comp.add_input_port("in")));
    class
}

pub(super) fn idle_sink() -> Arc<ComponentClass> {
    Arc::new(idle_sink_class())
}
