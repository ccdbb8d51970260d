// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Test utilities for component implementations.
//!
//! Wires components together without a graph so each class can be exercised
//! on its own.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use tracegraph_core::component::{Component, ExecutionContext, LoggingLevel, PortInfo, PortType};
use tracegraph_core::component_class::{
    ComponentClass, ComponentClassType, ConsumeStatus, IteratorStatus, MessageIteratorClass,
    SeekStatus,
};
use tracegraph_core::error::TraceError;
use tracegraph_core::iterator::{IteratorNext, MessageBatch, MessageIterator};
use tracegraph_core::message::{EventMessage, Message, SharedMessage, StreamMessage};
use tracegraph_core::plugin::descriptor::build_component_class;
use tracegraph_core::trace_ir::{ClockClass, EventClass, Stream, TraceClass};

/// Builds a `utils` class from the plugin's descriptor tables.
pub fn class(class_type: ComponentClassType, name: &str) -> Arc<ComponentClass> {
    let tables = crate::descriptor_tables();
    let (index, descriptor) = tables
        .component_classes_of(0)
        .find(|(_, d)| d.name == name && d.kind.class_type() == Some(class_type))
        .expect("class is described");
    let class = build_component_class(descriptor, tables.component_class_attributes_of(index), true)
        .unwrap()
        .unwrap();
    Arc::new(class)
}

pub fn component(class: Arc<ComponentClass>, name: &str, params: Option<&serde_json::Value>) -> Component {
    Component::create(class, name, params, LoggingLevel::Info, ExecutionContext::default()).unwrap()
}

/// Connects two components and runs both port-connected methods.
pub fn connect(upstream: &Component, output_port: &str, downstream: &Component, input_port: &str) {
    downstream.attach_upstream(input_port, upstream, output_port).unwrap();
    upstream
        .output_port_connected(
            output_port,
            &PortInfo {
                component_name: downstream.name().to_string(),
                port_name: input_port.to_string(),
                port_type: PortType::Input,
            },
        )
        .unwrap();
    downstream
        .input_port_connected(
            input_port,
            &PortInfo {
                component_name: upstream.name().to_string(),
                port_name: output_port.to_string(),
                port_type: PortType::Output,
            },
        )
        .unwrap();
}

pub fn drain(iterator: &mut MessageIterator) -> Vec<SharedMessage> {
    let mut out = Vec::new();
    loop {
        match iterator.next().unwrap() {
            IteratorNext::Messages(batch) => out.extend(batch),
            IteratorNext::End => return out,
            IteratorNext::Again => {},
        }
    }
}

/// Connects `source.out` to `sink.in` and consumes until the end. Returns the
/// number of consume calls.
pub fn run_sink(source: Arc<ComponentClass>, sink: Arc<ComponentClass>, params: Option<&serde_json::Value>) -> usize {
    let source = component(source, "src", None);
    let sink = component(sink, "sink", params);
    connect(&source, "out", &sink, "in");
    sink.graph_is_configured().unwrap();
    let mut calls = 0;
    loop {
        calls += 1;
        if sink.consume().unwrap() == ConsumeStatus::End {
            sink.finalize();
            return calls;
        }
    }
}

struct Ticker {
    stream: Stream,
    event_class: EventClass,
    values: Arc<[u64]>,
    position: usize,
}

impl Ticker {
    fn new(values: Arc<[u64]>, stream_id: u64, clock_class: ClockClass) -> Self {
        let trace_class = TraceClass::new();
        trace_class.set_assigns_automatic_stream_class_id(false).unwrap();
        let stream_class = trace_class.create_stream_class_with_id(0).unwrap();
        stream_class.set_assigns_automatic_stream_id(false).unwrap();
        stream_class.set_default_clock_class(clock_class).unwrap();
        let event_class = stream_class.create_event_class().unwrap();
        let trace = trace_class.instantiate();
        let stream = stream_class.instantiate_with_id(&trace, stream_id).unwrap();
        Self { stream, event_class, values, position: 0 }
    }

    fn fill(&mut self, batch: &mut MessageBatch) -> tracegraph_core::Result<IteratorStatus> {
        let total = self.values.len() + 2;
        if self.position >= total {
            return Ok(IteratorStatus::End);
        }
        while !batch.is_full() && self.position < total {
            let msg: Message = if self.position == 0 {
                StreamMessage::beginning(&self.stream).into()
            } else if self.position <= self.values.len() {
                EventMessage::with_default_clock_snapshot(
                    &self.event_class,
                    &self.stream,
                    self.values[self.position - 1],
                )?
                .into()
            } else {
                StreamMessage::end(&self.stream).into()
            };
            batch.push(msg)?;
            self.position += 1;
        }
        Ok(IteratorStatus::Ok)
    }
}

/// A seekable source emitting one stream with an event at each of `values`.
pub fn ticker_source_with(values: &[u64], stream_id: u64, clock_class: impl Fn() -> ClockClass + Send + Sync + 'static) -> Arc<ComponentClass> {
    let values: Arc<[u64]> = values.into();
    let mut iterator_class = MessageIteratorClass::new(Arc::new(|it, batch| {
        it.data_mut::<Ticker>()
            .ok_or_else(|| TraceError::Component("missing ticker".into()))?
            .fill(batch)
    }));
    iterator_class
        .set_initialize_method(Arc::new(move |it, _, _| {
            it.set_data(Ticker::new(Arc::clone(&values), stream_id, clock_class()));
            Ok(())
        }))
        .set_seek_beginning_methods(
            Arc::new(|it| {
                if let Some(ticker) = it.data_mut::<Ticker>() {
                    ticker.position = 0;
                }
                Ok(SeekStatus::Ok)
            }),
            None,
        );
    let mut class = ComponentClass::source("ticker", iterator_class).unwrap();
    class.set_initialize_method(Arc::new(|comp, _| comp.add_output_port("out")));
    Arc::new(class)
}

/// Events at 10, 20, ... with an absolute default clock.
pub fn ticker_source(events: u64) -> Arc<ComponentClass> {
    let values: Vec<u64> = (1..=events).map(|i| i * 10).collect();
    ticker_source_with(&values, 0, ClockClass::new)
}

pub fn clock_values(messages: &[SharedMessage]) -> Vec<Option<u64>> {
    messages.iter().map(|m| m.default_clock_snapshot().map(|cs| cs.value())).collect()
}
