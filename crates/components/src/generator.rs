// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Generator source: emits a synthetic trace of `tick` events.
//!
//! Every stream carries `packets` packets of `events-per-packet` events.
//! Streams are interleaved message by message, so the output is ordered by
//! default clock value. A stream's n-th message after its beginning has the
//! clock value `n * step`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracegraph_core::component::SelfComponent;
use tracegraph_core::component_class::{IteratorStatus, QueryContext, QueryOutcome, SeekStatus};
use tracegraph_core::error::{Result, TraceError};
use tracegraph_core::iterator::{IteratorConfiguration, MessageBatch, SelfMessageIterator};
use tracegraph_core::message::{EventMessage, Message, PacketMessage, StreamMessage};
use tracegraph_core::params_helpers;
use tracegraph_core::plugin::descriptor::{
    ComponentClassAttribute, ComponentClassDescriptorKind, DescriptorTables,
};
use tracegraph_core::trace_ir::{ClockClass, EventClass, Field, FieldClass, Packet, Stream, TraceClass};

pub const CLASS_NAME: &str = "generator";
const OUTPUT_PORT: &str = "out";
const EVENT_NAME: &str = "tick";
const SUPPORTED_PARAMS_OBJECT: &str = "supported-params";

/// Configuration for the generator source.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "kebab-case")]
pub struct GeneratorConfig {
    /// Number of streams, at least 1.
    pub streams: u64,
    /// Packets per stream.
    pub packets: u64,
    /// Events per packet.
    pub events_per_packet: u64,
    /// Frequency of the default clock, in Hz.
    pub clock_frequency: u64,
    /// Clock cycles between two consecutive messages of a stream.
    pub step: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self { streams: 1, packets: 4, events_per_packet: 8, clock_frequency: 1_000_000_000, step: 1000 }
    }
}

impl GeneratorConfig {
    fn validate(&self) -> Result<()> {
        if self.streams == 0 {
            return Err(TraceError::Configuration("`streams` must be at least 1".to_string()));
        }
        if self.clock_frequency == 0 || self.clock_frequency == u64::MAX {
            return Err(TraceError::Configuration(format!(
                "Invalid `clock-frequency`: {}",
                self.clock_frequency
            )));
        }
        if self.step == 0 {
            return Err(TraceError::Configuration("`step` must be at least 1".to_string()));
        }
        self.last_clock_value().map(|_| ())
    }

    const fn messages_per_packet(&self) -> u64 {
        self.events_per_packet + 2
    }

    /// Messages of one stream, stream beginning and end included.
    const fn messages_per_stream(&self) -> u64 {
        self.packets * self.messages_per_packet() + 2
    }

    fn last_clock_value(&self) -> Result<u64> {
        (self.packets * self.messages_per_packet())
            .checked_mul(self.step)
            .ok_or_else(|| TraceError::Overflow("Generated clock values exceed 64 bits".to_string()))
    }
}

struct GeneratedStream {
    stream: Stream,
    packet: Option<Packet>,
}

struct GeneratorIterator {
    config: GeneratorConfig,
    event_class: EventClass,
    streams: Vec<GeneratedStream>,
    /// Index in the per-stream message sequence.
    position: u64,
    /// Next stream to emit a message for at `position`.
    stream_index: usize,
}

impl GeneratorIterator {
    fn new(config: GeneratorConfig) -> Result<Self> {
        let trace_class = TraceClass::new();
        let stream_class = trace_class.create_stream_class()?;
        let clock_class = ClockClass::new();
        clock_class.set_name("monotonic")?;
        clock_class.set_frequency(config.clock_frequency)?;
        stream_class.set_default_clock_class(clock_class)?;
        stream_class.set_supports_packets(true, true, true)?;

        let event_class = stream_class.create_event_class()?;
        event_class.set_name(EVENT_NAME)?;
        event_class.set_payload_field_class(
            FieldClass::structure().member("index", FieldClass::unsigned_integer(64)?).build()?,
        )?;

        let trace = trace_class.instantiate();
        let streams = (0..config.streams)
            .map(|_| Ok(GeneratedStream { stream: stream_class.instantiate(&trace)?, packet: None }))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { config, event_class, streams, position: 0, stream_index: 0 })
    }

    const fn is_done(&self) -> bool {
        self.position >= self.config.messages_per_stream()
    }

    fn rewind(&mut self) {
        self.position = 0;
        self.stream_index = 0;
        for stream in &mut self.streams {
            stream.packet = None;
        }
    }

    fn message(&mut self) -> Result<Message> {
        let config = &self.config;
        let generated = &mut self.streams[self.stream_index];
        if self.position == 0 {
            return Ok(StreamMessage::beginning(&generated.stream).into());
        }
        if self.position + 1 == config.messages_per_stream() {
            return Ok(StreamMessage::end(&generated.stream).into());
        }

        let offset = self.position - 1;
        let packet_index = offset / config.messages_per_packet();
        let in_packet = offset % config.messages_per_packet();
        let value = offset * config.step;
        if in_packet == 0 {
            let packet = generated.stream.create_packet()?;
            let msg = PacketMessage::beginning_with_default_clock_snapshot(&packet, value)?;
            generated.packet = Some(packet);
            return Ok(msg.into());
        }

        let Some(packet) = generated.packet.as_ref() else {
            return Err(TraceError::Component("Generator lost its current packet".to_string()));
        };
        if in_packet + 1 == config.messages_per_packet() {
            let msg = PacketMessage::end_with_default_clock_snapshot(packet, value)?;
            generated.packet = None;
            return Ok(msg.into());
        }

        let mut msg = EventMessage::in_packet_with_default_clock_snapshot(&self.event_class, packet, value)?;
        let index = packet_index * config.events_per_packet + in_packet - 1;
        if let Some(Field::UnsignedInteger(field)) =
            msg.event_mut().payload_field_mut().and_then(|payload| payload.member_mut("index"))
        {
            *field = index;
        }
        Ok(msg.into())
    }

    fn advance(&mut self) {
        self.stream_index += 1;
        if self.stream_index == self.streams.len() {
            self.stream_index = 0;
            self.position += 1;
        }
    }

    fn fill(&mut self, batch: &mut MessageBatch) -> Result<IteratorStatus> {
        if self.is_done() {
            return Ok(IteratorStatus::End);
        }
        while !batch.is_full() && !self.is_done() {
            let msg = self.message()?;
            batch.push(msg)?;
            self.advance();
        }
        Ok(IteratorStatus::Ok)
    }
}

fn missing_state() -> TraceError {
    TraceError::Component("Generator iterator lost its state".to_string())
}

fn initialize(comp: &mut SelfComponent, params: Option<&serde_json::Value>) -> Result<()> {
    let config: GeneratorConfig = params_helpers::parse_params_optional(params)?;
    config.validate()?;
    comp.add_output_port(OUTPUT_PORT)?;
    tracing::debug!(
        component = %comp.name(),
        streams = config.streams,
        packets = config.packets,
        events_per_packet = config.events_per_packet,
        "Generator configured"
    );
    comp.set_data(config);
    Ok(())
}

fn iterator_initialize(
    it: &mut SelfMessageIterator,
    _config: &mut IteratorConfiguration,
    _port: &str,
) -> Result<()> {
    let config = it
        .with_component_data(|config: &mut GeneratorConfig| config.clone())
        .ok_or_else(|| TraceError::Component("Generator component has no configuration".to_string()))?;
    it.set_data(GeneratorIterator::new(config)?);
    Ok(())
}

fn next(it: &mut SelfMessageIterator, batch: &mut MessageBatch) -> Result<IteratorStatus> {
    it.data_mut::<GeneratorIterator>().ok_or_else(missing_state)?.fill(batch)
}

fn seek_beginning(it: &mut SelfMessageIterator) -> Result<SeekStatus> {
    it.data_mut::<GeneratorIterator>().ok_or_else(missing_state)?.rewind();
    Ok(SeekStatus::Ok)
}

fn query(_context: &QueryContext, object: &str, _params: Option<&serde_json::Value>) -> Result<QueryOutcome> {
    if object != SUPPORTED_PARAMS_OBJECT {
        return Ok(QueryOutcome::UnknownObject);
    }
    let schema = schemars::schema_for!(GeneratorConfig);
    serde_json::to_value(schema)
        .map(QueryOutcome::Result)
        .map_err(|e| TraceError::Component(format!("Cannot serialize parameter schema: {e}")))
}

pub(crate) fn describe(tables: &mut DescriptorTables, plugin: usize) {
    let class = tables.add_component_class(
        plugin,
        CLASS_NAME,
        ComponentClassDescriptorKind::Source(Arc::new(next)),
    );
    tables
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::Description("Generate a synthetic trace of tick events.".into()),
        )
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::Help(
                "Query `supported-params` for the parameter schema.".into(),
            ),
        )
        .add_component_class_attribute(class, ComponentClassAttribute::Initialize(Arc::new(initialize)))
        .add_component_class_attribute(class, ComponentClassAttribute::Query(Arc::new(query)))
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::MsgIterInitialize(Arc::new(iterator_initialize)),
        )
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::MsgIterSeekBeginning(Arc::new(seek_beginning)),
        );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::{class, clock_values, component, drain};
    use serde_json::json;
    use tracegraph_core::iterator::{MessageIterator, SeekOutcome};
    use tracegraph_core::message::MessageType;
    use tracegraph_core::ComponentClassType;

    fn generator(params: &serde_json::Value) -> MessageIterator {
        let source = component(class(ComponentClassType::Source, CLASS_NAME), "gen", Some(params));
        MessageIterator::create(&source, OUTPUT_PORT).unwrap()
    }

    #[test]
    fn emits_packets_of_events() {
        let mut iterator = generator(&json!({ "packets": 2, "events-per-packet": 3, "step": 5 }));
        let messages = drain(&mut iterator);
        let types: Vec<MessageType> = messages.iter().map(|m| m.message_type()).collect();
        assert_eq!(messages.len(), 12);
        assert_eq!(types[0], MessageType::StreamBeginning);
        assert_eq!(types[1], MessageType::PacketBeginning);
        assert_eq!(types[5], MessageType::PacketEnd);
        assert_eq!(types[11], MessageType::StreamEnd);
        assert_eq!(types.iter().filter(|t| **t == MessageType::Event).count(), 6);

        let values: Vec<u64> = clock_values(&messages).into_iter().flatten().collect();
        assert_eq!(values, (0..10).map(|i| i * 5).collect::<Vec<_>>());

        let indexes: Vec<u64> = messages
            .iter()
            .filter_map(|m| m.as_event())
            .filter_map(|e| match e.event().payload_field()?.member("index")? {
                Field::UnsignedInteger(index) => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn interleaves_streams_in_clock_order() {
        let mut iterator = generator(&json!({ "streams": 3, "packets": 1, "events-per-packet": 2 }));
        let messages = drain(&mut iterator);
        assert_eq!(messages.len(), 3 * 6);
        let values: Vec<u64> = clock_values(&messages).into_iter().flatten().collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        let ids: Vec<u64> = messages[..3].iter().map(|m| m.stream().unwrap().id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn seeks_beginning() {
        let mut iterator = generator(&json!({ "packets": 1, "events-per-packet": 1 }));
        let first = drain(&mut iterator);
        assert!(iterator.can_seek_beginning().unwrap());
        assert_eq!(iterator.seek_beginning().unwrap(), SeekOutcome::Ok);
        let second = drain(&mut iterator);
        assert_eq!(clock_values(&first), clock_values(&second));
    }

    #[test]
    fn rejects_invalid_config() {
        for params in [json!({ "streams": 0 }), json!({ "step": 0 }), json!({ "clock-frequency": 0 })] {
            let err = tracegraph_core::Component::create(
                class(ComponentClassType::Source, CLASS_NAME),
                "gen",
                Some(&params),
                tracegraph_core::LoggingLevel::Info,
                tracegraph_core::ExecutionContext::default(),
            )
            .unwrap_err();
            assert!(matches!(err.root_cause(), TraceError::Configuration(_)));
        }
    }

    #[test]
    fn answers_supported_params_query() {
        let context = QueryContext::default();
        let QueryOutcome::Result(schema) = query(&context, SUPPORTED_PARAMS_OBJECT, None).unwrap() else {
            panic!("expected a schema");
        };
        assert!(schema["properties"].get("events-per-packet").is_some());
        assert!(matches!(query(&context, "metadata-info", None).unwrap(), QueryOutcome::UnknownObject));
    }
}
