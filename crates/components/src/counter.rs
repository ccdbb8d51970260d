// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Counter sink: counts messages per type and logs the totals.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracegraph_core::component::{LoggingLevel, SelfComponent};
use tracegraph_core::component_class::ConsumeStatus;
use tracegraph_core::error::{Result, TraceError};
use tracegraph_core::iterator::{IteratorNext, MessageIterator};
use tracegraph_core::message::{Message, MessageType};
use tracegraph_core::params_helpers;
use tracegraph_core::plugin::descriptor::{
    ComponentClassAttribute, ComponentClassDescriptorKind, DescriptorTables,
};

pub const CLASS_NAME: &str = "counter";
const INPUT_PORT: &str = "in";

/// Configuration for the counter sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "kebab-case")]
pub struct CounterConfig {
    /// Log intermediate totals every `step` messages; 0 logs only the final totals.
    pub step: u64,
    /// Leave message types with a zero count out of the totals.
    pub hide_zero: bool,
}

/// Per-type message counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageCounts {
    counts: [u64; MessageType::ALL.len()],
}

impl MessageCounts {
    fn index(message_type: MessageType) -> usize {
        MessageType::ALL.iter().position(|t| *t == message_type).unwrap_or_default()
    }

    pub fn record(&mut self, message: &Message) {
        self.counts[Self::index(message.message_type())] += 1;
    }

    pub fn get(&self, message_type: MessageType) -> u64 {
        self.counts[Self::index(message_type)]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Counts in [`MessageType::ALL`] order, optionally without zeros.
    pub fn entries(&self, hide_zero: bool) -> impl Iterator<Item = (MessageType, u64)> + '_ {
        MessageType::ALL
            .iter()
            .zip(self.counts.iter())
            .map(|(t, c)| (*t, *c))
            .filter(move |(_, c)| !hide_zero || *c > 0)
    }
}

struct CounterSink {
    config: CounterConfig,
    logging_level: LoggingLevel,
    counts: MessageCounts,
    last_logged_total: u64,
    iterator: Option<MessageIterator>,
}

impl CounterSink {
    fn log_totals(&self, name: &str) {
        if !self.logging_level.enabled(LoggingLevel::Info) {
            return;
        }
        let totals: Vec<String> = self
            .counts
            .entries(self.config.hide_zero)
            .map(|(t, c)| format!("{t}={c}"))
            .collect();
        tracing::info!(
            component = %name,
            total = self.counts.total(),
            counts = %totals.join(", "),
            "Message counts"
        );
    }

    fn consume(&mut self, name: &str) -> Result<ConsumeStatus> {
        let Some(iterator) = self.iterator.as_mut() else {
            return Err(TraceError::Component("Counter sink has no upstream iterator".to_string()));
        };
        match iterator.next()? {
            IteratorNext::Messages(batch) => {
                for message in batch.iter() {
                    self.counts.record(message);
                }
                let total = self.counts.total();
                if self.config.step > 0 && total - self.last_logged_total >= self.config.step {
                    self.last_logged_total = total;
                    self.log_totals(name);
                }
                Ok(ConsumeStatus::Ok)
            },
            IteratorNext::Again => Ok(ConsumeStatus::Again),
            IteratorNext::End => {
                self.iterator = None;
                Ok(ConsumeStatus::End)
            },
        }
    }
}

fn missing_state() -> TraceError {
    TraceError::Component("Counter sink lost its state".to_string())
}

fn initialize(comp: &mut SelfComponent, params: Option<&serde_json::Value>) -> Result<()> {
    let config: CounterConfig = params_helpers::parse_params_optional(params)?;
    comp.add_input_port(INPUT_PORT)?;
    let logging_level = comp.logging_level();
    comp.set_data(CounterSink {
        config,
        logging_level,
        counts: MessageCounts::default(),
        last_logged_total: 0,
        iterator: None,
    });
    Ok(())
}

fn graph_is_configured(comp: &mut SelfComponent) -> Result<()> {
    let iterator = comp.create_message_iterator(INPUT_PORT)?;
    comp.with_data(|sink: &mut CounterSink| sink.iterator = Some(iterator)).ok_or_else(missing_state)
}

fn consume(comp: &mut SelfComponent) -> Result<ConsumeStatus> {
    let name = comp.name().to_string();
    comp.with_data(|sink: &mut CounterSink| sink.consume(&name)).unwrap_or_else(|| Err(missing_state()))
}

fn finalize(comp: &mut SelfComponent) {
    let name = comp.name().to_string();
    if let Some(sink) = comp.take_data::<CounterSink>() {
        sink.log_totals(&name);
    }
}

pub(crate) fn describe(tables: &mut DescriptorTables, plugin: usize) {
    let class = tables.add_component_class(
        plugin,
        CLASS_NAME,
        ComponentClassDescriptorKind::Sink(Arc::new(consume)),
    );
    tables
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::Description("Count messages and log the totals.".into()),
        )
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::Help(
                "Parameters: `step` logs totals every N messages, `hide-zero` omits empty types."
                    .into(),
            ),
        )
        .add_component_class_attribute(class, ComponentClassAttribute::Initialize(Arc::new(initialize)))
        .add_component_class_attribute(class, ComponentClassAttribute::Finalize(Arc::new(finalize)))
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::GraphIsConfigured(Arc::new(graph_is_configured)),
        );
}
