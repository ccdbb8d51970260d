// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Dummy sink: consumes and drops every message.

use std::sync::Arc;
use tracegraph_core::component::SelfComponent;
use tracegraph_core::component_class::ConsumeStatus;
use tracegraph_core::error::{Result, TraceError};
use tracegraph_core::iterator::{IteratorNext, MessageIterator};
use tracegraph_core::plugin::descriptor::{
    ComponentClassAttribute, ComponentClassDescriptorKind, DescriptorTables,
};

pub const CLASS_NAME: &str = "dummy";
const INPUT_PORT: &str = "in";

struct DummySink {
    iterator: Option<MessageIterator>,
}

fn initialize(comp: &mut SelfComponent, _params: Option<&serde_json::Value>) -> Result<()> {
    comp.add_input_port(INPUT_PORT)?;
    comp.set_data(DummySink { iterator: None });
    Ok(())
}

fn graph_is_configured(comp: &mut SelfComponent) -> Result<()> {
    let iterator = comp.create_message_iterator(INPUT_PORT)?;
    comp.with_data(|sink: &mut DummySink| sink.iterator = Some(iterator));
    Ok(())
}

fn consume(comp: &mut SelfComponent) -> Result<ConsumeStatus> {
    let next = comp.with_data(|sink: &mut DummySink| {
        let Some(iterator) = sink.iterator.as_mut() else {
            return Err(TraceError::Component("Dummy sink has no upstream iterator".to_string()));
        };
        iterator.next()
    });
    match next.unwrap_or_else(|| Err(TraceError::Component("Dummy sink lost its state".to_string())))? {
        IteratorNext::Messages(batch) => {
            tracing::trace!(messages = batch.len(), "Dropping messages");
            Ok(ConsumeStatus::Ok)
        },
        IteratorNext::Again => Ok(ConsumeStatus::Again),
        IteratorNext::End => {
            // Release the upstream iterator as soon as it ends.
            comp.with_data(|sink: &mut DummySink| sink.iterator = None);
            Ok(ConsumeStatus::End)
        },
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
            ComponentClassAttribute::Description("Consume messages and discard them.".into()),
        )
        .add_component_class_attribute(class, ComponentClassAttribute::Initialize(Arc::new(initialize)))
        .add_component_class_attribute(
            class,
            ComponentClassAttribute::GraphIsConfigured(Arc::new(graph_is_configured)),
        );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::test_utils::{class, run_sink, ticker_source};
    use tracegraph_core::ComponentClassType;

    #[test]
    fn drains_upstream_until_end() {
        let sink = class(ComponentClassType::Sink, "dummy");
        let consumed = run_sink(ticker_source(20), sink, None);
        assert!(consumed >= 2);
    }
}
