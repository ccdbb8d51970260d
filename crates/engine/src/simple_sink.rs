// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Sinks built from closures, for applications that consume a graph's output
//! directly.

use std::sync::{Arc, Mutex, PoisonError};
use tracegraph_core::component::SelfComponent;
use tracegraph_core::component_class::{ComponentClass, ConsumeStatus};
use tracegraph_core::error::{Result, TraceError};
use tracegraph_core::iterator::MessageIterator;

pub type SimpleSinkInitialize = Box<dyn FnOnce(&mut MessageIterator) -> Result<()> + Send>;
pub type SimpleSinkConsume = Box<dyn FnMut(&mut MessageIterator) -> Result<ConsumeStatus> + Send>;
pub type SimpleSinkFinalize = Box<dyn FnOnce() + Send>;

const INPUT_PORT: &str = "in";

struct SimpleSink {
    initialize: Option<SimpleSinkInitialize>,
    consume: SimpleSinkConsume,
    finalize: Option<SimpleSinkFinalize>,
    iterator: Option<MessageIterator>,
}

impl SimpleSink {
    fn start(&mut self, mut iterator: MessageIterator) -> Result<()> {
        if let Some(initialize) = self.initialize.take() {
            initialize(&mut iterator)?;
        }
        self.iterator = Some(iterator);
        Ok(())
    }

    fn consume(&mut self) -> Result<ConsumeStatus> {
        let Some(iterator) = self.iterator.as_mut() else {
            return Err(TraceError::Component("Simple sink consumed before configuration".to_string()));
        };
        (self.consume)(iterator)
    }
}

fn missing_state() -> TraceError {
    TraceError::Component("Simple sink lost its state".to_string())
}

/// Builds a one-off sink class around the closures.
pub(crate) fn component_class(
    initialize: Option<SimpleSinkInitialize>,
    consume: SimpleSinkConsume,
    finalize: Option<SimpleSinkFinalize>,
) -> Result<ComponentClass> {
    let pending = Mutex::new(Some(SimpleSink { initialize, consume, finalize, iterator: None }));

    let mut class = ComponentClass::sink(
        "simple-sink",
        Arc::new(|comp: &mut SelfComponent| {
            comp.with_data(SimpleSink::consume).unwrap_or_else(|| Err(missing_state()))
        }),
    )?;
    class.set_initialize_method(Arc::new(move |comp, _params| {
        comp.add_input_port(INPUT_PORT)?;
        let sink = pending.lock().unwrap_or_else(PoisonError::into_inner).take();
        let sink = sink.ok_or_else(missing_state)?;
        comp.set_data(sink);
        Ok(())
    }));
    class.set_graph_is_configured_method(Arc::new(|comp| {
        let iterator = comp.create_message_iterator(INPUT_PORT)?;
        comp.with_data(|sink: &mut SimpleSink| sink.start(iterator))
            .unwrap_or_else(|| Err(missing_state()))
    }))?;
    class.set_finalize_method(Arc::new(|comp| {
        if let Some(mut sink) = comp.take_data::<SimpleSink>() {
            // Release the upstream iterator before the user callback.
            sink.iterator = None;
            if let Some(finalize) = sink.finalize.take() {
                finalize();
            }
        }
    }));
    Ok(class)
}
