// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracegraph_core::component::LoggingLevel;
use tracegraph_core::component_class::ConsumeStatus;
use tracegraph_core::interrupter::Interrupter;
use tracegraph_core::iterator::IteratorNext;
use tracegraph_core::state::GraphState;

use super::{add_collecting_sink, ticks_source};
use crate::graph::{Graph, GraphRunStatus};

#[test]
fn default_interrupter_pauses_the_run() {
    let mut graph = Graph::new(0).unwrap();
    graph.add_source_component(ticks_source(2), "src", None, LoggingLevel::Info).unwrap();
    let collected = add_collecting_sink(&mut graph, "sink");
    graph.connect_ports("src", "out", "sink", "in").unwrap();

    graph.default_interrupter().set();
    assert!(graph.is_interrupted());
    assert_eq!(graph.run().unwrap(), GraphRunStatus::Again);
    assert!(collected.types().is_empty());
    assert_ne!(graph.state(), GraphState::Faulty);

    graph.default_interrupter().reset();
    assert_eq!(graph.run().unwrap(), GraphRunStatus::End);
    assert_eq!(collected.types().len(), 4);
}

#[test]
fn added_interrupter_reaches_components() {
    let interrupter = Interrupter::new();
    let consumed = Arc::new(AtomicUsize::new(0));

    let mut graph = Graph::new(0).unwrap();
    graph.add_interrupter(interrupter.clone());
    graph.add_source_component(ticks_source(3), "src", None, LoggingLevel::Info).unwrap();
    let sink_interrupter = interrupter.clone();
    let count = Arc::clone(&consumed);
    graph
        .add_simple_sink_component(
            "sink",
            None,
            Box::new(move |iterator| {
                if iterator.component().is_interrupted() {
                    return Ok(ConsumeStatus::Again);
                }
                match iterator.next()? {
                    IteratorNext::Messages(batch) => {
                        // Pause the graph after the first delivery.
                        if count.fetch_add(batch.len(), Ordering::SeqCst) == 0 {
                            sink_interrupter.set();
                        }
                        Ok(ConsumeStatus::Ok)
                    },
                    IteratorNext::End => Ok(ConsumeStatus::End),
                    IteratorNext::Again => Ok(ConsumeStatus::Again),
                }
            }),
            None,
        )
        .unwrap();
    graph.connect_ports("src", "out", "sink", "in").unwrap();

    assert_eq!(graph.run().unwrap(), GraphRunStatus::Again);
    assert_eq!(consumed.load(Ordering::SeqCst), 1);

    interrupter.reset();
    assert_eq!(graph.run().unwrap(), GraphRunStatus::End);
    assert_eq!(consumed.load(Ordering::SeqCst), 5);
}
