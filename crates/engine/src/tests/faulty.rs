// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use tracegraph_core::component::LoggingLevel;
use tracegraph_core::error::TraceError;
use tracegraph_core::state::GraphState;

use super::{add_collecting_sink, ticks_class};
use crate::graph::Graph;

#[test]
fn iterator_failure_makes_the_graph_faulty() {
    let mut graph = Graph::new(0).unwrap();
    graph.add_source_component(Arc::new(ticks_class(5, Some(2))), "src", None, LoggingLevel::Info).unwrap();
    let collected = add_collecting_sink(&mut graph, "sink");
    graph.connect_ports("src", "out", "sink", "in").unwrap();

    let err = graph.run().unwrap_err();
    assert!(
        err.causes().any(|e| matches!(e, TraceError::Component(m) if m == "tick 2 went missing")),
        "{err:?}"
    );
    assert!(matches!(err.root_cause(), TraceError::Component(_)));
    assert_eq!(graph.state(), GraphState::Faulty);
    // What was delivered before the failure stays delivered.
    assert_eq!(collected.types().len(), 2);

    let err = graph.run_once().unwrap_err();
    assert_eq!(err.precondition().unwrap().id, "graph-is-not-faulty");
    let err = graph.connect_ports("src", "out", "sink", "in").unwrap_err();
    assert_eq!(err.precondition().unwrap().id, "graph-is-not-faulty");
}

#[test]
fn failing_sink_is_reported_with_its_name() {
    let mut graph = Graph::new(0).unwrap();
    graph.add_source_component(Arc::new(ticks_class(1, None)), "src", None, LoggingLevel::Info).unwrap();
    graph
        .add_simple_sink_component(
            "grumpy",
            None,
            Box::new(|_| Err(TraceError::Component("not in the mood".to_string()))),
            None,
        )
        .unwrap();
    graph.connect_ports("src", "out", "grumpy", "in").unwrap();

    let err = graph.run_once().unwrap_err();
    assert!(err.causes().any(|e| e.to_string().contains("not in the mood")), "{err}");
    assert_eq!(graph.state(), GraphState::Faulty);
}

#[test]
fn simple_sink_initialize_failure_fails_configuration() {
    let mut graph = Graph::new(0).unwrap();
    graph.add_source_component(Arc::new(ticks_class(1, None)), "src", None, LoggingLevel::Info).unwrap();
    graph
        .add_simple_sink_component(
            "sink",
            Some(Box::new(|_| Err(TraceError::Configuration("no output file".to_string())))),
            Box::new(|_| Ok(tracegraph_core::ConsumeStatus::End)),
            None,
        )
        .unwrap();
    graph.connect_ports("src", "out", "sink", "in").unwrap();

    let err = graph.run().unwrap_err();
    assert!(matches!(err.root_cause(), TraceError::Configuration(m) if m == "no output file"));
    assert_eq!(graph.state(), GraphState::Faulty);
}
