// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Merges several generated streams through the built-in muxer and checks
//! that the sink sees them in time order.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use std::sync::{Arc, Mutex};
use tracegraph_core::{ComponentClassType, ConsumeStatus, IteratorNext, LoggingLevel, MessageType};
use tracegraph_engine::{Engine, GraphConfig, GraphRunStatus};

#[derive(Default)]
struct Seen {
    times: Vec<i64>,
    types: Vec<MessageType>,
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn run_merge(batch_capacity: usize) -> Seen {
    let engine = Engine::with_config(GraphConfig { batch_capacity, ..GraphConfig::default() });
    let (generator, muxer) = {
        let registry = engine.registry.read().unwrap();
        (
            Arc::clone(registry.get("utils", ComponentClassType::Source, "generator").unwrap()),
            Arc::clone(registry.get("utils", ComponentClassType::Filter, "muxer").unwrap()),
        )
    };

    let mut graph = tracegraph_engine::Graph::with_config(engine.config.clone(), 0).unwrap();
    graph
        .add_source_component(
            Arc::clone(&generator),
            "slow",
            Some(&json!({ "packets": 2, "events-per-packet": 3, "step": 700 })),
            LoggingLevel::Info,
        )
        .unwrap();
    graph
        .add_source_component(
            generator,
            "fast",
            Some(&json!({ "streams": 2, "packets": 1, "step": 300 })),
            LoggingLevel::Info,
        )
        .unwrap();
    graph.add_filter_component(muxer, "mux", None, LoggingLevel::Debug).unwrap();

    let seen = Arc::new(Mutex::new(Seen::default()));
    let sink_seen = Arc::clone(&seen);
    graph
        .add_simple_sink_component(
            "check",
            None,
            Box::new(move |iterator| match iterator.next()? {
                IteratorNext::Messages(batch) => {
                    let mut seen = sink_seen.lock().unwrap();
                    for msg in batch.iter() {
                        seen.types.push(msg.message_type());
                        if let Some(snapshot) = msg.default_clock_snapshot() {
                            seen.times.push(snapshot.ns_from_origin()?);
                        }
                    }
                    Ok(ConsumeStatus::Ok)
                },
                IteratorNext::End => Ok(ConsumeStatus::End),
                IteratorNext::Again => Ok(ConsumeStatus::Again),
            }),
            None,
        )
        .unwrap();

    graph.connect_ports("slow", "out", "mux", "in0").unwrap();
    graph.connect_ports("fast", "out", "mux", "in1").unwrap();
    graph.connect_ports("mux", "out", "check", "in").unwrap();

    assert_eq!(graph.run().unwrap(), GraphRunStatus::End);
    drop(graph);
    Arc::try_unwrap(seen).ok().unwrap().into_inner().unwrap()
}

#[test]
fn merged_messages_are_in_time_order() {
    init_logging();
    let seen = run_merge(64);

    // 2 packets of 3 events plus 2 streams of one 8-event packet, each stream
    // framed by its beginning and end.
    assert_eq!(seen.types.len(), 12 + 2 * 12);
    assert_eq!(seen.types.iter().filter(|t| **t == MessageType::StreamBeginning).count(), 3);
    assert_eq!(seen.types.iter().filter(|t| **t == MessageType::Event).count(), 6 + 16);
    assert!(seen.times.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen.times);
}

#[test]
fn batch_capacity_does_not_change_the_order() {
    init_logging();
    let small = run_merge(1);
    let large = run_merge(64);
    assert_eq!(small.types, large.types);
    assert_eq!(small.times, large.times);
}
