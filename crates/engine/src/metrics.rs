// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! OpenTelemetry instruments recorded by graphs.

use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{global, KeyValue};
use tracegraph_core::component::BatchObserver;
use tracegraph_core::ConsumeStatus;

#[derive(Clone)]
pub(crate) struct GraphMetrics {
    consume_counter: Counter<u64>,
    batch_messages_histogram: Histogram<u64>,
    run_duration_histogram: Histogram<f64>,
}

impl GraphMetrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter("tracegraph_engine");
        Self {
            consume_counter: meter
                .u64_counter("graph.sink.consume")
                .with_description("Sink consume calls by outcome")
                .build(),
            batch_messages_histogram: meter
                .u64_histogram("iterator.batch.messages")
                .with_description("Messages delivered per message iterator batch")
                .build(),
            run_duration_histogram: meter
                .f64_histogram("graph.run.duration")
                .with_description("Duration of graph runs")
                .with_unit("s")
                .build(),
        }
    }

    /// Records one consume call; `None` stands for a failed call.
    pub(crate) fn record_consume(&self, sink: &str, status: Option<ConsumeStatus>) {
        let outcome = match status {
            Some(ConsumeStatus::Ok) => "ok",
            Some(ConsumeStatus::End) => "end",
            Some(ConsumeStatus::Again) => "again",
            None => "error",
        };
        self.consume_counter
            .add(1, &[KeyValue::new("sink", sink.to_string()), KeyValue::new("outcome", outcome)]);
    }

    pub(crate) fn record_run(&self, seconds: f64, status: &'static str) {
        self.run_duration_histogram.record(seconds, &[KeyValue::new("status", status)]);
    }
}

impl BatchObserver for GraphMetrics {
    fn batch_delivered(&self, component: &str, port: &str, messages: usize) {
        self.batch_messages_histogram.record(
            messages as u64,
            &[
                KeyValue::new("component", component.to_string()),
                KeyValue::new("port", port.to_string()),
            ],
        );
    }
}
