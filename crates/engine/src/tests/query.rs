// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracegraph_core::component_class::{ComponentClass, QueryOutcome};
use tracegraph_core::error::TraceError;
use tracegraph_core::interrupter::Interrupter;
use tracegraph_core::registry::ComponentClassKey;

use super::{idle_sink, ticks_class};
use crate::{Engine, QueryExecutor};

/// Answers `echo` with its params and `later` with `Again`.
fn echo_class(calls: Arc<AtomicUsize>) -> Arc<ComponentClass> {
    let mut class = ticks_class(0, None);
    class.set_query_method(Arc::new(move |_, object, params| {
        calls.fetch_add(1, Ordering::SeqCst);
        match object {
            "echo" => Ok(QueryOutcome::Result(params.cloned().unwrap_or_default())),
            "later" => Ok(QueryOutcome::Again),
            "broken" => Err(TraceError::Component("cannot answer".into())),
            _ => Ok(QueryOutcome::UnknownObject),
        }
    }));
    Arc::new(class)
}

#[test]
fn builtin_generator_answers_supported_params() {
    let engine = Engine::new();
    let key: ComponentClassKey = "source.utils.generator".parse().unwrap();
    let outcome = engine.query(&key, "supported-params", None).unwrap();
    assert!(matches!(outcome, QueryOutcome::Result(_)), "{outcome:?}");

    assert_eq!(engine.query(&key, "metadata-info", None).unwrap(), QueryOutcome::UnknownObject);
}

#[test]
fn class_without_query_method_knows_no_object() {
    let engine = Engine::new();
    let key: ComponentClassKey = "sink.utils.counter".parse().unwrap();
    assert_eq!(engine.query(&key, "anything", None).unwrap(), QueryOutcome::UnknownObject);

    let executor = QueryExecutor::new(idle_sink(), "anything", None).unwrap();
    assert_eq!(executor.query().unwrap(), QueryOutcome::UnknownObject);
}

#[test]
fn unknown_class_is_a_configuration_error() {
    let engine = Engine::new();
    let key: ComponentClassKey = "source.utils.nothing".parse().unwrap();
    let err = engine.query(&key, "supported-params", None).unwrap_err();
    assert!(matches!(&err, TraceError::Configuration(m) if m.contains("source.utils.nothing")), "{err}");
}

#[test]
fn object_must_not_be_empty() {
    let err = QueryExecutor::new(idle_sink(), "", None).unwrap_err();
    assert_eq!(err.precondition().unwrap().id, "object-is-not-empty");
}

#[test]
fn outcomes_pass_through() {
    let calls = Arc::new(AtomicUsize::new(0));
    let class = echo_class(Arc::clone(&calls));

    let params = json!({ "path": "/tmp/trace" });
    let executor = QueryExecutor::new(Arc::clone(&class), "echo", Some(params.clone())).unwrap();
    assert_eq!(executor.query().unwrap(), QueryOutcome::Result(params));

    let executor = QueryExecutor::new(Arc::clone(&class), "later", None).unwrap();
    assert_eq!(executor.query().unwrap(), QueryOutcome::Again);

    let executor = QueryExecutor::new(Arc::clone(&class), "other", None).unwrap();
    assert_eq!(executor.query().unwrap(), QueryOutcome::UnknownObject);

    let executor = QueryExecutor::new(class, "broken", None).unwrap();
    let err = executor.query().unwrap_err();
    assert!(err.to_string().contains("Query `broken`"), "{err}");
    assert!(err.causes().any(|e| e.to_string().contains("cannot answer")));

    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn interrupted_executor_tries_again_later() {
    let calls = Arc::new(AtomicUsize::new(0));
    let executor = QueryExecutor::new(echo_class(Arc::clone(&calls)), "echo", None).unwrap();

    let external = Interrupter::new();
    executor.add_interrupter(external.clone());
    external.set();
    assert!(executor.is_interrupted());
    assert_eq!(executor.query().unwrap(), QueryOutcome::Again);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    external.reset();
    executor.default_interrupter().set();
    assert_eq!(executor.query().unwrap(), QueryOutcome::Again);

    executor.default_interrupter().reset();
    assert_eq!(executor.query().unwrap(), QueryOutcome::Result(serde_json::Value::Null));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
