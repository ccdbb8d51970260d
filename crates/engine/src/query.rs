// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Query executor: asks a component class about an object without creating a
//! component.

use serde_json::Value;
use std::sync::Arc;
use tracegraph_core::component::LoggingLevel;
use tracegraph_core::component_class::{ComponentClass, QueryContext, QueryOutcome};
use tracegraph_core::error::{ErrorContext, Result};
use tracegraph_core::interrupter::{Interrupter, InterrupterSet};
use tracegraph_core::ensure_pre;

pub struct QueryExecutor {
    class: Arc<ComponentClass>,
    object: String,
    params: Option<Value>,
    logging_level: LoggingLevel,
    interrupters: InterrupterSet,
    default_interrupter: Interrupter,
}

impl QueryExecutor {
    /// # Errors
    ///
    /// Fails if `object` is empty.
    pub fn new(class: Arc<ComponentClass>, object: &str, params: Option<Value>) -> Result<Self> {
        ensure_pre!(!object.is_empty(), "object-is-not-empty", "Query object name is empty");
        let interrupters = InterrupterSet::new();
        let default_interrupter = Interrupter::new();
        interrupters.add(default_interrupter.clone());
        Ok(Self {
            class,
            object: object.to_string(),
            params,
            logging_level: LoggingLevel::default(),
            interrupters,
            default_interrupter,
        })
    }

    pub fn set_logging_level(&mut self, logging_level: LoggingLevel) {
        self.logging_level = logging_level;
    }

    pub const fn logging_level(&self) -> LoggingLevel {
        self.logging_level
    }

    pub const fn default_interrupter(&self) -> &Interrupter {
        &self.default_interrupter
    }

    pub fn add_interrupter(&self, interrupter: Interrupter) {
        self.interrupters.add(interrupter);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupters.is_set()
    }

    /// Runs the class's query method.
    ///
    /// A class without a query method answers [`QueryOutcome::UnknownObject`].
    /// An interrupted executor answers [`QueryOutcome::Again`] without calling
    /// the method.
    ///
    /// # Errors
    ///
    /// Returns the query method's error.
    pub fn query(&self) -> Result<QueryOutcome> {
        let Some(method) = self.class.query_method().cloned() else {
            tracing::debug!(class = %self.class.name(), "Component class has no query method");
            return Ok(QueryOutcome::UnknownObject);
        };
        if self.is_interrupted() {
            return Ok(QueryOutcome::Again);
        }

        let context =
            QueryContext { logging_level: self.logging_level, interrupters: self.interrupters.clone() };
        let outcome = method(&context, &self.object, self.params.as_ref()).cause(format!(
            "Query `{}` on component class `{}` failed",
            self.object,
            self.class.name()
        ))?;
        tracing::debug!(
            class = %self.class.name(),
            object = %self.object,
            outcome = match &outcome {
                QueryOutcome::Result(_) => "result",
                QueryOutcome::Again => "again",
                QueryOutcome::UnknownObject => "unknown-object",
            },
            "Query executed"
        );
        Ok(outcome)
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("class", &self.class.name())
            .field("object", &self.object)
            .field("logging_level", &self.logging_level)
            .finish_non_exhaustive()
    }
}
