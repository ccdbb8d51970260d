// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for tracegraph.
//!
//! Two taxonomies share one enum:
//! - precondition violations ([`TraceError::Precondition`]) report API misuse and
//!   carry a stable identifier (see [`crate::precondition`]);
//! - operational errors (allocation, overflow, plugin and component failures) are
//!   recoverable by the caller and may be chained with [`ErrorContext::cause`].

use crate::precondition::PreconditionViolation;
use thiserror::Error;

/// Main error type for tracegraph operations.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Memory allocation failed.
    ///
    /// Examples:
    /// - Reserving storage for a name, description or EMF URI
    /// - Growing a message batch
    #[error("Memory error: {0}")]
    Memory(String),

    /// Arithmetic overflow.
    ///
    /// Examples:
    /// - Cycle to nanosecond conversion exceeding a signed 64-bit count
    /// - Clock class offset that cannot be expressed in nanoseconds
    #[error("Overflow error: {0}")]
    Overflow(String),

    /// An API contract was not honored by the caller.
    #[error("Precondition not satisfied: {0}")]
    Precondition(#[from] PreconditionViolation),

    /// A user-supplied component or iterator method reported a failure.
    ///
    /// Examples:
    /// - Source initialization rejected its parameters
    /// - A message iterator `next` method failed to read its input
    #[error("Component error: {0}")]
    Component(String),

    /// Plugin loading, initialization or registration error.
    ///
    /// Examples:
    /// - Mismatched begin/end descriptor sections
    /// - Plugin initialization function returned a negative status
    /// - Duplicate component class name within a plugin
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Configuration or graph-structure error.
    ///
    /// Examples:
    /// - Unconnected input port when the graph is configured
    /// - Unknown component class in a graph definition
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error (plugin directories, configuration files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error wrapped with additional context. Walk the chain with
    /// [`TraceError::causes`].
    #[error("{message}")]
    Caused {
        message: String,
        #[source]
        cause: Box<TraceError>,
    },
}

/// Convenience type alias for Results using `TraceError`.
pub type Result<T> = std::result::Result<T, TraceError>;

impl TraceError {
    /// Wraps `self` as the cause of a new error carrying `message`.
    #[must_use]
    pub fn with_cause(self, message: impl Into<String>) -> Self {
        Self::Caused { message: message.into(), cause: Box::new(self) }
    }

    /// Iterates over this error and every error it wraps, outermost first.
    pub fn causes(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |err| match err {
            Self::Caused { cause, .. } => Some(cause.as_ref()),
            _ => None,
        })
    }

    /// Returns the innermost error of the cause chain.
    pub fn root_cause(&self) -> &Self {
        self.causes().last().unwrap_or(self)
    }

    /// Returns the precondition violation at the root of the chain, if any.
    pub fn precondition(&self) -> Option<&PreconditionViolation> {
        match self.root_cause() {
            Self::Precondition(violation) => Some(violation),
            _ => None,
        }
    }
}

/// Adds a cause-chain link to a fallible result.
pub trait ErrorContext<T> {
    /// Wraps the error, if any, with `message`.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped in [`TraceError::Caused`].
    fn cause(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn cause(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|err| err.with_cause(message))
    }
}

impl From<TraceError> for String {
    fn from(err: TraceError) -> Self {
        err.to_string()
    }
}

// Generic string errors come from user methods.
impl From<String> for TraceError {
    fn from(s: String) -> Self {
        Self::Component(s)
    }
}

impl From<&str> for TraceError {
    fn from(s: &str) -> Self {
        Self::Component(s.to_string())
    }
}

impl From<std::collections::TryReserveError> for TraceError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::Memory(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::precondition::CheckTier;

    #[test]
    fn test_error_display() {
        let err = TraceError::Overflow("cycles to ns".to_string());
        assert_eq!(err.to_string(), "Overflow error: cycles to ns");

        let err = TraceError::Configuration("Input port `in0` is not connected".to_string());
        assert_eq!(err.to_string(), "Configuration error: Input port `in0` is not connected");
    }

    #[test]
    fn test_string_to_error_conversion() {
        let err: TraceError = "Cannot open input".into();
        assert_eq!(err.to_string(), "Component error: Cannot open input");
    }

    #[test]
    fn test_cause_chain() {
        let result: Result<()> = Err(TraceError::Memory("name".to_string()));
        let err = result.cause("Cannot set stream class name").unwrap_err();
        let messages: Vec<String> = err.causes().map(ToString::to_string).collect();
        assert_eq!(messages, vec!["Cannot set stream class name", "Memory error: name"]);
        assert!(matches!(err.root_cause(), TraceError::Memory(_)));
    }

    #[test]
    fn test_precondition_lookup_through_chain() {
        let violation = PreconditionViolation::new(CheckTier::Pre, "count-gt-0", "count is 0");
        let err = TraceError::from(violation).with_cause("Cannot set count");
        assert_eq!(err.precondition().map(|v| v.id), Some("count-gt-0"));
    }
}
