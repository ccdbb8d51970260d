// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! YAML graph definitions.
//!
//! ```yaml
//! name: merge
//! components:
//!   gen-a:
//!     class: source.utils.generator
//!     params: { packets: 2 }
//!   mux:
//!     class: filter.utils.muxer
//!   count:
//!     class: sink.utils.counter
//!     logging_level: info
//! connections:
//!   - gen-a.out -> mux.in0
//!   - from: mux.out
//!     to: count.in
//! ```

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracegraph_core::component::LoggingLevel;
use tracegraph_core::error::{Result, TraceError};
use tracegraph_core::registry::ComponentClassKey;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComponentDefinition {
    /// Component class as `TYPE.PLUGIN.NAME`.
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub logging_level: LoggingLevel,
}

impl ComponentDefinition {
    /// # Errors
    ///
    /// Fails if `class` is not a valid `TYPE.PLUGIN.NAME` triple.
    pub fn class_key(&self) -> Result<ComponentClassKey> {
        self.class.parse().map_err(TraceError::Configuration)
    }
}

/// One side of a connection: `component.port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub component: String,
    pub port: String,
}

impl Endpoint {
    /// Splits on the first `.`; port names may contain dots.
    ///
    /// # Errors
    ///
    /// Fails if there is no `.` or either side is empty.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().split_once('.') {
            Some((component, port)) if !component.is_empty() && !port.is_empty() => {
                Ok(Self { component: component.to_string(), port: port.to_string() })
            },
            _ => Err(TraceError::Configuration(format!(
                "Invalid endpoint '{s}', expected COMPONENT.PORT"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ConnectionDefinition {
    /// `"upstream.port -> downstream.port"`
    Arrow(String),
    Explicit { from: String, to: String },
}

impl ConnectionDefinition {
    /// # Errors
    ///
    /// Fails on a malformed connection or endpoint.
    pub fn endpoints(&self) -> Result<(Endpoint, Endpoint)> {
        match self {
            Self::Arrow(s) => {
                let Some((from, to)) = s.split_once("->") else {
                    return Err(TraceError::Configuration(format!(
                        "Invalid connection '{s}', expected 'a.out -> b.in'"
                    )));
                };
                Ok((Endpoint::parse(from)?, Endpoint::parse(to)?))
            },
            Self::Explicit { from, to } => Ok((Endpoint::parse(from)?, Endpoint::parse(to)?)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub components: IndexMap<String, ComponentDefinition>,
    #[serde(default)]
    pub connections: Vec<ConnectionDefinition>,
}

impl GraphDefinition {
    /// # Errors
    ///
    /// Returns a configuration error if the document does not parse.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_saphyr::from_str(yaml)
            .map_err(|e| TraceError::Configuration(format!("Invalid graph definition: {e}")))
    }

    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a configuration
    /// error if it does not parse.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }
}
