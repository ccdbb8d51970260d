// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Runtime configuration for graphs.

use crate::constants::{DEFAULT_BATCH_CAPACITY, DEFAULT_MIP_VERSION};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Configuration applied to every component of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GraphConfig {
    /// Maximum messages per iterator batch (default: 15).
    pub batch_capacity: usize,
    /// Check the message sequence every iterator returns. Only effective in
    /// builds with developer checks.
    pub validate_messages: bool,
    /// Negotiate the MIP version from the component classes when building a
    /// graph from a definition.
    pub negotiate_mip: bool,
    /// MIP version used when negotiation is off.
    pub mip_version: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            validate_messages: true,
            negotiate_mip: true,
            mip_version: DEFAULT_MIP_VERSION,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: GraphConfig = serde_json::from_str(r#"{"batch_capacity": 4}"#).unwrap();
        assert_eq!(config.batch_capacity, 4);
        assert!(config.validate_messages);
        assert_eq!(config.mip_version, DEFAULT_MIP_VERSION);
    }
}
