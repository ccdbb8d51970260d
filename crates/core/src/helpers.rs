// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Utility functions for component implementations.
//!
//! - [`params_helpers`]: Parse component parameters from JSON values

/// Helper functions for parsing component parameters.
pub mod params_helpers {
    use crate::error::{Result, TraceError};
    use serde::Deserialize;

    /// Parses parameters from an optional JSON value, using defaults if not
    /// provided. A `null` value counts as not provided.
    ///
    /// # Errors
    ///
    /// Returns `TraceError::Configuration` if the value does not deserialize.
    pub fn parse_params_optional<T>(params: Option<&serde_json::Value>) -> Result<T>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        match params {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| TraceError::Configuration(format!("Invalid parameters: {e}"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::params_helpers::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize, PartialEq, Eq)]
    #[serde(default)]
    struct Params {
        count: u32,
    }

    #[test]
    fn optional_params_default_when_absent() {
        assert_eq!(parse_params_optional::<Params>(None).unwrap(), Params::default());
        assert_eq!(parse_params_optional::<Params>(Some(&json!(null))).unwrap(), Params::default());
        assert_eq!(parse_params_optional::<Params>(Some(&json!({"count": 3}))).unwrap().count, 3);
    }

    #[test]
    fn malformed_params_are_rejected() {
        assert!(parse_params_optional::<Params>(Some(&json!({"count": "three"}))).is_err());
        assert!(parse_params_optional::<Params>(Some(&json!("three"))).is_err());
    }
}
