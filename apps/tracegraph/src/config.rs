// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracegraph_engine::GraphConfig;
use tracing::Level;

/// Prefix of environment overrides, e.g. `TRACEGRAPH_LOG__CONSOLE_LEVEL=debug`.
pub const ENV_PREFIX: &str = "TRACEGRAPH_";

/// Log level for filtering messages.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Log output format.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration for console and file output.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(default)]
pub struct LogConfig {
    pub console_enable: bool,
    pub console_level: LogLevel,
    pub console_format: LogFormat,
    pub file_enable: bool,
    pub file_level: LogLevel,
    pub file_path: String,
    pub file_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            console_level: LogLevel::default(),
            console_format: LogFormat::default(),
            file_enable: false,
            file_level: LogLevel::Info,
            file_path: "./tracegraph.log".to_string(),
            file_format: LogFormat::default(),
        }
    }
}

/// Where to look for shared-object plugins.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(default)]
pub struct PluginConfig {
    /// Directories scanned for plugins, in order. The first plugin with a
    /// given name wins.
    pub directories: Vec<String>,
    /// Scan subdirectories too.
    pub recurse: bool,
    /// Abort on the first plugin that fails to load instead of skipping it.
    pub fail_on_load_error: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self { directories: Vec::new(), recurse: true, fail_on_load_error: false }
    }
}

const fn default_retry_duration_us() -> u64 {
    tracegraph_engine::constants::DEFAULT_AGAIN_RETRY_US
}

/// Graph run loop settings.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct RunConfig {
    /// Sleep between runs while the graph reports `Again` (microseconds).
    #[serde(default = "default_retry_duration_us")]
    pub retry_duration_us: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { retry_duration_us: default_retry_duration_us() }
    }
}

/// Root configuration for the tracegraph runner.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub plugins: PluginConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: Config,
    pub file_missing: Option<String>,
}

/// Loads the configuration from defaults, a TOML file, and environment variables.
///
/// # Errors
///
/// Returns an error if the configuration file exists but is not valid TOML,
/// or if any layer holds a value of the wrong type.
pub fn load(config_path: &str) -> Result<ConfigLoadResult, Box<figment::Error>> {
    let mut figment =
        Figment::new().merge(figment::providers::Serialized::defaults(Config::default()));

    let mut file_missing = None;

    if std::path::Path::new(config_path).exists() {
        figment = figment.merge(Toml::file(config_path));
    } else {
        file_missing = Some(config_path.to_string());
    }

    let config: Config =
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().map_err(Box::new)?;

    Ok(ConfigLoadResult { config, file_missing })
}

/// Generates the default configuration as a pretty-printed TOML string.
///
/// # Errors
///
/// Returns an error if the default configuration cannot be serialized to TOML.
pub fn generate_default() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&Config::default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let result = load(path.to_str().unwrap()).unwrap();
        assert_eq!(result.file_missing.as_deref(), path.to_str());
        assert_eq!(result.config.graph, GraphConfig::default());
        assert!(result.config.plugins.recurse);
        assert_eq!(result.config.run.retry_duration_us, 100_000);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracegraph.toml");
        std::fs::write(
            &path,
            r#"
[log]
console_level = "debug"
console_format = "json"

[plugins]
directories = ["/opt/tracegraph/plugins"]
fail_on_load_error = true

[graph]
batch_capacity = 4

[run]
retry_duration_us = 10
"#,
        )
        .unwrap();

        let result = load(path.to_str().unwrap()).unwrap();
        assert!(result.file_missing.is_none());
        let config = result.config;
        assert_eq!(config.log.console_level, LogLevel::Debug);
        assert_eq!(config.log.console_format, LogFormat::Json);
        assert!(config.log.console_enable);
        assert_eq!(config.plugins.directories, ["/opt/tracegraph/plugins"]);
        assert!(config.plugins.fail_on_load_error);
        assert!(config.plugins.recurse);
        assert_eq!(config.graph.batch_capacity, 4);
        assert!(config.graph.validate_messages);
        assert_eq!(config.run.retry_duration_us, 10);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracegraph.toml");
        std::fs::write(&path, "[graph]\nbatch_capacity = \"many\"\n").unwrap();
        assert!(load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let toml_string = generate_default().unwrap();
        let config: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.graph, GraphConfig::default());
        assert_eq!(config.log.console_level, LogLevel::Warn);
    }
}
