// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! engine: Graph execution for tracegraph.
//! This crate connects components into graphs and drives them, runs queries
//! and negotiates the message interchange protocol version.

use anyhow::Context;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracegraph_core::component_class::QueryOutcome;
use tracegraph_core::error::{Result, TraceError};
use tracegraph_core::plugin::PluginSet;
use tracegraph_core::registry::{ComponentClassKey, ComponentClassRegistry};

// --- Public Modules ---

pub mod config;
pub mod constants;
pub mod definition;
pub mod graph;
pub mod graph_builder;
pub mod mip;
pub mod query;

mod metrics;
mod simple_sink;

// Re-exports
pub use config::GraphConfig;
pub use definition::{ComponentDefinition, ConnectionDefinition, Endpoint, GraphDefinition};
pub use graph::{Connection, Graph, GraphRunStatus};
pub use graph_builder::build_graph;
pub use mip::{greatest_operative_mip_version, ComponentDescriptor, ComponentDescriptorSet};
pub use query::QueryExecutor;
pub use simple_sink::{SimpleSinkConsume, SimpleSinkFinalize, SimpleSinkInitialize};

// --- Engine Structs ---

/// Entry point tying a component-class registry to a graph configuration.
pub struct Engine {
    pub registry: Arc<RwLock<ComponentClassRegistry>>,
    pub config: GraphConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with the built-in `utils` component classes.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        let engine = Self::without_builtins(config);
        match tracegraph_plugin_native::load_all_from_static(tracegraph_components::descriptor_tables(), true)
        {
            Ok(Some(plugins)) => engine.register_plugins(&plugins),
            Ok(None) => tracing::warn!("Built-in plugin table is empty"),
            Err(e) => tracing::error!(error = %e, "Failed to load built-in component classes"),
        }
        engine
    }

    /// Creates an engine with an empty registry.
    pub fn without_builtins(config: GraphConfig) -> Self {
        Self { registry: Arc::new(RwLock::new(ComponentClassRegistry::new())), config }
    }

    pub fn register_plugins(&self, plugins: &PluginSet) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.register_plugin_set(plugins);
        tracing::info!(plugins = plugins.len(), classes = registry.len(), "Registered plugins");
    }

    /// Loads every plugin found in `dir` and registers its component classes.
    /// Returns the number of plugins loaded.
    ///
    /// # Errors
    ///
    /// With `fail_on_load_error`, any plugin load failure is an error;
    /// otherwise only an unreadable directory is.
    pub fn load_plugins_from_dir(
        &self,
        dir: &Path,
        recurse: bool,
        fail_on_load_error: bool,
    ) -> anyhow::Result<usize> {
        let plugins = tracegraph_plugin_native::load_all_from_dir(dir, recurse, fail_on_load_error)
            .with_context(|| format!("Failed to load plugins from {}", dir.display()))?;
        let Some(plugins) = plugins else {
            tracing::info!(?dir, "No plugins found in directory");
            return Ok(0);
        };
        self.register_plugins(&plugins);
        Ok(plugins.len())
    }

    /// # Errors
    ///
    /// See [`build_graph`].
    pub fn build_graph(&self, definition: &GraphDefinition) -> Result<Graph> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        build_graph(definition, &registry, self.config.clone())
    }

    /// Queries the registered class `key` about `object`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown class, otherwise the
    /// query method's error.
    pub fn query(
        &self,
        key: &ComponentClassKey,
        object: &str,
        params: Option<serde_json::Value>,
    ) -> Result<QueryOutcome> {
        let class = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_by_key(key)
            .cloned()
            .ok_or_else(|| TraceError::Configuration(format!("Unknown component class `{key}`")))?;
        QueryExecutor::new(class, object, params)?.query()
    }
}

#[cfg(test)]
mod tests;
