// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use tracegraph_core::component_class::ComponentClass;
use tracegraph_core::error::{ErrorContext, Result, TraceError};
use tracegraph_core::registry::ComponentClassRegistry;

use crate::config::GraphConfig;
use crate::definition::GraphDefinition;
use crate::graph::Graph;
use crate::mip::{greatest_operative_mip_version, ComponentDescriptorSet};

/// Builds a configuring graph from a definition, resolving component classes
/// through `registry`.
///
/// When `config.negotiate_mip` is set, the graph uses the greatest MIP
/// version every component class supports; otherwise `config.mip_version`.
///
/// # Errors
///
/// Returns a configuration error if a class is unknown, an endpoint is
/// malformed or the classes share no MIP version. Component and connection
/// failures are returned as-is.
pub fn build_graph(
    definition: &GraphDefinition,
    registry: &ComponentClassRegistry,
    config: GraphConfig,
) -> Result<Graph> {
    tracing::info!(
        name = definition.name.as_deref().unwrap_or("<unnamed>"),
        components = definition.components.len(),
        connections = definition.connections.len(),
        "Building graph"
    );

    // --- 1. Resolve component classes ---
    let mut classes: Vec<(&str, Arc<ComponentClass>)> = Vec::with_capacity(definition.components.len());
    for (name, component) in &definition.components {
        let key = component.class_key()?;
        let Some(class) = registry.get_by_key(&key) else {
            tracing::error!(component = %name, class = %key, "Unknown component class");
            return Err(TraceError::Configuration(format!(
                "Component `{name}` uses unknown component class `{key}`"
            )));
        };
        classes.push((name.as_str(), class.clone()));
    }

    // --- 2. Pick the MIP version ---
    let mip_version = if config.negotiate_mip && !classes.is_empty() {
        let mut descriptors = ComponentDescriptorSet::new();
        for ((_, class), component) in classes.iter().zip(definition.components.values()) {
            descriptors.add_descriptor(class.clone(), component.params.clone(), component.logging_level);
        }
        greatest_operative_mip_version(&descriptors)?.ok_or_else(|| {
            TraceError::Configuration(
                "Component classes have no message interchange protocol version in common".to_string(),
            )
        })?
    } else {
        config.mip_version
    };

    // --- 3. Add components ---
    let mut graph = Graph::with_config(config, mip_version)?;
    for ((name, class), component) in classes.into_iter().zip(definition.components.values()) {
        graph
            .add_component(class, name, component.params.as_ref(), component.logging_level)
            .cause(format!("Cannot add component `{name}`"))?;
    }

    // --- 4. Connect ports ---
    for connection in &definition.connections {
        let (from, to) = connection.endpoints()?;
        graph.connect_ports(&from.component, &from.port, &to.component, &to.port)?;
    }

    tracing::info!(mip_version, "Graph built");
    Ok(graph)
}
