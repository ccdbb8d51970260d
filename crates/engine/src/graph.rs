// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Component graphs and their run loop.
//!
//! A graph owns its components and their connections. Running it calls the
//! sinks' consume methods in round-robin order; each sink pulls messages from
//! its upstream iterators, which pull further upstream. Nothing runs
//! concurrently: all work happens inside [`Graph::run_once`].

use crate::config::GraphConfig;
use crate::constants::MAX_MIP_VERSION;
use crate::metrics::GraphMetrics;
use crate::simple_sink::{self, SimpleSinkConsume, SimpleSinkFinalize, SimpleSinkInitialize};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracegraph_core::component::{Component, ExecutionContext, LoggingLevel, PortInfo, PortType};
use tracegraph_core::component_class::{ComponentClass, ComponentClassType, ConsumeStatus};
use tracegraph_core::error::{ErrorContext, Result, TraceError};
use tracegraph_core::interrupter::{Interrupter, InterrupterSet};
use tracegraph_core::state::GraphState;
use tracegraph_core::ensure_pre;

/// Outcome of [`Graph::run_once`] and [`Graph::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphRunStatus {
    /// Progress was made; run again.
    Ok,
    /// Every sink is done.
    End,
    /// No progress now; try again later.
    Again,
}

/// A connection between an output port and an input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub upstream: String,
    pub output_port: String,
    pub downstream: String,
    pub input_port: String,
}

pub struct Graph {
    config: GraphConfig,
    mip_version: u64,
    state: GraphState,
    components: IndexMap<String, Component>,
    connections: Vec<Connection>,
    sinks_to_consume: VecDeque<String>,
    interrupters: InterrupterSet,
    default_interrupter: Interrupter,
    metrics: GraphMetrics,
}

impl Graph {
    /// Creates a graph with the default configuration.
    ///
    /// # Errors
    ///
    /// Fails if `mip_version` is greater than [`MAX_MIP_VERSION`].
    pub fn new(mip_version: u64) -> Result<Self> {
        Self::with_config(GraphConfig::default(), mip_version)
    }

    /// # Errors
    ///
    /// Fails if `mip_version` is greater than [`MAX_MIP_VERSION`].
    pub fn with_config(config: GraphConfig, mip_version: u64) -> Result<Self> {
        ensure_pre!(
            mip_version <= MAX_MIP_VERSION,
            "mip-version-is-valid",
            "MIP version {mip_version} is greater than {MAX_MIP_VERSION}"
        );
        let interrupters = InterrupterSet::new();
        let default_interrupter = Interrupter::new();
        interrupters.add(default_interrupter.clone());
        tracing::debug!(mip_version, batch_capacity = config.batch_capacity, "Graph created");
        Ok(Self {
            config,
            mip_version,
            state: GraphState::Configuring,
            components: IndexMap::new(),
            connections: Vec::new(),
            sinks_to_consume: VecDeque::new(),
            interrupters,
            default_interrupter,
            metrics: GraphMetrics::new(),
        })
    }

    pub const fn state(&self) -> GraphState {
        self.state
    }

    pub const fn mip_version(&self) -> u64 {
        self.mip_version
    }

    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// Components in insertion order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// The interrupter every graph has. Setting it makes `run` return `Again`.
    pub const fn default_interrupter(&self) -> &Interrupter {
        &self.default_interrupter
    }

    /// Adds an interrupter observed by the graph, its components and their
    /// iterators.
    pub fn add_interrupter(&self, interrupter: Interrupter) {
        self.interrupters.add(interrupter);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupters.is_set()
    }

    fn ensure_configuring(&self) -> Result<()> {
        ensure_pre!(
            self.state != GraphState::Faulty,
            "graph-is-not-faulty",
            "Graph is faulty"
        );
        ensure_pre!(
            self.state.can_add_components(),
            "graph-is-not-configured",
            "Graph is already configured ({})",
            self.state
        );
        Ok(())
    }

    fn context(&self) -> ExecutionContext {
        ExecutionContext {
            mip_version: self.mip_version,
            batch_capacity: self.config.batch_capacity,
            validate_messages: self.config.validate_messages,
            interrupters: self.interrupters.clone(),
            batch_observer: Some(Arc::new(self.metrics.clone())),
        }
    }

    fn fail<T>(&mut self, err: TraceError) -> Result<T> {
        tracing::error!(error = %err, "Graph is now faulty");
        self.state = GraphState::Faulty;
        Err(err)
    }

    /// Creates a component of `class` named `name` and runs its initialize
    /// method with `params`.
    ///
    /// # Errors
    ///
    /// The graph must be configuring and `name` unused. An initialize failure
    /// makes the graph faulty.
    pub fn add_component(
        &mut self,
        class: Arc<ComponentClass>,
        name: &str,
        params: Option<&Value>,
        logging_level: LoggingLevel,
    ) -> Result<Component> {
        self.ensure_configuring()?;
        ensure_pre!(
            !self.components.contains_key(name),
            "unique-component-name",
            "Graph already has a component named `{name}`"
        );

        let class_type = class.class_type();
        let component = match Component::create(class, name, params, logging_level, self.context()) {
            Ok(component) => component,
            Err(err) => return self.fail(err),
        };
        if class_type == ComponentClassType::Sink {
            self.sinks_to_consume.push_back(name.to_string());
        }
        self.components.insert(name.to_string(), component.clone());
        tracing::info!(
            component = %name,
            class = %component.class().name(),
            %class_type,
            inputs = component.input_port_count(),
            outputs = component.output_port_count(),
            "Component added to graph"
        );
        Ok(component)
    }

    fn add_typed_component(
        &mut self,
        expected: ComponentClassType,
        class: Arc<ComponentClass>,
        name: &str,
        params: Option<&Value>,
        logging_level: LoggingLevel,
    ) -> Result<Component> {
        ensure_pre!(
            class.class_type() == expected,
            "component-class-type-matches",
            "Component class `{}` is a {}, not a {expected}",
            class.name(),
            class.class_type()
        );
        self.add_component(class, name, params, logging_level)
    }

    /// # Errors
    ///
    /// See [`Self::add_component`]; `class` must be a source class.
    pub fn add_source_component(
        &mut self,
        class: Arc<ComponentClass>,
        name: &str,
        params: Option<&Value>,
        logging_level: LoggingLevel,
    ) -> Result<Component> {
        self.add_typed_component(ComponentClassType::Source, class, name, params, logging_level)
    }

    /// # Errors
    ///
    /// See [`Self::add_component`]; `class` must be a filter class.
    pub fn add_filter_component(
        &mut self,
        class: Arc<ComponentClass>,
        name: &str,
        params: Option<&Value>,
        logging_level: LoggingLevel,
    ) -> Result<Component> {
        self.add_typed_component(ComponentClassType::Filter, class, name, params, logging_level)
    }

    /// # Errors
    ///
    /// See [`Self::add_component`]; `class` must be a sink class.
    pub fn add_sink_component(
        &mut self,
        class: Arc<ComponentClass>,
        name: &str,
        params: Option<&Value>,
        logging_level: LoggingLevel,
    ) -> Result<Component> {
        self.add_typed_component(ComponentClassType::Sink, class, name, params, logging_level)
    }

    /// Adds a sink with a single `in` port whose behavior is given by closures.
    ///
    /// `initialize` runs once the graph is configured, with the iterator on
    /// `in`; `consume` runs on every consume call; `finalize` runs when the
    /// component is finalized.
    ///
    /// # Errors
    ///
    /// See [`Self::add_component`].
    pub fn add_simple_sink_component(
        &mut self,
        name: &str,
        initialize: Option<SimpleSinkInitialize>,
        consume: SimpleSinkConsume,
        finalize: Option<SimpleSinkFinalize>,
    ) -> Result<Component> {
        let class = simple_sink::component_class(initialize, consume, finalize)?;
        self.add_component(Arc::new(class), name, None, LoggingLevel::default())
    }

    fn component_or_err(&self, name: &str) -> Result<Component> {
        self.components.get(name).cloned().ok_or_else(|| {
            tracing::error!(component = %name, "No such component in graph");
            TraceError::Configuration(format!("Graph has no component named `{name}`"))
        })
    }

    /// Connects `upstream`'s output port to `downstream`'s input port, then
    /// calls the port-connected methods of the upstream and downstream
    /// components, in that order.
    ///
    /// # Errors
    ///
    /// Both ports must exist and be free. A port-connected method failure
    /// undoes the connection and makes the graph faulty.
    pub fn connect_ports(
        &mut self,
        upstream: &str,
        output_port: &str,
        downstream: &str,
        input_port: &str,
    ) -> Result<()> {
        self.ensure_configuring()?;
        let up = self.component_or_err(upstream)?;
        let down = self.component_or_err(downstream)?;
        down.attach_upstream(input_port, &up, output_port)?;

        let downstream_info = PortInfo {
            component_name: downstream.to_string(),
            port_name: input_port.to_string(),
            port_type: PortType::Input,
        };
        let upstream_info = PortInfo {
            component_name: upstream.to_string(),
            port_name: output_port.to_string(),
            port_type: PortType::Output,
        };
        let notified = up
            .output_port_connected(output_port, &downstream_info)
            .and_then(|()| down.input_port_connected(input_port, &upstream_info));
        if let Err(err) = notified {
            down.detach_upstream(input_port);
            return self.fail(err.with_cause(format!(
                "Cannot connect `{upstream}.{output_port}` to `{downstream}.{input_port}`"
            )));
        }

        tracing::debug!(
            upstream = %upstream,
            output_port = %output_port,
            downstream = %downstream,
            input_port = %input_port,
            "Ports connected"
        );
        self.connections.push(Connection {
            upstream: upstream.to_string(),
            output_port: output_port.to_string(),
            downstream: downstream.to_string(),
            input_port: input_port.to_string(),
        });
        Ok(())
    }

    fn configure(&mut self) -> Result<()> {
        let unconnected: Vec<String> = self
            .components
            .values()
            .filter(|c| c.class_type() == ComponentClassType::Sink)
            .flat_map(|c| c.unconnected_input_ports().into_iter().map(move |p| format!("{}.{p}", c.name())))
            .collect();
        if !unconnected.is_empty() {
            return self.fail(TraceError::Configuration(format!(
                "Unconnected input ports: {}",
                unconnected.join(", ")
            )));
        }
        // Filters may keep a free port for the next connection.
        let starved: Vec<&str> = self
            .components
            .values()
            .filter(|c| {
                c.class_type() == ComponentClassType::Filter
                    && c.unconnected_input_ports().len() == c.input_port_count()
            })
            .map(Component::name)
            .collect();
        if !starved.is_empty() {
            return self.fail(TraceError::Configuration(format!(
                "Filters without a connected input port: {}",
                starved.join(", ")
            )));
        }
        if self.sinks_to_consume.is_empty() {
            return self.fail(TraceError::Configuration("Graph has no sink component".to_string()));
        }

        let sinks: Vec<Component> = self
            .components
            .values()
            .filter(|c| c.class_type() == ComponentClassType::Sink)
            .cloned()
            .collect();
        for sink in sinks {
            if let Err(err) = sink.graph_is_configured() {
                return self.fail(err);
            }
        }
        self.state = GraphState::Configured;
        tracing::info!(
            components = self.components.len(),
            connections = self.connections.len(),
            sinks = self.sinks_to_consume.len(),
            "Graph configured"
        );
        Ok(())
    }

    /// Configures the graph on first call, then calls the consume method of
    /// the next sink.
    ///
    /// # Errors
    ///
    /// Fails on a faulty graph, if configuration fails or if the sink fails.
    /// Any failure makes the graph faulty.
    pub fn run_once(&mut self) -> Result<GraphRunStatus> {
        ensure_pre!(
            self.state != GraphState::Faulty,
            "graph-is-not-faulty",
            "Graph is faulty"
        );
        match self.state {
            GraphState::Ended => return Ok(GraphRunStatus::End),
            GraphState::Configuring => self.configure()?,
            GraphState::Configured | GraphState::Faulty => {},
        }
        if self.is_interrupted() {
            return Ok(GraphRunStatus::Again);
        }

        let Some(sink_name) = self.sinks_to_consume.pop_front() else {
            self.state = GraphState::Ended;
            return Ok(GraphRunStatus::End);
        };
        let sink = self.component_or_err(&sink_name)?;
        let status = match sink.consume() {
            Ok(status) => status,
            Err(err) => {
                self.metrics.record_consume(&sink_name, None);
                return self.fail(err);
            },
        };
        self.metrics.record_consume(&sink_name, Some(status));

        match status {
            ConsumeStatus::Ok => {
                self.sinks_to_consume.push_back(sink_name);
                Ok(GraphRunStatus::Ok)
            },
            ConsumeStatus::Again => {
                self.sinks_to_consume.push_back(sink_name);
                Ok(GraphRunStatus::Again)
            },
            ConsumeStatus::End => {
                tracing::debug!(sink = %sink_name, "Sink ended");
                if self.sinks_to_consume.is_empty() {
                    self.state = GraphState::Ended;
                    tracing::info!("All sinks ended");
                    Ok(GraphRunStatus::End)
                } else {
                    Ok(GraphRunStatus::Ok)
                }
            },
        }
    }

    /// Runs the graph until every sink ended, it is interrupted, or the only
    /// remaining sink reports `Again`.
    ///
    /// # Errors
    ///
    /// See [`Self::run_once`].
    pub fn run(&mut self) -> Result<GraphRunStatus> {
        let start = Instant::now();
        let result = self.run_loop();
        let status = match &result {
            Ok(GraphRunStatus::End) => "end",
            Ok(GraphRunStatus::Again) => "again",
            Ok(GraphRunStatus::Ok) => "ok",
            Err(_) => "error",
        };
        self.metrics.record_run(start.elapsed().as_secs_f64(), status);
        result.cause("Graph run failed")
    }

    fn run_loop(&mut self) -> Result<GraphRunStatus> {
        loop {
            if self.is_interrupted() {
                tracing::info!("Graph is interrupted");
                return Ok(GraphRunStatus::Again);
            }
            match self.run_once()? {
                GraphRunStatus::Ok => {},
                // Other sinks may still make progress.
                GraphRunStatus::Again if self.sinks_to_consume.len() > 1 => {},
                status => return Ok(status),
            }
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        // Downstream first so iterators release their upstream components.
        for class_type in [ComponentClassType::Sink, ComponentClassType::Filter, ComponentClassType::Source] {
            for component in self.components.values().filter(|c| c.class_type() == class_type) {
                component.finalize();
            }
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("state", &self.state)
            .field("mip_version", &self.mip_version)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}
