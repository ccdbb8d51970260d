// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Component instances, their ports and the handle user methods receive.

use crate::component_class::{ComponentClass, ComponentClassType, ConsumeStatus};
use crate::error::{ErrorContext, Result, TraceError};
use crate::interrupter::InterrupterSet;
use crate::iterator::MessageIterator;
use crate::object::lock;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Logging level of a component, from most to least verbose.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warning,
    Error,
    Fatal,
    None,
}

impl LoggingLevel {
    /// Whether a message at `level` passes this threshold.
    pub fn enabled(self, level: Self) -> bool {
        self != Self::None && level >= self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    Input,
    Output,
}

/// Describes the other end of a connection to port-connected methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub component_name: String,
    pub port_name: String,
    pub port_type: PortType,
}

/// Receives the size of every batch a message iterator delivers.
pub trait BatchObserver: Send + Sync {
    fn batch_delivered(&self, component: &str, port: &str, messages: usize);
}

/// Runtime settings a graph hands to each of its components.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Negotiated message interchange protocol version.
    pub mip_version: u64,
    /// Maximum number of messages per iterator batch.
    pub batch_capacity: usize,
    /// Run the message sequence checks on iterator output.
    pub validate_messages: bool,
    pub interrupters: InterrupterSet,
    pub batch_observer: Option<Arc<dyn BatchObserver>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            mip_version: 0,
            batch_capacity: crate::iterator::DEFAULT_BATCH_CAPACITY,
            validate_messages: true,
            interrupters: InterrupterSet::new(),
            batch_observer: None,
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("mip_version", &self.mip_version)
            .field("batch_capacity", &self.batch_capacity)
            .field("validate_messages", &self.validate_messages)
            .field("interrupters", &self.interrupters.len())
            .field("batch_observer", &self.batch_observer.is_some())
            .finish()
    }
}

#[derive(Clone)]
struct Upstream {
    component: Component,
    port_name: String,
}

struct InputPort {
    name: String,
    upstream: Option<Upstream>,
}

struct OutputPort {
    name: String,
    connected: bool,
}

#[derive(Default)]
struct Ports {
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
}

pub(crate) struct ComponentInner {
    name: String,
    class: Arc<ComponentClass>,
    logging_level: LoggingLevel,
    context: ExecutionContext,
    ports: Mutex<Ports>,
    data: Mutex<Option<Box<dyn Any + Send>>>,
    finalized: AtomicBool,
}

/// A component instance. Clones share the same component.
#[derive(Clone)]
pub struct Component(Arc<ComponentInner>);

impl Component {
    /// Creates a component of `class` and runs its initialize method.
    ///
    /// # Errors
    ///
    /// Returns the initialize method's error, wrapped with the component name.
    pub fn create(
        class: Arc<ComponentClass>,
        name: &str,
        params: Option<&Value>,
        logging_level: LoggingLevel,
        context: ExecutionContext,
    ) -> Result<Self> {
        ensure_pre!(!name.is_empty(), "name-is-not-empty", "Component name is empty");
        let component = Self(Arc::new(ComponentInner {
            name: name.to_string(),
            class,
            logging_level,
            context,
            ports: Mutex::default(),
            data: Mutex::new(None),
            finalized: AtomicBool::new(false),
        }));

        if let Some(initialize) = component.class().methods.initialize.clone() {
            let mut self_component = SelfComponent::new(component.clone());
            initialize(&mut self_component, params)
                .cause(format!("Failed to initialize component `{name}`"))?;
        }
        tracing::debug!(
            component = %name,
            class = %component.class().name(),
            class_type = %component.class_type(),
            "Component initialized"
        );
        Ok(component)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn class(&self) -> &Arc<ComponentClass> {
        &self.0.class
    }

    pub fn class_type(&self) -> ComponentClassType {
        self.0.class.class_type()
    }

    pub fn logging_level(&self) -> LoggingLevel {
        self.0.logging_level
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.0.context
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.context.interrupters.is_set()
    }

    pub fn input_port_names(&self) -> Vec<String> {
        lock(&self.0.ports).inputs.iter().map(|p| p.name.clone()).collect()
    }

    pub fn output_port_names(&self) -> Vec<String> {
        lock(&self.0.ports).outputs.iter().map(|p| p.name.clone()).collect()
    }

    pub fn input_port_count(&self) -> usize {
        lock(&self.0.ports).inputs.len()
    }

    pub fn output_port_count(&self) -> usize {
        lock(&self.0.ports).outputs.len()
    }

    pub fn has_input_port(&self, name: &str) -> bool {
        lock(&self.0.ports).inputs.iter().any(|p| p.name == name)
    }

    pub fn has_output_port(&self, name: &str) -> bool {
        lock(&self.0.ports).outputs.iter().any(|p| p.name == name)
    }

    pub fn is_input_port_connected(&self, name: &str) -> bool {
        lock(&self.0.ports).inputs.iter().any(|p| p.name == name && p.upstream.is_some())
    }

    pub fn is_output_port_connected(&self, name: &str) -> bool {
        lock(&self.0.ports).outputs.iter().any(|p| p.name == name && p.connected)
    }

    /// Names of the input ports that have no connection yet.
    pub fn unconnected_input_ports(&self) -> Vec<String> {
        lock(&self.0.ports)
            .inputs
            .iter()
            .filter(|p| p.upstream.is_none())
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Records a connection from `upstream`'s output port to this component's
    /// input port. Port-connected methods are not called.
    ///
    /// # Errors
    ///
    /// Both ports must exist and be free.
    pub fn attach_upstream(
        &self,
        input_port: &str,
        upstream: &Self,
        output_port: &str,
    ) -> Result<()> {
        ensure_pre!(
            upstream.has_output_port(output_port),
            "output-port-exists",
            "Component `{}` has no output port `{output_port}`",
            upstream.name()
        );
        ensure_pre!(
            !upstream.is_output_port_connected(output_port),
            "output-port-is-not-connected",
            "Output port `{}.{output_port}` is already connected",
            upstream.name()
        );
        {
            let mut ports = lock(&self.0.ports);
            let Some(port) = ports.inputs.iter_mut().find(|p| p.name == input_port) else {
                return Err(crate::precondition::violation(
                    crate::precondition::CheckTier::Pre,
                    "input-port-exists",
                    format!("Component `{}` has no input port `{input_port}`", self.name()),
                )
                .into());
            };
            ensure_pre!(
                port.upstream.is_none(),
                "input-port-is-not-connected",
                "Input port `{}.{input_port}` is already connected",
                self.name()
            );
            port.upstream =
                Some(Upstream { component: upstream.clone(), port_name: output_port.to_string() });
        }
        let mut upstream_ports = lock(&upstream.0.ports);
        if let Some(port) = upstream_ports.outputs.iter_mut().find(|p| p.name == output_port) {
            port.connected = true;
        }
        Ok(())
    }

    /// Undoes [`Self::attach_upstream`] for `input_port`. Returns whether the
    /// port was connected.
    pub fn detach_upstream(&self, input_port: &str) -> bool {
        let upstream = {
            let mut ports = lock(&self.0.ports);
            ports.inputs.iter_mut().find(|p| p.name == input_port).and_then(|p| p.upstream.take())
        };
        let Some(upstream) = upstream else {
            return false;
        };
        let mut upstream_ports = lock(&upstream.component.0.ports);
        if let Some(port) = upstream_ports.outputs.iter_mut().find(|p| p.name == upstream.port_name) {
            port.connected = false;
        }
        true
    }

    /// # Errors
    ///
    /// Returns the method's error, if any.
    pub fn input_port_connected(&self, port: &str, other: &PortInfo) -> Result<()> {
        let Some(method) = self.class().methods.input_port_connected.clone() else {
            return Ok(());
        };
        method(&mut SelfComponent::new(self.clone()), port, other)
            .cause(format!("Component `{}` rejected connection on `{port}`", self.name()))
    }

    /// # Errors
    ///
    /// Returns the method's error, if any.
    pub fn output_port_connected(&self, port: &str, other: &PortInfo) -> Result<()> {
        let Some(method) = self.class().methods.output_port_connected.clone() else {
            return Ok(());
        };
        method(&mut SelfComponent::new(self.clone()), port, other)
            .cause(format!("Component `{}` rejected connection on `{port}`", self.name()))
    }

    /// # Errors
    ///
    /// Returns the method's error, if any.
    pub fn graph_is_configured(&self) -> Result<()> {
        let Some(method) = self.class().methods.graph_is_configured.clone() else {
            return Ok(());
        };
        method(&mut SelfComponent::new(self.clone()))
            .cause(format!("Sink `{}` failed to handle graph configuration", self.name()))
    }

    /// Runs the sink's consume method once.
    ///
    /// # Errors
    ///
    /// Fails if the component is not a sink or if the method fails.
    pub fn consume(&self) -> Result<ConsumeStatus> {
        let Some(consume) = self.class().methods.consume.clone() else {
            return Err(TraceError::Component(format!("Component `{}` is not a sink", self.name())));
        };
        consume(&mut SelfComponent::new(self.clone()))
            .map_err(|err| err.with_cause(format!("Sink `{}` failed to consume", self.name())))
    }

    /// Runs the finalize method once, then drops the user data.
    pub fn finalize(&self) {
        if self.0.finalized.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(finalize) = self.class().methods.finalize.clone() {
            finalize(&mut SelfComponent::new(self.clone()));
        }
        let data = lock(&self.0.data).take();
        drop(data);
        // Release upstream references held by input ports.
        for port in &mut lock(&self.0.ports).inputs {
            port.upstream = None;
        }
        tracing::debug!(component = %self.name(), "Component finalized");
    }

    pub fn is_finalized(&self) -> bool {
        self.0.finalized.load(Ordering::Acquire)
    }

    fn upstream_of(&self, input_port: &str) -> Result<Upstream> {
        let ports = lock(&self.0.ports);
        let port = ports.inputs.iter().find(|p| p.name == input_port);
        ensure_pre!(
            port.is_some(),
            "input-port-exists",
            "Component `{}` has no input port `{input_port}`",
            self.name()
        );
        let upstream = port.and_then(|p| p.upstream.clone());
        let Some(upstream) = upstream else {
            return Err(crate::precondition::violation(
                crate::precondition::CheckTier::Pre,
                "input-port-is-connected",
                format!("Input port `{}.{input_port}` is not connected", self.name()),
            )
            .into());
        };
        Ok(upstream)
    }

    pub(crate) fn with_data<T: Any + Send, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut data = lock(&self.0.data);
        data.as_mut().and_then(|d| d.downcast_mut::<T>()).map(f)
    }

    /// Creates a message iterator on the upstream end of `input_port`.
    ///
    /// # Errors
    ///
    /// The port must be connected; the upstream iterator's initialize method
    /// may fail.
    pub fn create_message_iterator(&self, input_port: &str) -> Result<MessageIterator> {
        let upstream = self.upstream_of(input_port)?;
        MessageIterator::create(&upstream.component, &upstream.port_name)
            .cause(format!("Cannot create message iterator on `{}.{input_port}`", self.name()))
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.0.name)
            .field("class", &self.0.class.name())
            .field("type", &self.0.class.class_type())
            .field("logging_level", &self.0.logging_level)
            .finish_non_exhaustive()
    }
}

/// Handle passed to component methods.
pub struct SelfComponent {
    component: Component,
}

impl SelfComponent {
    pub(crate) const fn new(component: Component) -> Self {
        Self { component }
    }

    pub const fn component(&self) -> &Component {
        &self.component
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn logging_level(&self) -> LoggingLevel {
        self.component.logging_level()
    }

    pub fn mip_version(&self) -> u64 {
        self.component.context().mip_version
    }

    pub fn is_interrupted(&self) -> bool {
        self.component.is_interrupted()
    }

    /// # Errors
    ///
    /// Fails if the component type has no input ports or if the name is taken.
    pub fn add_input_port(&mut self, name: &str) -> Result<()> {
        let class_type = self.component.class_type();
        ensure_pre!(
            class_type.has_input_ports(),
            "component-has-input-ports",
            "A {class_type} component cannot have input ports"
        );
        let mut ports = lock(&self.component.0.ports);
        ensure_pre!(
            !ports.inputs.iter().any(|p| p.name == name),
            "unique-input-port-name",
            "Component `{}` already has an input port named `{name}`",
            self.component.name()
        );
        ports.inputs.push(InputPort { name: name.to_string(), upstream: None });
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the component type has no output ports or if the name is taken.
    pub fn add_output_port(&mut self, name: &str) -> Result<()> {
        let class_type = self.component.class_type();
        ensure_pre!(
            class_type.has_output_ports(),
            "component-has-output-ports",
            "A {class_type} component cannot have output ports"
        );
        let mut ports = lock(&self.component.0.ports);
        ensure_pre!(
            !ports.outputs.iter().any(|p| p.name == name),
            "unique-output-port-name",
            "Component `{}` already has an output port named `{name}`",
            self.component.name()
        );
        ports.outputs.push(OutputPort { name: name.to_string(), connected: false });
        Ok(())
    }

    /// Replaces the component's user data.
    pub fn set_data<T: Any + Send>(&mut self, data: T) {
        *lock(&self.component.0.data) = Some(Box::new(data));
    }

    /// Runs `f` on the user data if it is a `T`.
    pub fn with_data<T: Any + Send, R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.component.with_data(f)
    }

    pub fn take_data<T: Any + Send>(&mut self) -> Option<T> {
        let boxed = lock(&self.component.0.data).take()?;
        boxed.downcast::<T>().ok().map(|b| *b)
    }

    /// # Errors
    ///
    /// See [`Component::create_message_iterator`].
    pub fn create_message_iterator(&mut self, input_port: &str) -> Result<MessageIterator> {
        self.component.create_message_iterator(input_port)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::component_class::{IteratorStatus, MessageIteratorClass};

    fn sink_class() -> Arc<ComponentClass> {
        let mut class = ComponentClass::sink("counter", Arc::new(|_| Ok(ConsumeStatus::End))).unwrap();
        class.set_initialize_method(Arc::new(|comp, _| {
            comp.add_input_port("in")?;
            comp.set_data(0_u32);
            Ok(())
        }));
        Arc::new(class)
    }

    fn source_class() -> Arc<ComponentClass> {
        let mut class = ComponentClass::source(
            "gen",
            MessageIteratorClass::new(Arc::new(|_, _| Ok(IteratorStatus::End))),
        )
        .unwrap();
        class.set_initialize_method(Arc::new(|comp, _| comp.add_output_port("out")));
        Arc::new(class)
    }

    #[test]
    fn ports_are_added_by_initialize() {
        let sink = Component::create(sink_class(), "sink", None, LoggingLevel::Info, ExecutionContext::default())
            .unwrap();
        assert_eq!(sink.input_port_names(), vec!["in".to_string()]);
        assert_eq!(sink.unconnected_input_ports(), vec!["in".to_string()]);

        let mut this = SelfComponent::new(sink.clone());
        let err = this.add_output_port("out").unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("component-has-output-ports"));
        let err = this.add_input_port("in").unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("unique-input-port-name"));

        assert_eq!(this.with_data(|count: &mut u32| {
            *count += 1;
            *count
        }), Some(1));
        assert_eq!(this.with_data(|_: &mut String| ()), None);
    }

    #[test]
    fn input_ports_take_one_connection() {
        let ctx = ExecutionContext::default();
        let source = Component::create(source_class(), "src", None, LoggingLevel::Info, ctx.clone()).unwrap();
        let sink = Component::create(sink_class(), "sink", None, LoggingLevel::Info, ctx).unwrap();

        sink.attach_upstream("in", &source, "out").unwrap();
        assert!(sink.is_input_port_connected("in"));
        assert!(source.is_output_port_connected("out"));
        let err = sink.attach_upstream("in", &source, "out").unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("output-port-is-not-connected"));
        let err = sink.attach_upstream("in", &source, "missing").unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("output-port-exists"));

        let mut iter = sink.create_message_iterator("in").unwrap();
        assert!(matches!(iter.next().unwrap(), crate::iterator::IteratorNext::End));
        drop(iter);

        assert!(sink.detach_upstream("in"));
        assert!(!source.is_output_port_connected("out"));
        assert!(!sink.detach_upstream("in"));
    }

    #[test]
    fn initialize_errors_carry_component_name() {
        let mut class = ComponentClass::sink("bad", Arc::new(|_| Ok(ConsumeStatus::End))).unwrap();
        class.set_initialize_method(Arc::new(|_, _| Err(TraceError::Component("no params".into()))));
        let err = Component::create(Arc::new(class), "bad0", None, LoggingLevel::Info, ExecutionContext::default())
            .unwrap_err();
        assert!(err.to_string().contains("bad0"));
        assert!(matches!(err.root_cause(), TraceError::Component(msg) if msg == "no params"));
    }

    #[test]
    fn logging_level_threshold() {
        assert!(LoggingLevel::Info.enabled(LoggingLevel::Error));
        assert!(!LoggingLevel::Warning.enabled(LoggingLevel::Debug));
        assert!(!LoggingLevel::None.enabled(LoggingLevel::Fatal));
    }
}
