// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Component classes and message-iterator classes.
//!
//! A component class is a named method table. Source and filter classes also
//! carry a [`MessageIteratorClass`] describing the iterators their output
//! ports produce. Classes are built mutably, then shared as
//! `Arc<ComponentClass>` once added to a [`crate::plugin::Plugin`].

use crate::component::{LoggingLevel, PortInfo, SelfComponent};
use crate::error::Result;
use crate::integer_range::UnsignedIntegerRangeSet;
use crate::interrupter::InterrupterSet;
use crate::iterator::{IteratorConfiguration, MessageBatch, SelfMessageIterator};
use crate::object::{lock, try_string};
use crate::plugin::LibraryHandle;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentClassType {
    Source,
    Filter,
    Sink,
}

impl ComponentClassType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Filter => "filter",
            Self::Sink => "sink",
        }
    }

    pub const fn has_input_ports(self) -> bool {
        matches!(self, Self::Filter | Self::Sink)
    }

    pub const fn has_output_ports(self) -> bool {
        matches!(self, Self::Source | Self::Filter)
    }
}

impl fmt::Display for ComponentClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComponentClassType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "source" | "src" => Ok(Self::Source),
            "filter" | "flt" => Ok(Self::Filter),
            "sink" => Ok(Self::Sink),
            other => Err(format!("unknown component class type '{other}'")),
        }
    }
}

/// What a query method produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Result(Value),
    /// Try again later.
    Again,
    /// The class does not know the queried object.
    UnknownObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeStatus {
    Ok,
    End,
    Again,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorStatus {
    Ok,
    End,
    Again,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    Ok,
    Again,
}

/// Passed to query methods.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub logging_level: LoggingLevel,
    pub interrupters: InterrupterSet,
}

impl QueryContext {
    pub fn is_interrupted(&self) -> bool {
        self.interrupters.is_set()
    }
}

pub type InitializeMethod =
    Arc<dyn Fn(&mut SelfComponent, Option<&Value>) -> Result<()> + Send + Sync>;
pub type FinalizeMethod = Arc<dyn Fn(&mut SelfComponent) + Send + Sync>;
pub type QueryMethod =
    Arc<dyn Fn(&QueryContext, &str, Option<&Value>) -> Result<QueryOutcome> + Send + Sync>;
/// Called with the name of the component's own port and the other end.
pub type PortConnectedMethod =
    Arc<dyn Fn(&mut SelfComponent, &str, &PortInfo) -> Result<()> + Send + Sync>;
/// Adds the supported MIP versions to the range set.
pub type GetSupportedMipVersionsMethod = Arc<
    dyn Fn(Option<&Value>, LoggingLevel, &mut UnsignedIntegerRangeSet) -> Result<()> + Send + Sync,
>;
pub type GraphIsConfiguredMethod = Arc<dyn Fn(&mut SelfComponent) -> Result<()> + Send + Sync>;
pub type ConsumeMethod = Arc<dyn Fn(&mut SelfComponent) -> Result<ConsumeStatus> + Send + Sync>;

pub type NextMethod =
    Arc<dyn Fn(&mut SelfMessageIterator, &mut MessageBatch) -> Result<IteratorStatus> + Send + Sync>;
/// Receives the name of the output port the iterator operates on.
pub type IteratorInitializeMethod = Arc<
    dyn Fn(&mut SelfMessageIterator, &mut IteratorConfiguration, &str) -> Result<()> + Send + Sync,
>;
pub type IteratorFinalizeMethod = Arc<dyn Fn(&mut SelfMessageIterator) + Send + Sync>;
pub type SeekNsFromOriginMethod =
    Arc<dyn Fn(&mut SelfMessageIterator, i64) -> Result<SeekStatus> + Send + Sync>;
pub type CanSeekNsFromOriginMethod =
    Arc<dyn Fn(&mut SelfMessageIterator, i64) -> Result<bool> + Send + Sync>;
pub type SeekBeginningMethod =
    Arc<dyn Fn(&mut SelfMessageIterator) -> Result<SeekStatus> + Send + Sync>;
pub type CanSeekBeginningMethod = Arc<dyn Fn(&mut SelfMessageIterator) -> Result<bool> + Send + Sync>;

/// Method table of the iterators a source or filter class produces.
///
/// Seek methods come in pairs; a missing `can_seek` method means the iterator
/// can always seek.
#[derive(Clone)]
pub struct MessageIteratorClass {
    pub(crate) next: NextMethod,
    pub(crate) initialize: Option<IteratorInitializeMethod>,
    pub(crate) finalize: Option<IteratorFinalizeMethod>,
    pub(crate) seek_ns_from_origin: Option<SeekNsFromOriginMethod>,
    pub(crate) can_seek_ns_from_origin: Option<CanSeekNsFromOriginMethod>,
    pub(crate) seek_beginning: Option<SeekBeginningMethod>,
    pub(crate) can_seek_beginning: Option<CanSeekBeginningMethod>,
}

impl MessageIteratorClass {
    pub fn new(next: NextMethod) -> Self {
        Self {
            next,
            initialize: None,
            finalize: None,
            seek_ns_from_origin: None,
            can_seek_ns_from_origin: None,
            seek_beginning: None,
            can_seek_beginning: None,
        }
    }

    pub fn set_initialize_method(&mut self, method: IteratorInitializeMethod) -> &mut Self {
        self.initialize = Some(method);
        self
    }

    pub fn set_finalize_method(&mut self, method: IteratorFinalizeMethod) -> &mut Self {
        self.finalize = Some(method);
        self
    }

    pub fn set_seek_ns_from_origin_methods(
        &mut self,
        seek: SeekNsFromOriginMethod,
        can_seek: Option<CanSeekNsFromOriginMethod>,
    ) -> &mut Self {
        self.seek_ns_from_origin = Some(seek);
        self.can_seek_ns_from_origin = can_seek;
        self
    }

    pub fn set_seek_beginning_methods(
        &mut self,
        seek: SeekBeginningMethod,
        can_seek: Option<CanSeekBeginningMethod>,
    ) -> &mut Self {
        self.seek_beginning = Some(seek);
        self.can_seek_beginning = can_seek;
        self
    }

    pub fn next_method(&self) -> &NextMethod {
        &self.next
    }

    pub const fn has_initialize_method(&self) -> bool {
        self.initialize.is_some()
    }

    pub const fn has_finalize_method(&self) -> bool {
        self.finalize.is_some()
    }

    pub const fn has_seek_ns_from_origin_method(&self) -> bool {
        self.seek_ns_from_origin.is_some()
    }

    pub const fn has_seek_beginning_method(&self) -> bool {
        self.seek_beginning.is_some()
    }
}

impl fmt::Debug for MessageIteratorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageIteratorClass")
            .field("initialize", &self.initialize.is_some())
            .field("finalize", &self.finalize.is_some())
            .field("seek_ns_from_origin", &self.seek_ns_from_origin.is_some())
            .field("can_seek_ns_from_origin", &self.can_seek_ns_from_origin.is_some())
            .field("seek_beginning", &self.seek_beginning.is_some())
            .field("can_seek_beginning", &self.can_seek_beginning.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub(crate) struct ComponentClassMethods {
    pub(crate) initialize: Option<InitializeMethod>,
    pub(crate) finalize: Option<FinalizeMethod>,
    pub(crate) query: Option<QueryMethod>,
    pub(crate) input_port_connected: Option<PortConnectedMethod>,
    pub(crate) output_port_connected: Option<PortConnectedMethod>,
    pub(crate) get_supported_mip_versions: Option<GetSupportedMipVersionsMethod>,
    pub(crate) graph_is_configured: Option<GraphIsConfiguredMethod>,
    pub(crate) consume: Option<ConsumeMethod>,
}

/// A source, filter or sink component class.
pub struct ComponentClass {
    class_type: ComponentClassType,
    name: String,
    description: Option<String>,
    help: Option<String>,
    plugin_name: Option<String>,
    pub(crate) methods: ComponentClassMethods,
    iterator_class: Option<MessageIteratorClass>,
    library: Mutex<Option<Arc<dyn LibraryHandle>>>,
}

impl ComponentClass {
    fn create(
        class_type: ComponentClassType,
        name: &str,
        iterator_class: Option<MessageIteratorClass>,
        consume: Option<ConsumeMethod>,
    ) -> Result<Self> {
        ensure_pre!(!name.is_empty(), "name-is-not-empty", "Component class name is empty");
        Ok(Self {
            class_type,
            name: try_string(name)?,
            description: None,
            help: None,
            plugin_name: None,
            methods: ComponentClassMethods { consume, ..ComponentClassMethods::default() },
            iterator_class,
            library: Mutex::new(None),
        })
    }

    /// # Errors
    ///
    /// Fails if `name` is empty or cannot be copied.
    pub fn source(name: &str, iterator_class: MessageIteratorClass) -> Result<Self> {
        Self::create(ComponentClassType::Source, name, Some(iterator_class), None)
    }

    /// # Errors
    ///
    /// Fails if `name` is empty or cannot be copied.
    pub fn filter(name: &str, iterator_class: MessageIteratorClass) -> Result<Self> {
        Self::create(ComponentClassType::Filter, name, Some(iterator_class), None)
    }

    /// # Errors
    ///
    /// Fails if `name` is empty or cannot be copied.
    pub fn sink(name: &str, consume: ConsumeMethod) -> Result<Self> {
        Self::create(ComponentClassType::Sink, name, None, Some(consume))
    }

    pub const fn class_type(&self) -> ComponentClassType {
        self.class_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// Name of the plugin this class was added to.
    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin_name.as_deref()
    }

    pub(crate) fn set_plugin_name(&mut self, plugin_name: String) {
        self.plugin_name = Some(plugin_name);
    }

    pub const fn iterator_class(&self) -> Option<&MessageIteratorClass> {
        self.iterator_class.as_ref()
    }

    pub const fn has_query_method(&self) -> bool {
        self.methods.query.is_some()
    }

    pub const fn has_get_supported_mip_versions_method(&self) -> bool {
        self.methods.get_supported_mip_versions.is_some()
    }

    pub fn query_method(&self) -> Option<&QueryMethod> {
        self.methods.query.as_ref()
    }

    pub fn get_supported_mip_versions_method(&self) -> Option<&GetSupportedMipVersionsMethod> {
        self.methods.get_supported_mip_versions.as_ref()
    }

    /// # Errors
    ///
    /// Fails with [`crate::TraceError::Memory`] if the string cannot be copied.
    pub fn set_description(&mut self, description: &str) -> Result<()> {
        self.description = Some(try_string(description)?);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with [`crate::TraceError::Memory`] if the string cannot be copied.
    pub fn set_help(&mut self, help: &str) -> Result<()> {
        self.help = Some(try_string(help)?);
        Ok(())
    }

    pub fn set_initialize_method(&mut self, method: InitializeMethod) {
        self.methods.initialize = Some(method);
    }

    pub fn set_finalize_method(&mut self, method: FinalizeMethod) {
        self.methods.finalize = Some(method);
    }

    pub fn set_query_method(&mut self, method: QueryMethod) {
        self.methods.query = Some(method);
    }

    pub fn set_get_supported_mip_versions_method(&mut self, method: GetSupportedMipVersionsMethod) {
        self.methods.get_supported_mip_versions = Some(method);
    }

    /// # Errors
    ///
    /// Only filter and sink classes have input ports.
    pub fn set_input_port_connected_method(&mut self, method: PortConnectedMethod) -> Result<()> {
        ensure_pre!(
            self.class_type.has_input_ports(),
            "component-class-has-input-ports",
            "{} class `{}` has no input ports",
            self.class_type,
            self.name
        );
        self.methods.input_port_connected = Some(method);
        Ok(())
    }

    /// # Errors
    ///
    /// Only source and filter classes have output ports.
    pub fn set_output_port_connected_method(&mut self, method: PortConnectedMethod) -> Result<()> {
        ensure_pre!(
            self.class_type.has_output_ports(),
            "component-class-has-output-ports",
            "{} class `{}` has no output ports",
            self.class_type,
            self.name
        );
        self.methods.output_port_connected = Some(method);
        Ok(())
    }

    /// # Errors
    ///
    /// Only sink classes are told that the graph is configured.
    pub fn set_graph_is_configured_method(&mut self, method: GraphIsConfiguredMethod) -> Result<()> {
        ensure_pre!(
            self.class_type == ComponentClassType::Sink,
            "component-class-is-sink",
            "{} class `{}` is not a sink",
            self.class_type,
            self.name
        );
        self.methods.graph_is_configured = Some(method);
        Ok(())
    }

    /// Ties the class to the shared library it came from.
    pub fn set_library(&mut self, library: Arc<dyn LibraryHandle>) {
        *lock(&self.library) = Some(library);
    }

    pub fn library(&self) -> Option<Arc<dyn LibraryHandle>> {
        lock(&self.library).clone()
    }

    /// Drops this class's reference on its shared library. Idempotent.
    pub fn release_library(&self) -> bool {
        lock(&self.library).take().is_some()
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("type", &self.class_type)
            .field("name", &self.name)
            .field("plugin_name", &self.plugin_name)
            .field("iterator_class", &self.iterator_class)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn next_end() -> NextMethod {
        Arc::new(|_, _| Ok(IteratorStatus::End))
    }

    #[test]
    fn port_methods_are_type_checked() {
        let mut source = ComponentClass::source("gen", MessageIteratorClass::new(next_end())).unwrap();
        let err = source.set_input_port_connected_method(Arc::new(|_, _, _| Ok(()))).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("component-class-has-input-ports"));
        source.set_output_port_connected_method(Arc::new(|_, _, _| Ok(()))).unwrap();

        let mut sink = ComponentClass::sink("dummy", Arc::new(|_| Ok(ConsumeStatus::End))).unwrap();
        assert!(sink.set_output_port_connected_method(Arc::new(|_, _, _| Ok(()))).is_err());
        sink.set_graph_is_configured_method(Arc::new(|_| Ok(()))).unwrap();
        assert!(sink.iterator_class().is_none());
        assert_eq!(sink.class_type(), ComponentClassType::Sink);
    }

    #[test]
    fn seek_methods_are_paired() {
        let mut iter_class = MessageIteratorClass::new(next_end());
        iter_class.set_seek_beginning_methods(Arc::new(|_| Ok(SeekStatus::Ok)), None);
        assert!(iter_class.has_seek_beginning_method());
        assert!(!iter_class.has_seek_ns_from_origin_method());
        assert!(iter_class.can_seek_beginning.is_none());
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = ComponentClass::filter("", MessageIteratorClass::new(next_end())).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("name-is-not-empty"));
    }

    #[test]
    fn class_type_parses_short_names() {
        assert_eq!("flt".parse::<ComponentClassType>(), Ok(ComponentClassType::Filter));
        assert!("mixer".parse::<ComponentClassType>().is_err());
    }
}
