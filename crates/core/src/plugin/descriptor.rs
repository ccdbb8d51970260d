// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Descriptor tables: the flat, tagged records a plugin exposes.
//!
//! A table set lists plugin descriptors, attributes of those plugins,
//! component-class descriptors and attributes of those classes. Records refer
//! to their owner by index. Loaders fold the records into [`super::Plugin`]
//! objects; native libraries produce them from their exported sections and
//! statically linked plugins build them directly.

use super::PluginVersion;
use crate::component_class::{
    CanSeekBeginningMethod, CanSeekNsFromOriginMethod, ComponentClass, ComponentClassType,
    ConsumeMethod, FinalizeMethod, GetSupportedMipVersionsMethod, GraphIsConfiguredMethod,
    InitializeMethod, IteratorFinalizeMethod, IteratorInitializeMethod, MessageIteratorClass,
    NextMethod, PortConnectedMethod, QueryMethod, SeekBeginningMethod, SeekNsFromOriginMethod,
};
use crate::error::{Result, TraceError};
use std::fmt;
use std::sync::Arc;

/// Plugin initialization callback. An error rejects the plugin.
pub type PluginInitMethod = Arc<dyn Fn() -> Result<()> + Send + Sync>;
/// Plugin exit callback, run when the plugin's library handle is released.
pub type PluginExitMethod = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
}

#[derive(Clone)]
pub enum PluginAttribute {
    Init(PluginInitMethod),
    Exit(PluginExitMethod),
    Author(String),
    License(String),
    Description(String),
    Version(PluginVersion),
    /// A tag this loader does not know.
    Unknown(i32),
}

impl PluginAttribute {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Exit(_) => "exit",
            Self::Author(_) => "author",
            Self::License(_) => "license",
            Self::Description(_) => "description",
            Self::Version(_) => "version",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Debug for PluginAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Author(s) | Self::License(s) | Self::Description(s) => {
                f.debug_tuple(self.name()).field(s).finish()
            },
            Self::Version(v) => f.debug_tuple("version").field(v).finish(),
            Self::Unknown(tag) => f.debug_tuple("unknown").field(tag).finish(),
            Self::Init(_) | Self::Exit(_) => f.write_str(self.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PluginDescriptorAttribute {
    /// Index into [`DescriptorTables::plugins`].
    pub plugin: usize,
    pub attribute: PluginAttribute,
}

/// Declared type of a component-class descriptor with its mandatory method.
#[derive(Clone)]
pub enum ComponentClassDescriptorKind {
    Source(NextMethod),
    Filter(NextMethod),
    Sink(ConsumeMethod),
    /// A type tag this loader does not know.
    Unknown(i32),
}

impl ComponentClassDescriptorKind {
    pub const fn class_type(&self) -> Option<ComponentClassType> {
        match self {
            Self::Source(_) => Some(ComponentClassType::Source),
            Self::Filter(_) => Some(ComponentClassType::Filter),
            Self::Sink(_) => Some(ComponentClassType::Sink),
            Self::Unknown(_) => None,
        }
    }
}

impl fmt::Debug for ComponentClassDescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.class_type()) {
            (Self::Unknown(tag), _) => write!(f, "unknown({tag})"),
            (_, Some(class_type)) => write!(f, "{class_type}"),
            (_, None) => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentClassDescriptor {
    /// Index into [`DescriptorTables::plugins`].
    pub plugin: usize,
    pub name: String,
    pub kind: ComponentClassDescriptorKind,
}

#[derive(Clone)]
pub enum ComponentClassAttribute {
    Description(String),
    Help(String),
    GetSupportedMipVersions(GetSupportedMipVersionsMethod),
    Initialize(InitializeMethod),
    Finalize(FinalizeMethod),
    Query(QueryMethod),
    InputPortConnected(PortConnectedMethod),
    OutputPortConnected(PortConnectedMethod),
    GraphIsConfigured(GraphIsConfiguredMethod),
    MsgIterInitialize(IteratorInitializeMethod),
    MsgIterFinalize(IteratorFinalizeMethod),
    MsgIterSeekNsFromOrigin(SeekNsFromOriginMethod),
    MsgIterSeekBeginning(SeekBeginningMethod),
    MsgIterCanSeekNsFromOrigin(CanSeekNsFromOriginMethod),
    MsgIterCanSeekBeginning(CanSeekBeginningMethod),
    Unknown(i32),
}

impl ComponentClassAttribute {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Description(_) => "description",
            Self::Help(_) => "help",
            Self::GetSupportedMipVersions(_) => "get-supported-mip-versions",
            Self::Initialize(_) => "initialize",
            Self::Finalize(_) => "finalize",
            Self::Query(_) => "query",
            Self::InputPortConnected(_) => "input-port-connected",
            Self::OutputPortConnected(_) => "output-port-connected",
            Self::GraphIsConfigured(_) => "graph-is-configured",
            Self::MsgIterInitialize(_) => "msg-iter-initialize",
            Self::MsgIterFinalize(_) => "msg-iter-finalize",
            Self::MsgIterSeekNsFromOrigin(_) => "msg-iter-seek-ns-from-origin",
            Self::MsgIterSeekBeginning(_) => "msg-iter-seek-beginning",
            Self::MsgIterCanSeekNsFromOrigin(_) => "msg-iter-can-seek-ns-from-origin",
            Self::MsgIterCanSeekBeginning(_) => "msg-iter-can-seek-beginning",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Whether a class of `class_type` can carry this attribute.
    pub const fn applies_to(&self, class_type: ComponentClassType) -> bool {
        match self {
            Self::Description(_)
            | Self::Help(_)
            | Self::GetSupportedMipVersions(_)
            | Self::Initialize(_)
            | Self::Finalize(_)
            | Self::Query(_) => true,
            Self::InputPortConnected(_) => class_type.has_input_ports(),
            Self::OutputPortConnected(_)
            | Self::MsgIterInitialize(_)
            | Self::MsgIterFinalize(_)
            | Self::MsgIterSeekNsFromOrigin(_)
            | Self::MsgIterSeekBeginning(_)
            | Self::MsgIterCanSeekNsFromOrigin(_)
            | Self::MsgIterCanSeekBeginning(_) => class_type.has_output_ports(),
            Self::GraphIsConfigured(_) => matches!(class_type, ComponentClassType::Sink),
            Self::Unknown(_) => false,
        }
    }
}

impl fmt::Debug for ComponentClassAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Description(s) | Self::Help(s) => f.debug_tuple(self.name()).field(s).finish(),
            Self::Unknown(tag) => f.debug_tuple("unknown").field(tag).finish(),
            _ => f.write_str(self.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentClassDescriptorAttribute {
    /// Index into [`DescriptorTables::component_classes`].
    pub component_class: usize,
    pub attribute: ComponentClassAttribute,
}

/// All descriptor records found in one module.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTables {
    pub plugins: Vec<PluginDescriptor>,
    pub plugin_attributes: Vec<PluginDescriptorAttribute>,
    pub component_classes: Vec<ComponentClassDescriptor>,
    pub component_class_attributes: Vec<ComponentClassDescriptorAttribute>,
}

impl DescriptorTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin descriptor and returns its index.
    pub fn add_plugin(&mut self, name: impl Into<String>) -> usize {
        self.plugins.push(PluginDescriptor { name: name.into() });
        self.plugins.len() - 1
    }

    pub fn add_plugin_attribute(&mut self, plugin: usize, attribute: PluginAttribute) -> &mut Self {
        self.plugin_attributes.push(PluginDescriptorAttribute { plugin, attribute });
        self
    }

    /// Adds a component-class descriptor and returns its index.
    pub fn add_component_class(
        &mut self,
        plugin: usize,
        name: impl Into<String>,
        kind: ComponentClassDescriptorKind,
    ) -> usize {
        self.component_classes.push(ComponentClassDescriptor { plugin, name: name.into(), kind });
        self.component_classes.len() - 1
    }

    pub fn add_component_class_attribute(
        &mut self,
        component_class: usize,
        attribute: ComponentClassAttribute,
    ) -> &mut Self {
        self.component_class_attributes
            .push(ComponentClassDescriptorAttribute { component_class, attribute });
        self
    }

    pub fn plugin_attributes_of(&self, plugin: usize) -> impl Iterator<Item = &PluginAttribute> {
        self.plugin_attributes.iter().filter(move |a| a.plugin == plugin).map(|a| &a.attribute)
    }

    /// Indices and descriptors of the classes belonging to `plugin`.
    pub fn component_classes_of(
        &self,
        plugin: usize,
    ) -> impl Iterator<Item = (usize, &ComponentClassDescriptor)> {
        self.component_classes.iter().enumerate().filter(move |(_, d)| d.plugin == plugin)
    }

    pub fn component_class_attributes_of(
        &self,
        component_class: usize,
    ) -> impl Iterator<Item = &ComponentClassAttribute> {
        self.component_class_attributes
            .iter()
            .filter(move |a| a.component_class == component_class)
            .map(|a| &a.attribute)
    }

    /// Appends every record of `other`, shifting its indices.
    pub fn merge(&mut self, other: Self) {
        let plugin_base = self.plugins.len();
        let class_base = self.component_classes.len();
        self.plugins.extend(other.plugins);
        self.plugin_attributes.extend(
            other
                .plugin_attributes
                .into_iter()
                .map(|a| PluginDescriptorAttribute { plugin: a.plugin + plugin_base, ..a }),
        );
        self.component_classes.extend(
            other
                .component_classes
                .into_iter()
                .map(|d| ComponentClassDescriptor { plugin: d.plugin + plugin_base, ..d }),
        );
        self.component_class_attributes.extend(other.component_class_attributes.into_iter().map(
            |a| ComponentClassDescriptorAttribute {
                component_class: a.component_class + class_base,
                ..a
            },
        ));
    }
}

/// Rejects a descriptor record in strict mode, logs and skips it otherwise.
fn reject(fail_on_load_error: bool, message: String) -> Result<()> {
    if fail_on_load_error {
        tracing::error!(%message, "Invalid component class descriptor");
        return Err(TraceError::Plugin(message));
    }
    tracing::warn!(%message, "Ignoring component class descriptor record");
    Ok(())
}

#[derive(Default)]
struct IteratorMethods {
    initialize: Option<IteratorInitializeMethod>,
    finalize: Option<IteratorFinalizeMethod>,
    seek_ns_from_origin: Option<SeekNsFromOriginMethod>,
    can_seek_ns_from_origin: Option<CanSeekNsFromOriginMethod>,
    seek_beginning: Option<SeekBeginningMethod>,
    can_seek_beginning: Option<CanSeekBeginningMethod>,
}

impl IteratorMethods {
    fn into_class(self, next: NextMethod, class_name: &str) -> MessageIteratorClass {
        let mut iterator_class = MessageIteratorClass::new(next);
        if let Some(method) = self.initialize {
            iterator_class.set_initialize_method(method);
        }
        if let Some(method) = self.finalize {
            iterator_class.set_finalize_method(method);
        }
        match (self.seek_ns_from_origin, self.can_seek_ns_from_origin) {
            (Some(seek), can_seek) => {
                iterator_class.set_seek_ns_from_origin_methods(seek, can_seek);
            },
            (None, Some(_)) => tracing::warn!(
                class = %class_name,
                "Ignoring can-seek-ns-from-origin method without seek-ns-from-origin method"
            ),
            (None, None) => {},
        }
        match (self.seek_beginning, self.can_seek_beginning) {
            (Some(seek), can_seek) => {
                iterator_class.set_seek_beginning_methods(seek, can_seek);
            },
            (None, Some(_)) => tracing::warn!(
                class = %class_name,
                "Ignoring can-seek-beginning method without seek-beginning method"
            ),
            (None, None) => {},
        }
        iterator_class
    }
}

/// Builds the component class a descriptor and its attributes describe.
///
/// Attributes are routed by the descriptor's declared type. An unknown type,
/// an unknown attribute or an attribute the type cannot carry is an error
/// when `fail_on_load_error` is set; otherwise it is logged and skipped, and
/// a descriptor of unknown type yields `None`.
///
/// # Errors
///
/// Returns `TraceError::Plugin` for rejected records in strict mode, or the
/// error of a failing class setter.
pub fn build_component_class<'a>(
    descriptor: &ComponentClassDescriptor,
    attributes: impl IntoIterator<Item = &'a ComponentClassAttribute>,
    fail_on_load_error: bool,
) -> Result<Option<ComponentClass>> {
    let Some(class_type) = descriptor.kind.class_type() else {
        reject(
            fail_on_load_error,
            format!("Component class `{}` has an unknown type: {:?}", descriptor.name, descriptor.kind),
        )?;
        return Ok(None);
    };

    let mut iterator_methods = IteratorMethods::default();
    let mut class_attributes = Vec::new();
    for attribute in attributes {
        if !attribute.applies_to(class_type) {
            let message = match attribute {
                ComponentClassAttribute::Unknown(tag) => format!(
                    "Component class `{}` has an attribute with unknown tag {tag}",
                    descriptor.name
                ),
                _ => format!(
                    "Attribute `{}` does not apply to {class_type} component class `{}`",
                    attribute.name(),
                    descriptor.name
                ),
            };
            reject(fail_on_load_error, message)?;
            continue;
        }
        match attribute {
            ComponentClassAttribute::MsgIterInitialize(m) => iterator_methods.initialize = Some(m.clone()),
            ComponentClassAttribute::MsgIterFinalize(m) => iterator_methods.finalize = Some(m.clone()),
            ComponentClassAttribute::MsgIterSeekNsFromOrigin(m) => {
                iterator_methods.seek_ns_from_origin = Some(m.clone());
            },
            ComponentClassAttribute::MsgIterCanSeekNsFromOrigin(m) => {
                iterator_methods.can_seek_ns_from_origin = Some(m.clone());
            },
            ComponentClassAttribute::MsgIterSeekBeginning(m) => {
                iterator_methods.seek_beginning = Some(m.clone());
            },
            ComponentClassAttribute::MsgIterCanSeekBeginning(m) => {
                iterator_methods.can_seek_beginning = Some(m.clone());
            },
            other => class_attributes.push(other),
        }
    }

    let mut class = match &descriptor.kind {
        ComponentClassDescriptorKind::Source(next) => ComponentClass::source(
            &descriptor.name,
            iterator_methods.into_class(next.clone(), &descriptor.name),
        )?,
        ComponentClassDescriptorKind::Filter(next) => ComponentClass::filter(
            &descriptor.name,
            iterator_methods.into_class(next.clone(), &descriptor.name),
        )?,
        ComponentClassDescriptorKind::Sink(consume) => {
            ComponentClass::sink(&descriptor.name, consume.clone())?
        },
        ComponentClassDescriptorKind::Unknown(_) => return Ok(None),
    };

    for attribute in class_attributes {
        match attribute {
            ComponentClassAttribute::Description(s) => class.set_description(s)?,
            ComponentClassAttribute::Help(s) => class.set_help(s)?,
            ComponentClassAttribute::GetSupportedMipVersions(m) => {
                class.set_get_supported_mip_versions_method(m.clone());
            },
            ComponentClassAttribute::Initialize(m) => class.set_initialize_method(m.clone()),
            ComponentClassAttribute::Finalize(m) => class.set_finalize_method(m.clone()),
            ComponentClassAttribute::Query(m) => class.set_query_method(m.clone()),
            ComponentClassAttribute::InputPortConnected(m) => {
                class.set_input_port_connected_method(m.clone())?;
            },
            ComponentClassAttribute::OutputPortConnected(m) => {
                class.set_output_port_connected_method(m.clone())?;
            },
            ComponentClassAttribute::GraphIsConfigured(m) => {
                class.set_graph_is_configured_method(m.clone())?;
            },
            // Routed above.
            _ => {},
        }
    }

    tracing::debug!(class = %descriptor.name, %class_type, "Built component class from descriptor");
    Ok(Some(class))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::component_class::{ConsumeStatus, IteratorStatus};

    #[test]
    fn attributes_route_by_class_type() {
        let seek = ComponentClassAttribute::MsgIterSeekBeginning(Arc::new(|_| {
            Ok(crate::component_class::SeekStatus::Ok)
        }));
        assert!(seek.applies_to(ComponentClassType::Source));
        assert!(!seek.applies_to(ComponentClassType::Sink));

        let configured = ComponentClassAttribute::GraphIsConfigured(Arc::new(|_| Ok(())));
        assert!(configured.applies_to(ComponentClassType::Sink));
        assert!(!configured.applies_to(ComponentClassType::Filter));
        assert!(!ComponentClassAttribute::Unknown(99).applies_to(ComponentClassType::Sink));
    }

    #[test]
    fn merge_shifts_indices() {
        let mut a = DescriptorTables::new();
        let p = a.add_plugin("a");
        a.add_component_class(p, "sink", ComponentClassDescriptorKind::Sink(Arc::new(|_| Ok(ConsumeStatus::End))));

        let mut b = DescriptorTables::new();
        let p = b.add_plugin("b");
        let cc = b.add_component_class(
            p,
            "src",
            ComponentClassDescriptorKind::Source(Arc::new(|_, _| Ok(IteratorStatus::End))),
        );
        b.add_component_class_attribute(cc, ComponentClassAttribute::Help("usage".into()));
        b.add_plugin_attribute(p, PluginAttribute::Author("someone".into()));

        a.merge(b);
        assert_eq!(a.plugins.len(), 2);
        assert_eq!(a.component_classes_of(1).map(|(i, _)| i).collect::<Vec<_>>(), vec![1]);
        assert_eq!(a.component_class_attributes_of(1).count(), 1);
        assert_eq!(a.plugin_attributes_of(1).next().map(PluginAttribute::name), Some("author"));
    }

    fn source_descriptor() -> ComponentClassDescriptor {
        ComponentClassDescriptor {
            plugin: 0,
            name: "src".into(),
            kind: ComponentClassDescriptorKind::Source(Arc::new(|_, _| Ok(IteratorStatus::End))),
        }
    }

    #[test]
    fn builds_source_with_routed_methods() {
        let attributes = vec![
            ComponentClassAttribute::Description("a source".into()),
            ComponentClassAttribute::MsgIterSeekBeginning(Arc::new(|_| {
                Ok(crate::component_class::SeekStatus::Ok)
            })),
            ComponentClassAttribute::MsgIterCanSeekNsFromOrigin(Arc::new(|_, _| Ok(true))),
        ];
        let class = build_component_class(&source_descriptor(), &attributes, true).unwrap().unwrap();
        assert_eq!(class.class_type(), ComponentClassType::Source);
        assert_eq!(class.description(), Some("a source"));
        let iterator_class = class.iterator_class().unwrap();
        assert!(iterator_class.has_seek_beginning_method());
        // A lone can-seek method is dropped.
        assert!(!iterator_class.has_seek_ns_from_origin_method());
    }

    #[test]
    fn misplaced_attribute_is_strict_error_or_lenient_skip() {
        let attributes = vec![ComponentClassAttribute::GraphIsConfigured(Arc::new(|_| Ok(())))];
        let err = build_component_class(&source_descriptor(), &attributes, true).unwrap_err();
        assert!(matches!(err, TraceError::Plugin(_)));
        assert!(build_component_class(&source_descriptor(), &attributes, false).unwrap().is_some());

        let unknown = vec![ComponentClassAttribute::Unknown(42)];
        assert!(build_component_class(&source_descriptor(), &unknown, true).is_err());
        assert!(build_component_class(&source_descriptor(), &unknown, false).unwrap().is_some());
    }

    #[test]
    fn unknown_class_type_is_skipped_when_lenient() {
        let descriptor = ComponentClassDescriptor {
            plugin: 0,
            name: "future".into(),
            kind: ComponentClassDescriptorKind::Unknown(7),
        };
        assert!(build_component_class(&descriptor, [], true).is_err());
        assert!(build_component_class(&descriptor, [], false).unwrap().is_none());
    }
}
