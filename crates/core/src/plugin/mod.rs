// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Plugins and plugin sets.
//!
//! A [`Plugin`] groups component classes under a name together with some
//! metadata. Plugins loaded from a shared library carry a [`LibraryHandle`];
//! every component class added to such a plugin holds a reference on it so
//! the library stays mapped while any of its classes is alive.

pub mod descriptor;

use crate::component_class::{ComponentClass, ComponentClassType};
use crate::error::{Result, TraceError};
use crate::object::try_string;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A loaded module that component classes keep alive.
pub trait LibraryHandle: Send + Sync + fmt::Debug {
    /// Path of the shared object, `None` for statically linked plugins.
    fn path(&self) -> Option<&Path>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(extra) = &self.extra {
            f.write_str(extra)?;
        }
        Ok(())
    }
}

pub struct Plugin {
    name: String,
    description: Option<String>,
    author: Option<String>,
    license: Option<String>,
    path: Option<PathBuf>,
    version: Option<PluginVersion>,
    sources: Vec<Arc<ComponentClass>>,
    filters: Vec<Arc<ComponentClass>>,
    sinks: Vec<Arc<ComponentClass>>,
    library: Option<Arc<dyn LibraryHandle>>,
}

impl Plugin {
    /// # Errors
    ///
    /// Fails if `name` is empty.
    pub fn new(name: &str) -> Result<Self> {
        ensure_pre!(!name.is_empty(), "name-is-not-empty", "Plugin name is empty");
        Ok(Self {
            name: try_string(name)?,
            description: None,
            author: None,
            license: None,
            path: None,
            version: None,
            sources: Vec::new(),
            filters: Vec::new(),
            sinks: Vec::new(),
            library: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn license(&self) -> Option<&str> {
        self.license.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub const fn version(&self) -> Option<&PluginVersion> {
        self.version.as_ref()
    }

    /// # Errors
    ///
    /// Fails with [`TraceError::Memory`] if the string cannot be copied.
    pub fn set_description(&mut self, description: &str) -> Result<()> {
        self.description = Some(try_string(description)?);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with [`TraceError::Memory`] if the string cannot be copied.
    pub fn set_author(&mut self, author: &str) -> Result<()> {
        self.author = Some(try_string(author)?);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with [`TraceError::Memory`] if the string cannot be copied.
    pub fn set_license(&mut self, license: &str) -> Result<()> {
        self.license = Some(try_string(license)?);
        Ok(())
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn set_version(&mut self, version: PluginVersion) {
        self.version = Some(version);
    }

    /// Binds the plugin to its library. Classes added afterwards reference it.
    pub fn set_library(&mut self, library: Arc<dyn LibraryHandle>) {
        self.library = Some(library);
    }

    pub fn library(&self) -> Option<&Arc<dyn LibraryHandle>> {
        self.library.as_ref()
    }

    /// Adds a component class and returns the shared handle to it.
    ///
    /// # Errors
    ///
    /// Fails if a class of the same type and name already exists in this plugin.
    pub fn add_component_class(&mut self, mut class: ComponentClass) -> Result<Arc<ComponentClass>> {
        if self.component_class(class.class_type(), class.name()).is_some() {
            return Err(TraceError::Plugin(format!(
                "Plugin `{}` already has a {} component class named `{}`",
                self.name,
                class.class_type(),
                class.name()
            )));
        }
        class.set_plugin_name(self.name.clone());
        if let Some(library) = &self.library {
            class.set_library(Arc::clone(library));
        }
        let class = Arc::new(class);
        self.classes_mut(class.class_type()).push(Arc::clone(&class));
        tracing::trace!(
            plugin = %self.name,
            class = %class.name(),
            class_type = %class.class_type(),
            "Component class added to plugin"
        );
        Ok(class)
    }

    fn classes_mut(&mut self, class_type: ComponentClassType) -> &mut Vec<Arc<ComponentClass>> {
        match class_type {
            ComponentClassType::Source => &mut self.sources,
            ComponentClassType::Filter => &mut self.filters,
            ComponentClassType::Sink => &mut self.sinks,
        }
    }

    /// Component classes of one type, in insertion order.
    pub fn component_classes_of(&self, class_type: ComponentClassType) -> &[Arc<ComponentClass>] {
        match class_type {
            ComponentClassType::Source => &self.sources,
            ComponentClassType::Filter => &self.filters,
            ComponentClassType::Sink => &self.sinks,
        }
    }

    /// Sources, then filters, then sinks.
    pub fn component_classes(&self) -> impl Iterator<Item = &Arc<ComponentClass>> {
        self.sources.iter().chain(&self.filters).chain(&self.sinks)
    }

    pub fn component_class_count(&self) -> usize {
        self.sources.len() + self.filters.len() + self.sinks.len()
    }

    pub fn source_component_class_count(&self) -> usize {
        self.sources.len()
    }

    pub fn filter_component_class_count(&self) -> usize {
        self.filters.len()
    }

    pub fn sink_component_class_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn source_component_class(&self, index: usize) -> Option<&Arc<ComponentClass>> {
        self.sources.get(index)
    }

    pub fn filter_component_class(&self, index: usize) -> Option<&Arc<ComponentClass>> {
        self.filters.get(index)
    }

    pub fn sink_component_class(&self, index: usize) -> Option<&Arc<ComponentClass>> {
        self.sinks.get(index)
    }

    pub fn component_class(&self, class_type: ComponentClassType, name: &str) -> Option<&Arc<ComponentClass>> {
        self.component_classes_of(class_type).iter().find(|cc| cc.name() == name)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("version", &self.version)
            .field("sources", &self.sources.len())
            .field("filters", &self.filters.len())
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

/// An ordered list of plugins.
#[derive(Debug, Default, Clone)]
pub struct PluginSet {
    plugins: Vec<Arc<Plugin>>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, plugin: impl Into<Arc<Plugin>>) {
        self.plugins.push(plugin.into());
    }

    /// Appends the plugins of `other` whose names are not in this set yet.
    /// Returns how many were skipped.
    pub fn extend_unique(&mut self, other: Self) -> usize {
        let mut skipped = 0;
        for plugin in other.plugins {
            if self.find(plugin.name()).is_some() {
                tracing::debug!(
                    plugin = %plugin.name(),
                    path = ?plugin.path(),
                    "Skipping plugin with a name already loaded"
                );
                skipped += 1;
            } else {
                self.plugins.push(plugin);
            }
        }
        skipped
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Plugin>> {
        self.plugins.get(index)
    }

    pub fn find(&self, name: &str) -> Option<&Arc<Plugin>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Plugin>> {
        self.plugins.iter()
    }
}

impl IntoIterator for PluginSet {
    type Item = Arc<Plugin>;
    type IntoIter = std::vec::IntoIter<Arc<Plugin>>;

    fn into_iter(self) -> Self::IntoIter {
        self.plugins.into_iter()
    }
}

impl<'a> IntoIterator for &'a PluginSet {
    type Item = &'a Arc<Plugin>;
    type IntoIter = std::slice::Iter<'a, Arc<Plugin>>;

    fn into_iter(self) -> Self::IntoIter {
        self.plugins.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::component_class::{ConsumeStatus, IteratorStatus, MessageIteratorClass};

    #[derive(Debug)]
    struct FakeLibrary;

    impl LibraryHandle for FakeLibrary {
        fn path(&self) -> Option<&Path> {
            None
        }
    }

    fn sink(name: &str) -> ComponentClass {
        ComponentClass::sink(name, Arc::new(|_| Ok(ConsumeStatus::End))).unwrap()
    }

    #[test]
    fn classes_are_unique_per_type() {
        let mut plugin = Plugin::new("utils").unwrap();
        plugin.add_component_class(sink("dummy")).unwrap();
        let err = plugin.add_component_class(sink("dummy")).unwrap_err();
        assert!(matches!(err, TraceError::Plugin(_)));

        let source = ComponentClass::source(
            "dummy",
            MessageIteratorClass::new(Arc::new(|_, _| Ok(IteratorStatus::End))),
        )
        .unwrap();
        plugin.add_component_class(source).unwrap();
        assert_eq!(plugin.component_class_count(), 2);
        assert_eq!(plugin.source_component_class(0).unwrap().plugin_name(), Some("utils"));
    }

    #[test]
    fn classes_reference_the_plugin_library() {
        let library: Arc<dyn LibraryHandle> = Arc::new(FakeLibrary);
        let mut plugin = Plugin::new("ext").unwrap();
        plugin.set_library(Arc::clone(&library));
        let class = plugin.add_component_class(sink("out")).unwrap();
        assert_eq!(Arc::strong_count(&library), 3);
        assert!(class.release_library());
        assert!(!class.release_library());
        assert_eq!(Arc::strong_count(&library), 2);
    }

    #[test]
    fn set_keeps_first_plugin_of_a_name() {
        let mut first = PluginSet::new();
        let mut a = Plugin::new("a").unwrap();
        a.set_path("/first/a.so");
        first.push(a);

        let mut second = PluginSet::new();
        let mut dup = Plugin::new("a").unwrap();
        dup.set_path("/second/a.so");
        second.push(dup);
        second.push(Plugin::new("b").unwrap());

        assert_eq!(first.extend_unique(second), 1);
        assert_eq!(first.len(), 2);
        assert_eq!(first.find("a").unwrap().path(), Some(Path::new("/first/a.so")));
    }

    #[test]
    fn version_display_appends_extra() {
        let v = PluginVersion { major: 2, minor: 1, patch: 0, extra: Some("-rc1".into()) };
        assert_eq!(v.to_string(), "2.1.0-rc1");
    }
}
