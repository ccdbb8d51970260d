// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Component-class registry and discovery.
//!
//! - [`ComponentClassRegistry`]: every instantiable class, keyed by plugin,
//!   type and name
//! - [`ComponentClassDefinition`]: serializable class metadata for listings

use crate::component_class::{ComponentClass, ComponentClassType};
use crate::plugin::{Plugin, PluginSet};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifies a component class across plugins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct ComponentClassKey {
    pub plugin: String,
    pub class_type: ComponentClassType,
    pub name: String,
}

impl ComponentClassKey {
    pub fn new(plugin: impl Into<String>, class_type: ComponentClassType, name: impl Into<String>) -> Self {
        Self { plugin: plugin.into(), class_type, name: name.into() }
    }
}

impl fmt::Display for ComponentClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class_type, self.plugin, self.name)
    }
}

impl std::str::FromStr for ComponentClassKey {
    type Err = String;

    /// Parses `TYPE.PLUGIN.NAME`, for example `source.utils.generator`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let (Some(class_type), Some(plugin), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("invalid component class '{s}', expected TYPE.PLUGIN.NAME"));
        };
        if plugin.is_empty() || name.is_empty() {
            return Err(format!("invalid component class '{s}', expected TYPE.PLUGIN.NAME"));
        }
        Ok(Self::new(plugin, class_type.parse()?, name))
    }
}

/// A serializable representation of a component class for listings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComponentClassDefinition {
    pub plugin: String,
    pub class_type: ComponentClassType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Whether the class answers queries.
    #[serde(default)]
    pub queryable: bool,
    /// Whether its message iterators can seek to the beginning.
    #[serde(default)]
    pub seekable: bool,
}

impl ComponentClassDefinition {
    fn from_class(plugin: &str, class: &ComponentClass) -> Self {
        Self {
            plugin: plugin.to_string(),
            class_type: class.class_type(),
            name: class.name().to_string(),
            description: class.description().map(str::to_string),
            help: class.help().map(str::to_string),
            queryable: class.has_query_method(),
            seekable: class.iterator_class().is_some_and(|ic| ic.has_seek_beginning_method()),
        }
    }
}

/// Holds every component class the engine can instantiate.
#[derive(Clone, Default)]
pub struct ComponentClassRegistry {
    classes: IndexMap<ComponentClassKey, Arc<ComponentClass>>,
}

impl ComponentClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class under `plugin`. Returns the class it replaced, if any.
    pub fn register(
        &mut self,
        plugin: &str,
        class: Arc<ComponentClass>,
    ) -> Option<Arc<ComponentClass>> {
        let key = ComponentClassKey::new(plugin, class.class_type(), class.name());
        tracing::debug!(class = %key, "Registering component class");
        self.classes.insert(key, class)
    }

    /// Registers every class of `plugin`.
    pub fn register_plugin(&mut self, plugin: &Plugin) {
        for class in plugin.component_classes() {
            self.register(plugin.name(), Arc::clone(class));
        }
    }

    pub fn register_plugin_set(&mut self, plugins: &PluginSet) {
        for plugin in plugins {
            self.register_plugin(plugin);
        }
    }

    pub fn get(&self, plugin: &str, class_type: ComponentClassType, name: &str) -> Option<&Arc<ComponentClass>> {
        self.classes.get(&ComponentClassKey::new(plugin, class_type, name))
    }

    pub fn get_by_key(&self, key: &ComponentClassKey) -> Option<&Arc<ComponentClass>> {
        self.classes.get(key)
    }

    /// Checks whether a class exists in the registry.
    pub fn contains(&self, key: &ComponentClassKey) -> bool {
        self.classes.contains_key(key)
    }

    /// Removes a class from the registry.
    /// Returns true if it was present.
    pub fn unregister(&mut self, key: &ComponentClassKey) -> bool {
        self.classes.shift_remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ComponentClassKey> {
        self.classes.keys()
    }

    /// Returns definitions for all registered classes, in registration order.
    pub fn definitions(&self) -> Vec<ComponentClassDefinition> {
        self.classes
            .iter()
            .map(|(key, class)| ComponentClassDefinition::from_class(&key.plugin, class))
            .collect()
    }
}

impl fmt::Debug for ComponentClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.classes.keys().map(ToString::to_string)).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::component_class::{ConsumeStatus, IteratorStatus, MessageIteratorClass, SeekStatus};

    fn plugin() -> Plugin {
        let mut plugin = Plugin::new("utils").unwrap();
        let mut iter_class = MessageIteratorClass::new(Arc::new(|_, _| Ok(IteratorStatus::End)));
        iter_class.set_seek_beginning_methods(Arc::new(|_| Ok(SeekStatus::Ok)), None);
        let mut source = ComponentClass::source("gen", iter_class).unwrap();
        source.set_description("Generates things").unwrap();
        plugin.add_component_class(source).unwrap();
        plugin
            .add_component_class(ComponentClass::sink("dummy", Arc::new(|_| Ok(ConsumeStatus::End))).unwrap())
            .unwrap();
        plugin
    }

    #[test]
    fn lookup_by_plugin_type_and_name() {
        let mut registry = ComponentClassRegistry::new();
        registry.register_plugin(&plugin());
        assert_eq!(registry.len(), 2);
        assert!(registry.get("utils", ComponentClassType::Sink, "dummy").is_some());
        assert!(registry.get("utils", ComponentClassType::Source, "dummy").is_none());

        let key = ComponentClassKey::new("utils", ComponentClassType::Sink, "dummy");
        assert_eq!(key.to_string(), "sink.utils.dummy");
        assert_eq!("sink.utils.dummy".parse::<ComponentClassKey>(), Ok(key.clone()));
        assert!("sink.utils".parse::<ComponentClassKey>().is_err());
        assert!("mixer.utils.dummy".parse::<ComponentClassKey>().is_err());
        assert!(registry.unregister(&key));
        assert!(!registry.contains(&key));
    }

    #[test]
    fn definitions_serialize() {
        let mut registry = ComponentClassRegistry::new();
        registry.register_plugin(&plugin());
        let defs = registry.definitions();
        assert_eq!(defs[0].name, "gen");
        assert!(defs[0].seekable);
        let json = serde_json::to_value(&defs[0]).unwrap();
        assert_eq!(json["class_type"], "source");
        assert_eq!(json["description"], "Generates things");
        assert!(json.get("help").is_none());
    }
}
