// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Built-in component classes, exposed as the `utils` plugin.
//!
//! The classes are described with [`DescriptorTables`] exactly like a native
//! plugin would describe them, so they go through the same loader.

use tracegraph_core::plugin::descriptor::{DescriptorTables, PluginAttribute};
use tracegraph_core::plugin::PluginVersion;

pub mod counter;
pub mod dummy;
pub mod generator;
pub mod muxer;

pub const PLUGIN_NAME: &str = "utils";

/// Descriptor tables of the `utils` plugin.
pub fn descriptor_tables() -> DescriptorTables {
    let mut tables = DescriptorTables::new();
    let plugin = tables.add_plugin(PLUGIN_NAME);
    tables
        .add_plugin_attribute(
            plugin,
            PluginAttribute::Description("Graph utilities: muxer, sinks and a trace generator".into()),
        )
        .add_plugin_attribute(plugin, PluginAttribute::Author("StreamKit Contributors".into()))
        .add_plugin_attribute(plugin, PluginAttribute::License("MPL-2.0".into()))
        .add_plugin_attribute(
            plugin,
            PluginAttribute::Version(PluginVersion { major: 0, minor: 1, patch: 0, extra: None }),
        );

    muxer::describe(&mut tables, plugin);
    dummy::describe(&mut tables, plugin);
    counter::describe(&mut tables, plugin);
    generator::describe(&mut tables, plugin);
    tables
}

#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tracegraph_core::ComponentClassType;

    #[test]
    fn utils_plugin_lists_every_class() {
        let tables = descriptor_tables();
        assert_eq!(tables.plugins.len(), 1);
        let mut classes: Vec<(ComponentClassType, &str)> = tables
            .component_classes_of(0)
            .filter_map(|(_, d)| d.kind.class_type().map(|t| (t, d.name.as_str())))
            .collect();
        classes.sort_unstable();
        assert_eq!(
            classes,
            vec![
                (ComponentClassType::Source, "generator"),
                (ComponentClassType::Filter, "muxer"),
                (ComponentClassType::Sink, "counter"),
                (ComponentClassType::Sink, "dummy"),
            ]
        );
    }
}
