// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Folding descriptor tables into plugins, and the file and directory loaders.

use anyhow::{anyhow, Context, Result};
use libloading::Library;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracegraph_core::plugin::descriptor::{build_component_class, DescriptorTables, PluginAttribute};
use tracegraph_core::{LibraryHandle, Plugin, PluginSet};
use tracegraph_plugin_sdk_native::types::PluginSections;

use crate::library::{register_component_class, NativeLibrary};
use crate::sections::{resolve_sections, RawSections};
use crate::wrapper::descriptor_tables;

/// Suffix of the libtool wrapper files installed next to shared objects.
pub const LIBTOOL_SUFFIX: &str = ".la";

/// Rejects a plugin-level record in strict mode, logs and skips it otherwise.
fn reject(fail_on_load_error: bool, message: String) -> Result<()> {
    if fail_on_load_error {
        tracing::error!(%message, "Invalid plugin");
        return Err(anyhow!(message));
    }
    tracing::warn!(%message, "Ignoring plugin record");
    Ok(())
}

fn fold_plugin(
    tables: &DescriptorTables,
    plugin_index: usize,
    library: &Arc<NativeLibrary>,
    fail_on_load_error: bool,
) -> Result<Option<Plugin>> {
    let name = &tables.plugins[plugin_index].name;
    let mut plugin = match Plugin::new(name) {
        Ok(plugin) => plugin,
        Err(e) => {
            reject(fail_on_load_error, format!("Cannot create plugin `{name}`: {e}"))?;
            return Ok(None);
        },
    };

    let mut init = None;
    let mut exit = None;
    for attribute in tables.plugin_attributes_of(plugin_index) {
        match attribute {
            PluginAttribute::Init(f) => init = Some(Arc::clone(f)),
            PluginAttribute::Exit(f) => exit = Some(Arc::clone(f)),
            PluginAttribute::Author(author) => plugin.set_author(author)?,
            PluginAttribute::License(license) => plugin.set_license(license)?,
            PluginAttribute::Description(description) => plugin.set_description(description)?,
            PluginAttribute::Version(version) => plugin.set_version(version.clone()),
            PluginAttribute::Unknown(tag) => {
                reject(fail_on_load_error, format!("Plugin `{name}` has an attribute with unknown tag {tag}"))?;
            },
        }
    }

    let mut classes = Vec::new();
    for (class_index, descriptor) in tables.component_classes_of(plugin_index) {
        let class = build_component_class(
            descriptor,
            tables.component_class_attributes_of(class_index),
            fail_on_load_error,
        )
        .with_context(|| format!("Cannot build component class `{}` of plugin `{name}`", descriptor.name))?;
        classes.extend(class);
    }

    if let Some(init) = init {
        if let Err(e) = init() {
            if fail_on_load_error {
                return Err(anyhow!(e).context(format!("Plugin `{name}` failed to initialize")));
            }
            // Only this plugin is skipped; its exit callback is never registered.
            tracing::warn!(plugin = %name, error = %e, "Plugin failed to initialize, skipping it");
            return Ok(None);
        }
    }
    if let Some(exit) = exit {
        library.register_exit(exit);
    }

    let handle: Arc<dyn LibraryHandle> = Arc::<NativeLibrary>::clone(library);
    if let Some(path) = handle.path() {
        plugin.set_path(path);
    }
    plugin.set_library(handle);

    for class in classes {
        let class_name = class.name().to_string();
        match plugin.add_component_class(class) {
            Ok(class) => register_component_class(&class),
            Err(e) => reject(fail_on_load_error, format!("Cannot add component class `{class_name}`: {e}"))?,
        }
    }

    tracing::debug!(
        plugin = %plugin.name(),
        path = ?plugin.path(),
        component_classes = plugin.component_class_count(),
        "Loaded plugin"
    );
    Ok(Some(plugin))
}

/// Folds every plugin of `tables`, binding them to `library`.
///
/// In lenient mode, plugins with invalid records or a failing initialization
/// are skipped. Returns `Ok(None)` ("not found") when no plugin remains.
///
/// # Errors
///
/// In strict mode, any invalid record or failing plugin initialization.
pub fn load_all_from_tables(
    tables: &DescriptorTables,
    library: &Arc<NativeLibrary>,
    fail_on_load_error: bool,
) -> Result<Option<PluginSet>> {
    let mut set = PluginSet::new();
    for plugin_index in 0..tables.plugins.len() {
        if let Some(plugin) = fold_plugin(tables, plugin_index, library, fail_on_load_error)? {
            set.push(plugin);
        }
    }
    Ok((!set.is_empty()).then_some(set))
}

/// Loads the plugins of descriptor tables built in-process.
///
/// # Errors
///
/// See [`load_all_from_tables`].
pub fn load_all_from_static(tables: DescriptorTables, fail_on_load_error: bool) -> Result<Option<PluginSet>> {
    load_all_from_tables(&tables, &NativeLibrary::statically_linked(), fail_on_load_error)
}

/// Loads the plugins of sections generated by the SDK macro and linked into
/// the process.
///
/// # Errors
///
/// In strict mode, any invalid record or failing plugin initialization.
pub fn load_all_from_sections(sections: &PluginSections, fail_on_load_error: bool) -> Result<Option<PluginSet>> {
    let raw = RawSections::from_static(sections);
    // SAFETY: `PluginSections` only holds records built by the SDK macro.
    let tables = unsafe { descriptor_tables(&raw, fail_on_load_error) }?;
    load_all_from_tables(&tables, &NativeLibrary::statically_linked(), fail_on_load_error)
}

/// Whether `path` names something the loader may open: a native shared
/// object or a libtool wrapper.
pub fn has_plugin_suffix(path: &Path) -> bool {
    let path = path.to_string_lossy();
    [std::env::consts::DLL_SUFFIX, LIBTOOL_SUFFIX]
        .iter()
        .any(|suffix| path.len() > suffix.len() && path.ends_with(suffix))
}

/// Loads the plugins of one shared object.
///
/// Returns `Ok(None)` when the path does not have a plugin suffix, cannot be
/// opened, or is not a tracegraph plugin.
///
/// # Errors
///
/// In strict mode, missing sections after the first one, invalid records or
/// failing plugin initialization.
pub fn load_all_from_file(path: impl AsRef<Path>, fail_on_load_error: bool) -> Result<Option<PluginSet>> {
    let path = path.as_ref();
    if !has_plugin_suffix(path) {
        tracing::trace!(?path, "Skipping file without a plugin suffix");
        return Ok(None);
    }

    // SAFETY: Loading a dynamic library is inherently unsafe as we're executing code
    // from an external source. Plugins are trusted code (chosen by the user/admin).
    let library = match unsafe { Library::new(path) } {
        Ok(library) => library,
        Err(e) => {
            tracing::debug!(?path, error = %e, "Cannot open module");
            return Ok(None);
        },
    };

    // SAFETY: a module exporting the section accessors was built with the SDK
    // macro; its records live as long as `library`.
    let tables = {
        let Some(raw) = (unsafe { resolve_sections(&library, fail_on_load_error) })
            .with_context(|| format!("Invalid plugin sections in '{}'", path.display()))?
        else {
            return Ok(None);
        };
        unsafe { descriptor_tables(&raw, fail_on_load_error) }
            .with_context(|| format!("Invalid plugin descriptors in '{}'", path.display()))?
    };

    let library = NativeLibrary::open(path.to_path_buf(), library);
    let plugins = load_all_from_tables(&tables, &library, fail_on_load_error)
        .with_context(|| format!("Failed to load plugins from '{}'", path.display()))?;
    if let Some(plugins) = &plugins {
        tracing::info!(path = %path.display(), plugins = plugins.len(), "Loaded plugin module");
    }
    Ok(plugins)
}

fn sorted_entries(dir: &Path) -> Result<Vec<(PathBuf, std::fs::FileType)>> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("Cannot read plugin directory '{}'", dir.display()))?
        .map(|entry| {
            let entry = entry?;
            Ok((entry.path(), entry.file_type()?))
        })
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Cannot list plugin directory '{}'", dir.display()))?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

fn scan_dir(dir: &Path, recurse: bool, fail_on_load_error: bool, set: &mut PluginSet) -> Result<()> {
    for (path, file_type) in sorted_entries(dir)? {
        if file_type.is_dir() {
            if recurse {
                scan_dir(&path, recurse, fail_on_load_error, set)?;
            }
            continue;
        }
        // Symbolic links are not followed.
        if !file_type.is_file() {
            continue;
        }
        match load_all_from_file(&path, fail_on_load_error) {
            Ok(Some(plugins)) => {
                let skipped = set.extend_unique(plugins);
                if skipped > 0 {
                    tracing::info!(path = %path.display(), skipped, "Skipped plugins with names already loaded");
                }
            },
            Ok(None) => {},
            Err(e) if fail_on_load_error => return Err(e),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Ignoring plugin file"),
        }
    }
    Ok(())
}

/// Loads every plugin found in `dir`, optionally recursing into
/// subdirectories. Entries are visited in path order; when two plugins share
/// a name, the first one wins.
///
/// # Errors
///
/// Fails if `dir` cannot be read, or in strict mode if any plugin file fails
/// to load.
pub fn load_all_from_dir(dir: impl AsRef<Path>, recurse: bool, fail_on_load_error: bool) -> Result<Option<PluginSet>> {
    let dir = dir.as_ref();
    let mut set = PluginSet::new();
    scan_dir(dir, recurse, fail_on_load_error, &mut set)?;
    tracing::info!(dir = %dir.display(), recurse, plugins = set.len(), "Scanned plugin directory");
    Ok((!set.is_empty()).then_some(set))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn suffix_discriminator() {
        let native = format!("libdemo{}", std::env::consts::DLL_SUFFIX);
        assert!(has_plugin_suffix(Path::new(&native)));
        assert!(has_plugin_suffix(Path::new("libdemo.la")));
        assert!(!has_plugin_suffix(Path::new("libdemo.txt")));
        assert!(!has_plugin_suffix(Path::new(".la")));
        assert!(!has_plugin_suffix(Path::new(std::env::consts::DLL_SUFFIX)));
    }

    #[test]
    fn files_without_suffix_are_not_opened() {
        assert!(load_all_from_file("/nonexistent/plugin.txt", true).unwrap().is_none());
    }

    #[test]
    fn unopenable_module_is_not_found() {
        let path = format!("/nonexistent/libplugin{}", std::env::consts::DLL_SUFFIX);
        assert!(load_all_from_file(path, true).unwrap().is_none());
    }

    #[test]
    fn empty_tables_are_not_found() {
        assert!(load_all_from_static(DescriptorTables::new(), true).unwrap().is_none());
    }
}
