// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Descriptor section resolution.
//!
//! A plugin module exports a `begin`/`end` accessor pair per section. The
//! plugin-descriptor section decides whether the module is a plugin at all;
//! the other three must then be present too.

use anyhow::{anyhow, Result};
use libloading::{Library, Symbol};
use std::ffi::c_void;
use tracegraph_plugin_sdk_native::types::{
    CComponentClassDescriptor, CComponentClassDescriptorAttribute, CPluginDescriptor,
    CPluginDescriptorAttribute, CSectionAccessor, PluginSections, SectionSymbols, SECTIONS,
};

/// Something that exports section accessors.
pub trait SectionSource {
    /// Calls the accessor named `symbol` (NUL-terminated) and returns the
    /// pointer it yields, or `None` when the accessor does not exist.
    fn section_pointer(&self, symbol: &[u8]) -> Option<*const *const c_void>;
}

impl SectionSource for Library {
    fn section_pointer(&self, symbol: &[u8]) -> Option<*const *const c_void> {
        // SAFETY: section accessors are generated by the SDK macro with the
        // `CSectionAccessor` signature.
        let accessor: Symbol<CSectionAccessor> = unsafe { self.get(symbol) }.ok()?;
        Some(accessor())
    }
}

/// The records of the four sections, null entries removed.
pub struct RawSections<'a> {
    pub plugin_descriptors: Vec<&'a CPluginDescriptor>,
    pub plugin_descriptor_attributes: Vec<&'a CPluginDescriptorAttribute>,
    pub component_class_descriptors: Vec<&'a CComponentClassDescriptor>,
    pub component_class_descriptor_attributes: Vec<&'a CComponentClassDescriptorAttribute>,
}

impl RawSections<'static> {
    /// Sections of a plugin linked into the process.
    pub fn from_static(sections: &PluginSections) -> Self {
        Self {
            plugin_descriptors: sections.plugin_descriptors.to_vec(),
            plugin_descriptor_attributes: sections.plugin_descriptor_attributes.to_vec(),
            component_class_descriptors: sections.component_class_descriptors.to_vec(),
            component_class_descriptor_attributes: sections
                .component_class_descriptor_attributes
                .to_vec(),
        }
    }
}

/// Begin and end of one section, `None` if an accessor is missing.
fn section_bounds(source: &impl SectionSource, symbols: SectionSymbols) -> Option<(*const *const c_void, *const *const c_void)> {
    let begin = source.section_pointer(symbols.begin)?;
    let end = source.section_pointer(symbols.end)?;
    Some((begin, end))
}

/// # Safety
///
/// `[begin, end)` must be a readable array of pointers that are either null
/// or point to `T` records living for `'a`.
unsafe fn section_records<'a, T>(
    symbols: SectionSymbols,
    begin: *const *const c_void,
    end: *const *const c_void,
) -> Result<Vec<&'a T>> {
    if begin.is_null() && end.is_null() {
        return Ok(Vec::new());
    }
    if begin.is_null() || end.is_null() {
        return Err(anyhow!(
            "Section `{}` has only one bound: begin={begin:?}, end={end:?}",
            symbols.begin_name()
        ));
    }
    let len = usize::try_from(end.offset_from(begin)).map_err(|_| {
        anyhow!("Section `{}` ends before it begins: begin={begin:?}, end={end:?}", symbols.begin_name())
    })?;
    let entries = std::slice::from_raw_parts(begin.cast::<*const T>(), len);
    Ok(entries.iter().filter_map(|entry| entry.as_ref()).collect())
}

/// # Safety
///
/// See [`section_records`]; `bounds` holds one pair per entry of `SECTIONS`.
unsafe fn collect_records<'a>(bounds: &[(*const *const c_void, *const *const c_void)]) -> Result<RawSections<'a>> {
    Ok(RawSections {
        plugin_descriptors: section_records(SECTIONS[0], bounds[0].0, bounds[0].1)?,
        plugin_descriptor_attributes: section_records(SECTIONS[1], bounds[1].0, bounds[1].1)?,
        component_class_descriptors: section_records(SECTIONS[2], bounds[2].0, bounds[2].1)?,
        component_class_descriptor_attributes: section_records(SECTIONS[3], bounds[3].0, bounds[3].1)?,
    })
}

/// Resolves the four sections of `source`.
///
/// Returns `Ok(None)` when `source` is not a plugin (no plugin-descriptor
/// section) or, with `fail_on_load_error` unset, when another section is
/// missing or malformed.
///
/// # Safety
///
/// The accessors of `source` must return section bounds as generated by the
/// SDK macro, valid for as long as `source` is borrowed.
///
/// # Errors
///
/// With `fail_on_load_error` set, a missing or malformed section after the
/// first one is an error.
pub unsafe fn resolve_sections<'a>(
    source: &'a impl SectionSource,
    fail_on_load_error: bool,
) -> Result<Option<RawSections<'a>>> {
    let mut bounds = Vec::with_capacity(SECTIONS.len());
    for (index, symbols) in SECTIONS.iter().enumerate() {
        match section_bounds(source, *symbols) {
            Some(b) => bounds.push(b),
            None if index == 0 => {
                tracing::debug!(
                    symbol = symbols.begin_name(),
                    "Module has no plugin descriptor section, not a tracegraph plugin"
                );
                return Ok(None);
            },
            None => {
                let message = format!(
                    "Cannot resolve section accessors `{}`/`{}`",
                    symbols.begin_name(),
                    symbols.end_name()
                );
                if fail_on_load_error {
                    return Err(anyhow!(message));
                }
                tracing::warn!(%message, "Ignoring module with incomplete sections");
                return Ok(None);
            },
        }
    }

    let records = collect_records(&bounds);

    match records {
        Ok(records) => {
            tracing::debug!(
                plugins = records.plugin_descriptors.len(),
                plugin_attributes = records.plugin_descriptor_attributes.len(),
                component_classes = records.component_class_descriptors.len(),
                component_class_attributes = records.component_class_descriptor_attributes.len(),
                "Resolved plugin sections"
            );
            Ok(Some(records))
        },
        Err(e) if fail_on_load_error => Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring module with malformed sections");
            Ok(None)
        },
    }
}
