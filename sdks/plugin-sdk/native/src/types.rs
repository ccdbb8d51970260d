// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! C ABI types for native plugins
//!
//! A plugin exposes four sections, each an array of pointers to descriptor
//! records, through pairs of `begin`/`end` accessor functions. Records refer
//! to their owner (plugin or component-class descriptor) by address.
//!
//! Host objects cross the boundary as opaque pointers. Host and plugin must be
//! built against the same `tracegraph-core`; [`PLUGIN_ABI_VERSION`] records
//! the layout revision of these records.

use std::os::raw::{c_char, c_void};

/// Layout revision of the descriptor records.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Status codes returned by plugin functions.
pub mod status {
    pub const OK: i32 = 0;
    pub const END: i32 = 1;
    pub const AGAIN: i32 = 11;
    pub const UNKNOWN_OBJECT: i32 = 42;
    pub const ERROR: i32 = -1;
    pub const MEMORY_ERROR: i32 = -12;
}

/// Type tags of plugin descriptor attributes.
pub mod plugin_attribute_type {
    pub const INIT: i32 = 0;
    pub const EXIT: i32 = 1;
    pub const AUTHOR: i32 = 2;
    pub const LICENSE: i32 = 3;
    pub const DESCRIPTION: i32 = 4;
    pub const VERSION: i32 = 5;
}

/// Type tags of component-class descriptors.
pub mod component_class_type {
    pub const SOURCE: i32 = 0;
    pub const FILTER: i32 = 1;
    pub const SINK: i32 = 2;
}

/// Type tags of component-class descriptor attributes.
pub mod component_class_attribute_type {
    pub const DESCRIPTION: i32 = 0;
    pub const HELP: i32 = 1;
    pub const GET_SUPPORTED_MIP_VERSIONS_METHOD: i32 = 2;
    pub const INITIALIZE_METHOD: i32 = 3;
    pub const FINALIZE_METHOD: i32 = 4;
    pub const QUERY_METHOD: i32 = 5;
    pub const INPUT_PORT_CONNECTED_METHOD: i32 = 6;
    pub const OUTPUT_PORT_CONNECTED_METHOD: i32 = 7;
    pub const GRAPH_IS_CONFIGURED_METHOD: i32 = 8;
    pub const MSG_ITER_INITIALIZE_METHOD: i32 = 9;
    pub const MSG_ITER_FINALIZE_METHOD: i32 = 10;
    pub const MSG_ITER_SEEK_NS_FROM_ORIGIN_METHOD: i32 = 11;
    pub const MSG_ITER_SEEK_BEGINNING_METHOD: i32 = 12;
    pub const MSG_ITER_CAN_SEEK_NS_FROM_ORIGIN_METHOD: i32 = 13;
    pub const MSG_ITER_CAN_SEEK_BEGINNING_METHOD: i32 = 14;
}

/// Logging levels as passed to plugin functions.
pub mod logging_level {
    pub const TRACE: i32 = 1;
    pub const DEBUG: i32 = 2;
    pub const INFO: i32 = 3;
    pub const WARNING: i32 = 4;
    pub const ERROR: i32 = 5;
    pub const FATAL: i32 = 6;
    pub const NONE: i32 = 0xff;
}

/// Result of a plugin function.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct CResult {
    pub status: i32,
    /// Optional null-terminated error message when `status` is negative.
    ///
    /// # Ownership
    ///
    /// This pointer is **borrowed** and must not be freed by the caller.
    /// Callers should copy it immediately if they need to keep it.
    pub error_message: *const c_char,
}

impl CResult {
    pub const fn status(status: i32) -> Self {
        Self { status, error_message: std::ptr::null() }
    }

    pub const fn ok() -> Self {
        Self::status(status::OK)
    }

    pub const fn error(status: i32, msg: *const c_char) -> Self {
        Self { status, error_message: msg }
    }
}

macro_rules! opaque_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            pub struct $name {
                _private: [u8; 0],
            }
        )*
    };
}

opaque_handle!(
    /// A host `SelfComponent`.
    CSelfComponent,
    /// A host `SelfMessageIterator`.
    CSelfMessageIterator,
    /// A host `MessageBatch`.
    CMessageBatch,
    /// A host `IteratorConfiguration`.
    CIteratorConfiguration,
    /// A host `QueryContext`.
    CQueryContext,
    /// A host `PortInfo`.
    CPortInfo,
    /// A host `UnsignedIntegerRangeSet`.
    CRangeSet,
);

pub type CPluginInitFn = extern "C" fn() -> CResult;
pub type CPluginExitFn = extern "C" fn();

/// Parameters are a JSON document, or null when absent.
pub type CInitializeFn = extern "C" fn(*mut CSelfComponent, *const c_char) -> CResult;
pub type CFinalizeFn = extern "C" fn(*mut CSelfComponent);
/// `(context, object, params JSON, result JSON out)`. The result pointer is
/// borrowed like [`CResult::error_message`].
pub type CQueryFn =
    extern "C" fn(*const CQueryContext, *const c_char, *const c_char, *mut *const c_char) -> CResult;
/// `(component, own port name, other end)`.
pub type CPortConnectedFn = extern "C" fn(*mut CSelfComponent, *const c_char, *const CPortInfo) -> CResult;
/// `(params JSON, logging level, supported versions out)`.
pub type CGetSupportedMipVersionsFn = extern "C" fn(*const c_char, i32, *mut CRangeSet) -> CResult;
pub type CGraphIsConfiguredFn = extern "C" fn(*mut CSelfComponent) -> CResult;
/// Returns `OK`, `END` or `AGAIN` on success.
pub type CConsumeFn = extern "C" fn(*mut CSelfComponent) -> CResult;
/// Returns `OK`, `END` or `AGAIN` on success.
pub type CNextFn = extern "C" fn(*mut CSelfMessageIterator, *mut CMessageBatch) -> CResult;
/// `(iterator, configuration, output port name)`.
pub type CMsgIterInitializeFn =
    extern "C" fn(*mut CSelfMessageIterator, *mut CIteratorConfiguration, *const c_char) -> CResult;
pub type CMsgIterFinalizeFn = extern "C" fn(*mut CSelfMessageIterator);
pub type CSeekNsFromOriginFn = extern "C" fn(*mut CSelfMessageIterator, i64) -> CResult;
pub type CCanSeekNsFromOriginFn = extern "C" fn(*mut CSelfMessageIterator, i64, *mut bool) -> CResult;
pub type CSeekBeginningFn = extern "C" fn(*mut CSelfMessageIterator) -> CResult;
pub type CCanSeekBeginningFn = extern "C" fn(*mut CSelfMessageIterator, *mut bool) -> CResult;

#[repr(C)]
pub struct CPluginDescriptor {
    pub name: *const c_char,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct CPluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Nullable.
    pub extra: *const c_char,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union CPluginAttributeValue {
    pub init: Option<CPluginInitFn>,
    pub exit: Option<CPluginExitFn>,
    /// Author, license or description.
    pub string: *const c_char,
    pub version: CPluginVersion,
}

#[repr(C)]
pub struct CPluginDescriptorAttribute {
    pub plugin_descriptor: *const CPluginDescriptor,
    pub type_name: *const c_char,
    /// One of [`plugin_attribute_type`].
    pub attr_type: i32,
    pub value: CPluginAttributeValue,
}

/// Mandatory method of a component class: `next` for sources and filters,
/// `consume` for sinks.
#[repr(C)]
#[derive(Copy, Clone)]
pub union CComponentClassMethod {
    pub next: Option<CNextFn>,
    pub consume: Option<CConsumeFn>,
}

#[repr(C)]
pub struct CComponentClassDescriptor {
    pub plugin_descriptor: *const CPluginDescriptor,
    pub name: *const c_char,
    /// One of [`component_class_type`].
    pub class_type: i32,
    pub method: CComponentClassMethod,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union CComponentClassAttributeValue {
    /// Description or help.
    pub string: *const c_char,
    pub get_supported_mip_versions: Option<CGetSupportedMipVersionsFn>,
    pub initialize: Option<CInitializeFn>,
    pub finalize: Option<CFinalizeFn>,
    pub query: Option<CQueryFn>,
    /// Input or output port connected.
    pub port_connected: Option<CPortConnectedFn>,
    pub graph_is_configured: Option<CGraphIsConfiguredFn>,
    pub msg_iter_initialize: Option<CMsgIterInitializeFn>,
    pub msg_iter_finalize: Option<CMsgIterFinalizeFn>,
    pub msg_iter_seek_ns_from_origin: Option<CSeekNsFromOriginFn>,
    pub msg_iter_seek_beginning: Option<CSeekBeginningFn>,
    pub msg_iter_can_seek_ns_from_origin: Option<CCanSeekNsFromOriginFn>,
    pub msg_iter_can_seek_beginning: Option<CCanSeekBeginningFn>,
}

#[repr(C)]
pub struct CComponentClassDescriptorAttribute {
    pub comp_class_descriptor: *const CComponentClassDescriptor,
    pub type_name: *const c_char,
    /// One of [`component_class_attribute_type`].
    pub attr_type: i32,
    pub value: CComponentClassAttributeValue,
}

// SAFETY: descriptor records are immutable statics holding pointers to other
// statics and to functions; sharing them between threads is sound.
unsafe impl Sync for CPluginDescriptor {}
unsafe impl Sync for CPluginDescriptorAttribute {}
unsafe impl Sync for CComponentClassDescriptor {}
unsafe impl Sync for CComponentClassDescriptorAttribute {}

/// Accessor returning the begin or end of a section.
pub type CSectionAccessor = extern "C" fn() -> *const *const c_void;

/// Names of the accessor functions of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSymbols {
    pub begin: &'static [u8],
    pub end: &'static [u8],
}

impl SectionSymbols {
    /// The begin symbol without its trailing NUL, for messages.
    pub fn begin_name(&self) -> &'static str {
        symbol_name(self.begin)
    }

    pub fn end_name(&self) -> &'static str {
        symbol_name(self.end)
    }
}

fn symbol_name(symbol: &'static [u8]) -> &'static str {
    std::str::from_utf8(symbol.strip_suffix(b"\0").unwrap_or(symbol)).unwrap_or("<invalid symbol>")
}

pub const PLUGIN_DESCRIPTORS_SECTION: SectionSymbols = SectionSymbols {
    begin: b"__tracegraph_get_begin_section_plugin_descriptors\0",
    end: b"__tracegraph_get_end_section_plugin_descriptors\0",
};

pub const PLUGIN_DESCRIPTOR_ATTRIBUTES_SECTION: SectionSymbols = SectionSymbols {
    begin: b"__tracegraph_get_begin_section_plugin_descriptor_attributes\0",
    end: b"__tracegraph_get_end_section_plugin_descriptor_attributes\0",
};

pub const COMPONENT_CLASS_DESCRIPTORS_SECTION: SectionSymbols = SectionSymbols {
    begin: b"__tracegraph_get_begin_section_component_class_descriptors\0",
    end: b"__tracegraph_get_end_section_component_class_descriptors\0",
};

pub const COMPONENT_CLASS_DESCRIPTOR_ATTRIBUTES_SECTION: SectionSymbols = SectionSymbols {
    begin: b"__tracegraph_get_begin_section_component_class_descriptor_attributes\0",
    end: b"__tracegraph_get_end_section_component_class_descriptor_attributes\0",
};

/// The sections in resolution order. Only the first one decides whether a
/// module is a plugin at all.
pub const SECTIONS: [SectionSymbols; 4] = [
    PLUGIN_DESCRIPTORS_SECTION,
    PLUGIN_DESCRIPTOR_ATTRIBUTES_SECTION,
    COMPONENT_CLASS_DESCRIPTORS_SECTION,
    COMPONENT_CLASS_DESCRIPTOR_ATTRIBUTES_SECTION,
];

/// The four sections of a plugin module, as generated by
/// [`crate::plugin_descriptors!`].
#[derive(Clone, Copy)]
pub struct PluginSections {
    pub plugin_descriptors: &'static [&'static CPluginDescriptor],
    pub plugin_descriptor_attributes: &'static [&'static CPluginDescriptorAttribute],
    pub component_class_descriptors: &'static [&'static CComponentClassDescriptor],
    pub component_class_descriptor_attributes: &'static [&'static CComponentClassDescriptorAttribute],
}

impl std::fmt::Debug for PluginSections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSections")
            .field("plugin_descriptors", &self.plugin_descriptors.len())
            .field("plugin_descriptor_attributes", &self.plugin_descriptor_attributes.len())
            .field("component_class_descriptors", &self.component_class_descriptors.len())
            .field(
                "component_class_descriptor_attributes",
                &self.component_class_descriptor_attributes.len(),
            )
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn section_accessors_pair_up_per_table() {
        for section in SECTIONS {
            let begin = std::str::from_utf8(section.begin).unwrap();
            let end = std::str::from_utf8(section.end).unwrap();
            let table = begin.strip_prefix("__tracegraph_get_begin_section_").unwrap();
            assert_eq!(end.strip_prefix("__tracegraph_get_end_section_").unwrap(), table);
            assert!(table.ends_with('\0'));
        }
    }
}
