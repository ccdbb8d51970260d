// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! tracegraph Native Plugin SDK
//!
//! Write component classes as plain Rust functions against `tracegraph-core`
//! and describe them with [`plugin_descriptors!`]. The macro generates the
//! C-compatible descriptor records, the `extern "C"` trampolines and the
//! section accessor symbols the host looks up when it loads the library.
//!
//! # Example
//!
//! ```ignore
//! use tracegraph_plugin_sdk_native::prelude::*;
//!
//! fn consume(comp: &mut SelfComponent) -> Result<ConsumeStatus> {
//!     Ok(ConsumeStatus::End)
//! }
//!
//! fn initialize(comp: &mut SelfComponent, _params: Option<&serde_json::Value>) -> Result<()> {
//!     comp.add_input_port("in")
//! }
//!
//! plugin_descriptors! {
//!     export sections PLUGIN_SECTIONS;
//!     plugin DEMO "demo" {
//!         description: "A demo plugin",
//!         version: (1, 0, 0),
//!     }
//!     sink DEMO_SINK "null" (consume) {
//!         initialize: initialize,
//!     }
//! }
//! ```
//!
//! Build the crate as a `cdylib`. Plugin functions are plain `fn` items in
//! scope at the macro call site.
//!
//! With `export sections`, the library exports one begin/end accessor pair
//! per record table, named `__tracegraph_get_begin_section_<table>` and
//! `__tracegraph_get_end_section_<table>`. These play the role of the
//! `__bt_get_begin_section_<table>`/`__bt_get_end_section_<table>` accessors
//! of babeltrace-style plugin modules; only the prefix differs. The tables
//! are listed in [`types::SECTIONS`].

pub mod conversions;
pub mod types;

pub use serde_json;
pub use tracegraph_core;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::plugin_descriptors;
    pub use crate::types::PluginSections;
    pub use tracegraph_core::component::{LoggingLevel, PortInfo, SelfComponent};
    pub use tracegraph_core::component_class::{
        ConsumeStatus, IteratorStatus, QueryContext, QueryOutcome, SeekStatus,
    };
    pub use tracegraph_core::error::{Result, TraceError};
    pub use tracegraph_core::integer_range::UnsignedIntegerRangeSet;
    pub use tracegraph_core::iterator::{IteratorConfiguration, MessageBatch, SelfMessageIterator};
}

/// A null-terminated C string from a string literal.
#[doc(hidden)]
#[macro_export]
macro_rules! __c_str {
    ($s:literal) => {
        concat!($s, "\0").as_ptr().cast::<::std::os::raw::c_char>()
    };
}

/// Value of one plugin attribute as `(tag, type name, value)` in record form.
#[doc(hidden)]
#[macro_export]
macro_rules! __plugin_attribute {
    (@record $tag:ident, $type_name:literal, $field:ident: $value:expr) => {
        $crate::types::CPluginDescriptorAttribute {
            plugin_descriptor: ::std::ptr::null(),
            type_name: $crate::__c_str!($type_name),
            attr_type: $crate::types::plugin_attribute_type::$tag,
            value: $crate::types::CPluginAttributeValue { $field: $value },
        }
    };
    (description: $v:literal) => {
        $crate::__plugin_attribute!(@record DESCRIPTION, "description", string: $crate::__c_str!($v))
    };
    (author: $v:literal) => {
        $crate::__plugin_attribute!(@record AUTHOR, "author", string: $crate::__c_str!($v))
    };
    (license: $v:literal) => {
        $crate::__plugin_attribute!(@record LICENSE, "license", string: $crate::__c_str!($v))
    };
    (version: ($major:literal, $minor:literal, $patch:literal)) => {
        $crate::__plugin_attribute!(@record VERSION, "version", version: $crate::types::CPluginVersion {
            major: $major,
            minor: $minor,
            patch: $patch,
            extra: ::std::ptr::null(),
        })
    };
    (version: ($major:literal, $minor:literal, $patch:literal, $extra:literal)) => {
        $crate::__plugin_attribute!(@record VERSION, "version", version: $crate::types::CPluginVersion {
            major: $major,
            minor: $minor,
            patch: $patch,
            extra: $crate::__c_str!($extra),
        })
    };
    (init: $f:ident) => {
        $crate::__plugin_attribute!(@record INIT, "init", init: Some({
            extern "C" fn trampoline() -> $crate::types::CResult {
                $crate::conversions::call_plugin_init($f)
            }
            trampoline as $crate::types::CPluginInitFn
        }))
    };
    (exit: $f:ident) => {
        $crate::__plugin_attribute!(@record EXIT, "exit", exit: Some({
            extern "C" fn trampoline() {
                $crate::conversions::call_plugin_exit($f);
            }
            trampoline as $crate::types::CPluginExitFn
        }))
    };
}

/// Value of one component-class attribute in record form.
#[doc(hidden)]
#[macro_export]
macro_rules! __component_class_attribute {
    (@record $tag:ident, $type_name:literal, $field:ident: $value:expr) => {
        $crate::types::CComponentClassDescriptorAttribute {
            comp_class_descriptor: ::std::ptr::null(),
            type_name: $crate::__c_str!($type_name),
            attr_type: $crate::types::component_class_attribute_type::$tag,
            value: $crate::types::CComponentClassAttributeValue { $field: $value },
        }
    };
    (description: $v:literal) => {
        $crate::__component_class_attribute!(@record DESCRIPTION, "description", string: $crate::__c_str!($v))
    };
    (help: $v:literal) => {
        $crate::__component_class_attribute!(@record HELP, "help", string: $crate::__c_str!($v))
    };
    (get_supported_mip_versions: $f:ident) => {
        $crate::__component_class_attribute!(@record GET_SUPPORTED_MIP_VERSIONS_METHOD,
            "get-supported-mip-versions-method", get_supported_mip_versions: Some({
            extern "C" fn trampoline(
                params: *const ::std::os::raw::c_char,
                level: i32,
                set: *mut $crate::types::CRangeSet,
            ) -> $crate::types::CResult {
                unsafe { $crate::conversions::call_get_supported_mip_versions($f, params, level, set) }
            }
            trampoline as $crate::types::CGetSupportedMipVersionsFn
        }))
    };
    (initialize: $f:ident) => {
        $crate::__component_class_attribute!(@record INITIALIZE_METHOD, "initialize-method", initialize: Some({
            extern "C" fn trampoline(
                comp: *mut $crate::types::CSelfComponent,
                params: *const ::std::os::raw::c_char,
            ) -> $crate::types::CResult {
                unsafe { $crate::conversions::call_initialize($f, comp, params) }
            }
            trampoline as $crate::types::CInitializeFn
        }))
    };
    (finalize: $f:ident) => {
        $crate::__component_class_attribute!(@record FINALIZE_METHOD, "finalize-method", finalize: Some({
            extern "C" fn trampoline(comp: *mut $crate::types::CSelfComponent) {
                unsafe { $crate::conversions::call_finalize($f, comp) }
            }
            trampoline as $crate::types::CFinalizeFn
        }))
    };
    (query: $f:ident) => {
        $crate::__component_class_attribute!(@record QUERY_METHOD, "query-method", query: Some({
            extern "C" fn trampoline(
                ctx: *const $crate::types::CQueryContext,
                object: *const ::std::os::raw::c_char,
                params: *const ::std::os::raw::c_char,
                result: *mut *const ::std::os::raw::c_char,
            ) -> $crate::types::CResult {
                unsafe { $crate::conversions::call_query($f, ctx, object, params, result) }
            }
            trampoline as $crate::types::CQueryFn
        }))
    };
    (@port_connected $tag:ident, $type_name:literal, $f:ident) => {
        $crate::__component_class_attribute!(@record $tag, $type_name, port_connected: Some({
            extern "C" fn trampoline(
                comp: *mut $crate::types::CSelfComponent,
                port: *const ::std::os::raw::c_char,
                other: *const $crate::types::CPortInfo,
            ) -> $crate::types::CResult {
                unsafe { $crate::conversions::call_port_connected($f, comp, port, other) }
            }
            trampoline as $crate::types::CPortConnectedFn
        }))
    };
    (input_port_connected: $f:ident) => {
        $crate::__component_class_attribute!(@port_connected INPUT_PORT_CONNECTED_METHOD,
            "input-port-connected-method", $f)
    };
    (output_port_connected: $f:ident) => {
        $crate::__component_class_attribute!(@port_connected OUTPUT_PORT_CONNECTED_METHOD,
            "output-port-connected-method", $f)
    };
    (graph_is_configured: $f:ident) => {
        $crate::__component_class_attribute!(@record GRAPH_IS_CONFIGURED_METHOD,
            "graph-is-configured-method", graph_is_configured: Some({
            extern "C" fn trampoline(comp: *mut $crate::types::CSelfComponent) -> $crate::types::CResult {
                unsafe { $crate::conversions::call_graph_is_configured($f, comp) }
            }
            trampoline as $crate::types::CGraphIsConfiguredFn
        }))
    };
    (msg_iter_initialize: $f:ident) => {
        $crate::__component_class_attribute!(@record MSG_ITER_INITIALIZE_METHOD,
            "msg-iter-initialize-method", msg_iter_initialize: Some({
            extern "C" fn trampoline(
                it: *mut $crate::types::CSelfMessageIterator,
                config: *mut $crate::types::CIteratorConfiguration,
                port: *const ::std::os::raw::c_char,
            ) -> $crate::types::CResult {
                unsafe { $crate::conversions::call_msg_iter_initialize($f, it, config, port) }
            }
            trampoline as $crate::types::CMsgIterInitializeFn
        }))
    };
    (msg_iter_finalize: $f:ident) => {
        $crate::__component_class_attribute!(@record MSG_ITER_FINALIZE_METHOD,
            "msg-iter-finalize-method", msg_iter_finalize: Some({
            extern "C" fn trampoline(it: *mut $crate::types::CSelfMessageIterator) {
                unsafe { $crate::conversions::call_msg_iter_finalize($f, it) }
            }
            trampoline as $crate::types::CMsgIterFinalizeFn
        }))
    };
    (msg_iter_seek_ns_from_origin: $f:ident) => {
        $crate::__component_class_attribute!(@record MSG_ITER_SEEK_NS_FROM_ORIGIN_METHOD,
            "msg-iter-seek-ns-from-origin-method", msg_iter_seek_ns_from_origin: Some({
            extern "C" fn trampoline(
                it: *mut $crate::types::CSelfMessageIterator,
                ns_from_origin: i64,
            ) -> $crate::types::CResult {
                unsafe { $crate::conversions::call_seek_ns_from_origin($f, it, ns_from_origin) }
            }
            trampoline as $crate::types::CSeekNsFromOriginFn
        }))
    };
    (msg_iter_can_seek_ns_from_origin: $f:ident) => {
        $crate::__component_class_attribute!(@record MSG_ITER_CAN_SEEK_NS_FROM_ORIGIN_METHOD,
            "msg-iter-can-seek-ns-from-origin-method", msg_iter_can_seek_ns_from_origin: Some({
            extern "C" fn trampoline(
                it: *mut $crate::types::CSelfMessageIterator,
                ns_from_origin: i64,
                can_seek: *mut bool,
            ) -> $crate::types::CResult {
                unsafe { $crate::conversions::call_can_seek_ns_from_origin($f, it, ns_from_origin, can_seek) }
            }
            trampoline as $crate::types::CCanSeekNsFromOriginFn
        }))
    };
    (msg_iter_seek_beginning: $f:ident) => {
        $crate::__component_class_attribute!(@record MSG_ITER_SEEK_BEGINNING_METHOD,
            "msg-iter-seek-beginning-method", msg_iter_seek_beginning: Some({
            extern "C" fn trampoline(it: *mut $crate::types::CSelfMessageIterator) -> $crate::types::CResult {
                unsafe { $crate::conversions::call_seek_beginning($f, it) }
            }
            trampoline as $crate::types::CSeekBeginningFn
        }))
    };
    (msg_iter_can_seek_beginning: $f:ident) => {
        $crate::__component_class_attribute!(@record MSG_ITER_CAN_SEEK_BEGINNING_METHOD,
            "msg-iter-can-seek-beginning-method", msg_iter_can_seek_beginning: Some({
            extern "C" fn trampoline(
                it: *mut $crate::types::CSelfMessageIterator,
                can_seek: *mut bool,
            ) -> $crate::types::CResult {
                unsafe { $crate::conversions::call_can_seek_beginning($f, it, can_seek) }
            }
            trampoline as $crate::types::CCanSeekBeginningFn
        }))
    };
}

/// Type tag and mandatory method of a component-class descriptor.
#[doc(hidden)]
#[macro_export]
macro_rules! __component_class_kind {
    (@next $tag:ident, $f:ident) => {
        (
            $crate::types::component_class_type::$tag,
            $crate::types::CComponentClassMethod {
                next: Some({
                    extern "C" fn trampoline(
                        it: *mut $crate::types::CSelfMessageIterator,
                        batch: *mut $crate::types::CMessageBatch,
                    ) -> $crate::types::CResult {
                        unsafe { $crate::conversions::call_next($f, it, batch) }
                    }
                    trampoline as $crate::types::CNextFn
                }),
            },
        )
    };
    (source $f:ident) => {
        $crate::__component_class_kind!(@next SOURCE, $f)
    };
    (filter $f:ident) => {
        $crate::__component_class_kind!(@next FILTER, $f)
    };
    (sink $f:ident) => {
        (
            $crate::types::component_class_type::SINK,
            $crate::types::CComponentClassMethod {
                consume: Some({
                    extern "C" fn trampoline(comp: *mut $crate::types::CSelfComponent) -> $crate::types::CResult {
                        unsafe { $crate::conversions::call_consume($f, comp) }
                    }
                    trampoline as $crate::types::CConsumeFn
                }),
            },
        )
    };
}

/// Describe one plugin and its component classes.
///
/// ```text
/// plugin_descriptors! {
///     [export] sections SECTIONS_STATIC;
///     plugin PLUGIN_STATIC "plugin-name" { key: value, ... }
///     (source|filter|sink) CLASS_STATIC "class-name" (mandatory_method) { key: value, ... }
///     ...
/// }
/// ```
///
/// Plugin keys: `description`, `author`, `license`, `version: (major, minor,
/// patch[, "extra"])`, `init` and `exit`. Class keys: `description`, `help`
/// and one per optional method (`initialize`, `finalize`, `query`,
/// `input_port_connected`, `msg_iter_seek_beginning`, ...).
///
/// `export` also emits the `#[no_mangle]` section accessors; use it once per
/// library.
#[macro_export]
macro_rules! plugin_descriptors {
    (
        export sections $sections:ident;
        $($rest:tt)*
    ) => {
        $crate::plugin_descriptors!(sections $sections; $($rest)*);

        $crate::__section_accessors!($sections, plugin_descriptors,
            __tracegraph_get_begin_section_plugin_descriptors,
            __tracegraph_get_end_section_plugin_descriptors);
        $crate::__section_accessors!($sections, plugin_descriptor_attributes,
            __tracegraph_get_begin_section_plugin_descriptor_attributes,
            __tracegraph_get_end_section_plugin_descriptor_attributes);
        $crate::__section_accessors!($sections, component_class_descriptors,
            __tracegraph_get_begin_section_component_class_descriptors,
            __tracegraph_get_end_section_component_class_descriptors);
        $crate::__section_accessors!($sections, component_class_descriptor_attributes,
            __tracegraph_get_begin_section_component_class_descriptor_attributes,
            __tracegraph_get_end_section_component_class_descriptor_attributes);
    };
    (
        sections $sections:ident;
        plugin $plugin:ident $plugin_name:literal { $($pkey:ident : $pval:tt),* $(,)? }
        $(
            $kind:ident $class:ident $class_name:literal ($method:ident) { $($ckey:ident : $cval:tt),* $(,)? }
        )*
    ) => {
        static $plugin: $crate::types::CPluginDescriptor = $crate::types::CPluginDescriptor {
            name: $crate::__c_str!($plugin_name),
        };

        $(
            static $class: $crate::types::CComponentClassDescriptor = {
                let (class_type, method) = $crate::__component_class_kind!($kind $method);
                $crate::types::CComponentClassDescriptor {
                    plugin_descriptor: &raw const $plugin,
                    name: $crate::__c_str!($class_name),
                    class_type,
                    method,
                }
            };
        )*

        pub static $sections: $crate::types::PluginSections = $crate::types::PluginSections {
            plugin_descriptors: &[&$plugin],
            plugin_descriptor_attributes: &[
                $(
                    &$crate::types::CPluginDescriptorAttribute {
                        plugin_descriptor: &raw const $plugin,
                        ..$crate::__plugin_attribute!($pkey: $pval)
                    },
                )*
            ],
            component_class_descriptors: &[$(&$class,)*],
            component_class_descriptor_attributes: &[
                $(
                    $(
                        &$crate::types::CComponentClassDescriptorAttribute {
                            comp_class_descriptor: &raw const $class,
                            ..$crate::__component_class_attribute!($ckey: $cval)
                        },
                    )*
                )*
            ],
        };
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __section_accessors {
    ($sections:ident, $field:ident, $begin:ident, $end:ident) => {
        #[no_mangle]
        pub extern "C" fn $begin() -> *const *const ::std::os::raw::c_void {
            $sections.$field.as_ptr().cast()
        }

        #[no_mangle]
        pub extern "C" fn $end() -> *const *const ::std::os::raw::c_void {
            $sections.$field.as_ptr_range().end.cast()
        }
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::conversions::c_str_to_string;
    use super::prelude::*;
    use super::types::{
        component_class_attribute_type, component_class_type, plugin_attribute_type, status,
        CPluginDescriptor,
    };

    fn consume(_comp: &mut SelfComponent) -> Result<ConsumeStatus> {
        Ok(ConsumeStatus::End)
    }

    fn next(_it: &mut SelfMessageIterator, _batch: &mut MessageBatch) -> Result<IteratorStatus> {
        Ok(IteratorStatus::End)
    }

    fn init() -> Result<()> {
        Err(TraceError::Plugin("not today".into()))
    }

    fn seek_beginning(_it: &mut SelfMessageIterator) -> Result<SeekStatus> {
        Ok(SeekStatus::Ok)
    }

    plugin_descriptors! {
        sections TEST_SECTIONS;
        plugin TEST_PLUGIN "test" {
            description: "Test plugin",
            version: (1, 2, 3, "-rc1"),
            init: init,
        }
        source TEST_SOURCE "src" (next) {
            description: "Test source",
            msg_iter_seek_beginning: seek_beginning,
        }
        sink TEST_SINK "sink" (consume) {}
    }

    #[test]
    fn macro_builds_linked_records() {
        let sections = &TEST_SECTIONS;
        assert_eq!(sections.plugin_descriptors.len(), 1);
        assert_eq!(sections.plugin_descriptor_attributes.len(), 3);
        assert_eq!(sections.component_class_descriptors.len(), 2);
        assert_eq!(sections.component_class_descriptor_attributes.len(), 2);

        let plugin: *const CPluginDescriptor = sections.plugin_descriptors[0];
        assert_eq!(unsafe { c_str_to_string(sections.plugin_descriptors[0].name) }.unwrap(), "test");
        for attribute in sections.plugin_descriptor_attributes {
            assert!(std::ptr::eq(attribute.plugin_descriptor, plugin));
        }
        let tags: Vec<i32> = sections.plugin_descriptor_attributes.iter().map(|a| a.attr_type).collect();
        assert_eq!(
            tags,
            [plugin_attribute_type::DESCRIPTION, plugin_attribute_type::VERSION, plugin_attribute_type::INIT]
        );

        let version = unsafe { sections.plugin_descriptor_attributes[1].value.version };
        assert_eq!((version.major, version.minor, version.patch), (1, 2, 3));
        assert_eq!(unsafe { c_str_to_string(version.extra) }.unwrap(), "-rc1");

        let source = sections.component_class_descriptors[0];
        assert_eq!(source.class_type, component_class_type::SOURCE);
        assert_eq!(sections.component_class_descriptors[1].class_type, component_class_type::SINK);
        let seek = sections.component_class_descriptor_attributes[1];
        assert!(std::ptr::eq(seek.comp_class_descriptor, source));
        assert_eq!(seek.attr_type, component_class_attribute_type::MSG_ITER_SEEK_BEGINNING_METHOD);
    }

    #[test]
    fn init_trampoline_reports_error() {
        let attribute = TEST_SECTIONS.plugin_descriptor_attributes[2];
        let init = unsafe { attribute.value.init }.unwrap();
        let result = init();
        assert_eq!(result.status, status::ERROR);
        let message = unsafe { c_str_to_string(result.error_message) }.unwrap();
        assert!(message.contains("not today"));
    }
}
