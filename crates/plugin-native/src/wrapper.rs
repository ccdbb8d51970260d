// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! C descriptor records to descriptor tables
//!
//! Every C method pointer is wrapped into the matching core method closure.
//! The closures hold bare function pointers into the module; the module stays
//! loaded because every class built from them references its library handle.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::os::raw::c_char;
use std::sync::Arc;
use tracegraph_core::component_class::{
    CanSeekBeginningMethod, CanSeekNsFromOriginMethod, ConsumeMethod, ConsumeStatus, FinalizeMethod,
    GetSupportedMipVersionsMethod, GraphIsConfiguredMethod, InitializeMethod, IteratorFinalizeMethod,
    IteratorInitializeMethod, IteratorStatus, NextMethod, PortConnectedMethod, QueryMethod,
    QueryOutcome, SeekBeginningMethod, SeekNsFromOriginMethod, SeekStatus,
};
use tracegraph_core::error::TraceError;
use tracegraph_core::plugin::descriptor::{
    ComponentClassAttribute, ComponentClassDescriptorKind, DescriptorTables, PluginAttribute,
};
use tracegraph_core::PluginVersion;
use tracegraph_plugin_sdk_native::conversions::{
    c_result_to_status, c_str_to_string, iterator_configuration_to_c, logging_level_to_c,
    message_batch_to_c, optional_c_str_to_string, optional_ptr, params_to_c, port_info_to_c,
    query_context_to_c, range_set_to_c, self_component_to_c, self_message_iterator_to_c,
    string_to_c,
};
use tracegraph_plugin_sdk_native::types::{
    component_class_attribute_type as cc_attr, component_class_type, plugin_attribute_type,
    status, CComponentClassDescriptor, CComponentClassDescriptorAttribute, CConsumeFn, CNextFn,
    CPluginDescriptor, CPluginDescriptorAttribute, CResult,
};

use crate::sections::RawSections;

/// Decodes a C result, then maps its status with `map`.
fn check<T>(result: CResult, what: &str, map: impl FnOnce(i32) -> Option<T>) -> tracegraph_core::Result<T> {
    // SAFETY: error messages are NUL-terminated strings owned by the plugin's
    // thread-local slot, valid until the next call on this thread.
    let status = unsafe { c_result_to_status(result, what) }?;
    map(status).ok_or_else(|| TraceError::Component(format!("{what} returned unexpected status {status}")))
}

fn ok_only(status: i32) -> Option<()> {
    (status == status::OK).then_some(())
}

fn wrap_next(f: CNextFn) -> NextMethod {
    Arc::new(move |it, batch| {
        check(f(self_message_iterator_to_c(it), message_batch_to_c(batch)), "next", |s| match s {
            status::OK => Some(IteratorStatus::Ok),
            status::END => Some(IteratorStatus::End),
            status::AGAIN => Some(IteratorStatus::Again),
            _ => None,
        })
    })
}

fn wrap_consume(f: CConsumeFn) -> ConsumeMethod {
    Arc::new(move |comp| {
        check(f(self_component_to_c(comp)), "consume", |s| match s {
            status::OK => Some(ConsumeStatus::Ok),
            status::END => Some(ConsumeStatus::End),
            status::AGAIN => Some(ConsumeStatus::Again),
            _ => None,
        })
    })
}

fn seek_status(status: i32) -> Option<SeekStatus> {
    match status {
        status::OK => Some(SeekStatus::Ok),
        status::AGAIN => Some(SeekStatus::Again),
        _ => None,
    }
}

fn string_field(ptr: *const c_char, what: &str) -> Result<String> {
    // SAFETY: descriptor strings are null or NUL-terminated statics of the module.
    unsafe { c_str_to_string(ptr) }.map_err(|e| anyhow!("Invalid {what}: {e}"))
}

/// Rejects a record in strict mode, logs and skips it otherwise.
fn reject(fail_on_load_error: bool, message: String) -> Result<()> {
    if fail_on_load_error {
        tracing::error!(%message, "Invalid plugin descriptor record");
        return Err(anyhow!(message));
    }
    tracing::warn!(%message, "Ignoring plugin descriptor record");
    Ok(())
}

// SAFETY (union reads below): the SDK stores the member each tag names.
fn plugin_attribute(record: &CPluginDescriptorAttribute) -> Result<Option<PluginAttribute>> {
    let value = record.value;
    Ok(match record.attr_type {
        plugin_attribute_type::INIT => unsafe { value.init }.map(|f| {
            PluginAttribute::Init(Arc::new(move || check(f(), "plugin init", ok_only)))
        }),
        plugin_attribute_type::EXIT => {
            unsafe { value.exit }.map(|f| PluginAttribute::Exit(Arc::new(move || f())))
        },
        plugin_attribute_type::AUTHOR => {
            Some(PluginAttribute::Author(string_field(unsafe { value.string }, "plugin author")?))
        },
        plugin_attribute_type::LICENSE => {
            Some(PluginAttribute::License(string_field(unsafe { value.string }, "plugin license")?))
        },
        plugin_attribute_type::DESCRIPTION => {
            Some(PluginAttribute::Description(string_field(unsafe { value.string }, "plugin description")?))
        },
        plugin_attribute_type::VERSION => {
            let version = unsafe { value.version };
            Some(PluginAttribute::Version(PluginVersion {
                major: version.major,
                minor: version.minor,
                patch: version.patch,
                // SAFETY: `extra` is null or a NUL-terminated static of the module.
                extra: unsafe { optional_c_str_to_string(version.extra) }
                    .map_err(|e| anyhow!("Invalid plugin version extra: {e}"))?,
            }))
        },
        tag => Some(PluginAttribute::Unknown(tag)),
    })
}

fn component_class_kind(record: &CComponentClassDescriptor) -> Option<ComponentClassDescriptorKind> {
    let method = record.method;
    match record.class_type {
        component_class_type::SOURCE => unsafe { method.next }.map(|f| ComponentClassDescriptorKind::Source(wrap_next(f))),
        component_class_type::FILTER => unsafe { method.next }.map(|f| ComponentClassDescriptorKind::Filter(wrap_next(f))),
        component_class_type::SINK => {
            unsafe { method.consume }.map(|f| ComponentClassDescriptorKind::Sink(wrap_consume(f)))
        },
        tag => Some(ComponentClassDescriptorKind::Unknown(tag)),
    }
}

#[allow(clippy::too_many_lines)]
fn component_class_attribute(
    record: &CComponentClassDescriptorAttribute,
) -> Result<Option<ComponentClassAttribute>> {
    let value = record.value;
    Ok(match record.attr_type {
        cc_attr::DESCRIPTION => {
            Some(ComponentClassAttribute::Description(string_field(unsafe { value.string }, "class description")?))
        },
        cc_attr::HELP => Some(ComponentClassAttribute::Help(string_field(unsafe { value.string }, "class help")?)),
        cc_attr::GET_SUPPORTED_MIP_VERSIONS_METHOD => unsafe { value.get_supported_mip_versions }.map(|f| {
            let method: GetSupportedMipVersionsMethod = Arc::new(move |params, level, set| {
                let params = params_to_c(params);
                check(
                    f(optional_ptr(params.as_ref()), logging_level_to_c(level), range_set_to_c(set)),
                    "get supported MIP versions",
                    ok_only,
                )
            });
            ComponentClassAttribute::GetSupportedMipVersions(method)
        }),
        cc_attr::INITIALIZE_METHOD => unsafe { value.initialize }.map(|f| {
            let method: InitializeMethod = Arc::new(move |comp, params| {
                let params = params_to_c(params);
                check(f(self_component_to_c(comp), optional_ptr(params.as_ref())), "initialize", ok_only)
            });
            ComponentClassAttribute::Initialize(method)
        }),
        cc_attr::FINALIZE_METHOD => unsafe { value.finalize }.map(|f| {
            let method: FinalizeMethod = Arc::new(move |comp| f(self_component_to_c(comp)));
            ComponentClassAttribute::Finalize(method)
        }),
        cc_attr::QUERY_METHOD => unsafe { value.query }.map(|f| {
            let method: QueryMethod = Arc::new(move |ctx, object, params| {
                let object = string_to_c(object);
                let params = params_to_c(params);
                let mut result: *const c_char = std::ptr::null();
                let outcome = f(query_context_to_c(ctx), object.as_ptr(), optional_ptr(params.as_ref()), &mut result);
                match check(outcome, "query", Some)? {
                    status::OK => {
                        // SAFETY: the result is borrowed from the plugin's
                        // thread-local slot and copied right away.
                        let json = unsafe { optional_c_str_to_string(result) }.map_err(TraceError::Component)?;
                        let value = match json {
                            Some(json) => serde_json::from_str(&json)
                                .map_err(|e| TraceError::Component(format!("Invalid query result JSON: {e}")))?,
                            None => serde_json::Value::Null,
                        };
                        Ok(QueryOutcome::Result(value))
                    },
                    status::AGAIN => Ok(QueryOutcome::Again),
                    status::UNKNOWN_OBJECT => Ok(QueryOutcome::UnknownObject),
                    other => Err(TraceError::Component(format!("query returned unexpected status {other}"))),
                }
            });
            ComponentClassAttribute::Query(method)
        }),
        cc_attr::INPUT_PORT_CONNECTED_METHOD => unsafe { value.port_connected }
            .map(|f| ComponentClassAttribute::InputPortConnected(wrap_port_connected(f, "input port connected"))),
        cc_attr::OUTPUT_PORT_CONNECTED_METHOD => unsafe { value.port_connected }
            .map(|f| ComponentClassAttribute::OutputPortConnected(wrap_port_connected(f, "output port connected"))),
        cc_attr::GRAPH_IS_CONFIGURED_METHOD => unsafe { value.graph_is_configured }.map(|f| {
            let method: GraphIsConfiguredMethod =
                Arc::new(move |comp| check(f(self_component_to_c(comp)), "graph is configured", ok_only));
            ComponentClassAttribute::GraphIsConfigured(method)
        }),
        cc_attr::MSG_ITER_INITIALIZE_METHOD => unsafe { value.msg_iter_initialize }.map(|f| {
            let method: IteratorInitializeMethod = Arc::new(move |it, config, port| {
                let port = string_to_c(port);
                check(
                    f(self_message_iterator_to_c(it), iterator_configuration_to_c(config), port.as_ptr()),
                    "message iterator initialize",
                    ok_only,
                )
            });
            ComponentClassAttribute::MsgIterInitialize(method)
        }),
        cc_attr::MSG_ITER_FINALIZE_METHOD => unsafe { value.msg_iter_finalize }.map(|f| {
            let method: IteratorFinalizeMethod = Arc::new(move |it| f(self_message_iterator_to_c(it)));
            ComponentClassAttribute::MsgIterFinalize(method)
        }),
        cc_attr::MSG_ITER_SEEK_NS_FROM_ORIGIN_METHOD => unsafe { value.msg_iter_seek_ns_from_origin }.map(|f| {
            let method: SeekNsFromOriginMethod = Arc::new(move |it, ns| {
                check(f(self_message_iterator_to_c(it), ns), "seek ns from origin", seek_status)
            });
            ComponentClassAttribute::MsgIterSeekNsFromOrigin(method)
        }),
        cc_attr::MSG_ITER_SEEK_BEGINNING_METHOD => unsafe { value.msg_iter_seek_beginning }.map(|f| {
            let method: SeekBeginningMethod =
                Arc::new(move |it| check(f(self_message_iterator_to_c(it)), "seek beginning", seek_status));
            ComponentClassAttribute::MsgIterSeekBeginning(method)
        }),
        cc_attr::MSG_ITER_CAN_SEEK_NS_FROM_ORIGIN_METHOD => unsafe { value.msg_iter_can_seek_ns_from_origin }.map(|f| {
            let method: CanSeekNsFromOriginMethod = Arc::new(move |it, ns| {
                let mut can_seek = false;
                check(f(self_message_iterator_to_c(it), ns, &mut can_seek), "can seek ns from origin", ok_only)?;
                Ok(can_seek)
            });
            ComponentClassAttribute::MsgIterCanSeekNsFromOrigin(method)
        }),
        cc_attr::MSG_ITER_CAN_SEEK_BEGINNING_METHOD => unsafe { value.msg_iter_can_seek_beginning }.map(|f| {
            let method: CanSeekBeginningMethod = Arc::new(move |it| {
                let mut can_seek = false;
                check(f(self_message_iterator_to_c(it), &mut can_seek), "can seek beginning", ok_only)?;
                Ok(can_seek)
            });
            ComponentClassAttribute::MsgIterCanSeekBeginning(method)
        }),
        tag => Some(ComponentClassAttribute::Unknown(tag)),
    })
}

fn wrap_port_connected(
    f: tracegraph_plugin_sdk_native::types::CPortConnectedFn,
    what: &'static str,
) -> PortConnectedMethod {
    Arc::new(move |comp, port, other| {
        let port = string_to_c(port);
        check(f(self_component_to_c(comp), port.as_ptr(), port_info_to_c(other)), what, ok_only)
    })
}

fn type_name(ptr: *const c_char) -> String {
    // SAFETY: type names are NUL-terminated literals emitted by the SDK macro.
    unsafe { c_str_to_string(ptr) }.unwrap_or_default()
}

/// Converts resolved section records into descriptor tables.
///
/// Attribute records refer to their owner by address; records whose owner is
/// not in the sections are ignored. A method record with a null function
/// pointer is rejected like an invalid record.
///
/// # Safety
///
/// Every record must be laid out as the SDK defines it, with unions holding
/// the member their tag names and strings NUL-terminated.
///
/// # Errors
///
/// In strict mode, any invalid record is an error.
pub unsafe fn descriptor_tables(sections: &RawSections<'_>, fail_on_load_error: bool) -> Result<DescriptorTables> {
    let mut tables = DescriptorTables::new();

    let mut plugins: HashMap<*const CPluginDescriptor, usize> = HashMap::new();
    for descriptor in &sections.plugin_descriptors {
        let name = string_field(descriptor.name, "plugin name")?;
        let index = tables.add_plugin(name);
        plugins.insert(std::ptr::from_ref(*descriptor), index);
    }

    for record in &sections.plugin_descriptor_attributes {
        let Some(&plugin) = plugins.get(&record.plugin_descriptor) else {
            tracing::debug!(attribute = %type_name(record.type_name), "Skipping plugin attribute of an unknown plugin");
            continue;
        };
        match plugin_attribute(record) {
            Ok(Some(attribute)) => {
                tables.add_plugin_attribute(plugin, attribute);
            },
            Ok(None) => reject(
                fail_on_load_error,
                format!(
                    "Plugin `{}` has a null `{}` attribute",
                    tables.plugins[plugin].name,
                    type_name(record.type_name)
                ),
            )?,
            Err(e) => reject(fail_on_load_error, format!("Plugin `{}`: {e}", tables.plugins[plugin].name))?,
        }
    }

    let mut classes: HashMap<*const CComponentClassDescriptor, usize> = HashMap::new();
    for descriptor in &sections.component_class_descriptors {
        let Some(&plugin) = plugins.get(&descriptor.plugin_descriptor) else {
            tracing::debug!("Skipping component class descriptor of an unknown plugin");
            continue;
        };
        let name = string_field(descriptor.name, "component class name")?;
        let Some(kind) = component_class_kind(descriptor) else {
            reject(fail_on_load_error, format!("Component class `{name}` has a null mandatory method"))?;
            continue;
        };
        let index = tables.add_component_class(plugin, name, kind);
        classes.insert(std::ptr::from_ref(*descriptor), index);
    }

    for record in &sections.component_class_descriptor_attributes {
        let Some(&class) = classes.get(&record.comp_class_descriptor) else {
            tracing::debug!(
                attribute = %type_name(record.type_name),
                "Skipping attribute of an unknown component class"
            );
            continue;
        };
        let class_name = tables.component_classes[class].name.clone();
        match component_class_attribute(record) {
            Ok(Some(attribute)) => {
                tables.add_component_class_attribute(class, attribute);
            },
            Ok(None) => reject(
                fail_on_load_error,
                format!("Component class `{class_name}` has a null `{}` attribute", type_name(record.type_name)),
            )?,
            Err(e) => reject(fail_on_load_error, format!("Component class `{class_name}`: {e}"))?,
        }
    }

    Ok(tables)
}
