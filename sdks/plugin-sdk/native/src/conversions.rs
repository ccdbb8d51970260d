// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Conversions between C ABI types and Rust types
//!
//! The `call_*` functions are the plugin side of the boundary: they turn
//! opaque handles back into host objects, run a Rust method and encode its
//! outcome as a [`CResult`]. Panics never cross the boundary.

use crate::types::{
    logging_level, status, CIteratorConfiguration, CMessageBatch, CPortInfo, CQueryContext,
    CRangeSet, CResult, CSelfComponent, CSelfMessageIterator,
};
use serde_json::Value;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracegraph_core::component::{LoggingLevel, PortInfo, SelfComponent};
use tracegraph_core::component_class::{
    ConsumeStatus, IteratorStatus, QueryContext, QueryOutcome, SeekStatus,
};
use tracegraph_core::error::{Result, TraceError};
use tracegraph_core::integer_range::UnsignedIntegerRangeSet;
use tracegraph_core::iterator::{IteratorConfiguration, MessageBatch, SelfMessageIterator};

/// Convert C string to Rust String
///
/// # Safety
///
/// The pointer must be a valid null-terminated C string
///
/// # Errors
///
/// Returns an error if the string contains invalid UTF-8
pub unsafe fn c_str_to_string(ptr: *const c_char) -> std::result::Result<String, String> {
    if ptr.is_null() {
        return Ok(String::new());
    }

    CStr::from_ptr(ptr)
        .to_str()
        .map(std::string::ToString::to_string)
        .map_err(|e| format!("Invalid UTF-8: {e}"))
}

/// Like [`c_str_to_string`], mapping null to `None`.
///
/// # Safety
///
/// The pointer must be null or a valid null-terminated C string
///
/// # Errors
///
/// Returns an error if the string contains invalid UTF-8
pub unsafe fn optional_c_str_to_string(ptr: *const c_char) -> std::result::Result<Option<String>, String> {
    if ptr.is_null() {
        return Ok(None);
    }
    c_str_to_string(ptr).map(Some)
}

/// Convert a Rust string to an owned C string, replacing interior NULs.
pub fn string_to_c(s: &str) -> CString {
    CString::new(s).unwrap_or_else(|_| CString::new(s.replace('\0', " ")).unwrap_or_default())
}

/// Serialize optional parameters for a C call. The returned string must
/// outlive the call.
pub fn params_to_c(params: Option<&Value>) -> Option<CString> {
    params.map(|p| string_to_c(&p.to_string()))
}

pub fn optional_ptr(s: Option<&CString>) -> *const c_char {
    s.map_or(std::ptr::null(), |s| s.as_ptr())
}

/// Parse parameters received from a C call. Null means no parameters.
///
/// # Safety
///
/// The pointer must be null or a valid null-terminated C string
///
/// # Errors
///
/// Returns an error if the string is not valid UTF-8 or not JSON
pub unsafe fn params_from_c(ptr: *const c_char) -> std::result::Result<Option<Value>, String> {
    let Some(json) = optional_c_str_to_string(ptr)? else {
        return Ok(None);
    };
    serde_json::from_str(&json).map(Some).map_err(|e| format!("Invalid parameters JSON: {e}"))
}

fn sanitized(msg: &str) -> CString {
    let sanitized = if msg.contains('\0') { msg.replace('\0', " ") } else { msg.to_string() };
    CString::new(sanitized).unwrap_or_default()
}

/// Convert an error message to a C string for returning across the C ABI.
///
/// # Ownership and lifetime
///
/// The returned pointer is **borrowed** and **must not be freed** by the caller.
/// It remains valid until the next `error_to_c()` call on the same OS thread.
///
/// This design:
/// - Prevents host-side leaks when the host copies the message into an owned string.
/// - Avoids cross-dylib allocator issues (freeing memory in a different module).
pub fn error_to_c(msg: impl AsRef<str>) -> *const c_char {
    thread_local! {
        static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
    }

    let c_str = sanitized(msg.as_ref());
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() = c_str;
        slot.borrow().as_ptr()
    })
}

/// Store a query result for returning across the C ABI.
///
/// Same ownership rules as [`error_to_c`], with its own slot.
pub fn query_result_to_c(value: &Value) -> *const c_char {
    thread_local! {
        static LAST_RESULT: RefCell<CString> = RefCell::new(CString::default());
    }

    let c_str = sanitized(&value.to_string());
    LAST_RESULT.with(|slot| {
        *slot.borrow_mut() = c_str;
        slot.borrow().as_ptr()
    })
}

pub const fn logging_level_to_c(level: LoggingLevel) -> i32 {
    match level {
        LoggingLevel::Trace => logging_level::TRACE,
        LoggingLevel::Debug => logging_level::DEBUG,
        LoggingLevel::Info => logging_level::INFO,
        LoggingLevel::Warning => logging_level::WARNING,
        LoggingLevel::Error => logging_level::ERROR,
        LoggingLevel::Fatal => logging_level::FATAL,
        LoggingLevel::None => logging_level::NONE,
    }
}

/// Unknown values map to the default level.
pub const fn logging_level_from_c(level: i32) -> LoggingLevel {
    match level {
        logging_level::TRACE => LoggingLevel::Trace,
        logging_level::DEBUG => LoggingLevel::Debug,
        logging_level::INFO => LoggingLevel::Info,
        logging_level::ERROR => LoggingLevel::Error,
        logging_level::FATAL => LoggingLevel::Fatal,
        logging_level::NONE => LoggingLevel::None,
        _ => LoggingLevel::Warning,
    }
}

/// Encode an error, including its causes, as a negative result.
pub fn trace_error_to_c(err: &TraceError) -> CResult {
    let status = match err.root_cause() {
        TraceError::Memory(_) => status::MEMORY_ERROR,
        _ => status::ERROR,
    };
    let message: Vec<String> = err
        .causes()
        .map(|e| match e {
            TraceError::Caused { message, .. } => message.clone(),
            other => other.to_string(),
        })
        .collect();
    CResult::error(status, error_to_c(message.join(": ")))
}

/// Decode a result on the host side: negative statuses become errors, other
/// statuses are returned for the caller to interpret.
///
/// # Safety
///
/// `result.error_message` must be null or a valid null-terminated C string
pub unsafe fn c_result_to_status(result: CResult, what: &str) -> Result<i32> {
    if result.status >= 0 {
        return Ok(result.status);
    }
    let message = optional_c_str_to_string(result.error_message)
        .ok()
        .flatten()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("status {}", result.status));
    let message = format!("{what} failed: {message}");
    Err(if result.status == status::MEMORY_ERROR {
        TraceError::Memory(message)
    } else {
        TraceError::Component(message)
    })
}

pub fn self_component_to_c(comp: &mut SelfComponent) -> *mut CSelfComponent {
    std::ptr::from_mut(comp).cast()
}

pub fn self_message_iterator_to_c(it: &mut SelfMessageIterator) -> *mut CSelfMessageIterator {
    std::ptr::from_mut(it).cast()
}

pub fn message_batch_to_c(batch: &mut MessageBatch) -> *mut CMessageBatch {
    std::ptr::from_mut(batch).cast()
}

pub fn iterator_configuration_to_c(config: &mut IteratorConfiguration) -> *mut CIteratorConfiguration {
    std::ptr::from_mut(config).cast()
}

pub fn query_context_to_c(ctx: &QueryContext) -> *const CQueryContext {
    std::ptr::from_ref(ctx).cast()
}

pub fn port_info_to_c(info: &PortInfo) -> *const CPortInfo {
    std::ptr::from_ref(info).cast()
}

pub fn range_set_to_c(set: &mut UnsignedIntegerRangeSet) -> *mut CRangeSet {
    std::ptr::from_mut(set).cast()
}

fn null_handle(what: &str) -> TraceError {
    TraceError::Component(format!("Null {what} handle"))
}

/// Run `f`, encoding its status or error. A panic becomes an error result.
fn guard(what: &str, f: impl FnOnce() -> Result<i32>) -> CResult {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(status)) => CResult::status(status),
        Ok(Err(err)) => trace_error_to_c(&err),
        Err(_) => CResult::error(status::ERROR, error_to_c(format!("{what} panicked"))),
    }
}

unsafe fn self_component<'a>(ptr: *mut CSelfComponent) -> Result<&'a mut SelfComponent> {
    ptr.cast::<SelfComponent>().as_mut().ok_or_else(|| null_handle("component"))
}

unsafe fn self_message_iterator<'a>(ptr: *mut CSelfMessageIterator) -> Result<&'a mut SelfMessageIterator> {
    ptr.cast::<SelfMessageIterator>().as_mut().ok_or_else(|| null_handle("message iterator"))
}

unsafe fn string_arg(ptr: *const c_char) -> Result<String> {
    c_str_to_string(ptr).map_err(TraceError::Component)
}

pub fn call_plugin_init(f: fn() -> Result<()>) -> CResult {
    guard("plugin init", || f().map(|()| status::OK))
}

pub fn call_plugin_exit(f: fn()) {
    if catch_unwind(f).is_err() {
        tracing::error!("Plugin exit function panicked");
    }
}

/// # Safety
///
/// `comp` must come from [`self_component_to_c`] and `params` must be null
/// or a valid C string.
pub unsafe fn call_initialize(
    f: fn(&mut SelfComponent, Option<&Value>) -> Result<()>,
    comp: *mut CSelfComponent,
    params: *const c_char,
) -> CResult {
    guard("initialize", || {
        let comp = self_component(comp)?;
        let params = params_from_c(params).map_err(TraceError::Configuration)?;
        f(comp, params.as_ref()).map(|()| status::OK)
    })
}

/// # Safety
///
/// `comp` must come from [`self_component_to_c`].
pub unsafe fn call_finalize(f: fn(&mut SelfComponent), comp: *mut CSelfComponent) {
    let result = guard("finalize", || {
        f(self_component(comp)?);
        Ok(status::OK)
    });
    if result.status < 0 {
        tracing::error!("Component finalize method failed");
    }
}

/// # Safety
///
/// Pointers must come from the matching `*_to_c` functions or be valid C
/// strings; `result` must be writable.
pub unsafe fn call_query(
    f: fn(&QueryContext, &str, Option<&Value>) -> Result<QueryOutcome>,
    ctx: *const CQueryContext,
    object: *const c_char,
    params: *const c_char,
    result: *mut *const c_char,
) -> CResult {
    guard("query", || {
        let ctx = ctx.cast::<QueryContext>().as_ref().ok_or_else(|| null_handle("query context"))?;
        let object = string_arg(object)?;
        let params = params_from_c(params).map_err(TraceError::Configuration)?;
        match f(ctx, &object, params.as_ref())? {
            QueryOutcome::Result(value) => {
                if !result.is_null() {
                    *result = query_result_to_c(&value);
                }
                Ok(status::OK)
            },
            QueryOutcome::Again => Ok(status::AGAIN),
            QueryOutcome::UnknownObject => Ok(status::UNKNOWN_OBJECT),
        }
    })
}

/// # Safety
///
/// Pointers must come from the matching `*_to_c` functions or be valid C
/// strings.
pub unsafe fn call_port_connected(
    f: fn(&mut SelfComponent, &str, &PortInfo) -> Result<()>,
    comp: *mut CSelfComponent,
    port: *const c_char,
    other: *const CPortInfo,
) -> CResult {
    guard("port connected", || {
        let comp = self_component(comp)?;
        let port = string_arg(port)?;
        let other = other.cast::<PortInfo>().as_ref().ok_or_else(|| null_handle("port info"))?;
        f(comp, &port, other).map(|()| status::OK)
    })
}

/// # Safety
///
/// `params` must be null or a valid C string; `set` must come from
/// [`range_set_to_c`].
pub unsafe fn call_get_supported_mip_versions(
    f: fn(Option<&Value>, LoggingLevel, &mut UnsignedIntegerRangeSet) -> Result<()>,
    params: *const c_char,
    level: i32,
    set: *mut CRangeSet,
) -> CResult {
    guard("get supported MIP versions", || {
        let params = params_from_c(params).map_err(TraceError::Configuration)?;
        let set = set.cast::<UnsignedIntegerRangeSet>().as_mut().ok_or_else(|| null_handle("range set"))?;
        f(params.as_ref(), logging_level_from_c(level), set).map(|()| status::OK)
    })
}

/// # Safety
///
/// `comp` must come from [`self_component_to_c`].
pub unsafe fn call_graph_is_configured(
    f: fn(&mut SelfComponent) -> Result<()>,
    comp: *mut CSelfComponent,
) -> CResult {
    guard("graph is configured", || f(self_component(comp)?).map(|()| status::OK))
}

/// # Safety
///
/// `comp` must come from [`self_component_to_c`].
pub unsafe fn call_consume(
    f: fn(&mut SelfComponent) -> Result<ConsumeStatus>,
    comp: *mut CSelfComponent,
) -> CResult {
    guard("consume", || {
        Ok(match f(self_component(comp)?)? {
            ConsumeStatus::Ok => status::OK,
            ConsumeStatus::End => status::END,
            ConsumeStatus::Again => status::AGAIN,
        })
    })
}

/// # Safety
///
/// Pointers must come from the matching `*_to_c` functions.
pub unsafe fn call_next(
    f: fn(&mut SelfMessageIterator, &mut MessageBatch) -> Result<IteratorStatus>,
    it: *mut CSelfMessageIterator,
    batch: *mut CMessageBatch,
) -> CResult {
    guard("next", || {
        let it = self_message_iterator(it)?;
        let batch = batch.cast::<MessageBatch>().as_mut().ok_or_else(|| null_handle("message batch"))?;
        Ok(match f(it, batch)? {
            IteratorStatus::Ok => status::OK,
            IteratorStatus::End => status::END,
            IteratorStatus::Again => status::AGAIN,
        })
    })
}

/// # Safety
///
/// Pointers must come from the matching `*_to_c` functions or be valid C
/// strings.
pub unsafe fn call_msg_iter_initialize(
    f: fn(&mut SelfMessageIterator, &mut IteratorConfiguration, &str) -> Result<()>,
    it: *mut CSelfMessageIterator,
    config: *mut CIteratorConfiguration,
    port: *const c_char,
) -> CResult {
    guard("message iterator initialize", || {
        let it = self_message_iterator(it)?;
        let config = config
            .cast::<IteratorConfiguration>()
            .as_mut()
            .ok_or_else(|| null_handle("iterator configuration"))?;
        let port = string_arg(port)?;
        f(it, config, &port).map(|()| status::OK)
    })
}

/// # Safety
///
/// `it` must come from [`self_message_iterator_to_c`].
pub unsafe fn call_msg_iter_finalize(f: fn(&mut SelfMessageIterator), it: *mut CSelfMessageIterator) {
    let result = guard("message iterator finalize", || {
        f(self_message_iterator(it)?);
        Ok(status::OK)
    });
    if result.status < 0 {
        tracing::error!("Message iterator finalize method failed");
    }
}

const fn seek_status_to_c(status: SeekStatus) -> i32 {
    match status {
        SeekStatus::Ok => status::OK,
        SeekStatus::Again => status::AGAIN,
    }
}

/// # Safety
///
/// `it` must come from [`self_message_iterator_to_c`].
pub unsafe fn call_seek_ns_from_origin(
    f: fn(&mut SelfMessageIterator, i64) -> Result<SeekStatus>,
    it: *mut CSelfMessageIterator,
    ns_from_origin: i64,
) -> CResult {
    guard("seek ns from origin", || {
        f(self_message_iterator(it)?, ns_from_origin).map(seek_status_to_c)
    })
}

/// # Safety
///
/// `it` must come from [`self_message_iterator_to_c`]; `can_seek` must be
/// writable.
pub unsafe fn call_can_seek_ns_from_origin(
    f: fn(&mut SelfMessageIterator, i64) -> Result<bool>,
    it: *mut CSelfMessageIterator,
    ns_from_origin: i64,
    can_seek: *mut bool,
) -> CResult {
    guard("can seek ns from origin", || {
        let answer = f(self_message_iterator(it)?, ns_from_origin)?;
        let out = can_seek.as_mut().ok_or_else(|| null_handle("can-seek output"))?;
        *out = answer;
        Ok(status::OK)
    })
}

/// # Safety
///
/// `it` must come from [`self_message_iterator_to_c`].
pub unsafe fn call_seek_beginning(
    f: fn(&mut SelfMessageIterator) -> Result<SeekStatus>,
    it: *mut CSelfMessageIterator,
) -> CResult {
    guard("seek beginning", || f(self_message_iterator(it)?).map(seek_status_to_c))
}

/// # Safety
///
/// `it` must come from [`self_message_iterator_to_c`]; `can_seek` must be
/// writable.
pub unsafe fn call_can_seek_beginning(
    f: fn(&mut SelfMessageIterator) -> Result<bool>,
    it: *mut CSelfMessageIterator,
    can_seek: *mut bool,
) -> CResult {
    guard("can seek beginning", || {
        let answer = f(self_message_iterator(it)?)?;
        let out = can_seek.as_mut().ok_or_else(|| null_handle("can-seek output"))?;
        *out = answer;
        Ok(status::OK)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn error_to_c_replaces_null_bytes() {
        let c_msg = error_to_c("Error\0with\0null\0bytes");
        let result = unsafe { CStr::from_ptr(c_msg) }.to_string_lossy();
        assert_eq!(result, "Error with null bytes");
    }

    #[test]
    fn error_chain_is_flattened() {
        let err = TraceError::Memory("out of memory".into()).with_cause("Cannot grow batch");
        let result = trace_error_to_c(&err);
        assert_eq!(result.status, status::MEMORY_ERROR);
        let message = unsafe { c_str_to_string(result.error_message) }.unwrap();
        assert_eq!(message, "Cannot grow batch: Memory error: out of memory");

        let err = unsafe { c_result_to_status(result, "next") }.unwrap_err();
        assert!(matches!(err, TraceError::Memory(_)));
    }

    #[test]
    fn non_negative_statuses_pass_through() {
        let status = unsafe { c_result_to_status(CResult::status(status::AGAIN), "consume") }.unwrap();
        assert_eq!(status, status::AGAIN);
    }

    #[test]
    fn params_round_trip_and_null() {
        let params = serde_json::json!({ "step": 3 });
        let c_params = params_to_c(Some(&params));
        let parsed = unsafe { params_from_c(optional_ptr(c_params.as_ref())) }.unwrap();
        assert_eq!(parsed, Some(params));
        assert_eq!(unsafe { params_from_c(std::ptr::null()) }.unwrap(), None);
    }

    #[test]
    fn logging_levels_map_both_ways() {
        for level in [
            LoggingLevel::Trace,
            LoggingLevel::Debug,
            LoggingLevel::Info,
            LoggingLevel::Warning,
            LoggingLevel::Error,
            LoggingLevel::Fatal,
            LoggingLevel::None,
        ] {
            assert_eq!(logging_level_from_c(logging_level_to_c(level)), level);
        }
        assert_eq!(logging_level_from_c(77), LoggingLevel::Warning);
    }

    #[test]
    fn panics_become_errors() {
        fn boom() -> Result<()> {
            panic!("boom")
        }
        let result = call_plugin_init(boom);
        assert_eq!(result.status, status::ERROR);
        let message = unsafe { c_str_to_string(result.error_message) }.unwrap();
        assert_eq!(message, "plugin init panicked");
    }
}
