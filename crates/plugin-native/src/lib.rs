// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Native Plugin Loader for tracegraph
//!
//! Loads plugins from shared objects built with `tracegraph-plugin-sdk-native`
//! and from descriptor tables linked into the process.
//!
//! Loading a module:
//! 1. resolve its four descriptor sections ([`sections`]); a module without
//!    the plugin-descriptor section is not a plugin;
//! 2. convert the C records into descriptor tables ([`wrapper`]);
//! 3. fold each plugin descriptor into a [`tracegraph_core::Plugin`], build
//!    its component classes, run its init callback and bind everything to
//!    one shared [`NativeLibrary`] handle ([`loader`]).
//!
//! Every loader takes `fail_on_load_error`: when set, invalid records and
//! failing init callbacks are errors; when unset the offending record or
//! plugin is logged and skipped, so older hosts can still load newer plugins.
//! A module counts as not found only when no plugin is left.

pub mod library;
pub mod loader;
pub mod sections;
pub mod wrapper;

pub use library::{release_all_library_handles, NativeLibrary, NO_DLCLOSE_ENV};
pub use loader::{
    has_plugin_suffix, load_all_from_dir, load_all_from_file, load_all_from_sections,
    load_all_from_static, load_all_from_tables,
};
