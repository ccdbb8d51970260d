// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Process-wide library release. Kept in its own binary so no other test
//! registers classes concurrently.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use tracegraph_core::ComponentClassType;
use tracegraph_plugin_native::{load_all_from_sections, release_all_library_handles};
use tracegraph_plugin_sdk_native::prelude::*;

static EXIT_CALLS: AtomicUsize = AtomicUsize::new(0);

fn exit() {
    EXIT_CALLS.fetch_add(1, Ordering::SeqCst);
}

fn consume(_comp: &mut SelfComponent) -> Result<ConsumeStatus> {
    Ok(ConsumeStatus::End)
}

plugin_descriptors! {
    sections HELD_SECTIONS;
    plugin HELD_PLUGIN "held" {
        exit: exit,
    }
    sink HELD_FIRST "first" (consume) {}
    sink HELD_SECOND "second" (consume) {}
}

#[test]
fn release_drops_library_references_once() {
    let plugins = load_all_from_sections(&HELD_SECTIONS, true).unwrap().unwrap();
    let plugin = plugins.find("held").unwrap().clone();
    let first = plugin.component_class(ComponentClassType::Sink, "first").unwrap().clone();
    drop(plugins);
    drop(plugin);

    // `first` is the only holder left; `second` went away with the plugin.
    assert!(first.library().is_some());
    assert_eq!(release_all_library_handles(), 1);
    assert!(first.library().is_none());
    assert_eq!(EXIT_CALLS.load(Ordering::SeqCst), 1);

    assert_eq!(release_all_library_handles(), 0);
    assert_eq!(first.name(), "first");
}
