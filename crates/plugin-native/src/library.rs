// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared-library handles and the process-wide component-class registry.

use libloading::Library;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracegraph_core::plugin::descriptor::PluginExitMethod;
use tracegraph_core::{ComponentClass, LibraryHandle};

/// Set to `1` to keep shared libraries mapped after their last handle is
/// dropped, so symbol names stay resolvable for leak checkers.
pub const NO_DLCLOSE_ENV: &str = "TRACEGRAPH_NO_DLCLOSE";

/// A module plugins were loaded from.
///
/// Every component class a plugin produces holds a reference, so the library
/// stays mapped while any of them is alive. Exit callbacks of successfully
/// initialized plugins run when the last reference goes away, before the
/// library is unmapped.
pub struct NativeLibrary {
    path: Option<PathBuf>,
    library: Option<Library>,
    exits: Mutex<Vec<PluginExitMethod>>,
}

impl NativeLibrary {
    pub(crate) fn open(path: PathBuf, library: Library) -> Arc<Self> {
        Arc::new(Self { path: Some(path), library: Some(library), exits: Mutex::new(Vec::new()) })
    }

    /// Handle for plugins linked into the process.
    pub(crate) fn statically_linked() -> Arc<Self> {
        Arc::new(Self { path: None, library: None, exits: Mutex::new(Vec::new()) })
    }

    pub(crate) fn register_exit(&self, exit: PluginExitMethod) {
        self.exits.lock().unwrap_or_else(PoisonError::into_inner).push(exit);
    }
}

impl LibraryHandle for NativeLibrary {
    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .field("loaded", &self.library.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for NativeLibrary {
    fn drop(&mut self) {
        let exits = std::mem::take(self.exits.get_mut().unwrap_or_else(PoisonError::into_inner));
        for exit in exits.iter().rev() {
            exit();
        }

        let Some(library) = self.library.take() else {
            return;
        };
        if std::env::var(NO_DLCLOSE_ENV).is_ok_and(|v| v == "1") {
            tracing::debug!(path = ?self.path, "Not unloading shared library");
            std::mem::forget(library);
            return;
        }
        if let Err(e) = library.close() {
            tracing::warn!(path = ?self.path, error = %e, "Failed to unload shared library");
        } else {
            tracing::debug!(path = ?self.path, "Unloaded shared library");
        }
    }
}

static COMPONENT_CLASSES: Mutex<Vec<Weak<ComponentClass>>> = Mutex::new(Vec::new());

/// Records a loaded class so its library reference can be released at exit.
pub(crate) fn register_component_class(class: &Arc<ComponentClass>) {
    let mut classes = COMPONENT_CLASSES.lock().unwrap_or_else(PoisonError::into_inner);
    classes.retain(|c| c.strong_count() > 0);
    classes.push(Arc::downgrade(class));
}

/// Drops the library reference of every loaded component class still alive.
///
/// Call before process teardown so libraries are unloaded while their own
/// static state is intact. Classes keep working as method tables only if
/// some other reference holds their library. Returns the number of classes
/// that released a reference; calling it again returns 0.
pub fn release_all_library_handles() -> usize {
    let classes = std::mem::take(&mut *COMPONENT_CLASSES.lock().unwrap_or_else(PoisonError::into_inner));
    let released = classes
        .iter()
        .filter_map(Weak::upgrade)
        .filter(|class| class.release_library())
        .count();
    tracing::debug!(released, "Released component-class library handles");
    released
}
