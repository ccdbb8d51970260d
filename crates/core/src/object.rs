// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared-object plumbing used by every trace IR entity.
//!
//! Entities are shared through `Arc` handles. Each one comes as a read-only view
//! (`ConstX`) and a read-write view (`X`) that derefs to the read-only one, so a
//! read-only handle exposes no mutator at all. The one-way frozen flag below
//! guards mutation through read-write views once an object reached a pipeline.

use crate::error::{Result, TraceError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Out-of-band metadata attached to schema-defining entities.
pub type UserAttributes = serde_json::Map<String, serde_json::Value>;

/// One-way unfrozen → frozen state.
#[derive(Debug, Default)]
pub struct FreezeState(AtomicBool);

impl FreezeState {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Freezes the object. Freezing twice is a no-op.
    pub fn freeze(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Fails with a `dev`-tier `not-frozen` violation if the object is frozen.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Precondition`] when the object is frozen and
    /// developer checks are enabled.
    pub fn ensure_mutable(&self, what: &str) -> Result<()> {
        ensure_dev!(!self.is_frozen(), "not-frozen", "{what} is frozen");
        Ok(())
    }
}

// A poisoned lock still holds structurally valid data.
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Copies `value` into a freshly reserved string, reporting allocation failure
/// as [`TraceError::Memory`] instead of aborting.
pub(crate) fn try_string(value: &str) -> Result<String> {
    let mut owned = String::new();
    owned
        .try_reserve_exact(value.len())
        .map_err(|err| TraceError::Memory(format!("cannot copy {} bytes: {err}", value.len())))?;
    owned.push_str(value);
    Ok(owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn freeze_is_one_way() {
        let state = FreezeState::new();
        assert!(!state.is_frozen());
        assert!(state.ensure_mutable("stream class").is_ok());
        state.freeze();
        state.freeze();
        assert!(state.is_frozen());
        if crate::precondition::DEV_CHECKS_ENABLED {
            let err = state.ensure_mutable("stream class").unwrap_err();
            assert_eq!(err.precondition().map(|v| v.id), Some("not-frozen"));
        }
    }

    #[test]
    fn try_string_copies() {
        assert!(matches!(try_string("my-trace").as_deref(), Ok("my-trace")));
    }
}
