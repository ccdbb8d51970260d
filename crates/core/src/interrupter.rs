// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Cooperative cancellation.
//!
//! Long-running operations (graph runs, queries, user methods) poll their
//! interrupters between pull steps. Nothing is preempted.

use crate::object::{read, write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A shareable flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct Interrupter(Arc<AtomicBool>);

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The interrupters an operation observes: it is interrupted when any is set.
///
/// Clones share the same list, so interrupters added to a graph after its
/// components were created are still observed by them.
#[derive(Debug, Clone, Default)]
pub struct InterrupterSet {
    interrupters: Arc<RwLock<Vec<Interrupter>>>,
}

impl InterrupterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, interrupter: Interrupter) {
        write(&self.interrupters).push(interrupter);
    }

    pub fn is_set(&self) -> bool {
        read(&self.interrupters).iter().any(Interrupter::is_set)
    }

    pub fn len(&self) -> usize {
        read(&self.interrupters).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.interrupters).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_set_interrupter_interrupts() {
        let default = Interrupter::new();
        let extra = Interrupter::new();
        let set = InterrupterSet::new();
        let observer = set.clone();
        set.add(default.clone());
        assert!(!observer.is_set());
        set.add(extra.clone());
        assert_eq!(observer.len(), 2);

        extra.set();
        assert!(observer.is_set());
        extra.reset();
        assert!(!set.is_set());
        default.clone().set();
        assert!(default.is_set());
    }
}
