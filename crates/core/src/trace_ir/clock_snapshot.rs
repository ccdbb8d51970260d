// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Clock snapshots and their per-clock-class pool.
//!
//! The pool is simple:
//! - one bounded free list per clock class
//! - `ClockSnapshot` returns its slot to the pool on drop
//!
//! Snapshots are created for nearly every message, so recycling their slots
//! keeps the per-message hot path free of allocator churn.

use super::clock_class::ConstClockClass;
use crate::error::{Result, TraceError};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// Free slots kept per clock class.
pub const DEFAULT_SNAPSHOT_POOL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub available: usize,
    pub max_available: usize,
}

#[derive(Debug, Default)]
struct Slot {
    value_cycles: u64,
    /// `None` when the conversion overflowed.
    ns_from_origin: Option<i64>,
}

struct PoolInner {
    free: Vec<Box<Slot>>,
    max_available: usize,
    hits: u64,
    misses: u64,
}

#[derive(Clone)]
struct PoolHandle(Weak<Mutex<PoolInner>>);

pub(crate) struct ClockSnapshotPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl Default for ClockSnapshotPool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SNAPSHOT_POOL_CAPACITY)
    }
}

impl ClockSnapshotPool {
    pub(crate) fn with_capacity(max_available: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                free: Vec::new(),
                max_available,
                hits: 0,
                misses: 0,
            })),
        }
    }

    fn handle(&self) -> PoolHandle {
        PoolHandle(Arc::downgrade(&self.inner))
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let Ok(guard) = self.inner.lock() else {
            return PoolStats { hits: 0, misses: 0, available: 0, max_available: 0 };
        };
        PoolStats {
            hits: guard.hits,
            misses: guard.misses,
            available: guard.free.len(),
            max_available: guard.max_available,
        }
    }

    pub(crate) fn get(
        &self,
        clock_class: ConstClockClass,
        value_cycles: u64,
        ns_from_origin: Option<i64>,
    ) -> ClockSnapshot {
        let recycled = {
            let Ok(mut guard) = self.inner.lock() else {
                return ClockSnapshot::detached(clock_class, value_cycles, ns_from_origin);
            };
            let slot = guard.free.pop();
            if slot.is_some() {
                guard.hits += 1;
            } else {
                guard.misses += 1;
            }
            slot
        };

        let mut slot = recycled.unwrap_or_default();
        slot.value_cycles = value_cycles;
        slot.ns_from_origin = ns_from_origin;
        ClockSnapshot { clock_class, slot: Some(slot), pool: Some(self.handle()) }
    }
}

/// A captured clock value attached to a message.
pub struct ClockSnapshot {
    clock_class: ConstClockClass,
    slot: Option<Box<Slot>>,
    pool: Option<PoolHandle>,
}

impl ClockSnapshot {
    fn detached(clock_class: ConstClockClass, value_cycles: u64, ns: Option<i64>) -> Self {
        Self {
            clock_class,
            slot: Some(Box::new(Slot { value_cycles, ns_from_origin: ns })),
            pool: None,
        }
    }

    pub const fn clock_class(&self) -> &ConstClockClass {
        &self.clock_class
    }

    /// Raw value in cycles.
    pub fn value(&self) -> u64 {
        self.slot.as_ref().map_or(0, |slot| slot.value_cycles)
    }

    /// Nanoseconds from the clock class's origin.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Overflow`] if the value does not fit a signed
    /// 64-bit nanosecond count.
    pub fn ns_from_origin(&self) -> Result<i64> {
        self.slot.as_ref().and_then(|slot| slot.ns_from_origin).ok_or_else(|| {
            TraceError::Overflow(format!(
                "clock snapshot value {} overflows ns from origin",
                self.value()
            ))
        })
    }
}

impl fmt::Debug for ClockSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockSnapshot")
            .field("value", &self.value())
            .field("ns_from_origin", &self.slot.as_ref().and_then(|slot| slot.ns_from_origin))
            .field("pooled", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for ClockSnapshot {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take() else { return };
        let Some(slot) = self.slot.take() else { return };
        let Some(inner) = pool.0.upgrade() else { return };
        let Ok(mut guard) = inner.lock() else { return };

        if guard.free.len() >= guard.max_available {
            return;
        }
        guard.free.push(slot);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::trace_ir::ClockClass;

    #[test]
    fn snapshot_slots_are_recycled() {
        let cc = ClockClass::new();
        let first = cc.create_snapshot(10);
        assert_eq!(first.value(), 10);
        assert_eq!(first.ns_from_origin().unwrap(), 10);
        drop(first);
        assert_eq!(cc.snapshot_pool_stats().available, 1);

        let second = cc.create_snapshot(20);
        assert_eq!(second.value(), 20);
        let stats = cc.snapshot_pool_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.available, 0);
    }

    #[test]
    fn overflowing_snapshot_reports_on_read() {
        let cc = ClockClass::new();
        cc.set_offset(crate::trace_ir::ClockOffset::new(i64::MAX / 1_000_000_000, 0)).unwrap();
        let snapshot = cc.create_snapshot(u64::MAX);
        assert_eq!(snapshot.value(), u64::MAX);
        assert!(snapshot.ns_from_origin().is_err());
    }
}
