// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Clock classes and cycle-to-time conversion.

use super::clock_snapshot::{ClockSnapshot, ClockSnapshotPool, PoolStats};
use crate::error::{Result, TraceError};
use crate::object::{read, try_string, write, FreezeState, UserAttributes};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

pub const NS_PER_S: u64 = 1_000_000_000;

/// Offset of a clock class's origin, in seconds plus cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockOffset {
    pub seconds: i64,
    pub cycles: u64,
}

impl ClockOffset {
    pub const fn new(seconds: i64, cycles: u64) -> Self {
        Self { seconds, cycles }
    }
}

#[derive(Debug)]
struct ClockClassData {
    name: Option<String>,
    description: Option<String>,
    frequency: u64,
    offset: ClockOffset,
    precision: u64,
    origin_is_unix_epoch: bool,
    uuid: Option<Uuid>,
    user_attributes: UserAttributes,
    /// `None` when the offset itself overflows a signed nanosecond count.
    base_offset_ns: Option<i64>,
}

impl ClockClassData {
    fn refresh_base_offset(&mut self) {
        self.base_offset_ns = base_offset_ns(self.frequency, self.offset);
    }
}

pub(crate) struct ClockClassInner {
    frozen: FreezeState,
    data: RwLock<ClockClassData>,
    snapshots: ClockSnapshotPool,
}

/// Read-only view of a clock class.
#[derive(Clone)]
pub struct ConstClockClass(pub(crate) Arc<ClockClassInner>);

/// Read-write view of a clock class.
#[derive(Clone)]
pub struct ClockClass(ConstClockClass);

impl Deref for ClockClass {
    type Target = ConstClockClass;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for ClockClass {
    fn default() -> Self {
        Self::new()
    }
}

/// Cycles to nanoseconds, exact.
fn ns_from_value(frequency: u64, cycles: u64) -> u128 {
    if frequency == NS_PER_S {
        return u128::from(cycles);
    }
    u128::from(cycles) * u128::from(NS_PER_S) / u128::from(frequency)
}

fn base_offset_ns(frequency: u64, offset: ClockOffset) -> Option<i64> {
    let seconds_ns = offset.seconds.checked_mul(1_000_000_000)?;
    let cycles_ns = i64::try_from(ns_from_value(frequency, offset.cycles)).ok()?;
    seconds_ns.checked_add(cycles_ns)
}

impl ConstClockClass {
    pub fn name(&self) -> Option<String> {
        read(&self.0.data).name.clone()
    }

    pub fn description(&self) -> Option<String> {
        read(&self.0.data).description.clone()
    }

    /// Frequency in Hz.
    pub fn frequency(&self) -> u64 {
        read(&self.0.data).frequency
    }

    pub fn offset(&self) -> ClockOffset {
        read(&self.0.data).offset
    }

    pub fn precision(&self) -> u64 {
        read(&self.0.data).precision
    }

    pub fn origin_is_unix_epoch(&self) -> bool {
        read(&self.0.data).origin_is_unix_epoch
    }

    pub fn uuid(&self) -> Option<Uuid> {
        read(&self.0.data).uuid
    }

    pub fn user_attributes(&self) -> UserAttributes {
        read(&self.0.data).user_attributes.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.is_frozen()
    }

    /// Converts `value` cycles to nanoseconds from the clock's origin.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Overflow`] when the result does not fit a signed
    /// 64-bit nanosecond count.
    pub fn cycles_to_ns_from_origin(&self, value: u64) -> Result<i64> {
        let data = read(&self.0.data);
        ns_from_origin(&data, value)
    }

    /// Snapshot pool statistics for this clock class.
    pub fn snapshot_pool_stats(&self) -> PoolStats {
        self.0.snapshots.stats()
    }

    pub(crate) fn create_snapshot(&self, value: u64) -> ClockSnapshot {
        let ns = self.cycles_to_ns_from_origin(value).ok();
        self.0.snapshots.get(self.clone(), value, ns)
    }

    pub(crate) fn freeze(&self) {
        self.0.frozen.freeze();
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn ns_from_origin(data: &ClockClassData, value: u64) -> Result<i64> {
    let overflow = || {
        TraceError::Overflow(format!(
            "cannot convert {value} cycles to ns from origin: frequency={}, offset-s={}, offset-cycles={}",
            data.frequency, data.offset.seconds, data.offset.cycles
        ))
    };
    let base = data.base_offset_ns.ok_or_else(overflow)?;
    // The value alone may exceed i64 while a negative offset brings the sum back.
    let value_ns = i128::try_from(ns_from_value(data.frequency, value)).map_err(|_| overflow())?;
    i64::try_from(i128::from(base) + value_ns).map_err(|_| overflow())
}

impl PartialEq for ConstClockClass {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ConstClockClass {}

impl fmt::Debug for ConstClockClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = read(&self.0.data);
        f.debug_struct("ClockClass")
            .field("name", &data.name)
            .field("frequency", &data.frequency)
            .field("offset", &data.offset)
            .field("origin_is_unix_epoch", &data.origin_is_unix_epoch)
            .field("uuid", &data.uuid)
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ClockClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl ClockClass {
    /// Creates a 1 GHz clock class whose origin is the Unix epoch.
    pub fn new() -> Self {
        let mut data = ClockClassData {
            name: None,
            description: None,
            frequency: NS_PER_S,
            offset: ClockOffset::default(),
            precision: 0,
            origin_is_unix_epoch: true,
            uuid: None,
            user_attributes: UserAttributes::new(),
            base_offset_ns: None,
        };
        data.refresh_base_offset();
        Self(ConstClockClass(Arc::new(ClockClassInner {
            frozen: FreezeState::new(),
            data: RwLock::new(data),
            snapshots: ClockSnapshotPool::default(),
        })))
    }

    /// Read-only view of this clock class.
    pub fn as_const(&self) -> ConstClockClass {
        self.0.clone()
    }

    /// # Errors
    ///
    /// Fails with [`TraceError::Memory`] if the name cannot be copied, or with
    /// the `not-frozen` violation.
    pub fn set_name(&self, name: &str) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Clock class")?;
        let name = try_string(name)?;
        write(&self.0 .0.data).name = Some(name);
        Ok(())
    }

    /// # Errors
    ///
    /// Same as [`ClockClass::set_name`].
    pub fn set_description(&self, description: &str) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Clock class")?;
        let description = try_string(description)?;
        write(&self.0 .0.data).description = Some(description);
        Ok(())
    }

    /// # Errors
    ///
    /// `frequency` must not be 0 or `u64::MAX` and must be greater than the
    /// offset's cycle part.
    pub fn set_frequency(&self, frequency: u64) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Clock class")?;
        ensure_pre!(
            frequency != 0 && frequency != u64::MAX,
            "valid-frequency",
            "Invalid frequency: {frequency}"
        );
        let mut data = write(&self.0 .0.data);
        ensure_pre!(
            data.offset.cycles < frequency,
            "offset-cycles-lt-frequency",
            "Offset (cycles) is greater than or equal to the frequency: offset-cycles={}, frequency={frequency}",
            data.offset.cycles
        );
        data.frequency = frequency;
        data.refresh_base_offset();
        Ok(())
    }

    /// # Errors
    ///
    /// `offset.cycles` must be less than the frequency.
    pub fn set_offset(&self, offset: ClockOffset) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Clock class")?;
        let mut data = write(&self.0 .0.data);
        ensure_pre!(
            offset.cycles < data.frequency,
            "offset-cycles-lt-frequency",
            "Offset (cycles) is greater than or equal to the frequency: offset-cycles={}, frequency={}",
            offset.cycles,
            data.frequency
        );
        data.offset = offset;
        data.refresh_base_offset();
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_precision(&self, precision: u64) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Clock class")?;
        write(&self.0 .0.data).precision = precision;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_origin_is_unix_epoch(&self, origin_is_unix_epoch: bool) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Clock class")?;
        write(&self.0 .0.data).origin_is_unix_epoch = origin_is_unix_epoch;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_uuid(&self, uuid: Uuid) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Clock class")?;
        write(&self.0 .0.data).uuid = Some(uuid);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_user_attributes(&self, attributes: UserAttributes) -> Result<()> {
        self.0 .0.frozen.ensure_mutable("Clock class")?;
        write(&self.0 .0.data).user_attributes = attributes;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cc = ClockClass::new();
        assert_eq!(cc.frequency(), NS_PER_S);
        assert_eq!(cc.offset(), ClockOffset::new(0, 0));
        assert_eq!(cc.precision(), 0);
        assert!(cc.origin_is_unix_epoch());
        assert!(cc.name().is_none());
        assert!(cc.user_attributes().is_empty());
    }

    #[test]
    fn converts_cycles_with_offset() {
        let cc = ClockClass::new();
        cc.set_frequency(1_000).unwrap();
        cc.set_offset(ClockOffset::new(10, 500)).unwrap();
        // 10 s + 500 ms + 2.5 s
        assert_eq!(cc.cycles_to_ns_from_origin(2_500).unwrap(), 13_000_000_000);
    }

    #[test]
    fn conversion_matches_formula_for_odd_frequency() {
        let cc = ClockClass::new();
        cc.set_frequency(3).unwrap();
        cc.set_offset(ClockOffset::new(-2, 1)).unwrap();
        let expected = -2_000_000_000 + 333_333_333 + 7 * 1_000_000_000 / 3;
        assert_eq!(cc.cycles_to_ns_from_origin(7).unwrap(), expected);
    }

    #[test]
    fn conversion_overflow_is_reported() {
        let cc = ClockClass::new();
        cc.set_offset(ClockOffset::new(i64::MAX / 1_000_000_000, 0)).unwrap();
        let err = cc.cycles_to_ns_from_origin(u64::MAX / 2).unwrap_err();
        assert!(matches!(err, TraceError::Overflow(_)));

        let cc = ClockClass::new();
        cc.set_offset(ClockOffset::new(i64::MAX, 0)).unwrap();
        assert!(matches!(cc.cycles_to_ns_from_origin(0), Err(TraceError::Overflow(_))));
    }

    #[test]
    fn negative_offset_brings_large_values_back_in_range() {
        let cc = ClockClass::new();
        cc.set_offset(ClockOffset::new(-10, 0)).unwrap();
        let value = i64::MAX.unsigned_abs() + 5_000_000_000;
        assert_eq!(cc.cycles_to_ns_from_origin(value).unwrap(), i64::MAX - 5_000_000_000);

        // Still too far past the end once the offset is applied.
        let value = i64::MAX.unsigned_abs() + 10_000_000_001;
        assert!(matches!(cc.cycles_to_ns_from_origin(value), Err(TraceError::Overflow(_))));

        let cc = ClockClass::new();
        cc.set_frequency(1).unwrap();
        cc.set_offset(ClockOffset::new(-1_000_000_000, 0)).unwrap();
        assert_eq!(cc.cycles_to_ns_from_origin(1_000_000_000).unwrap(), 0);
        assert!(matches!(cc.cycles_to_ns_from_origin(u64::MAX), Err(TraceError::Overflow(_))));
    }

    #[test]
    fn offset_cycles_must_be_below_frequency() {
        let cc = ClockClass::new();
        cc.set_frequency(100).unwrap();
        let err = cc.set_offset(ClockOffset::new(0, 100)).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("offset-cycles-lt-frequency"));
        assert!(cc.set_frequency(0).is_err());
    }

    #[test]
    fn frozen_clock_class_rejects_mutation_in_dev_mode() {
        let cc = ClockClass::new();
        cc.set_name("monotonic").unwrap();
        cc.freeze();
        assert_eq!(cc.set_precision(3).is_err(), crate::precondition::DEV_CHECKS_ENABLED);
        assert_eq!(cc.name().as_deref(), Some("monotonic"));
    }
}
