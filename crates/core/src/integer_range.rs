// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Inclusive integer ranges and range sets.
//!
//! Ranges back the selectors of option and variant field classes and the
//! supported-MIP-version sets of component classes.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Inclusive `[lower, upper]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegerRange<T> {
    lower: T,
    upper: T,
}

pub type UnsignedIntegerRange = IntegerRange<u64>;
pub type SignedIntegerRange = IntegerRange<i64>;

impl<T: Ord + Copy + std::fmt::Debug> IntegerRange<T> {
    /// Creates a range.
    ///
    /// # Errors
    ///
    /// Fails with the `lower-le-upper` precondition when `lower > upper`.
    pub fn new(lower: T, upper: T) -> Result<Self> {
        ensure_pre!(
            lower <= upper,
            "lower-le-upper",
            "Range's lower bound is greater than its upper bound: lower={lower:?}, upper={upper:?}"
        );
        Ok(Self { lower, upper })
    }

    /// A range containing exactly `value`.
    pub const fn single(value: T) -> Self {
        Self { lower: value, upper: value }
    }

    pub const fn lower(&self) -> T {
        self.lower
    }

    pub const fn upper(&self) -> T {
        self.upper
    }

    pub fn contains(&self, value: T) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }

    /// The overlapping part of both ranges, if any.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        Some(Self { lower: self.lower.max(other.lower), upper: self.upper.min(other.upper) })
    }
}

/// Unordered set of (possibly overlapping) inclusive ranges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegerRangeSet<T> {
    ranges: Vec<IntegerRange<T>>,
}

pub type UnsignedIntegerRangeSet = IntegerRangeSet<u64>;
pub type SignedIntegerRangeSet = IntegerRangeSet<i64>;

impl<T: Ord + Copy + std::fmt::Debug> IntegerRangeSet<T> {
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Adds the `[lower, upper]` range.
    ///
    /// # Errors
    ///
    /// Fails with the `lower-le-upper` precondition when `lower > upper`.
    pub fn add_range(&mut self, lower: T, upper: T) -> Result<()> {
        self.ranges.push(IntegerRange::new(lower, upper)?);
        Ok(())
    }

    pub fn push(&mut self, range: IntegerRange<T>) {
        self.ranges.push(range);
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&IntegerRange<T>> {
        self.ranges.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IntegerRange<T>> {
        self.ranges.iter()
    }

    pub fn contains(&self, value: T) -> bool {
        self.ranges.iter().any(|range| range.contains(value))
    }

    /// True if any range of `self` overlaps any range of `other`.
    pub fn intersects(&self, other: &Self) -> bool {
        self.ranges.iter().any(|a| other.ranges.iter().any(|b| a.intersects(b)))
    }

    /// Every pairwise overlap between both sets.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let ranges = self
            .ranges
            .iter()
            .flat_map(|a| other.ranges.iter().filter_map(move |b| a.intersection(b)))
            .collect();
        Self { ranges }
    }

    /// Greatest value covered by the set.
    pub fn max_value(&self) -> Option<T> {
        self.ranges.iter().map(IntegerRange::upper).max()
    }
}

// Two sets are equal when they contain the same ranges regardless of order.
impl<T: PartialEq> PartialEq for IntegerRangeSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ranges.len() == other.ranges.len()
            && self.ranges.iter().all(|range| other.ranges.contains(range))
    }
}

impl<T: Eq> Eq for IntegerRangeSet<T> {}

impl<'a, T> IntoIterator for &'a IntegerRangeSet<T> {
    type Item = &'a IntegerRange<T>;
    type IntoIter = std::slice::Iter<'a, IntegerRange<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_are_inclusive() {
        let range = SignedIntegerRange::new(-3, 7).unwrap();
        assert!(range.contains(-3));
        assert!(range.contains(7));
        assert!(!range.contains(8));
        assert_eq!(range, SignedIntegerRange::new(-3, 7).unwrap());
        assert_ne!(range, SignedIntegerRange::new(-3, 6).unwrap());
    }

    #[test]
    fn reversed_bounds_are_rejected() {
        let err = UnsignedIntegerRange::new(10, 5).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("lower-le-upper"));
    }

    #[test]
    fn set_equality_ignores_order() {
        let mut a = UnsignedIntegerRangeSet::new();
        a.add_range(0, 2).unwrap();
        a.add_range(10, 20).unwrap();
        let mut b = UnsignedIntegerRangeSet::new();
        b.add_range(10, 20).unwrap();
        b.add_range(0, 2).unwrap();
        assert_eq!(a, b);
        b.add_range(30, 30).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn set_intersection() {
        let mut a = UnsignedIntegerRangeSet::new();
        a.add_range(0, 1).unwrap();
        let mut b = UnsignedIntegerRangeSet::new();
        b.add_range(1, 3).unwrap();
        let both = a.intersection(&b);
        assert_eq!(both.len(), 1);
        assert_eq!(both.max_value(), Some(1));
        assert!(a.intersects(&b));
    }
}
