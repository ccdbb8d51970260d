// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Named, structured contract checks.
//!
//! Every check carries a stable identifier (for example `count-gt-0`) and a
//! human-readable message. Checks are grouped in tiers:
//!
//! - [`CheckTier::Pre`]: always enforced (`ensure_pre!`).
//! - [`CheckTier::Dev`]: hot-path checks such as frozen-object mutation, enforced
//!   only when [`DEV_CHECKS_ENABLED`] is true (`ensure_dev!`).
//! - [`CheckTier::Post`]: checks on what a user method returned, such as the
//!   message sequence of an iterator; same gating as `Dev` (`ensure_post!`).
//!
//! A failed check logs at `error` level and yields a
//! [`TraceError::Precondition`](crate::TraceError::Precondition).

use std::fmt;

/// Whether developer-tier checks are compiled in.
pub const DEV_CHECKS_ENABLED: bool = cfg!(any(debug_assertions, feature = "dev-checks"));

/// The tier a check belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTier {
    Pre,
    Dev,
    Post,
}

impl fmt::Display for CheckTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => f.write_str("pre"),
            Self::Dev => f.write_str("dev"),
            Self::Post => f.write_str("post"),
        }
    }
}

/// A failed contract check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{tier}:{id}: {message}")]
pub struct PreconditionViolation {
    pub tier: CheckTier,
    /// Stable identifier of the violated condition.
    pub id: &'static str,
    pub message: String,
}

impl PreconditionViolation {
    pub fn new(tier: CheckTier, id: &'static str, message: impl Into<String>) -> Self {
        Self { tier, id, message: message.into() }
    }
}

#[doc(hidden)]
#[cold]
pub fn violation(tier: CheckTier, id: &'static str, message: String) -> PreconditionViolation {
    tracing::error!(%tier, id, %message, "Contract check failed");
    PreconditionViolation::new(tier, id, message)
}

/// Returns early with a `pre`-tier violation if `cond` is false.
#[macro_export]
macro_rules! ensure_pre {
    ($cond:expr, $id:literal, $($arg:tt)+) => {
        if !($cond) {
            return Err($crate::precondition::violation(
                $crate::precondition::CheckTier::Pre,
                $id,
                format!($($arg)+),
            )
            .into());
        }
    };
}

/// Returns early with a `dev`-tier violation if checks are enabled and `cond` is false.
#[macro_export]
macro_rules! ensure_dev {
    ($cond:expr, $id:literal, $($arg:tt)+) => {
        if $crate::precondition::DEV_CHECKS_ENABLED && !($cond) {
            return Err($crate::precondition::violation(
                $crate::precondition::CheckTier::Dev,
                $id,
                format!($($arg)+),
            )
            .into());
        }
    };
}

/// Returns early with a `post`-tier violation if checks are enabled and `cond` is false.
#[macro_export]
macro_rules! ensure_post {
    ($cond:expr, $id:literal, $($arg:tt)+) => {
        if $crate::precondition::DEV_CHECKS_ENABLED && !($cond) {
            return Err($crate::precondition::violation(
                $crate::precondition::CheckTier::Post,
                $id,
                format!($($arg)+),
            )
            .into());
        }
    };
}
