// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Message iterator and graph lifecycle states.
//!
//! ## Message iterator
//!
//! ```text
//!   Active ──next() → End──▶ Ended
//!     ▲                        │
//!     └──── seek succeeded ────┘
//!     │
//!     └── drop ──▶ Finalized
//! ```
//!
//! An iterator whose `next` method fails stays `Active`; the caller decides
//! whether to drop it.
//!
//! ## Graph
//!
//! ```text
//!   Configuring ──first run──▶ Configured ──all sinks ended──▶ Ended
//!        │                          │
//!        └──────── error ───────────┴──▶ Faulty
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageIteratorState {
    /// Returns messages on `next`.
    Active,
    /// `next` reported the end; only a seek makes it active again.
    Ended,
    /// Finalize method ran; the iterator is unusable.
    Finalized,
}

impl fmt::Display for MessageIteratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Ended => f.write_str("ended"),
            Self::Finalized => f.write_str("finalized"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphState {
    /// Components and connections may still be added.
    Configuring,
    /// Structure is frozen; sinks are being run.
    Configured,
    /// Every sink reported the end.
    Ended,
    /// A run failed; the graph cannot run again.
    Faulty,
}

impl GraphState {
    pub const fn can_add_components(self) -> bool {
        matches!(self, Self::Configuring)
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuring => f.write_str("configuring"),
            Self::Configured => f.write_str("configured"),
            Self::Ended => f.write_str("ended"),
            Self::Faulty => f.write_str("faulty"),
        }
    }
}
