// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared defaults for graph execution.

// === Message Batches ===

/// Default maximum number of messages a message iterator returns per `next` call.
pub use tracegraph_core::iterator::DEFAULT_BATCH_CAPACITY;

// === Message Interchange Protocol ===

/// MIP version used when a graph is created without negotiation.
pub const DEFAULT_MIP_VERSION: u64 = 0;

/// Greatest MIP version this engine implements.
///
/// Negotiation clips every component class's supported set to `[0, MAX_MIP_VERSION]`.
pub const MAX_MIP_VERSION: u64 = 1;

// === Run Loop ===

/// Default pause, in microseconds, before running a graph again after it
/// reported `Again`.
pub const DEFAULT_AGAIN_RETRY_US: u64 = 100_000;
