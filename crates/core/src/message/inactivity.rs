// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::Message;
use crate::trace_ir::{ClockSnapshot, ConstClockClass};

/// Tells downstream that no message older than the snapshot will follow.
#[derive(Debug)]
pub struct InactivityMessage {
    clock_snapshot: ClockSnapshot,
}

impl InactivityMessage {
    pub fn new(clock_class: &ConstClockClass, value: u64) -> Self {
        Self { clock_snapshot: clock_class.create_snapshot(value) }
    }

    pub const fn clock_snapshot(&self) -> &ClockSnapshot {
        &self.clock_snapshot
    }
}

impl From<InactivityMessage> for Message {
    fn from(msg: InactivityMessage) -> Self {
        Self::MessageIteratorInactivity(msg)
    }
}
