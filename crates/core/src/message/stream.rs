// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::Message;
use crate::error::Result;
use crate::trace_ir::{ClockSnapshot, ConstStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMessageKind {
    Beginning,
    End,
}

/// Stream beginning or stream end.
#[derive(Debug)]
pub struct StreamMessage {
    kind: StreamMessageKind,
    stream: ConstStream,
    default_clock_snapshot: Option<ClockSnapshot>,
}

impl StreamMessage {
    pub fn beginning(stream: &ConstStream) -> Self {
        Self::new(StreamMessageKind::Beginning, stream)
    }

    pub fn end(stream: &ConstStream) -> Self {
        Self::new(StreamMessageKind::End, stream)
    }

    fn new(kind: StreamMessageKind, stream: &ConstStream) -> Self {
        Self { kind, stream: stream.clone(), default_clock_snapshot: None }
    }

    pub const fn kind(&self) -> StreamMessageKind {
        self.kind
    }

    pub const fn stream(&self) -> &ConstStream {
        &self.stream
    }

    /// Sets the default clock snapshot from a raw value in cycles.
    ///
    /// # Errors
    ///
    /// Fails with `has-default-clock-class` if the stream class currently has no
    /// default clock class.
    pub fn set_default_clock_snapshot(&mut self, value: u64) -> Result<()> {
        let clock_class = self.stream.class().default_clock_class();
        ensure_pre!(
            clock_class.is_some(),
            "has-default-clock-class",
            "Stream class {} has no default clock class",
            self.stream.class().id()
        );
        self.default_clock_snapshot = clock_class.map(|cc| cc.create_snapshot(value));
        Ok(())
    }

    /// The default clock snapshot, `None` when unknown.
    pub const fn default_clock_snapshot(&self) -> Option<&ClockSnapshot> {
        self.default_clock_snapshot.as_ref()
    }
}

impl From<StreamMessage> for Message {
    fn from(msg: StreamMessage) -> Self {
        match msg.kind {
            StreamMessageKind::Beginning => Self::StreamBeginning(msg),
            StreamMessageKind::End => Self::StreamEnd(msg),
        }
    }
}
