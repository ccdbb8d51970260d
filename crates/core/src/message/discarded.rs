// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::Message;
use crate::error::Result;
use crate::trace_ir::{ClockSnapshot, ConstStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardedItemsKind {
    Events,
    Packets,
}

impl DiscardedItemsKind {
    const fn noun(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Packets => "packets",
        }
    }
}

/// Notice that a producer dropped events or packets.
///
/// Clock snapshots are all-or-nothing: when the stream class's
/// `discarded_*_have_default_clock_snapshots` flag is set, both the beginning
/// and end snapshots are present; otherwise neither is.
#[derive(Debug)]
pub struct DiscardedItemsMessage {
    kind: DiscardedItemsKind,
    stream: ConstStream,
    beginning_default_clock_snapshot: Option<ClockSnapshot>,
    end_default_clock_snapshot: Option<ClockSnapshot>,
    count: Option<u64>,
}

impl DiscardedItemsMessage {
    /// # Errors
    ///
    /// Fails with `stream-class-supports-discarded-events` or
    /// `without-default-clock-snapshots`.
    pub fn events(stream: &ConstStream) -> Result<Self> {
        Self::create(DiscardedItemsKind::Events, stream, None)
    }

    /// # Errors
    ///
    /// Fails with `stream-class-supports-discarded-events`,
    /// `with-default-clock-snapshots` or `beginning-le-end`.
    pub fn events_with_default_clock_snapshots(
        stream: &ConstStream,
        beginning: u64,
        end: u64,
    ) -> Result<Self> {
        Self::create(DiscardedItemsKind::Events, stream, Some((beginning, end)))
    }

    /// # Errors
    ///
    /// Fails with `stream-class-supports-discarded-packets` or
    /// `without-default-clock-snapshots`.
    pub fn packets(stream: &ConstStream) -> Result<Self> {
        Self::create(DiscardedItemsKind::Packets, stream, None)
    }

    /// # Errors
    ///
    /// Fails with `stream-class-supports-discarded-packets`,
    /// `with-default-clock-snapshots` or `beginning-le-end`.
    pub fn packets_with_default_clock_snapshots(
        stream: &ConstStream,
        beginning: u64,
        end: u64,
    ) -> Result<Self> {
        Self::create(DiscardedItemsKind::Packets, stream, Some((beginning, end)))
    }

    fn create(
        kind: DiscardedItemsKind,
        stream: &ConstStream,
        values: Option<(u64, u64)>,
    ) -> Result<Self> {
        let stream_class = stream.class();
        let (supported, with_snapshots) = match kind {
            DiscardedItemsKind::Events => (
                stream_class.supports_discarded_events(),
                stream_class.discarded_events_have_default_clock_snapshots(),
            ),
            DiscardedItemsKind::Packets => (
                stream_class.supports_discarded_packets(),
                stream_class.discarded_packets_have_default_clock_snapshots(),
            ),
        };
        match kind {
            DiscardedItemsKind::Events => ensure_pre!(
                supported,
                "stream-class-supports-discarded-events",
                "Stream class {} does not support discarded events",
                stream_class.id()
            ),
            DiscardedItemsKind::Packets => ensure_pre!(
                supported,
                "stream-class-supports-discarded-packets",
                "Stream class {} does not support discarded packets",
                stream_class.id()
            ),
        }

        let (beginning, end) = match values {
            Some((beginning, end)) => {
                ensure_pre!(
                    with_snapshots,
                    "with-default-clock-snapshots",
                    "Discarded {} of stream class {} have no default clock snapshots",
                    kind.noun(),
                    stream_class.id()
                );
                ensure_pre!(
                    beginning <= end,
                    "beginning-le-end",
                    "Beginning clock value {beginning} is greater than end clock value {end}"
                );
                let clock_class = stream_class.default_clock_class();
                (
                    clock_class.as_ref().map(|cc| cc.create_snapshot(beginning)),
                    clock_class.as_ref().map(|cc| cc.create_snapshot(end)),
                )
            },
            None => {
                ensure_pre!(
                    !with_snapshots,
                    "without-default-clock-snapshots",
                    "Discarded {} of stream class {} need default clock snapshots",
                    kind.noun(),
                    stream_class.id()
                );
                (None, None)
            },
        };

        Ok(Self {
            kind,
            stream: stream.clone(),
            beginning_default_clock_snapshot: beginning,
            end_default_clock_snapshot: end,
            count: None,
        })
    }

    pub const fn kind(&self) -> DiscardedItemsKind {
        self.kind
    }

    pub const fn stream(&self) -> &ConstStream {
        &self.stream
    }

    pub const fn beginning_default_clock_snapshot(&self) -> Option<&ClockSnapshot> {
        self.beginning_default_clock_snapshot.as_ref()
    }

    pub const fn end_default_clock_snapshot(&self) -> Option<&ClockSnapshot> {
        self.end_default_clock_snapshot.as_ref()
    }

    /// # Errors
    ///
    /// Fails with `count-gt-0` when `count` is 0.
    pub fn set_count(&mut self, count: u64) -> Result<()> {
        ensure_pre!(count > 0, "count-gt-0", "Discarded {} count is 0", self.kind.noun());
        self.count = Some(count);
        Ok(())
    }

    /// Number of discarded items, `None` until set.
    pub const fn count(&self) -> Option<u64> {
        self.count
    }
}

impl From<DiscardedItemsMessage> for Message {
    fn from(msg: DiscardedItemsMessage) -> Self {
        match msg.kind {
            DiscardedItemsKind::Events => Self::DiscardedEvents(msg),
            DiscardedItemsKind::Packets => Self::DiscardedPackets(msg),
        }
    }
}
