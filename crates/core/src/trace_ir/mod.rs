// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Trace IR: the class/instance schema graph that messages reference.
//!
//! ```text
//! TraceClass ──owns──▶ StreamClass ──owns──▶ EventClass
//!     │                    │  └─ default ClockClass
//!     ▼ instantiate        ▼ instantiate
//!   Trace ─────owns──────▶ Stream ──create_packet──▶ Packet
//! ```
//!
//! Class entities own their children. Handles on a child also hold their parent,
//! and instances hold their class, so the ownership graph has no cycles.

mod clock_class;
mod clock_snapshot;
mod event;
mod event_class;
mod field_class;
mod packet;
mod stream;
mod stream_class;
mod trace;
mod trace_class;

pub use clock_class::{ClockClass, ClockOffset, ConstClockClass, NS_PER_S};
pub use clock_snapshot::{ClockSnapshot, PoolStats, DEFAULT_SNAPSHOT_POOL_CAPACITY};
pub use event::Event;
pub use event_class::{ConstEventClass, EventClass, EventClassLogLevel};
pub use field_class::{
    Field, FieldClass, FieldClassKind, FieldClassType, SelectorRanges, StructureBuilder,
    StructureMember, VariantBuilder, VariantOption,
};
pub use packet::{ConstPacket, Packet};
pub use stream::{ConstStream, Stream};
pub(crate) use stream::StreamInner;
pub use stream_class::{ConstStreamClass, StreamClass};
pub use trace::{ConstTrace, DestructionListenerId, EnvironmentValue, Trace};
pub use trace_class::{ConstTraceClass, TraceClass};
