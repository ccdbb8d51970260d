// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! tracegraph core: the trace IR object model, the message protocol and the
//! component machinery every tracegraph pipeline is built from.
//!
//! ## Core Modules
//!
//! - [`trace_ir`]: clock, trace, stream and event classes and their instances
//! - [`message`]: the eight message variants and their construction rules
//! - [`iterator`]: message iterators, batches and seeking
//! - [`component_class`]: component and message-iterator method tables
//! - [`component`]: component instances, ports and the self-component handle
//! - [`plugin`]: plugins, plugin sets and descriptor tables
//! - [`registry`]: component-class lookup for graph builders
//! - [`validation`]: message sequence checks on iterator output
//! - [`precondition`]: named contract checks
//! - [`helpers`]: parameter parsing for component implementations
//! - [`error`]: error types and cause chains
//!
//! ## Quick Start
//!
//! ```ignore
//! use tracegraph_core::trace_ir::{ClockClass, TraceClass};
//! use tracegraph_core::message::{EventMessage, StreamMessage};
//!
//! let trace_class = TraceClass::new();
//! let stream_class = trace_class.create_stream_class()?;
//! stream_class.set_default_clock_class(ClockClass::new())?;
//! let event_class = stream_class.create_event_class()?;
//!
//! let trace = trace_class.instantiate();
//! let stream = stream_class.instantiate(&trace)?;
//! batch.push(StreamMessage::beginning(&stream))?;
//! batch.push(EventMessage::with_default_clock_snapshot(&event_class, &stream, 1_000)?)?;
//! ```

// Contract-check macros are used by every module below.
#[macro_use]
pub mod precondition;

pub mod component;
pub mod component_class;
pub mod error;
pub mod helpers;
pub mod integer_range;
pub mod interrupter;
pub mod iterator;
pub mod message;
pub mod object;
pub mod plugin;
pub mod registry;
pub mod state;
pub mod trace_ir;
pub mod validation;

// Error handling
pub use error::{ErrorContext, Result, TraceError};
pub use precondition::{CheckTier, PreconditionViolation, DEV_CHECKS_ENABLED};

// Components and iteration
pub use component::{
    BatchObserver, Component, ExecutionContext, LoggingLevel, PortInfo, PortType, SelfComponent,
};
pub use component_class::{
    ComponentClass, ComponentClassType, ConsumeStatus, IteratorStatus, MessageIteratorClass,
    QueryContext, QueryOutcome, SeekStatus,
};
pub use interrupter::{Interrupter, InterrupterSet};
pub use iterator::{
    IteratorConfiguration, IteratorNext, MessageBatch, MessageIterator, SeekOutcome,
    SelfMessageIterator, DEFAULT_BATCH_CAPACITY,
};

// Messages
pub use message::{Message, MessageType, SharedMessage};

// Plugins and registry
pub use plugin::{LibraryHandle, Plugin, PluginSet, PluginVersion};
pub use registry::{ComponentClassDefinition, ComponentClassKey, ComponentClassRegistry};

pub use helpers::params_helpers;
pub use object::UserAttributes;
pub use state::{GraphState, MessageIteratorState};
