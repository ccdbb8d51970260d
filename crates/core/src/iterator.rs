// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Message iterators: the pull side of the message protocol.
//!
//! A [`MessageIterator`] wraps the user methods of a [`MessageIteratorClass`]
//! and enforces the protocol around them: bounded batches, the ended state,
//! freezing of returned messages, sequence validation and seeking.

use crate::component::{BatchObserver, Component, LoggingLevel};
use crate::component_class::{IteratorStatus, MessageIteratorClass, SeekStatus};
use crate::error::{ErrorContext, Result, TraceError};
use crate::message::{Message, MessageType, SharedMessage};
use crate::state::MessageIteratorState;
use crate::validation::MessageSequenceValidator;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Default maximum number of messages per batch.
pub const DEFAULT_BATCH_CAPACITY: usize = 15;

const INLINE_BATCH: usize = 16;

/// Messages returned by one `next` call, bounded by a capacity.
#[derive(Debug)]
pub struct MessageBatch {
    messages: SmallVec<[SharedMessage; INLINE_BATCH]>,
    capacity: usize,
}

impl MessageBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { messages: SmallVec::new(), capacity }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.messages.len() >= self.capacity
    }

    /// Number of messages that can still be pushed.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.messages.len())
    }

    /// # Errors
    ///
    /// Fails with `batch-not-full` once the capacity is reached.
    pub fn push(&mut self, msg: impl Into<Message>) -> Result<()> {
        self.push_shared(Arc::new(msg.into()))
    }

    /// Pushes an already shared message, as filters forwarding upstream
    /// messages do.
    ///
    /// # Errors
    ///
    /// Fails with `batch-not-full` once the capacity is reached.
    pub fn push_shared(&mut self, msg: SharedMessage) -> Result<()> {
        ensure_pre!(
            !self.is_full(),
            "batch-not-full",
            "Message batch is full ({} messages)",
            self.capacity
        );
        self.messages.push(msg);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedMessage> {
        self.messages.iter()
    }

    pub fn into_vec(self) -> Vec<SharedMessage> {
        self.messages.into_vec()
    }
}

impl IntoIterator for MessageBatch {
    type Item = SharedMessage;
    type IntoIter = smallvec::IntoIter<[SharedMessage; INLINE_BATCH]>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

/// Settings an iterator initialize method may change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IteratorConfiguration {
    can_seek_forward: bool,
}

impl IteratorConfiguration {
    /// Declares that the iterator can seek to any time after its current position.
    pub fn set_can_seek_forward(&mut self, can_seek_forward: bool) {
        self.can_seek_forward = can_seek_forward;
    }

    pub const fn can_seek_forward(&self) -> bool {
        self.can_seek_forward
    }
}

/// Handle passed to message iterator methods.
pub struct SelfMessageIterator {
    component: Component,
    port_name: String,
    data: Option<Box<dyn Any + Send>>,
}

impl SelfMessageIterator {
    /// The component owning the output port this iterator operates on.
    pub const fn component(&self) -> &Component {
        &self.component
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn logging_level(&self) -> LoggingLevel {
        self.component.logging_level()
    }

    pub fn is_interrupted(&self) -> bool {
        self.component.is_interrupted()
    }

    /// Runs `f` on the owning component's user data if it is a `T`.
    pub fn with_component_data<T: Any + Send, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.component.with_data(f)
    }

    pub fn set_data<T: Any + Send>(&mut self, data: T) {
        self.data = Some(Box::new(data));
    }

    pub fn data<T: Any + Send>(&self) -> Option<&T> {
        self.data.as_ref().and_then(|d| d.downcast_ref::<T>())
    }

    pub fn data_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.data.as_mut().and_then(|d| d.downcast_mut::<T>())
    }

    pub fn take_data<T: Any + Send>(&mut self) -> Option<T> {
        let boxed = self.data.take()?;
        match boxed.downcast::<T>() {
            Ok(data) => Some(*data),
            Err(other) => {
                self.data = Some(other);
                None
            },
        }
    }

    /// Creates an iterator on one of the component's input ports.
    ///
    /// # Errors
    ///
    /// See [`Component::create_message_iterator`].
    pub fn create_message_iterator(&self, input_port: &str) -> Result<MessageIterator> {
        self.component.create_message_iterator(input_port)
    }
}

/// What [`MessageIterator::next`] produced.
#[derive(Debug)]
pub enum IteratorNext {
    Messages(MessageBatch),
    End,
    Again,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    Ok,
    /// The iterator class has no method for this kind of seek.
    NotSupported,
    Again,
}

/// A message iterator on an upstream output port.
///
/// The iterator finalizes itself when dropped.
pub struct MessageIterator {
    class: MessageIteratorClass,
    self_iter: SelfMessageIterator,
    config: IteratorConfiguration,
    state: MessageIteratorState,
    capacity: usize,
    validator: Option<MessageSequenceValidator>,
    observer: Option<Arc<dyn BatchObserver>>,
    /// Messages found while auto-seeking, returned before pulling again.
    pending: VecDeque<SharedMessage>,
    end_after_pending: bool,
}

impl MessageIterator {
    /// Creates an iterator on `upstream`'s `output_port` and runs its
    /// initialize method.
    ///
    /// # Errors
    ///
    /// Fails if the port does not exist, if the upstream class has no iterator
    /// class or if the initialize method fails.
    pub fn create(upstream: &Component, output_port: &str) -> Result<Self> {
        ensure_pre!(
            upstream.has_output_port(output_port),
            "output-port-exists",
            "Component `{}` has no output port `{output_port}`",
            upstream.name()
        );
        let Some(class) = upstream.class().iterator_class().cloned() else {
            return Err(TraceError::Component(format!(
                "Component `{}` has no message iterator class",
                upstream.name()
            )));
        };

        let mut self_iter = SelfMessageIterator {
            component: upstream.clone(),
            port_name: output_port.to_string(),
            data: None,
        };
        let mut config = IteratorConfiguration::default();
        if let Some(initialize) = class.initialize.clone() {
            initialize(&mut self_iter, &mut config, output_port).cause(format!(
                "Failed to initialize message iterator on `{}.{output_port}`",
                upstream.name()
            ))?;
        }

        let context = upstream.context();
        tracing::debug!(
            component = %upstream.name(),
            port = %output_port,
            capacity = context.batch_capacity,
            "Message iterator created"
        );
        Ok(Self {
            class,
            self_iter,
            config,
            state: MessageIteratorState::Active,
            capacity: context.batch_capacity.max(1),
            validator: context.validate_messages.then(MessageSequenceValidator::new),
            observer: context.batch_observer.clone(),
            pending: VecDeque::new(),
            end_after_pending: false,
        })
    }

    pub const fn state(&self) -> MessageIteratorState {
        self.state
    }

    pub const fn component(&self) -> &Component {
        &self.self_iter.component
    }

    pub fn port_name(&self) -> &str {
        &self.self_iter.port_name
    }

    pub const fn can_seek_forward(&self) -> bool {
        self.config.can_seek_forward()
    }

    pub const fn batch_capacity(&self) -> usize {
        self.capacity
    }

    /// Pulls the next batch of messages.
    ///
    /// # Errors
    ///
    /// Returns the `next` method's error, an error if it returned OK with an
    /// empty batch, or a sequence violation when validation is enabled.
    pub fn next(&mut self) -> Result<IteratorNext> {
        match self.state {
            MessageIteratorState::Ended => return Ok(IteratorNext::End),
            MessageIteratorState::Finalized => {
                return Err(TraceError::Component(format!(
                    "Message iterator on `{}.{}` is finalized",
                    self.component().name(),
                    self.port_name()
                )));
            },
            MessageIteratorState::Active => {},
        }

        if !self.pending.is_empty() {
            return self.drain_pending().map(IteratorNext::Messages);
        }
        if self.end_after_pending {
            self.end_after_pending = false;
            self.state = MessageIteratorState::Ended;
            return Ok(IteratorNext::End);
        }

        let mut batch = MessageBatch::with_capacity(self.capacity);
        let status = self.call_next(&mut batch)?;
        match status {
            IteratorStatus::Ok => {
                if batch.is_empty() {
                    return Err(TraceError::Component(format!(
                        "Message iterator on `{}.{}` returned OK without messages",
                        self.component().name(),
                        self.port_name()
                    )));
                }
                self.accept(&batch)?;
                Ok(IteratorNext::Messages(batch))
            },
            IteratorStatus::End => {
                if !batch.is_empty() {
                    return Err(TraceError::Component(format!(
                        "Message iterator on `{}.{}` returned messages with its end",
                        self.component().name(),
                        self.port_name()
                    )));
                }
                tracing::debug!(
                    component = %self.component().name(),
                    port = %self.port_name(),
                    "Message iterator ended"
                );
                self.state = MessageIteratorState::Ended;
                Ok(IteratorNext::End)
            },
            IteratorStatus::Again => Ok(IteratorNext::Again),
        }
    }

    fn call_next(&mut self, batch: &mut MessageBatch) -> Result<IteratorStatus> {
        let next = Arc::clone(&self.class.next);
        next(&mut self.self_iter, batch).map_err(|err| {
            err.with_cause(format!(
                "Message iterator on `{}.{}` failed",
                self.self_iter.component.name(),
                self.self_iter.port_name
            ))
        })
    }

    fn accept(&mut self, batch: &MessageBatch) -> Result<()> {
        for msg in batch.iter() {
            msg.freeze();
            if let Some(validator) = self.validator.as_mut() {
                validator.check(msg)?;
            }
        }
        if let Some(observer) = &self.observer {
            observer.batch_delivered(self.self_iter.component.name(), &self.self_iter.port_name, batch.len());
        }
        Ok(())
    }

    fn drain_pending(&mut self) -> Result<MessageBatch> {
        let mut batch = MessageBatch::with_capacity(self.capacity);
        while !batch.is_full() {
            let Some(msg) = self.pending.pop_front() else { break };
            batch.push_shared(msg)?;
        }
        self.accept(&batch)?;
        Ok(batch)
    }

    /// # Errors
    ///
    /// Returns the `can_seek_beginning` method's error.
    pub fn can_seek_beginning(&mut self) -> Result<bool> {
        if self.class.seek_beginning.is_none() {
            return Ok(false);
        }
        match self.class.can_seek_beginning.clone() {
            Some(can_seek) => can_seek(&mut self.self_iter),
            None => Ok(true),
        }
    }

    /// Seeks to the beginning. On success the iterator is active again and
    /// previously returned messages are no longer part of its sequence.
    ///
    /// # Errors
    ///
    /// Returns the seek method's error.
    pub fn seek_beginning(&mut self) -> Result<SeekOutcome> {
        let Some(seek) = self.class.seek_beginning.clone() else {
            return Ok(SeekOutcome::NotSupported);
        };
        self.ensure_not_finalized()?;
        match seek(&mut self.self_iter).cause("Failed to seek message iterator to beginning")? {
            SeekStatus::Ok => {
                self.reset_after_seek();
                Ok(SeekOutcome::Ok)
            },
            SeekStatus::Again => Ok(SeekOutcome::Again),
        }
    }

    /// Whether the iterator can seek to `ns_from_origin`, either directly or by
    /// seeking to the beginning and skipping older messages.
    ///
    /// # Errors
    ///
    /// Returns the `can_seek` method's error.
    pub fn can_seek_ns_from_origin(&mut self, ns_from_origin: i64) -> Result<bool> {
        if self.class.seek_ns_from_origin.is_some() {
            return match self.class.can_seek_ns_from_origin.clone() {
                Some(can_seek) => can_seek(&mut self.self_iter, ns_from_origin),
                None => Ok(true),
            };
        }
        self.can_seek_beginning()
    }

    /// Seeks so that the next message is the first one at or after
    /// `ns_from_origin`.
    ///
    /// Without a dedicated method this seeks to the beginning, then drops
    /// timestamped messages older than the target while keeping the stream and
    /// packet beginnings that are still open at that point.
    ///
    /// # Errors
    ///
    /// Returns the seek or `next` method's error, or an overflow error when a
    /// message's clock snapshot cannot be expressed in nanoseconds.
    pub fn seek_ns_from_origin(&mut self, ns_from_origin: i64) -> Result<SeekOutcome> {
        if let Some(seek) = self.class.seek_ns_from_origin.clone() {
            self.ensure_not_finalized()?;
            return match seek(&mut self.self_iter, ns_from_origin)
                .cause(format!("Failed to seek message iterator to {ns_from_origin} ns"))?
            {
                SeekStatus::Ok => {
                    self.reset_after_seek();
                    Ok(SeekOutcome::Ok)
                },
                SeekStatus::Again => Ok(SeekOutcome::Again),
            };
        }
        if !self.can_seek_beginning()? {
            return Ok(SeekOutcome::NotSupported);
        }
        self.auto_seek_ns_from_origin(ns_from_origin)
    }

    fn auto_seek_ns_from_origin(&mut self, target: i64) -> Result<SeekOutcome> {
        match self.seek_beginning()? {
            SeekOutcome::Ok => {},
            other => return Ok(other),
        }
        tracing::debug!(
            component = %self.component().name(),
            port = %self.port_name(),
            target,
            "Seeking by skipping messages from the beginning"
        );

        let mut kept: Vec<SharedMessage> = Vec::new();
        loop {
            let mut batch = MessageBatch::with_capacity(self.capacity);
            match self.call_next(&mut batch)? {
                IteratorStatus::Ok => {},
                IteratorStatus::Again => {
                    if self.self_iter.is_interrupted() {
                        return Err(TraceError::Component(
                            "Interrupted while seeking message iterator".to_string(),
                        ));
                    }
                    std::thread::yield_now();
                    continue;
                },
                IteratorStatus::End => {
                    self.pending.extend(kept);
                    self.end_after_pending = true;
                    return Ok(SeekOutcome::Ok);
                },
            }

            let mut messages = batch.into_iter();
            while let Some(msg) = messages.next() {
                msg.freeze();
                if reaches(&msg, target)? {
                    self.pending.extend(kept);
                    self.pending.push_back(msg);
                    self.pending.extend(messages);
                    return Ok(SeekOutcome::Ok);
                }
                keep_open_context(&mut kept, msg);
            }
        }
    }

    fn reset_after_seek(&mut self) {
        self.state = MessageIteratorState::Active;
        self.pending.clear();
        self.end_after_pending = false;
        if let Some(validator) = self.validator.as_mut() {
            validator.reset();
        }
    }

    fn ensure_not_finalized(&self) -> Result<()> {
        ensure_pre!(
            self.state != MessageIteratorState::Finalized,
            "message-iterator-is-not-finalized",
            "Message iterator on `{}.{}` is finalized",
            self.component().name(),
            self.port_name()
        );
        Ok(())
    }
}

/// Whether `msg` is at or after `target`. Discarded-items messages count by
/// their end time.
fn reaches(msg: &Message, target: i64) -> Result<bool> {
    let snapshot = match msg {
        Message::DiscardedEvents(m) | Message::DiscardedPackets(m) => m.end_default_clock_snapshot(),
        other => other.default_clock_snapshot(),
    };
    match snapshot {
        Some(snapshot) => Ok(snapshot.ns_from_origin()? >= target),
        None => Ok(false),
    }
}

/// Keeps the stream and packet beginnings that are still open after `msg`.
fn keep_open_context(kept: &mut Vec<SharedMessage>, msg: SharedMessage) {
    match msg.message_type() {
        MessageType::StreamBeginning | MessageType::PacketBeginning => kept.push(msg),
        MessageType::StreamEnd => {
            if let Some(stream) = msg.stream() {
                kept.retain(|m| !m.stream().is_some_and(|s| s.ptr_eq(stream)));
            }
        },
        MessageType::PacketEnd => {
            if let Some(packet) = msg.as_packet_end().map(|m| m.packet()) {
                kept.retain(|m| !m.as_packet_beginning().is_some_and(|b| b.packet().ptr_eq(packet)));
            }
        },
        _ => {},
    }
}

impl Drop for MessageIterator {
    fn drop(&mut self) {
        if self.state == MessageIteratorState::Finalized {
            return;
        }
        if let Some(finalize) = self.class.finalize.clone() {
            finalize(&mut self.self_iter);
        }
        self.state = MessageIteratorState::Finalized;
    }
}

impl fmt::Debug for MessageIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageIterator")
            .field("component", &self.self_iter.component.name())
            .field("port", &self.self_iter.port_name)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
