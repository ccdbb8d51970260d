// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Stream classes: event class container and capability flags.

use super::clock_class::{ClockClass, ConstClockClass};
use super::event_class::{ConstEventClass, EventClass, EventClassInner};
use super::field_class::FieldClass;
use super::stream::Stream;
use super::trace::Trace;
use super::trace_class::ConstTraceClass;
use crate::error::Result;
use crate::object::{read, try_string, write, FreezeState, UserAttributes};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, RwLock};

#[derive(Default)]
pub(crate) struct StreamClassData {
    name: Option<String>,
    user_attributes: UserAttributes,
    assigns_automatic_event_class_id: bool,
    assigns_automatic_stream_id: bool,
    supports_packets: bool,
    packets_have_beginning_default_clock_snapshot: bool,
    packets_have_end_default_clock_snapshot: bool,
    supports_discarded_events: bool,
    discarded_events_have_default_clock_snapshots: bool,
    supports_discarded_packets: bool,
    discarded_packets_have_default_clock_snapshots: bool,
    default_clock_class: Option<ClockClass>,
    packet_context_field_class: Option<FieldClass>,
    event_common_context_field_class: Option<FieldClass>,
    event_classes: Vec<Arc<EventClassInner>>,
    next_event_class_id: u64,
}

pub(crate) struct StreamClassInner {
    pub(crate) id: u64,
    frozen: FreezeState,
    data: RwLock<StreamClassData>,
}

impl StreamClassInner {
    pub(crate) fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            frozen: FreezeState::new(),
            data: RwLock::new(StreamClassData {
                assigns_automatic_event_class_id: true,
                assigns_automatic_stream_id: true,
                ..StreamClassData::default()
            }),
        })
    }
}

/// Read-only view of a stream class.
///
/// Holding any view keeps the parent trace class alive.
#[derive(Clone)]
pub struct ConstStreamClass {
    inner: Arc<StreamClassInner>,
    trace_class: ConstTraceClass,
}

/// Read-write view of a stream class.
#[derive(Clone)]
pub struct StreamClass(ConstStreamClass);

impl Deref for StreamClass {
    type Target = ConstStreamClass;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ConstStreamClass {
    pub(crate) const fn from_parts(
        inner: Arc<StreamClassInner>,
        trace_class: ConstTraceClass,
    ) -> Self {
        Self { inner, trace_class }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> Option<String> {
        read(&self.inner.data).name.clone()
    }

    pub const fn trace_class(&self) -> &ConstTraceClass {
        &self.trace_class
    }

    pub fn user_attributes(&self) -> UserAttributes {
        read(&self.inner.data).user_attributes.clone()
    }

    pub fn assigns_automatic_event_class_id(&self) -> bool {
        read(&self.inner.data).assigns_automatic_event_class_id
    }

    pub fn assigns_automatic_stream_id(&self) -> bool {
        read(&self.inner.data).assigns_automatic_stream_id
    }

    pub fn supports_packets(&self) -> bool {
        read(&self.inner.data).supports_packets
    }

    pub fn packets_have_beginning_default_clock_snapshot(&self) -> bool {
        read(&self.inner.data).packets_have_beginning_default_clock_snapshot
    }

    pub fn packets_have_end_default_clock_snapshot(&self) -> bool {
        read(&self.inner.data).packets_have_end_default_clock_snapshot
    }

    pub fn supports_discarded_events(&self) -> bool {
        read(&self.inner.data).supports_discarded_events
    }

    pub fn discarded_events_have_default_clock_snapshots(&self) -> bool {
        read(&self.inner.data).discarded_events_have_default_clock_snapshots
    }

    pub fn supports_discarded_packets(&self) -> bool {
        read(&self.inner.data).supports_discarded_packets
    }

    pub fn discarded_packets_have_default_clock_snapshots(&self) -> bool {
        read(&self.inner.data).discarded_packets_have_default_clock_snapshots
    }

    pub fn default_clock_class(&self) -> Option<ConstClockClass> {
        read(&self.inner.data).default_clock_class.as_ref().map(ClockClass::as_const)
    }

    pub fn packet_context_field_class(&self) -> Option<FieldClass> {
        read(&self.inner.data).packet_context_field_class.clone()
    }

    pub fn event_common_context_field_class(&self) -> Option<FieldClass> {
        read(&self.inner.data).event_common_context_field_class.clone()
    }

    pub fn event_class_count(&self) -> usize {
        read(&self.inner.data).event_classes.len()
    }

    /// Event class at `index`, in creation order.
    pub fn event_class(&self, index: usize) -> Option<ConstEventClass> {
        let inner = read(&self.inner.data).event_classes.get(index).cloned()?;
        Some(ConstEventClass::from_parts(inner, self.clone()))
    }

    pub fn event_class_by_id(&self, id: u64) -> Option<ConstEventClass> {
        let inner = read(&self.inner.data).event_classes.iter().find(|ec| ec.id == id).cloned()?;
        Some(ConstEventClass::from_parts(inner, self.clone()))
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.is_frozen()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Freezes this stream class, its default clock class and its trace class.
    pub(crate) fn freeze(&self) {
        if self.inner.frozen.is_frozen() {
            return;
        }
        self.inner.frozen.freeze();
        if let Some(clock_class) = &read(&self.inner.data).default_clock_class {
            clock_class.freeze();
        }
        self.trace_class.freeze();
    }
}

impl PartialEq for ConstStreamClass {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ConstStreamClass {}

impl fmt::Debug for ConstStreamClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = read(&self.inner.data);
        f.debug_struct("StreamClass")
            .field("id", &self.inner.id)
            .field("name", &data.name)
            .field("supports_packets", &data.supports_packets)
            .field("supports_discarded_events", &data.supports_discarded_events)
            .field("supports_discarded_packets", &data.supports_discarded_packets)
            .field("has_default_clock_class", &data.default_clock_class.is_some())
            .field("event_class_count", &data.event_classes.len())
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for StreamClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl StreamClass {
    pub(crate) const fn from_parts(
        inner: Arc<StreamClassInner>,
        trace_class: ConstTraceClass,
    ) -> Self {
        Self(ConstStreamClass::from_parts(inner, trace_class))
    }

    pub fn as_const(&self) -> ConstStreamClass {
        self.0.clone()
    }

    fn ensure_mutable(&self) -> Result<()> {
        self.0.inner.frozen.ensure_mutable("Stream class")
    }

    /// # Errors
    ///
    /// Fails with [`crate::TraceError::Memory`] if the name cannot be copied, or
    /// with the `not-frozen` violation.
    pub fn set_name(&self, name: &str) -> Result<()> {
        self.ensure_mutable()?;
        let name = try_string(name)?;
        write(&self.0.inner.data).name = Some(name);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_user_attributes(&self, attributes: UserAttributes) -> Result<()> {
        self.ensure_mutable()?;
        write(&self.0.inner.data).user_attributes = attributes;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_assigns_automatic_event_class_id(&self, value: bool) -> Result<()> {
        self.ensure_mutable()?;
        write(&self.0.inner.data).assigns_automatic_event_class_id = value;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_assigns_automatic_stream_id(&self, value: bool) -> Result<()> {
        self.ensure_mutable()?;
        write(&self.0.inner.data).assigns_automatic_stream_id = value;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with the `not-frozen` violation.
    pub fn set_default_clock_class(&self, clock_class: ClockClass) -> Result<()> {
        self.ensure_mutable()?;
        write(&self.0.inner.data).default_clock_class = Some(clock_class);
        Ok(())
    }

    /// Sets packet support and whether packet beginning/end messages carry a
    /// default clock snapshot.
    ///
    /// # Errors
    ///
    /// Clock snapshot flags require packet support and a default clock class.
    pub fn set_supports_packets(
        &self,
        supports_packets: bool,
        with_beginning_default_clock_snapshot: bool,
        with_end_default_clock_snapshot: bool,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let with_clock_snapshots =
            with_beginning_default_clock_snapshot || with_end_default_clock_snapshot;
        ensure_pre!(
            supports_packets || !with_clock_snapshots,
            "supports-packets-for-default-clock-snapshots",
            "Packets cannot have default clock snapshots when they are not supported"
        );
        let mut data = write(&self.0.inner.data);
        ensure_pre!(
            !with_clock_snapshots || data.default_clock_class.is_some(),
            "has-default-clock-class",
            "Stream class has no default clock class"
        );
        data.supports_packets = supports_packets;
        data.packets_have_beginning_default_clock_snapshot = with_beginning_default_clock_snapshot;
        data.packets_have_end_default_clock_snapshot = with_end_default_clock_snapshot;
        Ok(())
    }

    /// # Errors
    ///
    /// Clock snapshots require discarded event support and a default clock class.
    pub fn set_supports_discarded_events(
        &self,
        supports_discarded_events: bool,
        with_default_clock_snapshots: bool,
    ) -> Result<()> {
        self.ensure_mutable()?;
        ensure_pre!(
            supports_discarded_events || !with_default_clock_snapshots,
            "supports-discarded-events-for-default-clock-snapshots",
            "Discarded events cannot have default clock snapshots when they are not supported"
        );
        let mut data = write(&self.0.inner.data);
        ensure_pre!(
            !with_default_clock_snapshots || data.default_clock_class.is_some(),
            "has-default-clock-class",
            "Stream class has no default clock class"
        );
        data.supports_discarded_events = supports_discarded_events;
        data.discarded_events_have_default_clock_snapshots = with_default_clock_snapshots;
        Ok(())
    }

    /// # Errors
    ///
    /// Requires packet support; clock snapshots additionally require a default
    /// clock class.
    pub fn set_supports_discarded_packets(
        &self,
        supports_discarded_packets: bool,
        with_default_clock_snapshots: bool,
    ) -> Result<()> {
        self.ensure_mutable()?;
        ensure_pre!(
            supports_discarded_packets || !with_default_clock_snapshots,
            "supports-discarded-packets-for-default-clock-snapshots",
            "Discarded packets cannot have default clock snapshots when they are not supported"
        );
        let mut data = write(&self.0.inner.data);
        ensure_pre!(
            !supports_discarded_packets || data.supports_packets,
            "supports-packets",
            "Stream class does not support packets"
        );
        ensure_pre!(
            !with_default_clock_snapshots || data.default_clock_class.is_some(),
            "has-default-clock-class",
            "Stream class has no default clock class"
        );
        data.supports_discarded_packets = supports_discarded_packets;
        data.discarded_packets_have_default_clock_snapshots = with_default_clock_snapshots;
        Ok(())
    }

    /// # Errors
    ///
    /// Requires packet support and a structure field class.
    pub fn set_packet_context_field_class(&self, field_class: FieldClass) -> Result<()> {
        self.ensure_mutable()?;
        ensure_pre!(
            field_class.is_structure(),
            "is-structure-field-class",
            "Packet context field class is not a structure field class"
        );
        let mut data = write(&self.0.inner.data);
        ensure_pre!(
            data.supports_packets,
            "supports-packets",
            "Stream class does not support packets"
        );
        data.packet_context_field_class = Some(field_class);
        Ok(())
    }

    /// # Errors
    ///
    /// Requires a structure field class.
    pub fn set_event_common_context_field_class(&self, field_class: FieldClass) -> Result<()> {
        self.ensure_mutable()?;
        ensure_pre!(
            field_class.is_structure(),
            "is-structure-field-class",
            "Event common context field class is not a structure field class"
        );
        write(&self.0.inner.data).event_common_context_field_class = Some(field_class);
        Ok(())
    }

    /// Creates an event class with the next automatic ID.
    ///
    /// # Errors
    ///
    /// Fails with `assigns-automatic-event-class-id` when the stream class
    /// expects explicit IDs.
    pub fn create_event_class(&self) -> Result<EventClass> {
        let mut data = write(&self.0.inner.data);
        ensure_pre!(
            data.assigns_automatic_event_class_id,
            "assigns-automatic-event-class-id",
            "Stream class does not automatically assign event class IDs"
        );
        let id = data.next_event_class_id;
        data.next_event_class_id += 1;
        Ok(self.push_event_class(&mut data, id))
    }

    /// Creates an event class with the caller-supplied `id`.
    ///
    /// # Errors
    ///
    /// Fails when the stream class assigns IDs automatically or when `id` is
    /// already used (`unique-event-class-id`).
    pub fn create_event_class_with_id(&self, id: u64) -> Result<EventClass> {
        let mut data = write(&self.0.inner.data);
        ensure_pre!(
            !data.assigns_automatic_event_class_id,
            "not-assigns-automatic-event-class-id",
            "Stream class automatically assigns event class IDs"
        );
        ensure_pre!(
            !data.event_classes.iter().any(|ec| ec.id == id),
            "unique-event-class-id",
            "Duplicate event class ID: {id}"
        );
        Ok(self.push_event_class(&mut data, id))
    }

    fn push_event_class(&self, data: &mut StreamClassData, id: u64) -> EventClass {
        let inner = EventClassInner::new(id);
        data.event_classes.push(Arc::clone(&inner));
        EventClass::from_parts(inner, self.as_const())
    }

    pub fn event_class_mut(&self, index: usize) -> Option<EventClass> {
        let inner = read(&self.0.inner.data).event_classes.get(index).cloned()?;
        Some(EventClass::from_parts(inner, self.as_const()))
    }

    pub fn event_class_by_id_mut(&self, id: u64) -> Option<EventClass> {
        let inner =
            read(&self.0.inner.data).event_classes.iter().find(|ec| ec.id == id).cloned()?;
        Some(EventClass::from_parts(inner, self.as_const()))
    }

    /// Creates a stream of this class in `trace` with the next automatic ID.
    ///
    /// # Errors
    ///
    /// `trace` must be an instance of this stream class's trace class and this
    /// stream class must assign stream IDs automatically.
    pub fn instantiate(&self, trace: &Trace) -> Result<Stream> {
        ensure_pre!(
            self.assigns_automatic_stream_id(),
            "assigns-automatic-stream-id",
            "Stream class does not automatically assign stream IDs"
        );
        trace.add_stream(self.as_const(), None)
    }

    /// Creates a stream of this class in `trace` with the caller-supplied `id`.
    ///
    /// # Errors
    ///
    /// `trace` must be an instance of this stream class's trace class, this
    /// stream class must expect explicit stream IDs and `id` must be unused in
    /// `trace`.
    pub fn instantiate_with_id(&self, trace: &Trace, id: u64) -> Result<Stream> {
        ensure_pre!(
            !self.assigns_automatic_stream_id(),
            "not-assigns-automatic-stream-id",
            "Stream class automatically assigns stream IDs"
        );
        trace.add_stream(self.as_const(), Some(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::trace_ir::TraceClass;

    #[test]
    fn capability_flags_need_default_clock_class() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let err = sc.set_supports_discarded_events(true, true).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("has-default-clock-class"));

        sc.set_default_clock_class(ClockClass::new()).unwrap();
        sc.set_supports_discarded_events(true, true).unwrap();
        assert!(sc.supports_discarded_events());
        assert!(sc.discarded_events_have_default_clock_snapshots());
    }

    #[test]
    fn discarded_packets_need_packet_support() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let err = sc.set_supports_discarded_packets(true, false).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("supports-packets"));

        sc.set_supports_packets(true, false, false).unwrap();
        sc.set_supports_discarded_packets(true, false).unwrap();
        assert!(sc.supports_discarded_packets());
        assert!(!sc.discarded_packets_have_default_clock_snapshots());
    }

    #[test]
    fn event_classes_by_index_and_id() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let open = sc.create_event_class().unwrap();
        open.set_name("sys_open").unwrap();
        let close = sc.create_event_class().unwrap();
        close.set_name("sys_close").unwrap();

        assert_eq!(sc.event_class_count(), 2);
        assert_eq!(sc.event_class(1).and_then(|ec| ec.name()).as_deref(), Some("sys_close"));
        assert_eq!(sc.event_class_by_id(0).and_then(|ec| ec.name()).as_deref(), Some("sys_open"));
        assert!(sc.event_class_by_id(2).is_none());
    }

    #[test]
    fn packet_context_must_be_structure() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_supports_packets(true, false, false).unwrap();
        let err = sc.set_packet_context_field_class(FieldClass::string()).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("is-structure-field-class"));
        let fc = FieldClass::structure().member("seq", FieldClass::bool()).build().unwrap();
        sc.set_packet_context_field_class(fc).unwrap();
        assert!(sc.packet_context_field_class().is_some());
    }
}
