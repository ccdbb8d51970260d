// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::event_class::ConstEventClass;
use super::field_class::Field;
use super::packet::ConstPacket;
use super::stream::ConstStream;

/// An event, owned by the event message that carries it.
///
/// Fields are present only when the matching field class is set on the event
/// class (payload, specific context) or on the stream class (common context).
#[derive(Debug, Clone)]
pub struct Event {
    class: ConstEventClass,
    stream: ConstStream,
    packet: Option<ConstPacket>,
    common_context: Option<Field>,
    specific_context: Option<Field>,
    payload: Option<Field>,
}

impl Event {
    pub(crate) fn new(class: ConstEventClass, stream: ConstStream, packet: Option<ConstPacket>) -> Self {
        let common_context =
            stream.class().event_common_context_field_class().map(|fc| Field::from_class(&fc));
        let specific_context = class.specific_context_field_class().map(|fc| Field::from_class(&fc));
        let payload = class.payload_field_class().map(|fc| Field::from_class(&fc));
        Self { class, stream, packet, common_context, specific_context, payload }
    }

    pub const fn class(&self) -> &ConstEventClass {
        &self.class
    }

    pub const fn stream(&self) -> &ConstStream {
        &self.stream
    }

    pub const fn packet(&self) -> Option<&ConstPacket> {
        self.packet.as_ref()
    }

    pub const fn common_context_field(&self) -> Option<&Field> {
        self.common_context.as_ref()
    }

    pub fn common_context_field_mut(&mut self) -> Option<&mut Field> {
        self.common_context.as_mut()
    }

    pub const fn specific_context_field(&self) -> Option<&Field> {
        self.specific_context.as_ref()
    }

    pub fn specific_context_field_mut(&mut self) -> Option<&mut Field> {
        self.specific_context.as_mut()
    }

    pub const fn payload_field(&self) -> Option<&Field> {
        self.payload.as_ref()
    }

    pub fn payload_field_mut(&mut self) -> Option<&mut Field> {
        self.payload.as_mut()
    }

    pub(crate) fn freeze(&self) {
        self.class.freeze();
        match &self.packet {
            Some(packet) => packet.freeze(),
            None => self.stream.freeze(),
        }
    }
}
