use std::cmp::Ordering;

use chrono::TimeZone;
use serde_json::Value;
use sofa_protocol::{Button, ButtonKind, SofaInitRequest, SofaType, SofaWrapper};

use crate::state::{
    ChatMessage, ChatMessageKind, ControlButton, ControlKind, MessageDeliveryState,
    MessageDirection, RawRecord, Subcontrol,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Payload {
    Text {
        body: String,
    },
    /// A `SOFA::Message` that carries buttons or a keyboard hint.
    Control {
        body: String,
        controls: Vec<ControlButton>,
        show_keyboard: Option<bool>,
    },
    PaymentRequest {
        body: String,
        value_wei: u128,
        destination: String,
    },
    Payment {
        value_wei: u128,
        tx_hash: Option<String>,
        status: Option<String>,
    },
    Command {
        body: String,
    },
    /// Init handshakes, unknown types and anything that failed to decode.
    Other,
}

impl Payload {
    /// Buttons and keyboard hint of an interactive message.
    pub(crate) fn control_strip(&self) -> Option<(&[ControlButton], Option<bool>)> {
        match self {
            Payload::Control {
                controls,
                show_keyboard,
                ..
            } => Some((controls, *show_keyboard)),
            _ => None,
        }
    }

    pub(crate) fn value_wei(&self) -> Option<u128> {
        match self {
            Payload::PaymentRequest { value_wei, .. } | Payload::Payment { value_wei, .. } => {
                Some(*value_wei)
            }
            _ => None,
        }
    }

    fn text(&self) -> &str {
        match self {
            Payload::Text { body }
            | Payload::Control { body, .. }
            | Payload::PaymentRequest { body, .. }
            | Payload::Command { body } => body,
            Payload::Payment { .. } | Payload::Other => "",
        }
    }

    fn kind(&self) -> ChatMessageKind {
        match self {
            Payload::Text { .. } => ChatMessageKind::Text,
            Payload::Control { .. } => ChatMessageKind::Control,
            Payload::PaymentRequest { .. } => ChatMessageKind::PaymentRequest,
            Payload::Payment { .. } => ChatMessageKind::Payment,
            Payload::Command { .. } => ChatMessageKind::Command,
            Payload::Other => ChatMessageKind::Other,
        }
    }
}

/// The core's view of one conversation event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Message {
    pub(crate) id: String,
    pub(crate) timestamp: i64,
    pub(crate) direction: MessageDirection,
    pub(crate) author: String,
    /// Raw body as stored; used to recognise the same outgoing message on update.
    pub(crate) body: String,
    pub(crate) payload: Payload,
    pub(crate) has_attachment: bool,
    pub(crate) delivery: MessageDeliveryState,
    pub(crate) was_read: bool,
    pub(crate) is_displayable: bool,
    pub(crate) fiat_value: Option<String>,
    pub(crate) ether_value: Option<String>,
}

impl Message {
    pub(crate) fn is_outgoing(&self) -> bool {
        self.direction == MessageDirection::Outgoing
    }

    pub(crate) fn is_unread_incoming(&self) -> bool {
        self.direction == MessageDirection::Incoming && !self.was_read
    }

    pub(crate) fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            id: self.id.clone(),
            author: self.author.clone(),
            is_mine: self.is_outgoing(),
            kind: self.payload.kind(),
            text: self.payload.text().to_string(),
            timestamp: self.timestamp,
            display_timestamp: display_timestamp(self.timestamp),
            delivery: self.delivery,
            has_attachment: self.has_attachment,
            was_read: self.was_read,
            fiat_value: self.fiat_value.clone(),
            ether_value: self.ether_value.clone(),
        }
    }
}

/// Side effects requested by processing a freshly inserted payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ControlEffect {
    AnswerInitRequest(SofaInitRequest),
    PaymentRequested {
        message_id: String,
        value_wei: u128,
        destination: String,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Decoded {
    pub(crate) message: Message,
    pub(crate) effects: Vec<ControlEffect>,
}

/// Only payment requests are processed during a bulk load.
pub(crate) fn should_process_on_load(body: &str) -> bool {
    SofaType::from_body(body) == SofaType::PaymentRequest
}

pub(crate) fn decode_record(record: &RawRecord, process: bool) -> Decoded {
    let (payload, wrapper) = match sofa_protocol::parse(&record.body) {
        Ok(None) => (
            Payload::Text {
                body: record.body.clone(),
            },
            None,
        ),
        Ok(Some(wrapper)) => (payload_from_wrapper(&wrapper), Some(wrapper)),
        Err(e) => {
            tracing::debug!(%e, id = %record.unique_id, "undecodable payload");
            (Payload::Other, None)
        }
    };

    let effects = match (process, wrapper) {
        (true, Some(wrapper)) if record.direction == MessageDirection::Incoming => {
            control_effects(&record.unique_id, wrapper, &payload)
        }
        _ => vec![],
    };

    let is_displayable = match &payload {
        Payload::Other => false,
        Payload::PaymentRequest { .. } | Payload::Payment { .. } => true,
        p => !p.text().is_empty() || record.has_attachments,
    };

    Decoded {
        message: Message {
            id: record.unique_id.clone(),
            timestamp: record.timestamp,
            direction: record.direction,
            author: record.author.clone(),
            body: record.body.clone(),
            payload,
            has_attachment: record.has_attachments,
            delivery: record.delivery,
            was_read: record.was_read,
            is_displayable,
            fiat_value: None,
            ether_value: None,
        },
        effects,
    }
}

fn control_effects(id: &str, wrapper: SofaWrapper, payload: &Payload) -> Vec<ControlEffect> {
    match (wrapper, payload) {
        (SofaWrapper::InitRequest(req), _) => vec![ControlEffect::AnswerInitRequest(req)],
        (
            SofaWrapper::PaymentRequest(_),
            Payload::PaymentRequest {
                value_wei,
                destination,
                ..
            },
        ) => vec![ControlEffect::PaymentRequested {
            message_id: id.to_string(),
            value_wei: *value_wei,
            destination: destination.clone(),
        }],
        _ => vec![],
    }
}

fn payload_from_wrapper(wrapper: &SofaWrapper) -> Payload {
    match wrapper {
        SofaWrapper::Message(m) if m.is_interactive() => Payload::Control {
            body: m.body.clone(),
            controls: m.controls.iter().map(control_button).collect(),
            show_keyboard: m.show_keyboard,
        },
        SofaWrapper::Message(m) => Payload::Text {
            body: m.body.clone(),
        },
        SofaWrapper::Command(c) => Payload::Command {
            body: c.body.clone(),
        },
        SofaWrapper::PaymentRequest(r) => match sofa_protocol::parse_wei(&r.value) {
            Some(value_wei) => Payload::PaymentRequest {
                body: r.body.clone(),
                value_wei,
                destination: r.destination_address.clone(),
            },
            None => Payload::Other,
        },
        SofaWrapper::Payment(p) => match sofa_protocol::parse_wei(&p.value) {
            Some(value_wei) => Payload::Payment {
                value_wei,
                tx_hash: p.tx_hash.clone(),
                status: p.status.clone(),
            },
            None => Payload::Other,
        },
        SofaWrapper::InitRequest(_) | SofaWrapper::Init(_) => Payload::Other,
    }
}

fn value_string(value: &Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

pub(crate) fn control_button(button: &Button) -> ControlButton {
    ControlButton {
        kind: match button.kind {
            ButtonKind::Button => ControlKind::Button,
            ButtonKind::Group => ControlKind::Group,
        },
        label: button.label.clone(),
        value: value_string(&button.value),
        action: button.action.clone(),
        subcontrols: button
            .controls
            .iter()
            .map(|b| Subcontrol {
                label: b.label.clone(),
                value: value_string(&b.value),
                action: b.action.clone(),
            })
            .collect(),
    }
}

/// Merge rule for an update at a held position.
///
/// The same outgoing message coming back from the transport only changes its
/// delivery state; everything already derived for it is kept.
pub(crate) fn merge_update(held: &Message, incoming: Message) -> Message {
    if held.id == incoming.id
        && held.is_outgoing()
        && incoming.is_outgoing()
        && held.body == incoming.body
    {
        let mut merged = held.clone();
        merged.delivery = incoming.delivery;
        merged.was_read = incoming.was_read;
        merged
    } else {
        incoming
    }
}

/// Timestamp order; on a tie the attachment-bearing message comes first.
pub(crate) fn load_order(a: &Message, b: &Message) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| b.has_attachment.cmp(&a.has_attachment))
}

fn display_timestamp(millis: i64) -> String {
    chrono::Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%l:%M %p").to_string().trim().to_string())
        .unwrap_or_default()
}
