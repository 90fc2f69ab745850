use std::time::{SystemTime, UNIX_EPOCH};

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageDirection {
    Incoming,
    Outgoing,
}

impl MessageDirection {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(Self::Incoming),
            "outgoing" => Some(Self::Outgoing),
            _ => None,
        }
    }
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageDeliveryState {
    Pending,
    Sent,
    Delivered,
    Failed,
}

impl MessageDeliveryState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One message event as the store holds it.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    pub unique_id: String,
    pub thread_id: String,
    /// Unix millis.
    pub timestamp: i64,
    pub author: String,
    pub body: String,
    pub has_attachments: bool,
    pub direction: MessageDirection,
    pub delivery: MessageDeliveryState,
    pub was_read: bool,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatMessageKind {
    Text,
    Control,
    PaymentRequest,
    Payment,
    Command,
    Other,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub author: String,
    pub is_mine: bool,
    pub kind: ChatMessageKind,
    pub text: String,
    pub timestamp: i64,
    pub display_timestamp: String,
    pub delivery: MessageDeliveryState,
    pub has_attachment: bool,
    pub was_read: bool,
    pub fiat_value: Option<String>,
    pub ether_value: Option<String>,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Button,
    Group,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subcontrol {
    pub label: String,
    pub value: Option<String>,
    pub action: Option<String>,
}

/// A quick-reply button (or a group of them) offered by the peer.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ControlButton {
    pub kind: ControlKind,
    pub label: String,
    pub value: Option<String>,
    pub action: Option<String>,
    pub subcontrols: Vec<Subcontrol>,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayState {
    Show,
    Hide,
    HideAndShow,
    DoNothing,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageSound {
    Received,
    Sent,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatViewState {
    pub rev: u64,
    pub thread_id: String,
    /// Visible messages, newest first.
    pub messages: Vec<ChatMessage>,
    pub controls: Vec<ControlButton>,
    pub show_keyboard: Option<bool>,
    pub selected_control: Option<ControlButton>,
}

impl ChatViewState {
    pub fn empty(thread_id: String) -> Self {
        Self {
            rev: 0,
            thread_id,
            messages: vec![],
            controls: vec![],
            show_keyboard: None,
            selected_control: None,
        }
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
