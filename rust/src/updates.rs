use crate::core::{ComputedReload, FetchOutcome};
use crate::state::{ChatViewState, ControlButton, DisplayState, MessageSound};
use crate::store::StoreNotification;
use crate::ChatAction;

#[derive(uniffi::Enum, Clone, Debug)]
#[allow(clippy::large_enum_variant)] // uniffi enums cannot use Box<T> indirection
pub enum ChatUpdate {
    /// The visible projection changed. Always carries a full snapshot.
    Reloaded(ChatViewState),
    /// Follows every `Reloaded` that was not superseded in between.
    LastMessageReceived {
        rev: u64,
    },
    /// A control message arrived; the input bar should re-evaluate its keyboard and buttons.
    KeyboardVisibilityRequired {
        rev: u64,
        message_id: String,
        show_keyboard: Option<bool>,
        controls: Vec<ControlButton>,
    },
    SoundRequested {
        rev: u64,
        sound: MessageSound,
    },
    PaymentRequested {
        rev: u64,
        message_id: String,
        value_wei: String,
        destination_address: String,
    },
    ControlMenuChanged {
        rev: u64,
        display_state: DisplayState,
        selected_control: Option<ControlButton>,
    },
    DraftLoaded {
        rev: u64,
        draft: Option<String>,
    },
}

impl ChatUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            ChatUpdate::Reloaded(s) => s.rev,
            ChatUpdate::LastMessageReceived { rev }
            | ChatUpdate::KeyboardVisibilityRequired { rev, .. }
            | ChatUpdate::SoundRequested { rev, .. }
            | ChatUpdate::PaymentRequested { rev, .. }
            | ChatUpdate::ControlMenuChanged { rev, .. }
            | ChatUpdate::DraftLoaded { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub(crate) enum CoreMsg {
    Action(ChatAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub(crate) enum InternalEvent {
    // Store change feed
    StoreModified(StoreNotification),

    // Async store reads
    FetchFinished { token: u64, outcome: FetchOutcome },
    DraftLoaded { draft: Option<String> },

    // Reload queue
    ReloadComputed(ComputedReload),
}
