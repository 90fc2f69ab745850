use crate::state::ControlButton;

#[derive(uniffi::Enum, Debug, Clone)]
pub enum ChatAction {
    // Messages
    LoadMessages,
    SendMessage {
        text: String,
    },

    // Control strip
    SelectControl {
        control: Option<ControlButton>,
    },
    TapControl {
        control: ControlButton,
    },

    // Drafts
    SaveDraft {
        text: Option<String>,
    },
    ReloadDraft,

    // Pricing
    ExchangeRateUpdated,

    // Lifecycle
    Close,
}

impl ChatAction {
    /// Log-safe action tag (never includes message or draft text).
    pub fn tag(&self) -> &'static str {
        match self {
            // Messages
            ChatAction::LoadMessages => "LoadMessages",
            ChatAction::SendMessage { .. } => "SendMessage",

            // Control strip
            ChatAction::SelectControl { .. } => "SelectControl",
            ChatAction::TapControl { .. } => "TapControl",

            // Drafts
            ChatAction::SaveDraft { .. } => "SaveDraft",
            ChatAction::ReloadDraft => "ReloadDraft",

            // Pricing
            ChatAction::ExchangeRateUpdated => "ExchangeRateUpdated",

            // Lifecycle
            ChatAction::Close => "Close",
        }
    }
}
