use serde_json::Value;
use sofa_protocol::{SofaCommand, SofaWrapper};

use super::ChatCore;
use crate::state::{ControlButton, ControlKind, DisplayState};
use crate::updates::ChatUpdate;

/// What the control submenu should do when `candidate` is selected while
/// `selected` is open. Pure; the caller applies the result.
pub fn display_state(
    selected: Option<&ControlButton>,
    candidate: Option<&ControlButton>,
) -> DisplayState {
    match (selected, candidate) {
        (Some(current), Some(next)) if current == next => DisplayState::Hide,
        (Some(_), Some(_)) => DisplayState::HideAndShow,
        (None, None) => DisplayState::DoNothing,
        (Some(_), None) => DisplayState::Hide,
        (None, Some(_)) => DisplayState::Show,
    }
}

impl ChatCore {
    pub(super) fn select_control(&mut self, candidate: Option<ControlButton>) {
        let display_state = display_state(self.state.selected_control.as_ref(), candidate.as_ref());
        match display_state {
            DisplayState::Show | DisplayState::HideAndShow => {
                self.state.selected_control = candidate
            }
            DisplayState::Hide => self.state.selected_control = None,
            DisplayState::DoNothing => return,
        }
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        self.emit(ChatUpdate::ControlMenuChanged {
            rev,
            display_state,
            selected_control: self.state.selected_control.clone(),
        });
    }

    pub(super) fn tap_control(&mut self, control: ControlButton) {
        match control.kind {
            ControlKind::Group => self.select_control(Some(control)),
            ControlKind::Button => {
                let body = SofaWrapper::Command(SofaCommand {
                    body: control.label.clone(),
                    value: control.value.clone().map(Value::String),
                })
                .encode();
                tracing::debug!(label = %control.label, "control command");
                self.send_outgoing(body);
                self.select_control(None);
            }
        }
    }
}
