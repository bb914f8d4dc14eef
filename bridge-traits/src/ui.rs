//! UI Surface Abstraction
//!
//! The single screen the session controller drives: four buttons and two
//! text displays. Implementations wrap widgets that may only be touched from
//! the thread that owns them, so the trait carries no `Send` bound.
//! Updates reach it through the dispatcher in `core-service`.

use serde::{Deserialize, Serialize};

/// Enabled/disabled state of the four action buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlState {
    pub sign_in: bool,
    pub sign_out: bool,
    pub call_api_interactive: bool,
    pub call_api_silent: bool,
}

impl ControlState {
    /// Controls while no account is signed in.
    pub fn unauthenticated() -> Self {
        Self {
            sign_in: true,
            sign_out: false,
            call_api_interactive: false,
            call_api_silent: false,
        }
    }

    /// Controls while an account is signed in.
    pub fn authenticated() -> Self {
        Self {
            sign_in: false,
            sign_out: true,
            call_api_interactive: true,
            call_api_silent: true,
        }
    }

    /// Whether these controls describe the signed-in screen.
    pub fn is_authenticated(&self) -> bool {
        *self == Self::authenticated()
    }
}

/// Host screen receiving controller-pushed state.
pub trait UiSurface {
    /// Enable or disable the action buttons.
    fn set_controls(&self, controls: ControlState);

    /// Replace the current-user label.
    fn set_current_user(&self, text: &str);

    /// Replace the result/error log.
    fn set_result_text(&self, text: &str);

    /// Show a transient notice (toast, snackbar, status line).
    fn show_notice(&self, text: &str);
}
