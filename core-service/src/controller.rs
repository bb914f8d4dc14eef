//! # Session Controller
//!
//! Turns the four screen actions into identity and Graph calls and pushes
//! the resulting screen state through a [`UiDispatcher`].
//!
//! ## Screen states
//!
//! | View            | Sign in | Sign out | Call API (interactive) | Call API (silent) |
//! |-----------------|---------|----------|------------------------|-------------------|
//! | unauthenticated | on      | off      | off                    | off               |
//! | authenticated   | off     | on       | on                     | on                |
//!
//! Errors are rendered into the result text. A cancelled prompt is only
//! logged. Operations are not serialized against each other.

use crate::error::CoreError;
use crate::ui::UiDispatcher;
use bridge_traits::ui::ControlState;
use core_auth::{Account, AccountLoad, AuthOutcome, AuthRequest, IdentityClient, TokenResult};
use provider_onedrive::{GraphClient, UserProfile};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

/// Notice shown after the account is signed out.
pub const SIGNED_OUT_NOTICE: &str = "Signed Out.";

/// A button press on the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    SignIn,
    SignOut,
    CallApiInteractive,
    CallApiSilent,
}

/// Drives the single session screen.
#[derive(Clone)]
pub struct SessionController {
    identity: Arc<IdentityClient>,
    graph: Arc<GraphClient>,
    ui: UiDispatcher,
}

impl SessionController {
    pub fn new(identity: Arc<IdentityClient>, graph: Arc<GraphClient>, ui: UiDispatcher) -> Self {
        Self {
            identity,
            graph,
            ui,
        }
    }

    pub fn identity(&self) -> &Arc<IdentityClient> {
        &self.identity
    }

    /// Run `action` on the tokio runtime so the calling (UI) thread never waits.
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle(&self, action: UserAction) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move { controller.perform(action).await })
    }

    /// Run `action` to completion.
    pub async fn perform(&self, action: UserAction) {
        match action {
            UserAction::SignIn => self.on_sign_in().await,
            UserAction::SignOut => self.on_sign_out().await,
            UserAction::CallApiInteractive => self.on_call_api_interactive().await,
            UserAction::CallApiSilent => self.on_call_api_silent().await,
        }
    }

    /// Reconcile the account at startup and show the matching view.
    #[instrument(skip(self))]
    pub async fn on_start(&self) {
        match self.identity.load_current_account().await {
            Ok(AccountLoad::Loaded(Some(account)))
            | Ok(AccountLoad::Changed {
                current: Some(account),
                ..
            }) => self.show_authenticated(&account),
            Ok(AccountLoad::Loaded(None)) => self.show_unauthenticated(),
            Ok(AccountLoad::Changed { current: None, .. }) => {
                info!("Signed-in account is gone");
                self.show_signed_out();
            }
            Err(e) => self.show_error(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn on_sign_in(&self) {
        match self.identity.sign_in(self.configured_request()).await {
            Ok(AuthOutcome::Success(account)) => self.show_authenticated(&account),
            Ok(AuthOutcome::Cancelled) => info!("User cancelled sign-in"),
            Err(e) => self.show_error(e.into()),
        }
    }

    /// Always ends on the signed-out view; a sign-out error is shown after it.
    #[instrument(skip(self))]
    pub async fn on_sign_out(&self) {
        let result = self.identity.sign_out().await;
        self.show_signed_out();
        if let Err(e) = result {
            self.show_error(e.into());
        }
    }

    #[instrument(skip(self))]
    pub async fn on_call_api_interactive(&self) {
        let token = match self
            .identity
            .acquire_token_interactive(self.configured_request())
            .await
        {
            Ok(AuthOutcome::Success(token)) => token,
            Ok(AuthOutcome::Cancelled) => {
                info!("User cancelled interactive token request");
                return;
            }
            Err(e) => return self.show_error(e.into()),
        };

        self.show_authenticated(&token.account);
        self.call_graph(&token).await;
    }

    /// Silent acquisition against the configured silent authority. There is
    /// no interactive fallback.
    #[instrument(skip(self))]
    pub async fn on_call_api_silent(&self) {
        let authority = self.identity.config().silent_authority().to_string();
        match self
            .identity
            .acquire_token_silent(self.configured_request(), &authority)
            .await
        {
            Ok(token) => self.call_graph(&token).await,
            Err(e) => self.show_error(e.into()),
        }
    }

    async fn call_graph(&self, token: &TokenResult) {
        match self.graph.fetch_profile(&token.access_token).await {
            Ok(profile) => self.ui.set_result_text(render_profile(&profile)),
            Err(e) => self.show_error(e.into()),
        }
    }

    fn configured_request(&self) -> AuthRequest {
        AuthRequest::new().with_scopes(self.identity.config().scopes.iter().cloned())
    }

    fn show_authenticated(&self, account: &Account) {
        self.ui.set_controls(ControlState::authenticated());
        self.ui.set_current_user(account.username.clone());
    }

    fn show_unauthenticated(&self) {
        self.ui.set_controls(ControlState::unauthenticated());
        self.ui.set_current_user("");
    }

    fn show_signed_out(&self) {
        self.show_unauthenticated();
        self.ui.set_result_text("");
        self.ui.show_notice(SIGNED_OUT_NOTICE);
    }

    fn show_error(&self, err: CoreError) {
        error!(error = %err, "Session operation failed");
        self.ui.set_result_text(err.to_string());
    }
}

/// Pretty JSON of the drive, or of the whole profile when it has no drive.
pub fn render_profile(profile: &UserProfile) -> String {
    let rendered = match &profile.drive {
        Some(drive) => serde_json::to_string_pretty(drive),
        None => serde_json::to_string_pretty(profile),
    };
    rendered.unwrap_or_else(|e| format!("Failed to render result: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_onedrive::Drive;

    #[test]
    fn test_render_prefers_drive() {
        let profile: UserProfile = serde_json::from_str(
            r#"{ "id": "u1", "displayName": "Ada", "drive": { "id": "d1", "driveType": "personal" } }"#,
        )
        .unwrap();

        let rendered = render_profile(&profile);
        let drive: Drive = serde_json::from_str(&rendered).unwrap();
        assert_eq!(drive.id, "d1");
        assert!(!rendered.contains("Ada"));
        assert!(rendered.contains('\n'));
    }

    #[test]
    fn test_render_without_drive_shows_profile() {
        let profile: UserProfile =
            serde_json::from_str(r#"{ "id": "u1", "displayName": "Ada" }"#).unwrap();
        let rendered = render_profile(&profile);
        assert!(rendered.contains("\"displayName\": \"Ada\""));
    }
}
