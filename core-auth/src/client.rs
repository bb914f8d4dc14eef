//! # Identity Client
//!
//! Single-account identity client: owns the one signed-in [`Account`] and
//! mediates every token request through an [`IdentityBroker`].
//!
//! ## Lifecycle
//!
//! A client is created `Uninitialized`, validates its configuration while
//! `Initializing` and becomes `Ready` once the configuration is accepted.
//! Every operation before that fails with [`AuthError::NotReady`].
//!
//! ## Account tracking
//!
//! Whenever an operation yields an account that differs from the held one,
//! the held account is replaced and [`AuthEvent::AccountChanged`] is emitted.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthRequest, IdentityBroker, IdentityClient};
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//!
//! # async fn example(broker: Arc<dyn IdentityBroker>, json: &str) -> core_auth::Result<()> {
//! let client = IdentityClient::from_resource(json, broker, EventBus::default()).await?;
//!
//! let outcome = client.sign_in(AuthRequest::new()).await?;
//! if let Some(account) = outcome.success() {
//!     println!("Signed in as {}", account.username);
//! }
//! # Ok(())
//! # }
//! ```

use crate::broker::IdentityBroker;
use crate::error::{AuthError, Result};
use crate::types::{Account, AccountLoad, AuthOutcome, AuthRequest, ClientState, TokenResult};
use core_runtime::config::AuthConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

/// Single-account identity client.
pub struct IdentityClient {
    config: AuthConfig,
    broker: Arc<dyn IdentityBroker>,
    event_bus: EventBus,
    state: RwLock<ClientState>,
    /// Held only for reads and writes, never across broker calls.
    account: RwLock<Option<Account>>,
}

impl IdentityClient {
    /// Create an uninitialized client. Call [`start`](Self::start) before use.
    pub fn new(config: AuthConfig, broker: Arc<dyn IdentityBroker>, event_bus: EventBus) -> Self {
        Self {
            config,
            broker,
            event_bus,
            state: RwLock::new(ClientState::Uninitialized),
            account: RwLock::new(None),
        }
    }

    /// Create and start a client.
    pub async fn initialize(
        config: AuthConfig,
        broker: Arc<dyn IdentityBroker>,
        event_bus: EventBus,
    ) -> Result<Self> {
        let client = Self::new(config, broker, event_bus);
        client.start().await?;
        Ok(client)
    }

    /// Parse a JSON configuration resource, then [`initialize`](Self::initialize).
    pub async fn from_resource(
        json: &str,
        broker: Arc<dyn IdentityBroker>,
        event_bus: EventBus,
    ) -> Result<Self> {
        let config = AuthConfig::from_json(json)?;
        Self::initialize(config, broker, event_bus).await
    }

    /// Validate the configuration and move to `Ready`.
    ///
    /// On an invalid configuration the client returns to `Uninitialized`.
    /// Starting a ready client is a no-op.
    #[instrument(skip(self), fields(client_id = %self.config.client_id))]
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if state.is_ready() {
                return Ok(());
            }
            *state = ClientState::Initializing;
        }

        if let Err(e) = self.config.validate() {
            error!(error = %e, "Identity client configuration rejected");
            *self.state.write().await = ClientState::Uninitialized;
            let err = AuthError::from(e);
            self.emit_error(&err);
            return Err(err);
        }

        let has_account = self.account.read().await.is_some();
        *self.state.write().await = ClientState::Ready { has_account };

        info!("Identity client ready");
        Ok(())
    }

    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The held account, if any.
    pub async fn current_account(&self) -> Option<Account> {
        self.account.read().await.clone()
    }

    /// Reconcile the held account with the broker's current account.
    #[instrument(skip(self))]
    pub async fn load_current_account(&self) -> Result<AccountLoad> {
        self.ensure_ready().await?;

        let current = match self.broker.current_account().await {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Failed to load current account");
                self.emit_error(&e);
                return Err(e);
            }
        };

        let held = self.current_account().await;
        let load = match (held, current) {
            (Some(held), Some(current)) if held.same_as(&current) => {
                self.replace_account(Some(current.clone())).await;
                AccountLoad::Loaded(Some(current))
            }
            (None, current) => {
                if let Some(account) = &current {
                    info!(account_id = %account.id, "Restored signed-in account");
                }
                self.replace_account(current.clone()).await;
                AccountLoad::Loaded(current)
            }
            (Some(held), current) => {
                self.replace_account(current.clone()).await;
                self.emit_account_changed(Some(&held), current.as_ref());
                AccountLoad::Changed {
                    prior: Some(held),
                    current,
                }
            }
        };

        Ok(load)
    }

    /// Interactive sign-in.
    ///
    /// # Errors
    ///
    /// - `AccountAlreadySignedIn` if an account is held
    /// - `ScopeNotConfigured` if the request names a scope outside the configured set
    /// - any broker error; the account is left unset
    #[instrument(skip(self, request))]
    pub async fn sign_in(&self, request: AuthRequest) -> Result<AuthOutcome<Account>> {
        self.ensure_ready().await?;

        if let Some(account) = self.current_account().await {
            warn!(account_id = %account.id, "Sign-in refused, an account is already signed in");
            return Err(AuthError::AccountAlreadySignedIn {
                username: account.username,
            });
        }

        let request = self.resolve_request(request)?;
        let outcome = self.interactive(&request).await?;

        Ok(match outcome {
            AuthOutcome::Success(token) => {
                let account = token.account.clone();
                self.adopt_account(&account).await;
                self.emit_token_acquired(&token, true);
                AuthOutcome::Success(account)
            }
            AuthOutcome::Cancelled => AuthOutcome::Cancelled,
        })
    }

    /// Clear the held account and ask the broker to drop its token material.
    ///
    /// Idempotent. The local account is cleared even when the broker fails;
    /// that error is returned afterwards.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        self.ensure_ready().await?;

        let Some(prior) = self.replace_account(None).await else {
            debug!("Sign-out with no account held");
            return Ok(());
        };

        let removed = self.broker.remove_account(&prior).await;

        self.emit(AuthEvent::SignedOut {
            account_id: Some(prior.id.to_string()),
        });

        if let Err(e) = removed {
            warn!(error = %e, "Broker failed to remove account");
            self.emit_error(&e);
            return Err(e);
        }

        info!(account_id = %prior.id, "Signed out");
        Ok(())
    }

    /// Acquire a token, always showing UI.
    #[instrument(skip(self, request))]
    pub async fn acquire_token_interactive(
        &self,
        request: AuthRequest,
    ) -> Result<AuthOutcome<TokenResult>> {
        self.ensure_ready().await?;

        let request = self.resolve_request(request)?;
        let outcome = self.interactive(&request).await?;

        if let AuthOutcome::Success(token) = &outcome {
            self.adopt_account(&token.account).await;
            self.emit_token_acquired(token, true);
        }

        Ok(outcome)
    }

    /// Acquire a token from cached material only, never showing UI.
    ///
    /// # Errors
    ///
    /// - `NoAccount` if no account is held
    /// - `UiRequired` when the broker cannot issue a token silently
    #[instrument(skip(self, request))]
    pub async fn acquire_token_silent(
        &self,
        request: AuthRequest,
        authority: &str,
    ) -> Result<TokenResult> {
        self.ensure_ready().await?;

        let account = self.current_account().await.ok_or(AuthError::NoAccount)?;
        let request = self.resolve_request(request)?;

        let token = match self
            .broker
            .acquire_token_silent(&account, &request.scopes, authority)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, ui_required = e.is_ui_required(), "Silent token acquisition failed");
                self.emit_error(&e);
                return Err(e);
            }
        };

        self.adopt_account(&token.account).await;
        self.emit_token_acquired(&token, false);

        Ok(token)
    }

    async fn ensure_ready(&self) -> Result<()> {
        if self.state.read().await.is_ready() {
            Ok(())
        } else {
            Err(AuthError::NotReady)
        }
    }

    /// Empty scopes become the configured set; anything outside it is refused.
    fn resolve_request(&self, mut request: AuthRequest) -> Result<AuthRequest> {
        if request.scopes.is_empty() {
            request.scopes = self.config.scopes.clone();
            return Ok(request);
        }

        if let Some(scope) = request
            .scopes
            .iter()
            .find(|scope| !self.config.allows_scope(scope))
        {
            return Err(AuthError::ScopeNotConfigured(scope.clone()));
        }

        Ok(request)
    }

    async fn interactive(&self, request: &AuthRequest) -> Result<AuthOutcome<TokenResult>> {
        match self.broker.acquire_token_interactive(request).await {
            Ok(AuthOutcome::Cancelled) => {
                info!("Interactive request cancelled by user");
                self.emit(AuthEvent::SignInCancelled);
                Ok(AuthOutcome::Cancelled)
            }
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(error = %e, "Interactive token acquisition failed");
                self.emit_error(&e);
                Err(e)
            }
        }
    }

    /// Make `account` the held account, reporting a sign-in or an account
    /// change as appropriate.
    async fn adopt_account(&self, account: &Account) {
        let prior = self.replace_account(Some(account.clone())).await;
        match prior {
            None => self.emit(AuthEvent::SignedIn {
                account_id: account.id.to_string(),
                username: account.username.clone(),
            }),
            Some(prior) if !prior.same_as(account) => {
                self.emit_account_changed(Some(&prior), Some(account))
            }
            Some(_) => {}
        }
    }

    /// Swap the held account and keep `Ready { has_account }` in step.
    async fn replace_account(&self, account: Option<Account>) -> Option<Account> {
        let has_account = account.is_some();
        let prior = std::mem::replace(&mut *self.account.write().await, account);

        let mut state = self.state.write().await;
        if state.is_ready() {
            *state = ClientState::Ready { has_account };
        }

        prior
    }

    fn emit_account_changed(&self, prior: Option<&Account>, current: Option<&Account>) {
        info!(
            prior = ?prior.map(|a| a.id.as_str()),
            current = ?current.map(|a| a.id.as_str()),
            "Current account changed"
        );
        self.emit(AuthEvent::AccountChanged {
            prior: prior.map(|a| a.id.to_string()),
            current: current.map(|a| a.id.to_string()),
        });
    }

    fn emit_token_acquired(&self, token: &TokenResult, interactive: bool) {
        self.emit(AuthEvent::TokenAcquired {
            account_id: token.account.id.to_string(),
            interactive,
            expires_at: token.expires_at.timestamp(),
        });
    }

    fn emit_error(&self, err: &AuthError) {
        self.emit(AuthEvent::AuthError {
            message: err.to_string(),
            ui_required: err.is_ui_required(),
        });
    }

    fn emit(&self, event: AuthEvent) {
        self.event_bus.emit(CoreEvent::Auth(event));
    }
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient")
            .field("client_id", &self.config.client_id)
            .field("authority", &self.config.authority)
            .finish_non_exhaustive()
    }
}
