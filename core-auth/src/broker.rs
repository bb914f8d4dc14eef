//! # Identity Broker
//!
//! The seam between [`IdentityClient`](crate::IdentityClient) and whatever
//! actually talks to the identity provider. A host may implement
//! [`IdentityBroker`] over a platform authentication SDK; [`OAuthBroker`] is
//! the bundled implementation over the authorization-code + PKCE flow.

use crate::error::{AuthError, Result};
use crate::oauth::{OAuthConfig, OAuthFlowManager};
use crate::token_cache::TokenCache;
use crate::types::{Account, AuthOutcome, AuthRequest, TokenResult};
use async_trait::async_trait;
use bridge_traits::http::HttpClient;
use bridge_traits::presenter::{AuthorizationPresenter, PresenterOutcome};
use core_runtime::config::{AuthConfig, CacheBehavior};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Operations the identity client needs from an authentication SDK.
///
/// Implementations must be safe to call concurrently; the client does not
/// serialize calls.
#[async_trait]
pub trait IdentityBroker: Send + Sync {
    /// The account the provider currently considers signed in, if any.
    async fn current_account(&self) -> Result<Option<Account>>;

    /// Show the provider's UI and obtain a token. `request.scopes` is never
    /// empty here.
    async fn acquire_token_interactive(
        &self,
        request: &AuthRequest,
    ) -> Result<AuthOutcome<TokenResult>>;

    /// Obtain a token for `account` from cached material only, never showing
    /// UI. Fails with [`AuthError::UiRequired`] when that is impossible.
    async fn acquire_token_silent(
        &self,
        account: &Account,
        scopes: &[String],
        authority: &str,
    ) -> Result<TokenResult>;

    /// Forget `account` and any token material held for it.
    async fn remove_account(&self, account: &Account) -> Result<()>;
}

/// [`IdentityBroker`] over OAuth 2.0 authorization code + PKCE.
///
/// The authorization page is shown through the host's
/// [`AuthorizationPresenter`]; issued tokens are kept in an in-memory
/// [`TokenCache`].
pub struct OAuthBroker {
    flow: OAuthFlowManager,
    presenter: Arc<dyn AuthorizationPresenter>,
    cache: TokenCache,
    refresh_buffer_secs: i64,
}

impl OAuthBroker {
    pub fn new(
        config: &AuthConfig,
        http_client: Arc<dyn HttpClient>,
        presenter: Arc<dyn AuthorizationPresenter>,
    ) -> Self {
        let flow = OAuthFlowManager::new(
            OAuthConfig {
                client_id: config.client_id.clone(),
                redirect_uri: config.redirect_uri.clone(),
                authority: config.authority.clone(),
            },
            http_client,
        );

        Self {
            flow,
            presenter,
            cache: TokenCache::new(config.cache.behavior),
            refresh_buffer_secs: i64::try_from(config.cache.refresh_buffer_secs)
                .unwrap_or(i64::MAX),
        }
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }
}

#[async_trait]
impl IdentityBroker for OAuthBroker {
    async fn current_account(&self) -> Result<Option<Account>> {
        Ok(self.cache.account().await)
    }

    #[instrument(skip(self, request), fields(scopes = ?request.scopes))]
    async fn acquire_token_interactive(
        &self,
        request: &AuthRequest,
    ) -> Result<AuthOutcome<TokenResult>> {
        let (auth_url, verifier) = self.flow.build_auth_url(
            &request.scopes,
            request.login_hint.as_deref(),
            request.prompt,
        )?;

        let redirect_uri = self.flow.config().redirect_uri.clone();
        let outcome = self
            .presenter
            .present(&auth_url, &redirect_uri)
            .await
            .map_err(|e| AuthError::Presenter(e.to_string()))?;

        let redirect = match outcome {
            PresenterOutcome::Redirected(url) => url,
            PresenterOutcome::Cancelled => {
                info!("Authorization page dismissed");
                return Ok(AuthOutcome::Cancelled);
            }
        };

        let code = match self.flow.read_redirect(&redirect, &verifier)? {
            AuthOutcome::Success(code) => code,
            AuthOutcome::Cancelled => return Ok(AuthOutcome::Cancelled),
        };

        let grant = self
            .flow
            .exchange_code(&code, &verifier, &request.scopes)
            .await?;

        let account = grant.account.ok_or_else(|| {
            AuthError::InvalidResponse("Token response carried no id_token".to_string())
        })?;

        let result = grant.tokens.to_result(account.clone());
        self.cache.store(account, grant.tokens).await;

        Ok(AuthOutcome::Success(result))
    }

    #[instrument(skip(self, account, scopes), fields(account_id = %account.id))]
    async fn acquire_token_silent(
        &self,
        account: &Account,
        scopes: &[String],
        authority: &str,
    ) -> Result<TokenResult> {
        if self.cache.behavior() == CacheBehavior::Disabled {
            return Err(AuthError::UiRequired(
                "Token caching is disabled".to_string(),
            ));
        }

        let credential = self
            .cache
            .credential()
            .await
            .filter(|c| c.account.same_as(account))
            .ok_or_else(|| {
                AuthError::UiRequired("No cached credential for account".to_string())
            })?;

        if !credential
            .tokens
            .is_expired_with_buffer(self.refresh_buffer_secs)
            && credential.tokens.covers(scopes)
        {
            debug!("Returning cached access token");
            return Ok(credential.tokens.to_result(credential.account));
        }

        let refresh_token = credential.tokens.refresh_token.as_deref().ok_or_else(|| {
            AuthError::UiRequired("Cached credential has no refresh token".to_string())
        })?;

        let grant = self
            .flow
            .refresh_access_token(authority, refresh_token, scopes)
            .await
            .map_err(|e| match e {
                AuthError::TokenEndpoint { status, message } => {
                    warn!(status, "Refresh token rejected");
                    AuthError::UiRequired(message)
                }
                other => other,
            })?;

        let result = grant.tokens.to_result(credential.account);
        self.cache.update_tokens(grant.tokens).await;

        Ok(result)
    }

    async fn remove_account(&self, account: &Account) -> Result<()> {
        if let Some(held) = self.cache.account().await {
            if held.same_as(account) {
                self.cache.clear().await;
            }
        }
        Ok(())
    }
}
