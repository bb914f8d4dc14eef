//! Authorization-code flow with PKCE for a public client.
//!
//! Endpoints follow the Microsoft identity platform layout:
//! `{authority}/oauth2/v2.0/authorize` and `{authority}/oauth2/v2.0/token`.
//! A flow is three steps, each a method on [`OAuthFlowManager`]:
//!
//! 1. [`build_auth_url`](OAuthFlowManager::build_auth_url) returns the URL to
//!    present and a fresh [`PkceVerifier`]
//! 2. [`read_redirect`](OAuthFlowManager::read_redirect) turns the provider's
//!    redirect into a code, a cancellation or an error
//! 3. [`exchange_code`](OAuthFlowManager::exchange_code) redeems the code
//!
//! [`refresh_access_token`](OAuthFlowManager::refresh_access_token) redeems a
//! refresh token against any authority.
//!
//! Codes, verifiers and tokens never appear in logs. The `id_token` is only
//! decoded to name the account; its signature is not checked since it comes
//! straight from the token endpoint over TLS.
//!
//! ```no_run
//! # use bridge_traits::http::HttpClient;
//! # use std::sync::Arc;
//! # fn example(http_client: Arc<dyn HttpClient>) -> core_auth::Result<()> {
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//!
//! let flow = OAuthFlowManager::new(
//!     OAuthConfig {
//!         client_id: "00000000-0000-0000-0000-000000000000".to_string(),
//!         redirect_uri: "http://localhost:8400/callback".to_string(),
//!         authority: "https://login.microsoftonline.com/common".to_string(),
//!     },
//!     http_client,
//! );
//! let (url, verifier) = flow.build_auth_url(&["User.Read".to_string()], None, None)?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{Account, AccountId, AuthOutcome, OAuthTokens, Prompt, MAX_TOKEN_LIFETIME_SECS};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Always requested, so the provider returns an `id_token` and a refresh token.
pub const RESERVED_SCOPES: &[&str] = &["openid", "profile", "offline_access"];

/// Encodes to 43 characters, the RFC 7636 minimum.
const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    /// Authority for interactive requests.
    pub authority: String,
}

pub fn authorize_endpoint(authority: &str) -> String {
    format!("{}/oauth2/v2.0/authorize", authority.trim_end_matches('/'))
}

pub fn token_endpoint(authority: &str) -> String {
    format!("{}/oauth2/v2.0/token", authority.trim_end_matches('/'))
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Per-attempt secrets: the PKCE code verifier and the anti-forgery `state`.
///
/// Only the S256 [`challenge`](Self::challenge) leaves the process before
/// the code exchange.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    pub fn new() -> Self {
        Self {
            verifier: random_token(VERIFIER_BYTES),
            state: random_token(STATE_BYTES),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// `BASE64URL(SHA256(verifier))`
    pub fn challenge(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.verifier.as_bytes()))
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Tokens issued by the token endpoint together with the account they
/// belong to, when the response carried an `id_token`.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub tokens: OAuthTokens,
    pub account: Option<Account>,
}

/// OAuth 2.0 flow manager.
///
/// Handles the authorization code flow with PKCE and refresh-token redemption.
/// Every request is sent once; failures are reported, never retried.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the authorization URL with PKCE challenge.
    ///
    /// Returns both the URL and the PKCE verifier, which must be kept for
    /// [`read_redirect`](Self::read_redirect) and
    /// [`exchange_code`](Self::exchange_code).
    #[instrument(skip(self, login_hint))]
    pub fn build_auth_url(
        &self,
        scopes: &[String],
        login_hint: Option<&str>,
        prompt: Option<Prompt>,
    ) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&authorize_endpoint(&self.config.authority))
            .map_err(|e| AuthError::Config(format!("Invalid authority: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("response_mode", "query");
            query.append_pair("scope", &scope_param(scopes));
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            if let Some(hint) = login_hint {
                query.append_pair("login_hint", hint);
            }
            if let Some(prompt) = prompt {
                query.append_pair("prompt", prompt.as_str());
            }
        }

        debug!("Built authorization URL");

        Ok((url.to_string(), verifier))
    }

    /// Read the provider's redirect.
    ///
    /// Returns the authorization code, `Cancelled` when the user declined
    /// (`error=access_denied`), or an error for any other provider error, a
    /// state mismatch or a redirect without a code.
    pub fn read_redirect(
        &self,
        redirect_url: &str,
        verifier: &PkceVerifier,
    ) -> Result<AuthOutcome<String>> {
        let url = Url::parse(redirect_url)
            .map_err(|e| AuthError::Presenter(format!("Invalid redirect URL: {}", e)))?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            if error == "access_denied" {
                info!("User declined authorization");
                return Ok(AuthOutcome::Cancelled);
            }
            return Err(AuthError::Provider {
                error,
                description: description.unwrap_or_default(),
            });
        }

        let actual = state.unwrap_or_default();
        if actual != verifier.state() {
            warn!("OAuth state mismatch on redirect");
            return Err(AuthError::StateMismatch {
                expected: verifier.state().to_string(),
                actual,
            });
        }

        code.map(AuthOutcome::Success).ok_or_else(|| {
            AuthError::InvalidResponse("Redirect carried no authorization code".to_string())
        })
    }

    /// Exchange an authorization code for OAuth tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The authorization code is rejected (`TokenEndpoint`)
    /// - Network errors occur (`Network`)
    /// - The response cannot be decoded (`InvalidResponse`)
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &PkceVerifier,
        scopes: &[String],
    ) -> Result<TokenGrant> {
        let scope = scope_param(scopes);
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier.verifier()),
            ("scope", scope.as_str()),
        ];

        debug!("Exchanging authorization code for tokens");

        let response = self
            .post_token_request(&token_endpoint(&self.config.authority), &params)
            .await?;
        let grant = parse_token_response(&response, scopes, None)?;

        info!(
            expires_at = %grant.tokens.expires_at,
            "Exchanged authorization code for tokens"
        );

        Ok(grant)
    }

    /// Refresh an access token against `authority`.
    ///
    /// Sends exactly one request. Keeps the old refresh token when the
    /// provider does not rotate it.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(
        &self,
        authority: &str,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<TokenGrant> {
        let scope = scope_param(scopes);
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("scope", scope.as_str()),
        ];

        debug!("Refreshing access token");

        let response = self
            .post_token_request(&token_endpoint(authority), &params)
            .await?;
        let grant = parse_token_response(&response, scopes, Some(refresh_token))?;

        info!(expires_at = %grant.tokens.expires_at, "Refreshed access token");

        Ok(grant)
    }

    async fn post_token_request(
        &self,
        token_url: &str,
        params: &[(&str, &str)],
    ) -> Result<HttpResponse> {
        let encoded_body = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Config(format!("Failed to encode token request: {}", e)))?;

        let request = HttpRequest::new(HttpMethod::Post, token_url)
            .header("Accept", "application/json")
            .form(encoded_body);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.is_success() {
            let status = response.status;
            let body = response.text_lossy();
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(description) => format!("{}: {}", e.error, description),
                    None => e.error,
                })
                .unwrap_or(body);

            warn!(status, "Token endpoint rejected request");

            return Err(AuthError::TokenEndpoint { status, message });
        }

        Ok(response)
    }
}

/// Requested scopes plus the reserved OpenID scopes, space separated.
fn scope_param(scopes: &[String]) -> String {
    let mut all: Vec<&str> = scopes.iter().map(String::as_str).collect();
    for reserved in RESERVED_SCOPES {
        if !all.iter().any(|s| s.eq_ignore_ascii_case(reserved)) {
            all.push(reserved);
        }
    }
    all.join(" ")
}

fn parse_token_response(
    response: &HttpResponse,
    requested: &[String],
    previous_refresh_token: Option<&str>,
) -> Result<TokenGrant> {
    let token_response: TokenResponse = response
        .json()
        .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

    let scopes = match token_response.scope.as_deref() {
        Some(granted) if !granted.trim().is_empty() => {
            granted.split_whitespace().map(String::from).collect()
        }
        _ => requested.to_vec(),
    };

    let account = token_response
        .id_token
        .as_deref()
        .map(IdTokenClaims::decode)
        .transpose()?
        .map(IdTokenClaims::into_account)
        .transpose()?;

    if !(0..=MAX_TOKEN_LIFETIME_SECS).contains(&token_response.expires_in) {
        return Err(AuthError::InvalidResponse(format!(
            "expires_in out of range: {}",
            token_response.expires_in
        )));
    }

    let tokens = OAuthTokens::new(
        token_response.access_token,
        token_response
            .refresh_token
            .or_else(|| previous_refresh_token.map(String::from)),
        token_response.expires_in,
        scopes,
    );

    Ok(TokenGrant { tokens, account })
}

/// Token response from the identity provider.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    scope: Option<String>,
    id_token: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Claims read from the `id_token` payload.
#[derive(Debug, Deserialize)]
pub struct IdTokenClaims {
    pub oid: Option<String>,
    pub sub: Option<String>,
    pub preferred_username: Option<String>,
    pub name: Option<String>,
    pub tid: Option<String>,
}

impl IdTokenClaims {
    /// Decode the payload segment of a compact JWT. The signature is not
    /// checked.
    pub fn decode(id_token: &str) -> Result<Self> {
        let payload = id_token
            .split('.')
            .nth(1)
            .ok_or_else(|| AuthError::InvalidResponse("id_token is not a JWT".to_string()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::InvalidResponse(format!("id_token payload: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::InvalidResponse(format!("id_token claims: {}", e)))
    }

    /// `oid` (falling back to `sub`) becomes the account id;
    /// `preferred_username` (falling back to `name`) the username.
    pub fn into_account(self) -> Result<Account> {
        let id = self.oid.or(self.sub).ok_or_else(|| {
            AuthError::InvalidResponse("id_token has neither oid nor sub".to_string())
        })?;
        let username = self
            .preferred_username
            .or(self.name)
            .unwrap_or_else(|| id.clone());

        let account = Account::new(AccountId::new(id), username);
        Ok(match self.tid {
            Some(tid) => account.with_tenant(tid),
            None => account,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bytes::Bytes;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StubHttpClient;

    #[async_trait::async_trait]
    impl HttpClient for StubHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(BridgeError::OperationFailed(
                "HTTP client not mocked for unit test".to_string(),
            ))
        }
    }

    fn manager() -> OAuthFlowManager {
        OAuthFlowManager::new(
            OAuthConfig {
                client_id: "test-client".to_string(),
                redirect_uri: "http://localhost:8400/callback".to_string(),
                authority: "https://login.microsoftonline.com/common".to_string(),
            },
            Arc::new(StubHttpClient),
        )
    }

    pub(crate) fn jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.sig")
    }

    fn response(body: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_pkce_verifier_generation() {
        let verifier = PkceVerifier::new();

        assert!(verifier.verifier().len() >= 43);
        assert!(!verifier.state().is_empty());
        assert_eq!(verifier.challenge(), verifier.challenge());

        let verifier2 = PkceVerifier::new();
        assert_ne!(verifier.verifier(), verifier2.verifier());
        assert_ne!(verifier.state(), verifier2.state());
    }

    #[test]
    fn test_pkce_challenge_known_vector() {
        // RFC 7636 appendix B
        let verifier = PkceVerifier {
            verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
            state: "s".to_string(),
        };
        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            token_endpoint("https://login.microsoftonline.com/contoso/"),
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
        assert_eq!(
            authorize_endpoint("https://login.microsoftonline.com/common"),
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize"
        );
    }

    #[test]
    fn test_build_auth_url() {
        let (url, verifier) = manager()
            .build_auth_url(
                &["Files.Read".to_string()],
                Some("ada@contoso.com"),
                Some(Prompt::SelectAccount),
            )
            .unwrap();

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/common/oauth2/v2.0/authorize");
        let query: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "test-client");
        assert_eq!(query["redirect_uri"], "http://localhost:8400/callback");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["scope"], "Files.Read openid profile offline_access");
        assert_eq!(query["state"], verifier.state());
        assert_eq!(query["code_challenge"], verifier.challenge());
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["login_hint"], "ada@contoso.com");
        assert_eq!(query["prompt"], "select_account");
    }

    #[test]
    fn test_build_auth_url_invalid_authority() {
        let manager = OAuthFlowManager::new(
            OAuthConfig {
                client_id: "c".to_string(),
                redirect_uri: "http://localhost:8400/callback".to_string(),
                authority: "not a valid url".to_string(),
            },
            Arc::new(StubHttpClient),
        );
        assert!(matches!(
            manager.build_auth_url(&[], None, None),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_read_redirect() {
        let manager = manager();
        let verifier = PkceVerifier::new();

        let ok = format!(
            "http://localhost:8400/callback?code=abc&state={}",
            verifier.state()
        );
        assert_eq!(
            manager.read_redirect(&ok, &verifier).unwrap(),
            AuthOutcome::Success("abc".to_string())
        );

        let denied = "http://localhost:8400/callback?error=access_denied&state=x";
        assert!(manager
            .read_redirect(denied, &verifier)
            .unwrap()
            .is_cancelled());

        let failed = "http://localhost:8400/callback?error=invalid_scope&error_description=bad+scope";
        match manager.read_redirect(failed, &verifier) {
            Err(AuthError::Provider { error, description }) => {
                assert_eq!(error, "invalid_scope");
                assert_eq!(description, "bad scope");
            }
            other => panic!("expected provider error, got {:?}", other),
        }

        let forged = "http://localhost:8400/callback?code=abc&state=forged";
        assert!(matches!(
            manager.read_redirect(forged, &verifier),
            Err(AuthError::StateMismatch { .. })
        ));
    }

    #[test]
    fn test_scope_param_does_not_duplicate_reserved() {
        assert_eq!(
            scope_param(&["openid".to_string(), "Files.Read".to_string()]),
            "openid Files.Read profile offline_access"
        );
    }

    #[test]
    fn test_parse_token_response_with_id_token() {
        let id_token = jwt(serde_json::json!({
            "oid": "oid-1",
            "sub": "sub-1",
            "preferred_username": "ada@contoso.com",
            "tid": "tenant-1"
        }));
        let response = response(serde_json::json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3599,
            "scope": "Files.Read openid profile",
            "id_token": id_token
        }));

        let grant = parse_token_response(&response, &["Files.Read".to_string()], None).unwrap();
        let account = grant.account.unwrap();
        assert_eq!(account.id.as_str(), "oid-1");
        assert_eq!(account.username, "ada@contoso.com");
        assert_eq!(account.tenant_id.as_deref(), Some("tenant-1"));
        assert_eq!(grant.tokens.refresh_token.as_deref(), Some("rt"));
        assert!(grant.tokens.covers(&["Files.Read".to_string()]));
    }

    #[test]
    fn test_parse_token_response_minimal_keeps_refresh_token() {
        let response = response(serde_json::json!({ "access_token": "at" }));

        let grant =
            parse_token_response(&response, &["Files.Read".to_string()], Some("old")).unwrap();
        assert!(grant.account.is_none());
        assert_eq!(grant.tokens.refresh_token.as_deref(), Some("old"));
        assert_eq!(grant.tokens.scopes, vec!["Files.Read".to_string()]);
        assert!(!grant.tokens.is_expired_with_buffer(300));
    }

    #[test]
    fn test_parse_token_response_rejects_unusable_lifetime() {
        for expires_in in [i64::MAX, MAX_TOKEN_LIFETIME_SECS + 1, -1] {
            let response = response(serde_json::json!({
                "access_token": "at",
                "expires_in": expires_in
            }));
            let result = parse_token_response(&response, &[], None);
            assert!(
                matches!(result, Err(AuthError::InvalidResponse(_))),
                "expires_in {expires_in}"
            );
        }
    }

    #[test]
    fn test_id_token_claims_fallbacks() {
        let claims = IdTokenClaims::decode(&jwt(serde_json::json!({
            "sub": "sub-only",
            "name": "Ada"
        })))
        .unwrap();
        let account = claims.into_account().unwrap();
        assert_eq!(account.id.as_str(), "sub-only");
        assert_eq!(account.username, "Ada");

        assert!(IdTokenClaims::decode("not-a-jwt").is_err());
        let anonymous = IdTokenClaims::decode(&jwt(serde_json::json!({}))).unwrap();
        assert!(anonymous.into_account().is_err());
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let result = manager()
            .refresh_access_token("https://login.microsoftonline.com/common", "rt", &[])
            .await;
        assert!(matches!(result, Err(AuthError::Network(_))));
    }
}
