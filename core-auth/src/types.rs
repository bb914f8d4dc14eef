use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-assigned identifier of a signed-in account.
///
/// For the Microsoft identity platform this is the object id (`oid`) claim.
/// The value is opaque; only equality matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The signed-in user as known to the identity provider.
///
/// # Examples
///
/// ```
/// use core_auth::{Account, AccountId};
///
/// let account = Account::new(AccountId::new("oid-1"), "ada@contoso.com");
/// assert_eq!(account.username, "ada@contoso.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Display name shown in the current-user label.
    pub username: String,
    pub tenant_id: Option<String>,
}

impl Account {
    pub fn new(id: AccountId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            tenant_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Whether both values describe the same provider account.
    pub fn same_as(&self, other: &Account) -> bool {
        self.id == other.id
    }
}

/// An access token issued for an account.
///
/// Never persisted. The `Debug` implementation redacts the token.
#[derive(Clone)]
pub struct TokenResult {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    /// Scopes the token was granted for.
    pub scopes: Vec<String>,
    pub account: Account,
}

impl TokenResult {
    /// True once `now` is within `buffer_seconds` of expiry.
    pub fn is_expired_with_buffer(&self, buffer_seconds: i64) -> bool {
        expires_within(self.expires_at, buffer_seconds)
    }
}

/// Longest token lifetime, and longest refresh buffer, the core works with.
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Whether `expires_at` falls within `buffer_seconds` of now. Buffers are
/// clamped to `0..=MAX_TOKEN_LIFETIME_SECS`.
fn expires_within(expires_at: DateTime<Utc>, buffer_seconds: i64) -> bool {
    let buffer = chrono::Duration::seconds(buffer_seconds.clamp(0, MAX_TOKEN_LIFETIME_SECS));
    expires_at
        .checked_sub_signed(buffer)
        .map_or(true, |deadline| Utc::now() >= deadline)
}

impl fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResult")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("account", &self.account.id)
            .finish()
    }
}

/// Interaction hint passed to the authorization page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Force credential entry.
    Login,
    /// Show the account picker.
    SelectAccount,
    /// Show the consent page even if consent was given.
    Consent,
    /// Fail rather than show any UI.
    None,
}

impl Prompt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Prompt::Login => "login",
            Prompt::SelectAccount => "select_account",
            Prompt::Consent => "consent",
            Prompt::None => "none",
        }
    }
}

/// Parameters of a single token request.
///
/// An empty scope list means "the configured scope set".
///
/// ```
/// use core_auth::{AuthRequest, Prompt};
///
/// let request = AuthRequest::new()
///     .with_scopes(["Files.Read"])
///     .with_prompt(Prompt::SelectAccount);
/// assert_eq!(request.scopes, vec!["Files.Read".to_string()]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequest {
    pub scopes: Vec<String>,
    pub login_hint: Option<String>,
    pub prompt: Option<Prompt>,
}

impl AuthRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_login_hint(mut self, hint: impl Into<String>) -> Self {
        self.login_hint = Some(hint.into());
        self
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = Some(prompt);
        self
    }
}

/// Outcome of an operation that may show UI.
///
/// Errors travel in the surrounding `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome<T> {
    Success(T),
    /// The user dismissed the prompt. Not an error.
    Cancelled,
}

impl<T> AuthOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AuthOutcome::Cancelled)
    }

    pub fn success(self) -> Option<T> {
        match self {
            AuthOutcome::Success(value) => Some(value),
            AuthOutcome::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AuthOutcome<U> {
        match self {
            AuthOutcome::Success(value) => AuthOutcome::Success(f(value)),
            AuthOutcome::Cancelled => AuthOutcome::Cancelled,
        }
    }
}

/// Result of asking the identity provider for its current account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountLoad {
    /// The held account (possibly none) is still current.
    Loaded(Option<Account>),
    /// The provider reports a different account. `prior` has been
    /// invalidated and `current` is now held.
    Changed {
        prior: Option<Account>,
        current: Option<Account>,
    },
}

impl AccountLoad {
    /// The account held after the load.
    pub fn account(&self) -> Option<&Account> {
        match self {
            AccountLoad::Loaded(account) => account.as_ref(),
            AccountLoad::Changed { current, .. } => current.as_ref(),
        }
    }
}

/// Lifecycle of an identity client.
///
/// ```text
/// Uninitialized -> Initializing -> Ready { has_account }
///        ^              |
///        +--------------+ (invalid configuration)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Initializing,
    Ready { has_account: bool },
}

impl ClientState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ClientState::Ready { .. })
    }
}

/// OAuth 2.0 token set held by the bundled broker's cache.
///
/// # Security
///
/// Tokens are never logged. The `Debug` implementation redacts them.
#[derive(Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl OAuthTokens {
    /// `expires_in` is clamped to `±MAX_TOKEN_LIFETIME_SECS`.
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        scopes: Vec<String>,
    ) -> Self {
        let lifetime = expires_in.clamp(-MAX_TOKEN_LIFETIME_SECS, MAX_TOKEN_LIFETIME_SECS);
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
            scopes,
        }
    }

    pub fn is_expired_with_buffer(&self, buffer_seconds: i64) -> bool {
        expires_within(self.expires_at, buffer_seconds)
    }

    /// Whether every requested scope was granted (case-insensitive).
    pub fn covers(&self, requested: &[String]) -> bool {
        requested
            .iter()
            .all(|r| self.scopes.iter().any(|s| s.eq_ignore_ascii_case(r)))
    }

    pub fn to_result(&self, account: Account) -> TokenResult {
        TokenResult {
            access_token: self.access_token.clone(),
            expires_at: self.expires_at,
            scopes: self.scopes.clone(),
            account,
        }
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str) -> Account {
        Account::new(AccountId::new(id), format!("{id}@contoso.com"))
    }

    #[test]
    fn test_token_debug_redacts() {
        let tokens = OAuthTokens::new(
            "secret-access".to_string(),
            Some("secret-refresh".to_string()),
            3600,
            vec!["Files.Read".to_string()],
        );
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("[REDACTED]"));

        let result = tokens.to_result(account("a"));
        let debug = format!("{:?}", result);
        assert!(!debug.contains("secret-access"));
    }

    #[test]
    fn test_token_expiry_buffer() {
        let tokens = OAuthTokens::new("t".to_string(), None, 600, vec![]);
        assert!(!tokens.is_expired_with_buffer(300));
        assert!(tokens.is_expired_with_buffer(900));

        let expired = OAuthTokens::new("t".to_string(), None, -10, vec![]);
        assert!(expired.is_expired_with_buffer(0));
    }

    #[test]
    fn test_extreme_lifetimes_and_buffers_saturate() {
        let long = OAuthTokens::new("t".to_string(), None, i64::MAX, vec![]);
        assert!(long.expires_at <= Utc::now() + chrono::Duration::seconds(MAX_TOKEN_LIFETIME_SECS));
        assert!(!long.is_expired_with_buffer(300));
        assert!(long.is_expired_with_buffer(i64::MAX));

        let past = OAuthTokens::new("t".to_string(), None, i64::MIN, vec![]);
        assert!(past.is_expired_with_buffer(0));

        let result = OAuthTokens {
            expires_at: DateTime::<Utc>::MIN_UTC,
            ..long
        }
        .to_result(account("a"));
        assert!(result.is_expired_with_buffer(i64::MAX));
        assert!(result.is_expired_with_buffer(-5));
    }

    #[test]
    fn test_covers_scopes() {
        let tokens = OAuthTokens::new(
            "t".to_string(),
            None,
            3600,
            vec!["Files.Read".to_string(), "openid".to_string()],
        );
        assert!(tokens.covers(&["files.read".to_string()]));
        assert!(tokens.covers(&[]));
        assert!(!tokens.covers(&["Mail.Read".to_string()]));
    }

    #[test]
    fn test_account_identity() {
        let a = account("a");
        let renamed = Account::new(AccountId::new("a"), "Ada Lovelace");
        assert!(a.same_as(&renamed));
        assert!(!a.same_as(&account("b")));
    }

    #[test]
    fn test_auth_outcome_helpers() {
        let outcome = AuthOutcome::Success(2).map(|v| v * 2);
        assert_eq!(outcome, AuthOutcome::Success(4));
        assert_eq!(outcome.success(), Some(4));

        let cancelled: AuthOutcome<u8> = AuthOutcome::Cancelled;
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.success(), None);
    }

    #[test]
    fn test_account_load_current() {
        let load = AccountLoad::Changed {
            prior: Some(account("a")),
            current: None,
        };
        assert!(load.account().is_none());

        let load = AccountLoad::Loaded(Some(account("b")));
        assert_eq!(load.account().map(|a| a.id.as_str()), Some("b"));
    }

    #[test]
    fn test_prompt_values() {
        assert_eq!(Prompt::SelectAccount.as_str(), "select_account");
        assert_eq!(Prompt::None.as_str(), "none");
    }
}
