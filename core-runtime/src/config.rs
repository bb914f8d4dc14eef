//! # Configuration
//!
//! [`AuthConfig`] mirrors the identity client's JSON resource (client id,
//! redirect URI, authorities, account mode, scopes and cache behaviour).
//! [`AppConfig`] adds the Graph settings in [`ApiConfig`] and the host's
//! `HttpClient` and `AuthorizationPresenter`.
//!
//! With the `desktop-shims` feature a missing HTTP client or presenter is
//! filled in from `bridge-desktop`. Without it, a missing HTTP client makes
//! [`AppConfigBuilder::build`] fail with `CapabilityMissing`.
//!
//! ```ignore
//! use core_runtime::config::AppConfig;
//!
//! let config = AppConfig::builder()
//!     .auth_json(include_str!("auth_config_single_account.json"))?
//!     .build()?;
//! ```
//!
//! Everything is validated in `build`, before the first user action:
//!
//! ```
//! use core_runtime::config::AppConfig;
//! use core_runtime::Error;
//!
//! assert!(matches!(AppConfig::builder().build(), Err(Error::Config(_))));
//! ```

use crate::error::{Error, Result};
use bridge_traits::{AuthorizationPresenter, HttpClient};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default base URL of the downstream API.
pub const DEFAULT_API_BASE_URL: &str = "https://graph.microsoft.com/v1.0/";

/// Default profile endpoint, relative to the base URL.
pub const DEFAULT_PROFILE_PATH: &str = "me?$expand=drive";

/// Default per-request timeout for API calls.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Default margin before expiry at which a cached token counts as stale.
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 300;

/// Largest accepted `cache.refresh_buffer_secs` (one day).
pub const MAX_REFRESH_BUFFER_SECS: u64 = 24 * 60 * 60;

// ============================================================================
// Identity client resource
// ============================================================================

/// How many accounts the identity client may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountMode {
    Single,
    Multiple,
}

/// Whether issued tokens are kept for silent acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBehavior {
    /// Keep tokens in memory for the life of the process.
    #[default]
    InMemory,
    /// Never cache; every silent request needs UI.
    Disabled,
}

/// Token cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub behavior: CacheBehavior,
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: u64,
}

fn default_refresh_buffer_secs() -> u64 {
    DEFAULT_REFRESH_BUFFER_SECS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            behavior: CacheBehavior::InMemory,
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
        }
    }
}

/// Identity client configuration, loaded from a JSON resource.
///
/// ```json
/// {
///   "client_id": "00000000-0000-0000-0000-000000000000",
///   "redirect_uri": "http://localhost:8400/callback",
///   "authority": "https://login.microsoftonline.com/common",
///   "account_mode": "SINGLE",
///   "scopes": ["Files.Read"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    /// Authority used for interactive requests.
    pub authority: String,
    /// Authority used for silent requests. Falls back to `authority`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent_authority: Option<String>,
    pub account_mode: AccountMode,
    /// The configured scope set. Requests may not ask for anything else.
    pub scopes: Vec<String>,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl AuthConfig {
    /// Parse a configuration resource.
    ///
    /// Only parses; call [`validate`](Self::validate) before use.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Malformed auth configuration: {}", e)))
    }

    /// Read and parse a configuration resource from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Cannot read auth configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Authority for silent token requests.
    pub fn silent_authority(&self) -> &str {
        self.silent_authority.as_deref().unwrap_or(&self.authority)
    }

    /// Checks:
    /// - single-account mode
    /// - client id, redirect URI and scope set are present
    /// - redirect URI and authorities are absolute URLs
    /// - refresh buffer is at most [`MAX_REFRESH_BUFFER_SECS`]
    pub fn validate(&self) -> Result<()> {
        if self.account_mode != AccountMode::Single {
            return Err(Error::Config(
                "Only SINGLE account mode is supported".to_string(),
            ));
        }

        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client_id cannot be empty".to_string()));
        }

        if self.scopes.is_empty() || self.scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::Config(
                "scopes must list at least one non-empty scope".to_string(),
            ));
        }

        if self.cache.refresh_buffer_secs > MAX_REFRESH_BUFFER_SECS {
            return Err(Error::Config(format!(
                "cache.refresh_buffer_secs must be at most {} (got {})",
                MAX_REFRESH_BUFFER_SECS, self.cache.refresh_buffer_secs
            )));
        }

        parse_url("redirect_uri", &self.redirect_uri)?;
        parse_url("authority", &self.authority)?;
        if let Some(silent) = &self.silent_authority {
            parse_url("silent_authority", silent)?;
        }

        Ok(())
    }

    /// Whether `scope` belongs to the configured scope set.
    pub fn allows_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s.eq_ignore_ascii_case(scope))
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| Error::Config(format!("{} is not a valid URL ({}): {}", field, value, e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!(
            "{} must be an absolute http(s) URL: {}",
            field, value
        )));
    }
    Ok(url)
}

// ============================================================================
// Downstream API
// ============================================================================

/// Downstream API endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL, ending in `/`.
    pub base_url: String,
    /// Profile endpoint relative to `base_url`.
    pub profile_path: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            profile_path: DEFAULT_PROFILE_PATH.to_string(),
            timeout: DEFAULT_API_TIMEOUT,
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_profile_path(mut self, path: impl Into<String>) -> Self {
        self.profile_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the profile endpoint.
    pub fn profile_url(&self) -> String {
        format!("{}{}", self.base_url, self.profile_path)
    }

    pub fn validate(&self) -> Result<()> {
        parse_url("base_url", &self.base_url)?;

        if !self.base_url.ends_with('/') {
            return Err(Error::Config(format!(
                "base_url must end with '/': {}",
                self.base_url
            )));
        }

        if self.profile_path.is_empty() || self.profile_path.starts_with('/') {
            return Err(Error::Config(
                "profile_path must be a non-empty relative path".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(Error::Config(
                "API timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Application configuration
// ============================================================================

/// Everything the session core needs to start.
///
/// Use [`AppConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct AppConfig {
    /// Identity client resource (required)
    pub auth: AuthConfig,

    /// Downstream API settings
    pub api: ApiConfig,

    /// HTTP client for token and API requests (optional with desktop default)
    pub http_client: Arc<dyn HttpClient>,

    /// Presenter for the bundled OAuth broker (optional with desktop default)
    pub presenter: Option<Arc<dyn AuthorizationPresenter>>,

    /// Event bus buffer size
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("auth", &self.auth)
            .field("api", &self.api)
            .field("http_client", &"HttpClient { ... }")
            .field(
                "presenter",
                &self
                    .presenter
                    .as_ref()
                    .map(|_| "AuthorizationPresenter { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl AppConfig {
    /// Creates a new builder for constructing an `AppConfig`.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.auth.validate()?;
        self.api.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeouts(
        bridge_desktop::DEFAULT_CONNECT_TIMEOUT,
        bridge_desktop::DEFAULT_REQUEST_TIMEOUT,
    )
    .map_err(|e| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: e.to_string(),
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for token and API requests. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile: inject a client backed by the platform network stack."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_presenter() -> Option<Arc<dyn AuthorizationPresenter>> {
    Some(Arc::new(bridge_desktop::LoopbackPresenter::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_presenter() -> Option<Arc<dyn AuthorizationPresenter>> {
    None
}

/// Builder for constructing [`AppConfig`] instances.
#[derive(Default)]
pub struct AppConfigBuilder {
    auth: Option<AuthConfig>,
    api: Option<ApiConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
    presenter: Option<Arc<dyn AuthorizationPresenter>>,
    event_buffer_size: Option<usize>,
}

impl AppConfigBuilder {
    /// Sets the identity client configuration (required).
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Parses and sets the identity client configuration from a JSON resource.
    pub fn auth_json(mut self, json: &str) -> Result<Self> {
        self.auth = Some(AuthConfig::from_json(json)?);
        Ok(self)
    }

    /// Sets the downstream API settings.
    pub fn api(mut self, api: ApiConfig) -> Self {
        self.api = Some(api);
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the authorization presenter used by the bundled OAuth broker.
    pub fn presenter(mut self, presenter: Arc<dyn AuthorizationPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `AppConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(AppConfig)` on success, or an error if:
    /// - The auth configuration is missing or invalid
    /// - No `HttpClient` was provided and no platform default exists
    /// - API settings are invalid
    pub fn build(self) -> Result<AppConfig> {
        let auth = self.auth.ok_or_else(|| {
            Error::Config("Auth configuration is required. Use .auth() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = AppConfig {
            auth,
            api: self.api.unwrap_or_default(),
            http_client,
            presenter: self.presenter.or_else(provide_default_presenter),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, HttpRequest, HttpResponse};

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(
            &self,
            _request: HttpRequest,
        ) -> std::result::Result<HttpResponse, BridgeError> {
            Err(BridgeError::NotAvailable("mock".to_string()))
        }
    }

    const SINGLE_ACCOUNT_JSON: &str = r#"{
        "client_id": "4b0db8c2-9f26-4417-8bde-3f0e3656f8e0",
        "redirect_uri": "http://localhost:8400/callback",
        "authority": "https://login.microsoftonline.com/common",
        "account_mode": "SINGLE",
        "scopes": ["Files.Read"]
    }"#;

    fn auth_config() -> AuthConfig {
        AuthConfig::from_json(SINGLE_ACCOUNT_JSON).unwrap()
    }

    #[test]
    fn test_parse_single_account_resource() {
        let config = auth_config();
        assert_eq!(config.account_mode, AccountMode::Single);
        assert_eq!(config.scopes, vec!["Files.Read".to_string()]);
        assert_eq!(config.cache, CacheConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_silent_authority_defaults_to_authority() {
        let mut config = auth_config();
        assert_eq!(
            config.silent_authority(),
            "https://login.microsoftonline.com/common"
        );

        config.silent_authority =
            Some("https://login.microsoftonline.com/contoso.onmicrosoft.com".to_string());
        assert_eq!(
            config.silent_authority(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com"
        );
    }

    #[test]
    fn test_cache_section() {
        let json = r#"{
            "client_id": "id",
            "redirect_uri": "http://localhost:8400/callback",
            "authority": "https://login.microsoftonline.com/common",
            "account_mode": "SINGLE",
            "scopes": ["Files.Read"],
            "cache": { "behavior": "disabled" }
        }"#;
        let config = AuthConfig::from_json(json).unwrap();
        assert_eq!(config.cache.behavior, CacheBehavior::Disabled);
        assert_eq!(config.cache.refresh_buffer_secs, DEFAULT_REFRESH_BUFFER_SECS);
    }

    #[test]
    fn test_validate_rejects_oversized_refresh_buffer() {
        let mut config = auth_config();
        config.cache.refresh_buffer_secs = MAX_REFRESH_BUFFER_SECS;
        assert!(config.validate().is_ok());

        config.cache.refresh_buffer_secs = MAX_REFRESH_BUFFER_SECS + 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.cache.refresh_buffer_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let result = AuthConfig::from_json("{ \"client_id\": ");
        assert!(matches!(result, Err(Error::Config(_))));

        let missing_scopes = r#"{
            "client_id": "id",
            "redirect_uri": "http://localhost:8400/callback",
            "authority": "https://login.microsoftonline.com/common",
            "account_mode": "SINGLE"
        }"#;
        assert!(matches!(
            AuthConfig::from_json(missing_scopes),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_multiple_account_mode() {
        let mut config = auth_config();
        config.account_mode = AccountMode::Multiple;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("SINGLE"));
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut config = auth_config();
        config.client_id = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = auth_config();
        config.scopes.clear();
        assert!(config.validate().is_err());

        let mut config = auth_config();
        config.authority = "login.microsoftonline.com".to_string();
        assert!(config.validate().is_err());

        let mut config = auth_config();
        config.silent_authority = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_allows_scope() {
        let config = auth_config();
        assert!(config.allows_scope("Files.Read"));
        assert!(config.allows_scope("files.read"));
        assert!(!config.allows_scope("Mail.Read"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = AuthConfig::load("/nonexistent/auth_config.json");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_api_config_defaults() {
        let api = ApiConfig::default();
        assert_eq!(
            api.profile_url(),
            "https://graph.microsoft.com/v1.0/me?$expand=drive"
        );
        assert_eq!(api.timeout, Duration::from_secs(10));
        assert!(api.validate().is_ok());
    }

    #[test]
    fn test_api_config_validation() {
        assert!(ApiConfig::default()
            .with_base_url("https://graph.microsoft.com/v1.0")
            .validate()
            .is_err());
        assert!(ApiConfig::default()
            .with_profile_path("/me")
            .validate()
            .is_err());
        assert!(ApiConfig::default()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_builder_requires_auth() {
        let result = AppConfig::builder()
            .http_client(Arc::new(MockHttpClient))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Auth configuration is required"));
    }

    #[test]
    fn test_builder_validates_auth() {
        let mut auth = auth_config();
        auth.client_id.clear();

        let result = AppConfig::builder()
            .auth(auth)
            .http_client(Arc::new(MockHttpClient))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_with_all_fields() {
        let config = AppConfig::builder()
            .auth_json(SINGLE_ACCOUNT_JSON)
            .unwrap()
            .api(ApiConfig::default().with_timeout(Duration::from_secs(5)))
            .http_client(Arc::new(MockHttpClient))
            .event_buffer_size(16)
            .build()
            .unwrap();

        assert_eq!(config.api.timeout, Duration::from_secs(5));
        assert_eq!(config.event_buffer_size, 16);
        assert!(format!("{:?}", config).contains("HttpClient { ... }"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client_without_shims() {
        let result = AppConfig::builder().auth(auth_config()).build();
        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "HttpClient")
            }
            other => panic!("expected CapabilityMissing, got {:?}", other),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let config = AppConfig::builder().auth(auth_config()).build().unwrap();
        assert!(config.presenter.is_some());
    }
}
