//! Microsoft Graph API client
//!
//! Fetches the signed-in user's profile with the drive expanded.

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use core_runtime::config::ApiConfig;
use core_runtime::events::{ApiEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{OneDriveError, Result};
use crate::types::UserProfile;

/// Microsoft Graph client.
///
/// Sends each request once with a per-request timeout taken from
/// [`ApiConfig`]. Retrying is left to the caller.
///
/// # Example
///
/// ```ignore
/// use provider_onedrive::GraphClient;
/// use core_runtime::config::ApiConfig;
///
/// let client = GraphClient::new(http_client, ApiConfig::default());
/// let profile = client.fetch_profile(&token.access_token).await?;
/// ```
pub struct GraphClient {
    http_client: Arc<dyn HttpClient>,
    config: ApiConfig,
    event_bus: Option<EventBus>,
}

impl GraphClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: ApiConfig) -> Self {
        Self {
            http_client,
            config,
            event_bus: None,
        }
    }

    /// Report each call as an [`ApiEvent`].
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// `GET {base_url}{profile_path}` with `token` as the bearer credential.
    ///
    /// # Errors
    ///
    /// - `Api` for a non-2xx status (message is the response body) or an
    ///   undecodable 2xx body
    /// - `Network` when no response was received
    #[instrument(skip(self, token), fields(endpoint = %self.config.profile_path))]
    pub async fn fetch_profile(&self, token: &str) -> Result<UserProfile> {
        let request = HttpRequest::new(HttpMethod::Get, self.config.profile_url())
            .bearer_token(token)
            .header("Accept", "application/json")
            .timeout(self.config.timeout);

        debug!("Requesting user profile");

        let response = match self.http_client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Profile request did not complete");
                let err = OneDriveError::Network(e.to_string());
                self.report_failure(&err);
                return Err(err);
            }
        };

        if !response.is_success() {
            let err = OneDriveError::Api {
                status: response.status,
                message: response.text_lossy(),
            };
            warn!(status = response.status, "Profile request rejected");
            self.report_failure(&err);
            return Err(err);
        }

        let profile: UserProfile = response.json().map_err(|e| {
            let err = OneDriveError::Api {
                status: response.status,
                message: format!("Failed to decode profile: {}", e),
            };
            self.report_failure(&err);
            err
        })?;

        info!(
            status = response.status,
            has_drive = profile.drive.is_some(),
            "Fetched user profile"
        );
        self.emit(ApiEvent::RequestCompleted {
            endpoint: self.config.profile_path.clone(),
            status: response.status,
        });

        Ok(profile)
    }

    fn report_failure(&self, err: &OneDriveError) {
        self.emit(ApiEvent::RequestFailed {
            endpoint: self.config.profile_path.clone(),
            status: err.status(),
            message: err.to_string(),
        });
    }

    fn emit(&self, event: ApiEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Api(event));
        }
    }
}
