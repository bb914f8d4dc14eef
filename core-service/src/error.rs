use core_auth::AuthError;
use provider_onedrive::OneDriveError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Identity client is not ready")]
    NotReady,

    #[error("Authentication error: {0}")]
    Auth(#[source] AuthError),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },
}

impl From<AuthError> for CoreError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Config(message) => CoreError::Config(message),
            AuthError::NotReady => CoreError::NotReady,
            other => CoreError::Auth(other),
        }
    }
}

impl From<OneDriveError> for CoreError {
    fn from(err: OneDriveError) -> Self {
        match err {
            OneDriveError::Api { status, message } => CoreError::Api { status, message },
            OneDriveError::Network(message) => CoreError::Network(message),
        }
    }
}

impl From<core_runtime::Error> for CoreError {
    fn from(err: core_runtime::Error) -> Self {
        match err {
            core_runtime::Error::Config(message) => CoreError::Config(message),
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_keep_their_category() {
        assert!(matches!(
            CoreError::from(AuthError::NotReady),
            CoreError::NotReady
        ));
        assert!(matches!(
            CoreError::from(AuthError::Config("bad".to_string())),
            CoreError::Config(_)
        ));
        assert!(matches!(
            CoreError::from(AuthError::UiRequired("expired".to_string())),
            CoreError::Auth(AuthError::UiRequired(_))
        ));
    }

    #[test]
    fn test_api_errors_split_by_transport() {
        let api = CoreError::from(OneDriveError::Api {
            status: 500,
            message: "boom".to_string(),
        });
        assert_eq!(api.to_string(), "API error 500: boom");

        let network = CoreError::from(OneDriveError::Network("reset".to_string()));
        assert!(matches!(network, CoreError::Network(_)));
    }
}
