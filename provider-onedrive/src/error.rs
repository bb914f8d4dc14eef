use thiserror::Error;

#[derive(Error, Debug)]
pub enum OneDriveError {
    /// Non-2xx status, or a 2xx body that could not be decoded.
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never produced a response (connect, DNS, TLS, timeout).
    #[error("Network error: {0}")]
    Network(String),
}

impl OneDriveError {
    /// HTTP status when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            OneDriveError::Api { status, .. } => Some(*status),
            OneDriveError::Network(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OneDriveError>;
