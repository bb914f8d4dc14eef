use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Identity client is not ready")]
    NotReady,

    #[error("Account {username} is already signed in; sign out first")]
    AccountAlreadySignedIn { username: String },

    #[error("No account is signed in")]
    NoAccount,

    #[error("Scope {0} is not part of the configured scope set")]
    ScopeNotConfigured(String),

    #[error("User interaction required: {0}")]
    UiRequired(String),

    #[error("OAuth state mismatch")]
    StateMismatch { expected: String, actual: String },

    #[error("Identity provider returned {error}: {description}")]
    Provider { error: String, description: String },

    #[error("Token endpoint returned {status}: {message}")]
    TokenEndpoint { status: u16, message: String },

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authorization page failed: {0}")]
    Presenter(String),
}

impl AuthError {
    /// Whether an interactive attempt could resolve the failure.
    pub fn is_ui_required(&self) -> bool {
        matches!(self, AuthError::UiRequired(_) | AuthError::NoAccount)
    }
}

impl From<core_runtime::Error> for AuthError {
    fn from(err: core_runtime::Error) -> Self {
        AuthError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
