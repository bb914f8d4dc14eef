use thiserror::Error;

/// Errors raised while assembling the runtime: configuration and host
/// capabilities.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A required host capability was neither injected nor available as a
    /// desktop default.
    #[error("Missing capability {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
