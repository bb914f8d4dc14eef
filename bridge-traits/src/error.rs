use thiserror::Error;

/// Failure reported by a host-provided capability.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host cannot provide the capability at all.
    #[error("Capability not available: {0}")]
    NotAvailable(String),

    #[error("Host operation failed: {0}")]
    OperationFailed(String),

    /// No response: DNS, connect or TLS failure.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True when nothing was received from the peer.
    pub fn is_transport(&self) -> bool {
        !matches!(
            self,
            BridgeError::NotAvailable(_) | BridgeError::OperationFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
