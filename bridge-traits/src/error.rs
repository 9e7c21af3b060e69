use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Not connected: {0}")]
    Disconnected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` when the failure happened on the local machine
    /// (spawning a process, writing a file) rather than in a remote peer.
    pub fn is_local_io(&self) -> bool {
        matches!(self, BridgeError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
