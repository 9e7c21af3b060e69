use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Adapter setup failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Remote link error: {0}")]
    Remote(#[from] core_remote::RemoteError),

    #[error("Service task failed: {0}")]
    TaskFailed(String),
}

impl ServiceError {
    /// Whether the process should exit with a failure status.
    pub fn is_fatal(&self) -> bool {
        match self {
            ServiceError::Playback(e) => e.is_fatal(),
            ServiceError::Remote(core_remote::RemoteError::CoordinatorStopped) => false,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
