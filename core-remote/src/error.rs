use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    /// An event carried arguments that do not match its expected shape.
    #[error("Malformed '{event}' event: {message}")]
    Decode { event: String, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] BridgeError),

    /// Nobody is left to receive commands.
    #[error("Playback coordinator is gone")]
    CoordinatorStopped,
}

pub type Result<T> = std::result::Result<T, RemoteError>;
