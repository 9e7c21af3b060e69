//! # Playback Error Types
//!
//! Errors raised by the coordinator and the offline cache. Only the
//! coordinator decides whether an error ends the process; see
//! [`PlaybackError::is_fatal`].

use bridge_traits::error::BridgeError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while driving playback.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Player Errors
    // ========================================================================
    /// A control call into the player backend failed.
    #[error("Player command '{command}' failed: {source}")]
    PlayerCommand {
        command: &'static str,
        #[source]
        source: BridgeError,
    },

    /// The player backend reported an error event.
    #[error("Player backend failed: {0}")]
    PlayerFailed(String),

    // ========================================================================
    // Mixer Errors
    // ========================================================================
    /// The mixer could not be launched at all.
    #[error("Mixer unavailable: {0}")]
    Mixer(#[source] BridgeError),

    // ========================================================================
    // Cache Errors
    // ========================================================================
    #[error(transparent)]
    Cache(#[from] CacheError),

    // ========================================================================
    // Coordinator Errors
    // ========================================================================
    /// The coordinator task is no longer running.
    #[error("Playback coordinator stopped")]
    CoordinatorStopped,

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    pub(crate) fn player(command: &'static str) -> impl FnOnce(BridgeError) -> Self {
        move |source| PlaybackError::PlayerCommand { command, source }
    }

    /// Returns `true` if the process should exit on this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            PlaybackError::PlayerCommand { .. }
            | PlaybackError::PlayerFailed(_)
            | PlaybackError::Mixer(_)
            | PlaybackError::Internal(_) => true,
            PlaybackError::Cache(e) => e.is_fatal(),
            PlaybackError::CoordinatorStopped => false,
        }
    }
}

/// Errors from the offline cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache root or group directory could not be created or read.
    #[error("Cache directory {path} unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The download did not produce usable content.
    #[error("Download of {url} failed: {message}")]
    Fetch { url: String, message: String },

    /// Writing or renaming the local file failed after the fetch succeeded.
    #[error("Cache write to {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Local write failures are fatal; the device's storage is in trouble.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CacheError::Io { .. })
    }

    /// Returns `true` if the failure came from the network side.
    pub fn is_network_error(&self) -> bool {
        matches!(self, CacheError::Fetch { .. })
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
