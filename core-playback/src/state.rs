//! Device state and the busy guard.

use std::fmt;
use tokio::time::{Duration, Instant};

/// What the device is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceState {
    /// Nothing loaded.
    #[default]
    Idle,
    /// A queue was loaded (or a skip requested) and the player has not yet
    /// confirmed that audio started.
    Fetching,
    Playing,
    Paused,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Idle => "idle",
            DeviceState::Fetching => "fetching",
            DeviceState::Playing => "playing",
            DeviceState::Paused => "paused",
        }
    }

    /// A queue is loaded in the player.
    pub fn has_queue(&self) -> bool {
        !matches!(self, DeviceState::Idle)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latch set while a load or skip is in flight.
///
/// While set, new play, shuffle and next commands are rejected.
#[derive(Debug, Default)]
pub struct CommandGuard {
    since: Option<Instant>,
}

impl CommandGuard {
    pub fn set(&mut self) {
        self.since = Some(Instant::now());
    }

    /// Clear the latch. Returns `true` if it was set.
    pub fn clear(&mut self) -> bool {
        self.since.take().is_some()
    }

    pub fn is_set(&self) -> bool {
        self.since.is_some()
    }

    /// How long the latch has been held.
    pub fn held_for(&self) -> Option<Duration> {
        self.since.map(|since| since.elapsed())
    }
}
