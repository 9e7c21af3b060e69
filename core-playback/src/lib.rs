//! # Playback Core
//!
//! Decides what the device plays in response to remote commands.
//!
//! ## Overview
//!
//! - [`coordinator`] - Single-task state machine owning the device state,
//!   the busy guard and the start watchdog
//! - [`cache`] - Opportunistic offline copy of remote tracks plus the startup
//!   retention sweep
//! - [`queue`] - Turning a play request into a concrete track list
//! - [`gain`] - Per-track output level rule
//! - [`protocol`] - Commands the coordinator accepts and notifications it emits
//!
//! All host interaction (player process, mixer, HTTP) goes through the traits
//! in `bridge-traits`.

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod gain;
pub mod protocol;
pub mod queue;
pub mod state;

pub use cache::{CacheConfig, CacheOutcome, CacheStats, CacheStore, RetentionPolicy, SkipReason, SweepReport};
pub use coordinator::{CoordinatorHandle, CoordinatorInput, CoordinatorSettings, PlaybackCoordinator};
pub use error::{CacheError, PlaybackError, Result};
pub use gain::GainRule;
pub use protocol::{LinkStatus, Notification, NotificationReceiver, NotificationSender, RemoteCommand};
pub use queue::{LoadedQueue, QueueSpec};
pub use state::{CommandGuard, DeviceState};
