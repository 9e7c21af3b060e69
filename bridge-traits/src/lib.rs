//! # Host Bridge Traits
//!
//! Capability traits for everything the playback client talks to but does not
//! implement itself.
//!
//! ## Overview
//!
//! The core crates only see these traits. Concrete adapters live in
//! `bridge-desktop`; tests substitute `mockall` mocks.
//!
//! ## Traits
//!
//! ### Playback
//! - [`PlayerBackend`](playback::PlayerBackend) - Media player driven by the coordinator
//! - [`MixerControl`](mixer::MixerControl) - Output gain adjustments
//!
//! ### Networking & I/O
//! - [`RemoteTransport`](network::RemoteTransport) - Event channel to the control server
//! - [`HttpClient`](http::HttpClient) - Streamed downloads for the offline cache
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Adapters
//! report what failed; deciding whether a failure is fatal is left to the
//! playback coordinator.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared behind `Arc`
//! across tasks.

pub mod error;
pub mod http;
pub mod mixer;
pub mod network;
pub mod playback;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{DownloadStream, HttpClient};
pub use mixer::MixerControl;
pub use network::{RemoteTransport, TransportEvent, TransportEventReceiver, TransportEventSender};
pub use playback::{
    BackendKind, PlayerBackend, PlayerEvent, PlayerEventReceiver, PlayerEventSender,
    PlayerFailure, QueueId, Track, END_OF_QUEUE_MESSAGE,
};
pub use time::{Clock, FixedClock, LogLevel, SystemClock};
