//! # Desktop Bridge Implementations
//!
//! Linux implementations of the bridge traits for the playback client.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with a bounded redirect chain
//! - `RemoteTransport` speaking Socket.IO over `tokio-tungstenite`
//! - `PlayerBackend` for `mpg123 -R` (queue held in memory)
//! - `PlayerBackend` for mpv JSON IPC (queue written to a scratch playlist)
//! - `MixerControl` spawning `amixer`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{endpoint_url, Mpg123Player, SocketIoTransport};
//! use tokio::sync::mpsc;
//!
//! let (player_tx, player_rx) = mpsc::unbounded_channel();
//! let player = Mpg123Player::new("mpg123", player_tx);
//!
//! let (transport_tx, transport_rx) = mpsc::unbounded_channel();
//! let endpoint = endpoint_url("https://example.org", "/piradio")?;
//! let transport = SocketIoTransport::new(endpoint, transport_tx);
//! ```

mod driver;
mod http;
mod mixer;
mod mpg123;
mod mpv;
mod socketio;

pub use http::{ReqwestHttpClient, DEFAULT_MAX_REDIRECTS};
pub use mixer::AmixerControl;
pub use mpg123::Mpg123Player;
pub use mpv::{MpvOptions, MpvPlayer};
pub use socketio::{endpoint_url, SocketIoTransport};
