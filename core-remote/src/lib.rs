//! # Remote Link
//!
//! Connects the playback coordinator to the control server.
//!
//! - [`codec`] - Event names and argument layout on the wire
//! - [`link`] - Connection lifecycle: join the device room, forward
//!   commands, deliver notifications, reconnect on loss
//!
//! The transport itself (Socket.IO over WebSocket) is a
//! [`RemoteTransport`](bridge_traits::network::RemoteTransport) provided by
//! `bridge-desktop`.

pub mod codec;
pub mod error;
pub mod link;

pub use error::{RemoteError, Result};
pub use link::{LinkSettings, RemoteLink};
