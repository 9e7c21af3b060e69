//! Remote Transport Abstraction
//!
//! A persistent, bidirectional, event-oriented channel to the control server.
//! Implementations only move named events with JSON arguments; decoding the
//! arguments into commands and the reconnect policy live in the remote link.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Something that happened on the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Session established with the server.
    Connected,
    /// Session lost. The transport does not reconnect on its own.
    Disconnected { reason: String },
    /// Named event pushed by the server.
    Message { event: String, args: Vec<Value> },
}

/// Channel a transport pushes its events into.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving side of [`TransportEventSender`].
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Event channel to the control server.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::RemoteTransport;
/// use serde_json::json;
///
/// async fn announce(transport: &dyn RemoteTransport, device: &str) {
///     if transport.is_connected() {
///         transport.emit("joinRoom", vec![json!(device)]).await.ok();
///     }
/// }
/// ```
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Start connecting. Returns once the attempt has been initiated; the
    /// outcome is reported as [`TransportEvent::Connected`] or
    /// [`TransportEvent::Disconnected`]. Calling this while a connection is
    /// open or in progress is a no-op.
    async fn open(&self) -> Result<()>;

    /// Send a named event with positional arguments.
    ///
    /// Fails with [`BridgeError::Disconnected`](crate::error::BridgeError::Disconnected)
    /// when no session is open.
    async fn emit(&self, event: &str, args: Vec<Value>) -> Result<()>;

    /// Whether a session is currently established.
    fn is_connected(&self) -> bool;

    /// Close the session without reporting a disconnect.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
