//! Socket.IO client transport
//!
//! Speaks just enough of Socket.IO v4 (over Engine.IO v4, WebSocket only) to
//! join a room, receive named events and emit them back. Each call to
//! [`RemoteTransport::open`] starts one session task; the session ends on the
//! first transport error, or when the server misses its heartbeat window, and
//! reports it as a disconnect. Reconnecting is the caller's decision.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    network::{RemoteTransport, TransportEvent, TransportEventSender},
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Socket.IO connect request for the default namespace.
const CONNECT: &str = "40";
/// Engine.IO pong.
const PONG: &str = "3";
/// Engine.IO v4 server defaults, used when the handshake omits them.
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

/// Heartbeat settings announced in the Engine.IO open packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Handshake {
    #[serde(default = "default_ping_interval")]
    ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT_MS
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL_MS,
            ping_timeout: DEFAULT_PING_TIMEOUT_MS,
        }
    }
}

impl Handshake {
    #[cfg(test)]
    pub(crate) fn new(ping_interval: Duration, ping_timeout: Duration) -> Self {
        Self {
            ping_interval: ping_interval.as_millis() as u64,
            ping_timeout: ping_timeout.as_millis() as u64,
        }
    }

    /// How long the server may stay silent before the link counts as dead.
    pub(crate) fn heartbeat_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// A decoded Engine.IO / Socket.IO text frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Packet {
    /// Engine.IO handshake; the client must answer with a namespace connect.
    Open(Handshake),
    /// Engine.IO close.
    Close,
    Ping,
    Pong,
    /// Namespace joined.
    Connected,
    /// Server left the namespace.
    Disconnect,
    Event { event: String, args: Vec<Value> },
    ConnectError(String),
    Other(String),
}

impl Packet {
    pub(crate) fn parse(text: &str) -> Self {
        match text.as_bytes().first() {
            Some(b'0') => Packet::Open(serde_json::from_str(&text[1..]).unwrap_or_default()),
            Some(b'1') => Packet::Close,
            Some(b'2') => Packet::Ping,
            Some(b'3') => Packet::Pong,
            Some(b'4') => Self::parse_socket(&text[1..]),
            _ => Packet::Other(text.to_string()),
        }
    }

    fn parse_socket(body: &str) -> Self {
        match body.as_bytes().first() {
            Some(b'0') => Packet::Connected,
            Some(b'1') => Packet::Disconnect,
            Some(b'2') => Self::parse_event(&body[1..]).unwrap_or_else(|| Packet::Other(body.to_string())),
            Some(b'4') => Packet::ConnectError(body[1..].to_string()),
            _ => Packet::Other(body.to_string()),
        }
    }

    fn parse_event(body: &str) -> Option<Self> {
        // Optional "/namespace," prefix, then an optional ack id.
        let body = match body.strip_prefix('/') {
            Some(rest) => rest.split_once(',').map(|(_, payload)| payload)?,
            None => body,
        };
        let body = body.trim_start_matches(|c: char| c.is_ascii_digit());

        let mut frame: Vec<Value> = serde_json::from_str(body).ok()?;
        if frame.is_empty() {
            return None;
        }
        let event = match frame.remove(0) {
            Value::String(event) => event,
            _ => return None,
        };
        Some(Packet::Event { event, args: frame })
    }
}

/// Encode an event emission for the default namespace.
pub(crate) fn encode_event(event: &str, args: Vec<Value>) -> String {
    let mut frame = Vec::with_capacity(args.len() + 1);
    frame.push(Value::String(event.to_string()));
    frame.extend(args);
    format!("42{}", Value::Array(frame))
}

/// WebSocket endpoint for a server URL and a Socket.IO path.
///
/// `https://host` with `/piradio` becomes
/// `wss://host/piradio/?EIO=4&transport=websocket`.
pub fn endpoint_url(server_url: &str, socket_path: &str) -> Result<Url> {
    let mut url = Url::parse(server_url).map_err(|e| {
        BridgeError::NotAvailable(format!("invalid server url '{server_url}': {e}"))
    })?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(BridgeError::NotAvailable(format!(
                "unsupported server url scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme).map_err(|_| {
        BridgeError::NotAvailable(format!("cannot use '{scheme}' for '{server_url}'"))
    })?;

    let path = socket_path.trim_matches('/');
    if path.is_empty() {
        url.set_path("/");
    } else {
        url.set_path(&format!("/{path}/"));
    }
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

struct Session {
    outgoing: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// [`RemoteTransport`] over a Socket.IO WebSocket.
pub struct SocketIoTransport {
    endpoint: Url,
    events: TransportEventSender,
    connected: Arc<AtomicBool>,
    session: Mutex<Option<Session>>,
}

impl SocketIoTransport {
    pub fn new(endpoint: Url, events: TransportEventSender) -> Self {
        Self {
            endpoint,
            events,
            connected: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteTransport for SocketIoTransport {
    async fn open(&self) -> Result<()> {
        let mut session = self.session.lock();
        if let Some(current) = session.as_ref() {
            if !current.task.is_finished() {
                trace!("Session already open or opening");
                return Ok(());
            }
        }

        debug!(endpoint = %self.endpoint, "Opening socket");
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(
            self.endpoint.clone(),
            self.events.clone(),
            Arc::clone(&self.connected),
            outgoing_rx,
            cancel.clone(),
        ));
        *session = Some(Session {
            outgoing,
            cancel,
            task,
        });
        Ok(())
    }

    async fn emit(&self, event: &str, args: Vec<Value>) -> Result<()> {
        if !self.is_connected() {
            return Err(BridgeError::Disconnected(format!("cannot emit '{event}'")));
        }
        let outgoing = self
            .session
            .lock()
            .as_ref()
            .map(|session| session.outgoing.clone())
            .ok_or_else(|| BridgeError::Disconnected("no session".into()))?;

        outgoing
            .send(Message::Text(encode_event(event, args)))
            .map_err(|_| BridgeError::Disconnected(format!("session ended before '{event}'")))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        let session = self.session.lock().take();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(session) = session {
            session.cancel.cancel();
            let _ = session.task.await;
            info!("Socket closed");
        }
        Ok(())
    }
}

async fn run_session(
    endpoint: Url,
    events: TransportEventSender,
    connected: Arc<AtomicBool>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    let reason = tokio::select! {
        _ = cancel.cancelled() => return,
        reason = drive(&endpoint, &events, &connected, &mut outgoing) => reason,
    };

    connected.store(false, Ordering::SeqCst);
    debug!(%reason, "Socket session ended");
    let _ = events.send(TransportEvent::Disconnected { reason });
}

/// Run one session until it fails. Returns the disconnect reason.
async fn drive(
    endpoint: &Url,
    events: &TransportEventSender,
    connected: &AtomicBool,
    outgoing: &mut mpsc::UnboundedReceiver<Message>,
) -> String {
    let (ws_stream, _) = match tokio_tungstenite::connect_async(endpoint.as_str()).await {
        Ok(stream) => stream,
        Err(e) => return format!("connect failed: {e}"),
    };
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // Armed by the open packet, pushed back by every server ping.
    let mut heartbeat: Option<Duration> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => return format!("closed by server: {frame:?}"),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return format!("transport error: {e}"),
                    None => return "transport close".to_string(),
                };

                let reply = match Packet::parse(&text) {
                    Packet::Open(handshake) => {
                        let window = handshake.heartbeat_window();
                        debug!(window_ms = window.as_millis() as u64, "Engine.IO session opened");
                        heartbeat = Some(window);
                        deadline = Some(Instant::now() + window);
                        Some(CONNECT)
                    }
                    Packet::Ping => {
                        if let Some(window) = heartbeat {
                            deadline = Some(Instant::now() + window);
                        }
                        Some(PONG)
                    }
                    Packet::Connected => {
                        connected.store(true, Ordering::SeqCst);
                        if events.send(TransportEvent::Connected).is_err() {
                            return "event receiver dropped".to_string();
                        }
                        None
                    }
                    Packet::Event { event, args } => {
                        trace!(%event, "Event received");
                        if events.send(TransportEvent::Message { event, args }).is_err() {
                            return "event receiver dropped".to_string();
                        }
                        None
                    }
                    Packet::Disconnect => return "io server disconnect".to_string(),
                    Packet::Close => return "transport close".to_string(),
                    Packet::ConnectError(message) => return format!("connect error: {message}"),
                    Packet::Pong => None,
                    Packet::Other(raw) => {
                        warn!(frame = %raw, "Ignoring unsupported frame");
                        None
                    }
                };

                if let Some(reply) = reply {
                    if let Err(e) = ws_tx.send(Message::Text(reply.to_string())).await {
                        return format!("send failed: {e}");
                    }
                }
            }
            Some(message) = outgoing.recv() => {
                if let Err(e) = ws_tx.send(message).await {
                    return format!("send failed: {e}");
                }
            }
            _ = expire(deadline) => {
                warn!("No ping from server within the heartbeat window");
                return "ping timeout".to_string();
            }
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("https://servicos.maisfarmacia.org", "/piradio")
                .unwrap()
                .as_str(),
            "wss://servicos.maisfarmacia.org/piradio/?EIO=4&transport=websocket"
        );
        assert_eq!(
            endpoint_url("http://192.168.2.104:9012", "piradio/")
                .unwrap()
                .as_str(),
            "ws://192.168.2.104:9012/piradio/?EIO=4&transport=websocket"
        );
        assert!(endpoint_url("ftp://example.org", "/piradio").is_err());
        assert!(endpoint_url("not a url", "/piradio").is_err());
    }

    #[test]
    fn test_parse_engine_packets() {
        assert_eq!(
            Packet::parse(r#"0{"sid":"x","pingInterval":300,"pingTimeout":200}"#),
            Packet::Open(Handshake::new(
                Duration::from_millis(300),
                Duration::from_millis(200)
            ))
        );
        assert_eq!(
            Packet::parse(r#"0{"sid":"x","pingInterval":300}"#),
            Packet::Open(Handshake::new(
                Duration::from_millis(300),
                Duration::from_millis(DEFAULT_PING_TIMEOUT_MS)
            ))
        );
        assert_eq!(Packet::parse("0"), Packet::Open(Handshake::default()));
        assert_eq!(Packet::parse("2"), Packet::Ping);
        assert_eq!(Packet::parse("1"), Packet::Close);
        assert_eq!(Packet::parse(r#"40{"sid":"y"}"#), Packet::Connected);
        assert_eq!(Packet::parse("41"), Packet::Disconnect);
        assert_eq!(
            Packet::parse(r#"44{"message":"denied"}"#),
            Packet::ConnectError(r#"{"message":"denied"}"#.into())
        );
    }

    #[test]
    fn test_heartbeat_window() {
        let handshake = Handshake::new(Duration::from_millis(25_000), Duration::from_millis(20_000));
        assert_eq!(handshake.heartbeat_window(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_event_packets() {
        assert_eq!(
            Packet::parse(r#"42["play",{"playlist":["https://h/music/42/a.mp3"]}]"#),
            Packet::Event {
                event: "play".into(),
                args: vec![json!({ "playlist": ["https://h/music/42/a.mp3"] })],
            }
        );
        assert_eq!(
            Packet::parse(r#"42["stop"]"#),
            Packet::Event {
                event: "stop".into(),
                args: vec![],
            }
        );
        // Ack id and namespace prefixes.
        assert_eq!(
            Packet::parse(r#"4217["next"]"#),
            Packet::Event {
                event: "next".into(),
                args: vec![],
            }
        );
        assert_eq!(
            Packet::parse(r#"42/admin,["pause"]"#),
            Packet::Event {
                event: "pause".into(),
                args: vec![],
            }
        );
        assert!(matches!(Packet::parse("42[5]"), Packet::Other(_)));
        assert!(matches!(Packet::parse("42not json"), Packet::Other(_)));
        assert!(matches!(Packet::parse(""), Packet::Other(_)));
    }

    #[test]
    fn test_encode_event() {
        assert_eq!(
            encode_event("joinRoom", vec![json!("0042")]),
            r#"42["joinRoom","0042"]"#
        );
        assert_eq!(encode_event("paused", vec![]), r#"42["paused"]"#);
    }
}
