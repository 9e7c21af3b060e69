//! # Event Bus System
//!
//! Broadcasts what the client is doing to any interested observer using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: [`CoreEvent`] wrapping playback, cache and link events
//! - **EventBus**: Central broadcast channel for publishing events
//!
//! Publishing never blocks and having no subscribers is not an error for
//! publishers: the coordinator and the link emit unconditionally.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, LinkEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus.publish(CoreEvent::Link(LinkEvent::Connected));
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event, CoreEvent::Link(LinkEvent::Connected));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playback coordinator events
    Playback(PlaybackEvent),
    /// Offline cache events
    Cache(CacheEvent),
    /// Control server connection events
    Link(LinkEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Link(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Fatal { .. }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::Link(LinkEvent::Disconnected { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::CommandIgnored { .. }) => EventSeverity::Debug,
            CoreEvent::Link(LinkEvent::ReconnectAttempt { .. }) => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events related to the device playback state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The device state changed.
    StateChanged {
        /// Previous state name.
        from: String,
        /// New state name.
        to: String,
    },
    /// A track began playing.
    TrackStarted {
        /// Display name of the track.
        title: String,
        /// URL or local path.
        source: String,
    },
    /// The current queue played to its end.
    QueueEnded {
        /// Number of tracks in the finished queue.
        tracks: usize,
    },
    /// A command had no effect (redundant or rejected while busy).
    CommandIgnored {
        /// Command name.
        command: String,
        /// Why it was ignored.
        reason: String,
    },
    /// The coordinator hit an unrecoverable condition and is shutting down.
    Fatal {
        /// Human-readable error message.
        message: String,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::StateChanged { .. } => "Playback state changed",
            PlaybackEvent::TrackStarted { .. } => "Track started",
            PlaybackEvent::QueueEnded { .. } => "Queue ended",
            PlaybackEvent::CommandIgnored { .. } => "Command ignored",
            PlaybackEvent::Fatal { .. } => "Fatal playback error",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Events related to the offline cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// A track was written to the cache.
    Stored {
        /// Final path of the cached file.
        path: String,
        /// Size of the file in bytes.
        bytes: u64,
    },
    /// A track was not cached.
    Skipped {
        /// Display name of the track.
        track: String,
        /// Why it was skipped.
        reason: String,
    },
    /// Caching a track failed.
    Failed {
        /// Display name of the track.
        track: String,
        /// Human-readable error message.
        message: String,
    },
    /// Startup sweep finished.
    SweepCompleted {
        /// Files removed.
        removed: usize,
        /// Files kept.
        kept: usize,
        /// Bytes freed.
        bytes_freed: u64,
    },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::Stored { .. } => "Track cached",
            CacheEvent::Skipped { .. } => "Track not cached",
            CacheEvent::Failed { .. } => "Cache write failed",
            CacheEvent::SweepCompleted { .. } => "Cache sweep completed",
        }
    }
}

// ============================================================================
// Link Events
// ============================================================================

/// Events related to the control server connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LinkEvent {
    /// Connected and joined the device room.
    Connected,
    /// Connection lost.
    Disconnected {
        /// Reason reported by the transport.
        reason: String,
    },
    /// A reconnect attempt was made.
    ReconnectAttempt {
        /// Attempt number since the last disconnect.
        attempt: u32,
    },
}

impl LinkEvent {
    fn description(&self) -> &str {
        match self {
            LinkEvent::Connected => "Connected to control server",
            LinkEvent::Disconnected { .. } => "Disconnected from control server",
            LinkEvent::ReconnectAttempt { .. } => "Reconnect attempt",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Publishes an event, ignoring the absence of subscribers.
    pub fn publish(&self, event: CoreEvent) {
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future events.
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn state_changed(from: &str, to: &str) -> CoreEvent {
        CoreEvent::Playback(PlaybackEvent::StateChanged {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(state_changed("Idle", "Fetching")).is_err());
        // publish swallows the missing-subscriber case
        bus.publish(state_changed("Idle", "Fetching"));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Cache(CacheEvent::Stored {
            path: "/cache/42/a.mp3".to_string(),
            bytes: 1024,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for attempt in 0..5 {
            bus.publish(CoreEvent::Link(LinkEvent::ReconnectAttempt { attempt }));
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
        assert!(sub.recv().await.is_ok());
    }

    #[test]
    fn test_event_severity() {
        let fatal = CoreEvent::Playback(PlaybackEvent::Fatal {
            message: "decoder died".to_string(),
        });
        assert_eq!(fatal.severity(), EventSeverity::Error);

        let failed = CoreEvent::Cache(CacheEvent::Failed {
            track: "a.mp3".to_string(),
            message: "HTTP status 404".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Warning);

        assert_eq!(
            state_changed("Playing", "Paused").severity(),
            EventSeverity::Info
        );
        assert!(EventSeverity::Error > EventSeverity::Warning);
    }

    #[test]
    fn test_event_description() {
        assert_eq!(
            CoreEvent::Playback(PlaybackEvent::QueueEnded { tracks: 3 }).description(),
            "Queue ended"
        );
        assert_eq!(
            CoreEvent::Cache(CacheEvent::SweepCompleted {
                removed: 1,
                kept: 2,
                bytes_freed: 10
            })
            .description(),
            "Cache sweep completed"
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Link(LinkEvent::Disconnected {
            reason: "transport close".to_string(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Link\""));
        assert!(json.contains("\"event\":\"Disconnected\""));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
