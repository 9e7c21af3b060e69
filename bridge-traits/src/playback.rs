//! Player backend bridge traits and supporting queue types.
//!
//! The playback core drives an external media player through the
//! [`PlayerBackend`] capability set. Two kinds of backend exist: one that
//! takes the queue as an in-memory list and one that needs the queue written
//! to a scratch playlist file before every load. Both report asynchronous
//! [`PlayerEvent`]s through the channel handed to them at construction.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Message the queue-object player family reports once the last track of a
/// queue has finished and there is nothing left to advance to.
pub const END_OF_QUEUE_MESSAGE: &str = "No next song was found";

/// Identifier attached to every queue handed to a backend.
///
/// Events carry the id of the queue they belong to so late events from a
/// superseded queue can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(Uuid);

impl QueueId {
    /// Generate a new queue identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QueueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single playable entry of a queue.
///
/// The serialized form keeps the field names the control server already
/// understands (`_name`, `src`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "_name")]
    display_name: String,
    src: String,
    #[serde(rename = "isRemote")]
    is_remote: bool,
}

impl Track {
    pub fn new(display_name: impl Into<String>, src: impl Into<String>, is_remote: bool) -> Self {
        Self {
            display_name: display_name.into(),
            src: src.into(),
            is_remote,
        }
    }

    /// Track streamed from an HTTP(S) locator. The display name is the last
    /// path segment of the URL.
    pub fn remote(url: impl Into<String>) -> Self {
        let src = url.into();
        let display_name = last_segment(&src).to_string();
        Self::new(display_name, src, true)
    }

    /// Track for a locator of unknown kind: HTTP(S) URLs are remote, anything
    /// else is treated as a local path.
    pub fn from_locator(locator: &str) -> Self {
        if is_remote_locator(locator) {
            Self::remote(locator)
        } else {
            Self::local(locator)
        }
    }

    /// Track read from the local filesystem.
    pub fn local(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(display_name, path.to_string_lossy().into_owned(), false)
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// URL or local path of the audio content.
    pub fn source(&self) -> &str {
        &self.src
    }

    pub fn is_remote(&self) -> bool {
        self.is_remote
    }
}

/// Whether a locator points at HTTP(S) content.
pub fn is_remote_locator(locator: &str) -> bool {
    let lower = locator.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn last_segment(locator: &str) -> &str {
    let without_query = locator.split(['?', '#']).next().unwrap_or(locator);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
}

/// Why a backend reported an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerFailure {
    /// The backend ran out of tracks. Not an error from the device's point of view.
    EndOfQueue,
    /// Anything else: decode failures, dead player process, broken IPC.
    Backend(String),
}

impl PlayerFailure {
    /// Classify a raw backend error message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim() == END_OF_QUEUE_MESSAGE {
            PlayerFailure::EndOfQueue
        } else {
            PlayerFailure::Backend(message)
        }
    }

    pub fn is_end_of_queue(&self) -> bool {
        matches!(self, PlayerFailure::EndOfQueue)
    }
}

impl fmt::Display for PlayerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerFailure::EndOfQueue => f.write_str(END_OF_QUEUE_MESSAGE),
            PlayerFailure::Backend(message) => f.write_str(message),
        }
    }
}

/// Asynchronous notifications produced by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A track began producing audio.
    Started { queue: QueueId, track: Track },
    /// A track finished. `exhausted` is set when no further track follows.
    Ended {
        queue: QueueId,
        track: Option<Track>,
        exhausted: bool,
    },
    /// The backend failed.
    Errored { queue: QueueId, cause: PlayerFailure },
    /// Informational: the backend confirmed a pause.
    Paused { queue: QueueId },
    /// Informational: the backend confirmed a resume.
    Resumed { queue: QueueId },
    /// Informational: the backend went idle.
    Stopped { queue: QueueId },
}

impl PlayerEvent {
    /// Queue the event belongs to.
    pub fn queue_id(&self) -> QueueId {
        match self {
            PlayerEvent::Started { queue, .. }
            | PlayerEvent::Ended { queue, .. }
            | PlayerEvent::Errored { queue, .. }
            | PlayerEvent::Paused { queue }
            | PlayerEvent::Resumed { queue }
            | PlayerEvent::Stopped { queue } => *queue,
        }
    }
}

/// Channel a backend pushes its events into.
pub type PlayerEventSender = mpsc::UnboundedSender<PlayerEvent>;

/// Receiving side of [`PlayerEventSender`].
pub type PlayerEventReceiver = mpsc::UnboundedReceiver<PlayerEvent>;

/// Which backend family to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Queue passed in memory; the backend walks it item by item.
    Queue,
    /// Queue externalized to a newline-delimited playlist file before load.
    File,
}

impl BackendKind {
    /// File-backed players can silently fail to pick up a freshly written
    /// playlist, so the coordinator re-issues the load until playback starts.
    pub fn requires_watchdog(&self) -> bool {
        matches!(self, BackendKind::File)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Queue => f.write_str("queue"),
            BackendKind::File => f.write_str("file"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(BackendKind::Queue),
            "file" => Ok(BackendKind::File),
            other => Err(format!("unknown player backend '{other}' (expected queue or file)")),
        }
    }
}

/// Capability set of a media player.
///
/// Implementations are driven exclusively by the playback coordinator, one
/// call at a time. A new [`load_queue`](PlayerBackend::load_queue) supersedes
/// the previous queue; it never queues behind it.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::playback::{PlayerBackend, QueueId, Track};
///
/// async fn start(player: &dyn PlayerBackend) -> bridge_traits::error::Result<()> {
///     let tracks = vec![Track::remote("https://example.com/music/list/a.mp3")];
///     player.load_queue(QueueId::new(), &tracks).await?;
///     player.play().await
/// }
/// ```
#[async_trait]
pub trait PlayerBackend: Send + Sync {
    /// Backend family, used to decide whether a start watchdog is needed.
    fn kind(&self) -> BackendKind;

    /// Replace the current queue.
    ///
    /// File-backed implementations must have the scratch playlist fully
    /// written before this returns; a write failure is reported as
    /// [`BridgeError::Io`](crate::error::BridgeError::Io).
    async fn load_queue(&self, queue: QueueId, tracks: &[Track]) -> Result<()>;

    /// Start playing the loaded queue from its first track.
    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Stop playback and drop the current queue.
    async fn stop(&self) -> Result<()>;

    /// Skip to the next track. Playback continues even if it was paused.
    async fn advance(&self) -> Result<()>;

    /// Called once a `Started` event for the current queue has been
    /// processed. File-backed players remove their scratch playlist here.
    async fn confirm_started(&self) -> Result<()> {
        Ok(())
    }

    /// Terminate the underlying player process, if any.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
