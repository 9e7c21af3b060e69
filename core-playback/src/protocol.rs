//! Commands accepted by the coordinator and notifications it produces.
//!
//! The wire encoding lives with the remote link; these are the decoded forms.

use crate::queue::QueueSpec;
use bridge_traits::playback::Track;
use tokio::sync::mpsc;

/// A decoded command from the control server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    Play(QueueSpec),
    /// Same as play; the server already sent the list in shuffled order.
    Shuffle(QueueSpec),
    Stop,
    Pause,
    Resume,
    Next,
}

impl RemoteCommand {
    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCommand::Play(_) => "play",
            RemoteCommand::Shuffle(_) => "shuffle",
            RemoteCommand::Stop => "stop",
            RemoteCommand::Pause => "pause",
            RemoteCommand::Resume => "resume",
            RemoteCommand::Next => "next",
        }
    }
}

/// Status report sent back to the control server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Playing(Track),
    /// The queue played to its end; carries the remote list the server sent.
    PlaylistEnd(Vec<String>),
    Paused,
    Stopped,
    Resumed,
}

impl Notification {
    /// Wire event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::Playing(_) => "playing",
            Notification::PlaylistEnd(_) => "playlistEnd",
            Notification::Paused => "paused",
            Notification::Stopped => "stopped",
            Notification::Resumed => "resumed",
        }
    }
}

pub type NotificationSender = mpsc::UnboundedSender<Notification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Connection changes forwarded by the remote link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected { reason: String },
}
