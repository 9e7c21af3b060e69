//! Turning a play request into the track list handed to the player.

use bridge_traits::playback::{QueueId, Track};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Payload of `play` and `shuffle`.
///
/// `playlist` is authoritative; `playlistLocal[i]`, when present, names a
/// cached copy of `playlist[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub playlist: Vec<String>,
    #[serde(rename = "playlistLocal", default)]
    pub playlist_local: Vec<String>,
}

impl QueueSpec {
    pub fn new(playlist: Vec<String>) -> Self {
        Self {
            playlist,
            playlist_local: Vec::new(),
        }
    }

    pub fn with_local(mut self, playlist_local: Vec<String>) -> Self {
        self.playlist_local = playlist_local;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.playlist.is_empty()
    }

    /// Build the track list, preferring a local copy wherever one exists and
    /// is non-empty.
    pub async fn resolve(&self) -> Vec<Track> {
        let mut tracks = Vec::with_capacity(self.playlist.len());
        for (index, locator) in self.playlist.iter().enumerate() {
            let local = self
                .playlist_local
                .get(index)
                .filter(|path| !path.is_empty());
            match local {
                Some(path) if has_content(path).await => {
                    debug!(index, path = %path, "Using cached copy");
                    tracks.push(Track::local(path));
                }
                _ => tracks.push(Track::from_locator(locator)),
            }
        }
        tracks
    }
}

async fn has_content(path: impl AsRef<Path>) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// The queue currently owned by the player.
#[derive(Debug, Clone)]
pub struct LoadedQueue {
    id: QueueId,
    tracks: Vec<Track>,
    playlist: Vec<String>,
    now_playing: Option<Track>,
}

impl LoadedQueue {
    pub fn new(tracks: Vec<Track>, playlist: Vec<String>) -> Self {
        Self {
            id: QueueId::new(),
            tracks,
            playlist,
            now_playing: None,
        }
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// The remote list as the server sent it.
    pub fn playlist(&self) -> &[String] {
        &self.playlist
    }

    pub fn now_playing(&self) -> Option<&Track> {
        self.now_playing.as_ref()
    }

    pub(crate) fn set_now_playing(&mut self, track: Track) {
        self.now_playing = Some(track);
    }
}
