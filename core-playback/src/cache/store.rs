//! Background download of remote tracks into the cache.

use super::config::CacheConfig;
use super::stats::CacheStats;
use crate::error::CacheError;
use bridge_traits::http::HttpClient;
use bridge_traits::playback::Track;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

const CHUNK_SIZE: usize = 64 * 1024;
const UNGROUPED: &str = "ungrouped";

/// Result of a cache attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    Stored { path: PathBuf, bytes: u64 },
    Skipped(SkipReason),
}

/// Why a track was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Local tracks are already on disk.
    NotRemote,
    /// The display name cannot be used as a file name.
    InvalidName,
    /// A non-empty file already sits at the final path.
    AlreadyCached,
    /// Another download for the same path is running.
    InFlight,
    BudgetExhausted { used: u64, budget: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotRemote => f.write_str("track is local"),
            SkipReason::InvalidName => f.write_str("track name is not a usable file name"),
            SkipReason::AlreadyCached => f.write_str("already cached"),
            SkipReason::InFlight => f.write_str("download already in progress"),
            SkipReason::BudgetExhausted { used, budget } => {
                write!(f, "cache budget exhausted ({used} of {budget} bytes)")
            }
        }
    }
}

/// Writes remote tracks under the cache root.
pub struct CacheStore {
    config: CacheConfig,
    http: Arc<dyn HttpClient>,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl CacheStore {
    pub fn new(config: CacheConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Current usage of the cache root.
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        CacheStats::collect(&self.config.root)
            .await
            .map_err(|source| CacheError::Unavailable {
                path: self.config.root.clone(),
                source,
            })
    }

    /// Group directory name for a track URL: the configured path segment,
    /// or `ungrouped` when the URL has no such directory segment.
    pub fn group_for(&self, url: &str) -> String {
        let after_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
        let path = after_scheme.split(['?', '#']).next().unwrap_or(after_scheme);
        // Drop the host and the final (file name) segment.
        let segments: Vec<&str> = path.split('/').skip(1).collect();
        let directories = &segments[..segments.len().saturating_sub(1)];

        match directories.get(self.config.group_segment) {
            Some(segment) if is_usable_component(segment) => (*segment).to_string(),
            _ => UNGROUPED.to_string(),
        }
    }

    /// Final path a track would be cached at.
    pub fn destination_for(&self, track: &Track) -> Option<PathBuf> {
        let name = track.display_name();
        if !is_usable_component(name) {
            return None;
        }
        Some(
            self.config
                .root
                .join(self.group_for(track.source()))
                .join(name),
        )
    }

    /// Cache a remote track unless it is already present, another download
    /// for it is running, or the budget is used up.
    #[instrument(skip(self, track), fields(track = %track.display_name()))]
    pub async fn store_if_eligible(&self, track: &Track) -> Result<CacheOutcome, CacheError> {
        if !track.is_remote() {
            return Ok(CacheOutcome::Skipped(SkipReason::NotRemote));
        }

        let Some(destination) = self.destination_for(track) else {
            warn!("Cannot derive a cache file name");
            return Ok(CacheOutcome::Skipped(SkipReason::InvalidName));
        };

        if has_content(&destination).await {
            debug!(path = %destination.display(), "Already cached");
            return Ok(CacheOutcome::Skipped(SkipReason::AlreadyCached));
        }

        let stats = self.stats().await?;
        if stats.is_full(self.config.budget_bytes) {
            info!(
                used = stats.total_bytes,
                budget = self.config.budget_bytes,
                "Cache budget exhausted, not caching"
            );
            return Ok(CacheOutcome::Skipped(SkipReason::BudgetExhausted {
                used: stats.total_bytes,
                budget: self.config.budget_bytes,
            }));
        }

        let Some(_claim) = self.claim(&destination) else {
            debug!(path = %destination.display(), "Download already in progress");
            return Ok(CacheOutcome::Skipped(SkipReason::InFlight));
        };

        // destination always has a parent: root/group/name
        let group_dir = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.root.clone());
        tokio::fs::create_dir_all(&group_dir)
            .await
            .map_err(|source| CacheError::Unavailable {
                path: group_dir.clone(),
                source,
            })?;

        let partial = group_dir.join(format!(".{}.part", track.display_name()));
        let url = track.source();
        let downloaded = match timeout(
            self.config.download_timeout,
            self.download_to(url, &partial),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CacheError::Fetch {
                url: url.to_string(),
                message: format!("timed out after {:?}", self.config.download_timeout),
            }),
        };

        let bytes = match downloaded {
            Ok(bytes) => bytes,
            Err(e) => {
                discard_partial(&partial).await;
                return Err(e);
            }
        };

        if let Err(source) = tokio::fs::rename(&partial, &destination).await {
            discard_partial(&partial).await;
            return Err(CacheError::Io {
                path: destination,
                source,
            });
        }

        info!(bytes, path = %destination.display(), "Track cached");
        Ok(CacheOutcome::Stored {
            path: destination,
            bytes,
        })
    }

    async fn download_to(&self, url: &str, partial: &Path) -> Result<u64, CacheError> {
        let fetch_error = |message: String| CacheError::Fetch {
            url: url.to_string(),
            message,
        };
        let write_error = |source: io::Error| CacheError::Io {
            path: partial.to_path_buf(),
            source,
        };

        debug!(url, "Downloading track for cache");
        let mut body = self
            .http
            .download_stream(url.to_string())
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let mut file = File::create(partial).await.map_err(write_error)?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let read = body
                .read(&mut buf)
                .await
                .map_err(|e| fetch_error(e.to_string()))?;
            if read == 0 {
                break;
            }
            file.write_all(&buf[..read]).await.map_err(write_error)?;
            written += read as u64;
        }
        file.flush().await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;

        if written == 0 {
            return Err(fetch_error("empty response body".to_string()));
        }
        Ok(written)
    }

    fn claim(&self, path: &Path) -> Option<InFlightClaim<'_>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(path.to_path_buf()) {
            return None;
        }
        Some(InFlightClaim {
            in_flight: &self.in_flight,
            path: path.to_path_buf(),
        })
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

/// Marks a destination path as being written; released on drop.
struct InFlightClaim<'a> {
    in_flight: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.path);
    }
}

fn is_usable_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

async fn has_content(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len() > 0)
        .unwrap_or(false)
}

async fn discard_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => debug!(path = %partial.display(), "Removed partial download"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %partial.display(), error = %e, "Failed to remove partial download"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::DownloadStream;

    struct NoNetwork;

    #[async_trait]
    impl HttpClient for NoNetwork {
        async fn download_stream(&self, _url: String) -> BridgeResult<DownloadStream> {
            unreachable!("no download expected")
        }
    }

    fn store() -> CacheStore {
        CacheStore::new(CacheConfig::new("/srv/cache"), Arc::new(NoNetwork))
    }

    #[test]
    fn test_group_is_second_path_segment() {
        let store = store();
        assert_eq!(store.group_for("https://host/music/42/a.mp3"), "42");
        assert_eq!(store.group_for("https://host/music/42/deep/a.mp3"), "42");
        assert_eq!(store.group_for("http://host/music/7/a.mp3?token=1/2"), "7");
    }

    #[test]
    fn test_group_falls_back_when_segment_missing() {
        let store = store();
        assert_eq!(store.group_for("https://host/a.mp3"), UNGROUPED);
        assert_eq!(store.group_for("https://host/music/a.mp3"), UNGROUPED);
        assert_eq!(store.group_for("https://host/music/../a.mp3"), UNGROUPED);
    }

    #[test]
    fn test_destination_layout() {
        let store = store();
        let track = Track::remote("https://host/music/42/Spot.mp3");
        assert_eq!(
            store.destination_for(&track),
            Some(PathBuf::from("/srv/cache/42/Spot.mp3"))
        );
        assert_eq!(store.destination_for(&Track::new("..", "http://h/m/1/x", true)), None);
    }

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let store = store();
        let path = PathBuf::from("/srv/cache/42/a.mp3");
        let first = store.claim(&path);
        assert!(first.is_some());
        assert!(store.claim(&path).is_none());
        drop(first);
        assert!(store.claim(&path).is_some());
    }

    #[tokio::test]
    async fn test_local_tracks_are_skipped() {
        let outcome = store()
            .store_if_eligible(&Track::local("/srv/cache/42/a.mp3"))
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Skipped(SkipReason::NotRemote));
    }
}
