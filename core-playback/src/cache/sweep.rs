//! Startup retention sweep.

use super::stats::{list_files, CachedFile};
use super::store::CacheStore;
use crate::error::CacheError;
use bridge_traits::time::Clock;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Expired files removed
    pub removed: usize,
    /// Leftover partial downloads removed
    pub partials_removed: usize,
    /// Files still in the cache afterwards
    pub kept: usize,
    pub bytes_freed: u64,
    /// The hard ceiling was exceeded and the whole cache was cleared
    pub ceiling_cleared: bool,
}

impl CacheStore {
    /// Remove partial downloads and expired files, then clear everything if
    /// the remainder is still above the hard ceiling. Runs before any
    /// playback so nothing is being written concurrently.
    ///
    /// Individual removal failures are logged and skipped.
    #[instrument(skip(self, clock), fields(root = %self.root().display()))]
    pub async fn sweep(&self, clock: &dyn Clock) -> Result<SweepReport, CacheError> {
        let root = self.root().to_path_buf();
        let unavailable = |source: io::Error| CacheError::Unavailable {
            path: root.clone(),
            source,
        };

        let now = clock.now();
        let retention = self.config().retention;
        let mut report = SweepReport::default();
        let mut kept: Vec<CachedFile> = Vec::new();

        for file in list_files(&root).await.map_err(unavailable)? {
            if file.is_partial() {
                if remove(&file).await {
                    report.partials_removed += 1;
                    report.bytes_freed += file.len;
                }
            } else if retention.is_expired(file.born, now) {
                if remove(&file).await {
                    debug!(path = %file.path.display(), born = %file.born, "Removed expired file");
                    report.removed += 1;
                    report.bytes_freed += file.len;
                } else {
                    kept.push(file);
                }
            } else {
                kept.push(file);
            }
        }

        let remaining: u64 = kept.iter().map(|file| file.len).sum();
        if let Some(ceiling) = self.config().hard_ceiling_bytes {
            if remaining > ceiling {
                warn!(remaining, ceiling, "Cache above hard ceiling, clearing it");
                report.ceiling_cleared = true;
                let mut survivors = Vec::new();
                for file in kept {
                    if remove(&file).await {
                        report.removed += 1;
                        report.bytes_freed += file.len;
                    } else {
                        survivors.push(file);
                    }
                }
                kept = survivors;
            }
        }
        report.kept = kept.len();

        remove_empty_groups(&root).await;

        info!(
            removed = report.removed,
            partials = report.partials_removed,
            kept = report.kept,
            bytes_freed = report.bytes_freed,
            policy = %retention.description(),
            "Cache sweep finished"
        );
        Ok(report)
    }
}

async fn remove(file: &CachedFile) -> bool {
    match tokio::fs::remove_file(&file.path).await {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            error!(path = %file.path.display(), error = %e, "Failed to remove cached file");
            false
        }
    }
}

async fn remove_empty_groups(root: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(root).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_dir = entry
            .file_type()
            .await
            .map(|kind| kind.is_dir())
            .unwrap_or(false);
        // remove_dir refuses non-empty directories
        if is_dir && tokio::fs::remove_dir(entry.path()).await.is_ok() {
            debug!(group = %entry.path().display(), "Removed empty group directory");
        }
    }
}
