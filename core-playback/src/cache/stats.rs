//! Cache statistics and directory walking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::DirEntry;

/// Statistics about the offline cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of regular files under the root, partial downloads included
    pub file_count: usize,

    /// Total bytes of those files
    pub total_bytes: u64,
}

impl CacheStats {
    /// Walk `root` and total up every regular file. A missing root is an
    /// empty cache.
    pub async fn collect(root: &Path) -> io::Result<Self> {
        let files = list_files(root).await?;
        Ok(Self {
            file_count: files.len(),
            total_bytes: files.iter().map(|file| file.len).sum(),
        })
    }

    /// Calculate cache usage as a percentage of max size.
    pub fn usage_percentage(&self, max_size: u64) -> f64 {
        if max_size == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / max_size as f64) * 100.0
    }

    /// Returns true if no new download may start.
    pub fn is_full(&self, max_size: u64) -> bool {
        self.total_bytes >= max_size
    }
}

/// A file found under the cache root.
#[derive(Debug, Clone)]
pub struct CachedFile {
    pub path: PathBuf,
    pub len: u64,
    /// Birth time where the filesystem records one, otherwise last modification.
    pub born: DateTime<Utc>,
}

impl CachedFile {
    /// `.<name>.part` files left behind by an interrupted download.
    pub fn is_partial(&self) -> bool {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.') && name.ends_with(".part"))
    }
}

/// Every regular file below `root`, depth first.
pub(crate) async fn list_files(root: &Path) -> io::Result<Vec<CachedFile>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Some(mut entries) = skip_vanished(tokio::fs::read_dir(&dir).await)? else {
            continue;
        };
        while let Some(entry) = entries.next_entry().await? {
            let Some(meta) = entry_metadata(&entry).await? else {
                continue;
            };
            if meta.is_dir() {
                pending.push(entry.path());
            } else if meta.is_file() {
                let born = meta
                    .created()
                    .or_else(|_| meta.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                files.push(CachedFile {
                    path: entry.path(),
                    len: meta.len(),
                    born: DateTime::<Utc>::from(born),
                });
            }
        }
    }

    Ok(files)
}

/// Metadata for a walked entry, or `None` once a concurrent download has
/// renamed or removed it.
async fn entry_metadata(entry: &DirEntry) -> io::Result<Option<Metadata>> {
    skip_vanished(entry.metadata().await)
}

fn skip_vanished<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
