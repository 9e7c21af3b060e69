//! Tests for the offline cache store and the startup sweep
//!
//! Downloads come from a `mockall` HTTP client; the filesystem is a temp dir.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{DownloadStream, HttpClient};
use bridge_traits::playback::Track;
use bridge_traits::time::FixedClock;
use chrono::{Duration as ChronoDuration, Utc};
use core_playback::{
    CacheConfig, CacheError, CacheOutcome, CacheStats, CacheStore, RetentionPolicy, SkipReason,
};
use mockall::mock;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Notify;

mock! {
    pub Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn download_stream(&self, url: String) -> BridgeResult<DownloadStream>;
    }
}

const URL: &str = "https://media.example.org/music/42/Morning.mp3";

fn body(bytes: usize) -> BridgeResult<DownloadStream> {
    Ok(Box::new(io::Cursor::new(vec![1u8; bytes])))
}

fn store(root: &Path, http: MockHttp) -> CacheStore {
    CacheStore::new(CacheConfig::new(root), Arc::new(http))
}

fn write(path: &Path, len: usize) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, vec![0u8; len]).unwrap();
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Reader that yields some bytes and then fails, like a dropped connection.
struct Truncated {
    sent: bool,
}

impl AsyncRead for Truncated {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.sent {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )))
        } else {
            self.sent = true;
            buf.put_slice(&[9u8; 512]);
            Poll::Ready(Ok(()))
        }
    }
}

// ============================================================================
// Store
// ============================================================================

#[tokio::test]
async fn test_store_writes_under_group_and_grows_total() {
    let dir = tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_download_stream().times(1).returning(|_| body(4096));
    let store = store(dir.path(), http);

    let before = store.stats().await.unwrap().total_bytes;
    let outcome = store.store_if_eligible(&Track::remote(URL)).await.unwrap();

    let final_path = dir.path().join("42").join("Morning.mp3");
    assert_eq!(
        outcome,
        CacheOutcome::Stored {
            path: final_path.clone(),
            bytes: 4096
        }
    );
    assert_eq!(std::fs::metadata(&final_path).unwrap().len(), 4096);
    assert_eq!(entries(&dir.path().join("42")), vec!["Morning.mp3"]);
    assert_eq!(store.stats().await.unwrap().total_bytes, before + 4096);
}

#[tokio::test]
async fn test_existing_file_is_not_downloaded_again() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("42/Morning.mp3"), 10);

    let mut http = MockHttp::new();
    http.expect_download_stream().never();
    let store = store(dir.path(), http);

    let outcome = store.store_if_eligible(&Track::remote(URL)).await.unwrap();
    assert_eq!(outcome, CacheOutcome::Skipped(SkipReason::AlreadyCached));
}

#[tokio::test]
async fn test_empty_leftover_is_replaced() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("42/Morning.mp3"), 0);

    let mut http = MockHttp::new();
    http.expect_download_stream().times(1).returning(|_| body(100));
    let store = store(dir.path(), http);

    assert!(matches!(
        store.store_if_eligible(&Track::remote(URL)).await.unwrap(),
        CacheOutcome::Stored { bytes: 100, .. }
    ));
}

#[tokio::test]
async fn test_budget_blocks_new_downloads() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("7/older.mp3"), 1000);

    let mut http = MockHttp::new();
    http.expect_download_stream().never();
    let store = CacheStore::new(
        CacheConfig::new(dir.path()).with_budget(1000),
        Arc::new(http),
    );

    let outcome = store.store_if_eligible(&Track::remote(URL)).await.unwrap();
    assert_eq!(
        outcome,
        CacheOutcome::Skipped(SkipReason::BudgetExhausted {
            used: 1000,
            budget: 1000
        })
    );
    assert!(!dir.path().join("42").exists());
}

#[tokio::test]
async fn test_http_error_leaves_no_file() {
    let dir = tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_download_stream().times(1).returning(|url| {
        Err(BridgeError::HttpStatus {
            status: 404,
            url,
        })
    });
    let store = store(dir.path(), http);

    let err = store
        .store_if_eligible(&Track::remote(URL))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Fetch { .. }));
    assert!(!err.is_fatal());
    assert!(entries(&dir.path().join("42")).is_empty());
}

#[tokio::test]
async fn test_interrupted_download_removes_partial_file() {
    let dir = tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_download_stream()
        .times(1)
        .returning(|_| Ok(Box::new(Truncated { sent: false })));
    let store = store(dir.path(), http);

    let err = store
        .store_if_eligible(&Track::remote(URL))
        .await
        .unwrap_err();
    assert!(err.is_network_error());
    assert!(entries(&dir.path().join("42")).is_empty());
}

#[tokio::test]
async fn test_empty_body_is_rejected() {
    let dir = tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_download_stream().times(1).returning(|_| body(0));
    let store = store(dir.path(), http);

    assert!(store.store_if_eligible(&Track::remote(URL)).await.is_err());
    assert!(!dir.path().join("42/Morning.mp3").exists());
}

#[tokio::test]
async fn test_concurrent_store_of_same_track_downloads_once() {
    struct Gated {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl HttpClient for Gated {
        async fn download_stream(&self, _url: String) -> BridgeResult<DownloadStream> {
            self.gate.notified().await;
            body(64)
        }
    }

    let dir = tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let store = Arc::new(CacheStore::new(
        CacheConfig::new(dir.path()),
        Arc::new(Gated {
            gate: Arc::clone(&gate),
        }),
    ));

    let first = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.store_if_eligible(&Track::remote(URL)).await })
    };
    // Let the first attempt claim the path and block on the gate.
    while !dir.path().join("42").exists() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = store.store_if_eligible(&Track::remote(URL)).await.unwrap();
    assert_eq!(second, CacheOutcome::Skipped(SkipReason::InFlight));

    gate.notify_one();
    assert!(matches!(
        first.await.unwrap().unwrap(),
        CacheOutcome::Stored { bytes: 64, .. }
    ));
}

#[tokio::test]
async fn test_url_without_group_segment_goes_to_ungrouped() {
    let dir = tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_download_stream().times(1).returning(|_| body(8));
    let store = store(dir.path(), http);

    store
        .store_if_eligible(&Track::remote("https://media.example.org/jingle.mp3"))
        .await
        .unwrap();
    assert!(dir.path().join("ungrouped/jingle.mp3").exists());
}

// ============================================================================
// Sweep
// ============================================================================

#[tokio::test]
async fn test_sweep_keeps_current_month_files() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("42/a.mp3"), 10);
    write(&dir.path().join("42/b.mp3"), 20);

    let store = store(dir.path(), MockHttp::new());
    let report = store.sweep(&FixedClock(Utc::now())).await.unwrap();

    assert_eq!(report.removed, 0);
    assert_eq!(report.kept, 2);
    assert!(!report.ceiling_cleared);
    assert_eq!(entries(&dir.path().join("42")), vec!["a.mp3", "b.mp3"]);
}

#[tokio::test]
async fn test_sweep_removes_files_from_earlier_months() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("42/a.mp3"), 10);
    write(&dir.path().join("7/b.mp3"), 20);

    let store = store(dir.path(), MockHttp::new());
    // Two months on, everything written today is from an earlier month.
    let later = Utc::now() + ChronoDuration::days(62);
    let report = store.sweep(&FixedClock(later)).await.unwrap();

    assert_eq!(report.removed, 2);
    assert_eq!(report.kept, 0);
    assert_eq!(report.bytes_freed, 30);
    // Empty group directories go too.
    assert!(entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_sweep_with_max_age_policy() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("42/a.mp3"), 10);

    let store = CacheStore::new(
        CacheConfig::new(dir.path())
            .with_retention(RetentionPolicy::MaxAge(Duration::from_secs(7 * 86_400))),
        Arc::new(MockHttp::new()),
    );

    let soon = Utc::now() + ChronoDuration::days(3);
    assert_eq!(store.sweep(&FixedClock(soon)).await.unwrap().removed, 0);

    let later = Utc::now() + ChronoDuration::days(8);
    assert_eq!(store.sweep(&FixedClock(later)).await.unwrap().removed, 1);
}

#[tokio::test]
async fn test_sweep_removes_partial_downloads() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("42/a.mp3"), 10);
    write(&dir.path().join("42/.b.mp3.part"), 5);

    let store = store(dir.path(), MockHttp::new());
    let report = store.sweep(&FixedClock(Utc::now())).await.unwrap();

    assert_eq!(report.partials_removed, 1);
    assert_eq!(report.kept, 1);
    assert_eq!(entries(&dir.path().join("42")), vec!["a.mp3"]);
}

#[tokio::test]
async fn test_sweep_clears_everything_above_hard_ceiling() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("42/a.mp3"), 600);
    write(&dir.path().join("7/b.mp3"), 600);

    let store = CacheStore::new(
        CacheConfig::new(dir.path())
            .with_budget(1000)
            .with_hard_ceiling(Some(1000)),
        Arc::new(MockHttp::new()),
    );
    let report = store.sweep(&FixedClock(Utc::now())).await.unwrap();

    assert!(report.ceiling_cleared);
    assert_eq!(report.removed, 2);
    assert_eq!(report.kept, 0);
    assert_eq!(
        CacheStats::collect(dir.path()).await.unwrap(),
        CacheStats::default()
    );
}

#[tokio::test]
async fn test_sweep_of_missing_root_is_empty() {
    let dir = tempdir().unwrap();
    let store = store(&dir.path().join("never-created"), MockHttp::new());
    let report = store.sweep(&FixedClock(Utc::now())).await.unwrap();
    assert_eq!(report, Default::default());
}
