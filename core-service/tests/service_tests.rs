//! End-to-end wiring of the service with stand-in adapters.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{DownloadStream, HttpClient};
use bridge_traits::mixer::MixerControl;
use bridge_traits::network::{RemoteTransport, TransportEvent, TransportEventSender};
use bridge_traits::playback::{
    BackendKind, PlayerBackend, PlayerEvent, PlayerEventSender, PlayerFailure, QueueId, Track,
};
use bridge_traits::time::SystemClock;
use core_playback::PlaybackError;
use core_runtime::config::ClientConfig;
use core_runtime::events::{CacheEvent, CoreEvent, PlaybackEvent};
use core_service::{CoreService, ServiceDependencies, ServiceError};
use mockall::mock;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::{mpsc, oneshot};

mock! {
    pub Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn download_stream(&self, url: String) -> BridgeResult<DownloadStream>;
    }
}

mock! {
    pub Mixer {}

    #[async_trait]
    impl MixerControl for Mixer {
        async fn adjust_gain(&self, delta_db: i32) -> BridgeResult<()>;
    }
}

/// Player whose decoder dies as soon as playback starts.
struct CrashingPlayer {
    events: PlayerEventSender,
    queue: Mutex<Option<QueueId>>,
}

#[async_trait]
impl PlayerBackend for CrashingPlayer {
    fn kind(&self) -> BackendKind {
        BackendKind::Queue
    }

    async fn load_queue(&self, queue: QueueId, _tracks: &[Track]) -> BridgeResult<()> {
        *self.queue.lock().unwrap() = Some(queue);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        if let Some(queue) = *self.queue.lock().unwrap() {
            let _ = self.events.send(PlayerEvent::Errored {
                queue,
                cause: PlayerFailure::Backend("decoder crashed".into()),
            });
        }
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn resume(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn advance(&self) -> BridgeResult<()> {
        Ok(())
    }
}

/// Transport that connects as soon as it is opened.
struct LoopbackTransport {
    events: TransportEventSender,
    connected: AtomicBool,
    emitted: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteTransport for LoopbackTransport {
    async fn open(&self) -> BridgeResult<()> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Connected);
        }
        Ok(())
    }

    async fn emit(&self, event: &str, _args: Vec<Value>) -> BridgeResult<()> {
        self.emitted.lock().unwrap().push(event.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

struct Setup {
    deps: ServiceDependencies,
    transport: Arc<LoopbackTransport>,
    transport_tx: TransportEventSender,
}

fn setup() -> Setup {
    let (player_tx, player_events) = mpsc::unbounded_channel();
    let (transport_tx, transport_events) = mpsc::unbounded_channel();
    let transport = Arc::new(LoopbackTransport {
        events: transport_tx.clone(),
        connected: AtomicBool::new(false),
        emitted: Mutex::new(Vec::new()),
    });

    let deps = ServiceDependencies {
        player: Arc::new(CrashingPlayer {
            events: player_tx,
            queue: Mutex::new(None),
        }),
        player_events,
        transport: transport.clone(),
        transport_events,
        http_client: Arc::new(MockHttp::new()),
        mixer: Arc::new(MockMixer::new()),
        clock: Arc::new(SystemClock),
    };
    Setup {
        deps,
        transport,
        transport_tx,
    }
}

fn config(cache_root: &Path) -> ClientConfig {
    ClientConfig::builder()
        .device_id("0042")
        .cache_root(cache_root)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_startup_sweep_runs_before_playback() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("42")).unwrap();
    std::fs::write(dir.path().join("42/.a.mp3.part"), b"half").unwrap();
    std::fs::write(dir.path().join("42/b.mp3"), b"whole").unwrap();

    let Setup { deps, .. } = setup();
    let service = CoreService::new(config(dir.path()), deps);
    let mut events = service.events().subscribe();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(service.run_until(async {
        let _ = stop_rx.await;
    }));

    let swept = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(CoreEvent::Cache(CacheEvent::SweepCompleted { removed, kept, .. })) =
                events.recv().await
            {
                return (removed, kept);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(swept, (1, 1));
    assert!(!dir.path().join("42/.a.mp3.part").exists());

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_joins_room_once_connected() {
    let dir = tempdir().unwrap();
    let Setup {
        deps, transport, ..
    } = setup();
    let service = CoreService::new(config(dir.path()), deps);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(service.run_until(async {
        let _ = stop_rx.await;
    }));

    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.emitted.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(transport.emitted.lock().unwrap()[0], "joinRoom");

    stop_tx.send(()).unwrap();
    assert!(running.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_fatal_player_error_ends_the_service() {
    let dir = tempdir().unwrap();
    let Setup {
        deps, transport_tx, ..
    } = setup();
    let service = CoreService::new(config(dir.path()), deps);
    let mut events = service.events().subscribe();
    let running = tokio::spawn(service.run());

    transport_tx
        .send(TransportEvent::Message {
            event: "play".into(),
            args: vec![json!({ "playlist": ["https://h/music/42/a.mp3"] })],
        })
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Playback(PlaybackError::PlayerFailed(_))
    ));
    assert!(err.is_fatal());

    let mut saw_fatal = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, CoreEvent::Playback(PlaybackEvent::Fatal { .. })) {
            saw_fatal = true;
        }
    }
    assert!(saw_fatal);
}
