//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (player, transport,
//! HTTP, mixer, clock) into the playback core and the remote link. On Linux
//! the `desktop-shims` feature (default) builds every adapter from a
//! [`ClientConfig`] via [`ServiceDependencies::desktop`]; tests pass their own.
//!
//! Running the service sweeps the offline cache, then runs the coordinator
//! and the remote link side by side until the coordinator stops. A fatal
//! playback error is returned to the caller, which is expected to exit.

pub mod error;

pub use error::{Result, ServiceError};

use std::future::Future;
use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    mixer::MixerControl,
    network::{RemoteTransport, TransportEventReceiver},
    playback::{PlayerBackend, PlayerEventReceiver},
    time::{Clock, SystemClock},
};
use core_playback::{CacheConfig, CacheStore, CoordinatorSettings, PlaybackCoordinator};
use core_remote::{LinkSettings, RemoteLink};
use core_runtime::config::ClientConfig;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{info, instrument, warn};

/// Aggregated handle to all bridge dependencies the core requires.
pub struct ServiceDependencies {
    pub player: Arc<dyn PlayerBackend>,
    /// Receiving end of the channel `player` reports into.
    pub player_events: PlayerEventReceiver,
    pub transport: Arc<dyn RemoteTransport>,
    /// Receiving end of the channel `transport` reports into.
    pub transport_events: TransportEventReceiver,
    pub http_client: Arc<dyn HttpClient>,
    pub mixer: Arc<dyn MixerControl>,
    pub clock: Arc<dyn Clock>,
}

#[cfg(feature = "desktop-shims")]
impl ServiceDependencies {
    /// Build the Linux adapters selected by `config`.
    pub fn desktop(config: &ClientConfig) -> Result<Self> {
        use bridge_desktop::{
            endpoint_url, AmixerControl, Mpg123Player, MpvOptions, MpvPlayer, ReqwestHttpClient,
            SocketIoTransport,
        };
        use bridge_traits::playback::BackendKind;
        use std::time::Duration;

        let (player_tx, player_events) = mpsc::unbounded_channel();
        let binary = config.player.resolved_binary();
        let player: Arc<dyn PlayerBackend> = match config.player.backend {
            BackendKind::Queue => Arc::new(Mpg123Player::new(binary, player_tx)),
            BackendKind::File => Arc::new(MpvPlayer::new(
                MpvOptions {
                    binary,
                    scratch_playlist: config.player.scratch_playlist.clone(),
                    ipc_socket: config.player.ipc_socket.clone(),
                },
                player_tx,
            )),
        };

        let (transport_tx, transport_events) = mpsc::unbounded_channel();
        let endpoint = endpoint_url(&config.remote.server_url, &config.remote.socket_path)?;
        let transport = Arc::new(SocketIoTransport::new(endpoint, transport_tx));

        let http_client = Arc::new(ReqwestHttpClient::with_redirects(
            config.cache.max_redirects,
            Duration::from_secs(10),
        )?);
        let mixer = Arc::new(AmixerControl::new(
            config.mixer.program.clone(),
            config.mixer.args.clone(),
        ));

        Ok(Self {
            player,
            player_events,
            transport,
            transport_events,
            http_client,
            mixer,
            clock: Arc::new(SystemClock),
        })
    }
}

/// Primary façade exposed to the binary.
pub struct CoreService {
    config: ClientConfig,
    deps: ServiceDependencies,
    events: EventBus,
}

impl CoreService {
    /// Create a new service from the provided dependencies.
    pub fn new(config: ClientConfig, deps: ServiceDependencies) -> Self {
        Self {
            config,
            deps,
            events: EventBus::default(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Bus carrying playback, cache and link events.
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Run until the coordinator stops on its own.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until the coordinator stops or `shutdown` completes.
    #[instrument(name = "service", skip_all, fields(device = %self.config.device_id))]
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            config,
            deps,
            events,
        } = self;

        let cache = Arc::new(CacheStore::new(
            CacheConfig::from(&config.cache),
            deps.http_client,
        ));
        startup_sweep(&cache, deps.clock.as_ref(), &events).await;

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (coordinator, handle) = PlaybackCoordinator::new(
            CoordinatorSettings::from_config(&config),
            deps.player,
            deps.player_events,
            deps.mixer,
            cache,
            notify_tx,
            events.clone(),
        );
        let link = RemoteLink::new(
            LinkSettings::from_config(&config),
            deps.transport,
            deps.transport_events,
            notify_rx,
            handle.clone(),
            events,
        );

        info!(
            backend = %config.player.backend,
            server = %config.remote.server_url,
            "Starting playback client"
        );
        let link_task = tokio::spawn(link.run());
        let mut coordinator_task = tokio::spawn(coordinator.run());

        tokio::pin!(shutdown);
        let coordinator_result = tokio::select! {
            result = &mut coordinator_task => result,
            _ = &mut shutdown => {
                info!("Shutting down");
                if handle.shutdown().is_err() {
                    warn!("Coordinator already stopped");
                }
                coordinator_task.await
            }
        };

        // The link ends once the coordinator's notification sender is gone.
        let link_result = link_task.await;

        coordinator_result.map_err(task_failed)??;
        match link_result.map_err(task_failed)? {
            Ok(()) => {}
            Err(e @ core_remote::RemoteError::CoordinatorStopped) => {
                warn!(error = %e, "Remote link ended with the coordinator");
            }
            Err(e) => return Err(e.into()),
        }
        info!("Playback client stopped");
        Ok(())
    }
}

/// Apply the retention rules before anything is played. A failing sweep
/// leaves the cache as it is.
async fn startup_sweep(cache: &CacheStore, clock: &dyn Clock, events: &EventBus) {
    match cache.sweep(clock).await {
        Ok(report) => events.publish(CoreEvent::Cache(CacheEvent::SweepCompleted {
            removed: report.removed + report.partials_removed,
            kept: report.kept,
            bytes_freed: report.bytes_freed,
        })),
        Err(e) => warn!(error = %e, "Startup cache sweep failed"),
    }
}

fn task_failed(e: JoinError) -> ServiceError {
    ServiceError::TaskFailed(e.to_string())
}

/// Build the Linux adapters for `config` and run until the coordinator stops.
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap(config: ClientConfig) -> Result<()> {
    let deps = ServiceDependencies::desktop(&config)?;
    CoreService::new(config, deps).run().await
}
