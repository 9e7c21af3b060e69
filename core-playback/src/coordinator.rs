//! # Playback Coordinator
//!
//! Single task that owns the device state and serializes everything that can
//! change it: remote commands, player events, the start watchdog, the skip
//! grace timer and background cache results all arrive as
//! [`CoordinatorInput`]s and are handled one at a time.
//!
//! ## State machine
//!
//! ```text
//!            play/shuffle              started
//!   Idle ──────────────────► Fetching ─────────► Playing ◄──┐
//!    ▲                         ▲   │                │ pause  │ resume
//!    │ stop / end of queue     │   │ watchdog       ▼        │
//!    └─────────────────────────┼───┘ (re-load)    Paused ────┘
//!                              └──── next (from Playing or Paused)
//! ```
//!
//! While a load or skip is in flight the busy guard is set and further
//! `play`, `shuffle` and `next` commands are dropped.
//!
//! Each loaded queue gets a fresh [`QueueId`]; player events, watchdog ticks
//! and skip deadlines for any other id are discarded.
//!
//! ## Failure policy
//!
//! Handlers return `Err` only for conditions that end the process: a failing
//! player control call, a backend error event other than end of queue, a
//! mixer that cannot be launched, or a local write failure in the cache.
//! Everything else is logged and playback continues.

use crate::cache::{CacheOutcome, CacheStore};
use crate::error::{CacheError, PlaybackError, Result};
use crate::gain::GainRule;
use crate::protocol::{LinkStatus, Notification, NotificationSender, RemoteCommand};
use crate::queue::{LoadedQueue, QueueSpec};
use crate::state::{CommandGuard, DeviceState};
use bridge_traits::mixer::MixerControl;
use bridge_traits::playback::{PlayerBackend, PlayerEvent, PlayerEventReceiver, PlayerFailure, QueueId, Track};
use core_runtime::config::ClientConfig;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus, PlaybackEvent};
use core_runtime::tasks::ScheduledTask;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Timing and identity knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Device identifier included in log lines.
    pub device_id: String,
    /// Re-issue interval for loads that never report a start (file-backed players only).
    pub watchdog_interval: Duration,
    /// Delay between pausing and advancing on `next`.
    pub advance_grace: Duration,
    pub gain: GainRule,
}

impl CoordinatorSettings {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            watchdog_interval: Duration::from_secs(15),
            advance_grace: Duration::from_secs(2),
            gain: GainRule::default(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            device_id: config.device_id.clone(),
            watchdog_interval: config.player.watchdog_interval,
            advance_grace: config.player.advance_grace,
            gain: GainRule::from_settings(&config.mixer),
        }
    }
}

/// Everything the coordinator reacts to.
#[derive(Debug)]
pub enum CoordinatorInput {
    Command(RemoteCommand),
    Player(PlayerEvent),
    /// Start watchdog tick for a queue.
    WatchdogFired(QueueId),
    /// Skip grace delay elapsed for a queue.
    AdvanceDue(QueueId),
    /// A background cache attempt finished.
    CacheFinished {
        track: Track,
        result: std::result::Result<CacheOutcome, CacheError>,
    },
    Link(LinkStatus),
    Shutdown,
}

/// Cloneable sender side of the coordinator inbox.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    inbox: mpsc::UnboundedSender<CoordinatorInput>,
}

impl CoordinatorHandle {
    /// Wrap an existing inbox sender.
    pub fn new(inbox: mpsc::UnboundedSender<CoordinatorInput>) -> Self {
        Self { inbox }
    }

    pub fn send(&self, input: CoordinatorInput) -> Result<()> {
        self.inbox
            .send(input)
            .map_err(|_| PlaybackError::CoordinatorStopped)
    }

    pub fn command(&self, command: RemoteCommand) -> Result<()> {
        self.send(CoordinatorInput::Command(command))
    }

    pub fn link_status(&self, status: LinkStatus) -> Result<()> {
        self.send(CoordinatorInput::Link(status))
    }

    /// Ask the coordinator to stop the player and return from `run`.
    pub fn shutdown(&self) -> Result<()> {
        self.send(CoordinatorInput::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

/// The playback state machine.
pub struct PlaybackCoordinator {
    settings: CoordinatorSettings,
    player: Arc<dyn PlayerBackend>,
    mixer: Arc<dyn MixerControl>,
    cache: Arc<CacheStore>,
    notifier: NotificationSender,
    events: EventBus,

    state: DeviceState,
    guard: CommandGuard,
    queue: Option<LoadedQueue>,
    watchdog: ScheduledTask,
    advance: ScheduledTask,

    inbox_tx: mpsc::UnboundedSender<CoordinatorInput>,
    inbox_rx: mpsc::UnboundedReceiver<CoordinatorInput>,
    player_events: PlayerEventReceiver,
}

impl PlaybackCoordinator {
    /// Create the coordinator and the handle used to feed it.
    ///
    /// `player_events` must be the receiving end of the channel `player`
    /// reports into.
    pub fn new(
        settings: CoordinatorSettings,
        player: Arc<dyn PlayerBackend>,
        player_events: PlayerEventReceiver,
        mixer: Arc<dyn MixerControl>,
        cache: Arc<CacheStore>,
        notifier: NotificationSender,
        events: EventBus,
    ) -> (Self, CoordinatorHandle) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let handle = CoordinatorHandle {
            inbox: inbox_tx.clone(),
        };
        let coordinator = Self {
            settings,
            player,
            mixer,
            cache,
            notifier,
            events,
            state: DeviceState::Idle,
            guard: CommandGuard::default(),
            queue: None,
            watchdog: ScheduledTask::new("start-watchdog"),
            advance: ScheduledTask::new("advance-grace"),
            inbox_tx,
            inbox_rx,
            player_events,
        };
        (coordinator, handle)
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            inbox: self.inbox_tx.clone(),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Whether a load or skip is in flight.
    pub fn is_busy(&self) -> bool {
        self.guard.is_set()
    }

    pub fn current_queue(&self) -> Option<&LoadedQueue> {
        self.queue.as_ref()
    }

    pub fn watchdog_active(&self) -> bool {
        self.watchdog.is_active()
    }

    /// Process inputs until shutdown or a fatal error.
    #[instrument(name = "coordinator", skip_all, fields(device = %self.settings.device_id))]
    pub async fn run(mut self) -> Result<()> {
        info!(backend = %self.player.kind(), "Playback coordinator started");

        let outcome = loop {
            match self.step().await {
                Ok(true) => continue,
                Ok(false) => break Ok(()),
                Err(e) => {
                    error!(error = %e, "Fatal playback error");
                    self.events.publish(CoreEvent::Playback(PlaybackEvent::Fatal {
                        message: e.to_string(),
                    }));
                    break Err(e);
                }
            }
        };

        self.teardown().await;
        outcome
    }

    /// Wait for the next input and handle it. Returns `Ok(false)` once a
    /// shutdown was requested or every input source is closed.
    pub async fn step(&mut self) -> Result<bool> {
        let input = tokio::select! {
            Some(input) = self.inbox_rx.recv() => input,
            Some(event) = self.player_events.recv() => CoordinatorInput::Player(event),
            else => return Ok(false),
        };

        if matches!(input, CoordinatorInput::Shutdown) {
            info!("Shutdown requested");
            return Ok(false);
        }
        self.handle_input(input).await?;
        Ok(true)
    }

    /// Handle a single input.
    pub async fn handle_input(&mut self, input: CoordinatorInput) -> Result<()> {
        match input {
            CoordinatorInput::Command(command) => self.handle_command(command).await,
            CoordinatorInput::Player(event) => self.handle_player_event(event).await,
            CoordinatorInput::WatchdogFired(queue) => self.handle_watchdog(queue).await,
            CoordinatorInput::AdvanceDue(queue) => self.handle_advance_due(queue).await,
            CoordinatorInput::CacheFinished { track, result } => {
                self.handle_cache_result(track, result)
            }
            CoordinatorInput::Link(status) => {
                self.handle_link_status(status);
                Ok(())
            }
            CoordinatorInput::Shutdown => Ok(()),
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    async fn handle_command(&mut self, command: RemoteCommand) -> Result<()> {
        debug!(command = command.name(), state = %self.state, "Received command");
        match command {
            RemoteCommand::Play(spec) => self.start_queue("play", spec).await,
            RemoteCommand::Shuffle(spec) => self.start_queue("shuffle", spec).await,
            RemoteCommand::Stop => self.stop().await,
            RemoteCommand::Pause => self.pause().await,
            RemoteCommand::Resume => self.resume().await,
            RemoteCommand::Next => self.next().await,
        }
    }

    async fn start_queue(&mut self, command: &'static str, spec: QueueSpec) -> Result<()> {
        if self.guard.is_set() {
            self.ignore(command, "still fetching song to play");
            return Ok(());
        }
        if spec.is_empty() {
            self.ignore(command, "playlist is empty");
            return Ok(());
        }

        if self.state.has_queue() {
            info!(command, tracks = spec.playlist.len(), "Restarting with new playlist");
            self.cancel_timers();
            self.player
                .stop()
                .await
                .map_err(PlaybackError::player("stop"))?;
        } else {
            info!(command, tracks = spec.playlist.len(), "Received request to play");
        }

        let tracks = spec.resolve().await;
        let queue = LoadedQueue::new(tracks, spec.playlist);
        let queue_id = queue.id();

        self.guard.set();
        self.queue = Some(queue);
        self.set_state(DeviceState::Fetching);
        self.load_current().await?;

        if self.player.kind().requires_watchdog() {
            self.arm_watchdog(queue_id);
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.state.has_queue() {
            self.ignore("stop", "already stopped");
            return Ok(());
        }

        info!("Stopping playback");
        self.cancel_timers();
        self.player
            .stop()
            .await
            .map_err(PlaybackError::player("stop"))?;
        self.guard.clear();
        self.queue = None;
        self.set_state(DeviceState::Idle);
        self.notify(Notification::Stopped);
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        match self.state {
            DeviceState::Playing => {
                info!("Pausing playback");
                self.player
                    .pause()
                    .await
                    .map_err(PlaybackError::player("pause"))?;
                self.set_state(DeviceState::Paused);
                self.notify(Notification::Paused);
            }
            DeviceState::Paused => self.ignore("pause", "already paused"),
            DeviceState::Idle | DeviceState::Fetching => self.ignore("pause", "nothing playing"),
        }
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        match self.state {
            DeviceState::Paused => {
                info!("Resuming playback");
                self.player
                    .resume()
                    .await
                    .map_err(PlaybackError::player("resume"))?;
                self.set_state(DeviceState::Playing);
                self.notify(Notification::Resumed);
            }
            DeviceState::Playing => self.ignore("resume", "already playing"),
            DeviceState::Idle | DeviceState::Fetching => self.ignore("resume", "nothing paused"),
        }
        Ok(())
    }

    async fn next(&mut self) -> Result<()> {
        if self.guard.is_set() {
            self.ignore("next", "still fetching song to play");
            return Ok(());
        }
        let Some(queue_id) = self.queue.as_ref().map(LoadedQueue::id) else {
            self.ignore("next", "nothing playing");
            return Ok(());
        };

        info!(grace = ?self.settings.advance_grace, "Received request to skip");
        self.guard.set();
        self.player
            .pause()
            .await
            .map_err(PlaybackError::player("pause"))?;
        self.set_state(DeviceState::Fetching);

        let inbox = self.inbox_tx.clone();
        self.advance.start_once(self.settings.advance_grace, async move {
            let _ = inbox.send(CoordinatorInput::AdvanceDue(queue_id));
        });
        Ok(())
    }

    // ========================================================================
    // Timers
    // ========================================================================

    async fn handle_advance_due(&mut self, queue_id: QueueId) -> Result<()> {
        if !self.is_current(queue_id) || self.state != DeviceState::Fetching {
            debug!(queue = %queue_id, "Dropping stale advance");
            return Ok(());
        }
        debug!("Advancing to next track");
        self.player
            .advance()
            .await
            .map_err(PlaybackError::player("advance"))
    }

    async fn handle_watchdog(&mut self, queue_id: QueueId) -> Result<()> {
        if !self.is_current(queue_id) || self.state != DeviceState::Fetching {
            debug!(queue = %queue_id, "Dropping stale watchdog tick");
            return Ok(());
        }
        warn!(
            interval = ?self.settings.watchdog_interval,
            "Playback has not started, re-issuing load"
        );
        self.load_current().await
    }

    fn arm_watchdog(&mut self, queue_id: QueueId) {
        let inbox = self.inbox_tx.clone();
        self.watchdog
            .start_repeating(self.settings.watchdog_interval, move || {
                let inbox = inbox.clone();
                async move { inbox.send(CoordinatorInput::WatchdogFired(queue_id)).is_ok() }
            });
    }

    fn cancel_timers(&mut self) {
        if self.watchdog.cancel() {
            debug!("Start watchdog cancelled");
        }
        if self.advance.cancel() {
            debug!("Pending advance cancelled");
        }
    }

    // ========================================================================
    // Player events
    // ========================================================================

    async fn handle_player_event(&mut self, event: PlayerEvent) -> Result<()> {
        let queue_id = event.queue_id();
        if !self.is_current(queue_id) {
            match &event {
                PlayerEvent::Errored {
                    cause: PlayerFailure::Backend(message),
                    ..
                } => warn!(queue = %queue_id, error = %message, "Error from superseded queue"),
                _ => debug!(queue = %queue_id, ?event, "Dropping stale player event"),
            }
            return Ok(());
        }

        match event {
            PlayerEvent::Started { track, .. } => self.on_started(track).await,
            PlayerEvent::Ended {
                track, exhausted, ..
            } => {
                let title = track.as_ref().map(|t| t.display_name().to_string());
                if exhausted {
                    self.finish_queue();
                } else {
                    info!(track = ?title, "Play done, switching to next one");
                }
                Ok(())
            }
            PlayerEvent::Errored { cause, .. } => match cause {
                PlayerFailure::EndOfQueue => {
                    self.finish_queue();
                    Ok(())
                }
                PlayerFailure::Backend(message) => Err(PlaybackError::PlayerFailed(message)),
            },
            PlayerEvent::Paused { .. } => {
                debug!("Player confirmed pause");
                Ok(())
            }
            PlayerEvent::Resumed { .. } => {
                debug!("Player confirmed resume");
                Ok(())
            }
            PlayerEvent::Stopped { .. } => {
                debug!("Player went idle");
                Ok(())
            }
        }
    }

    async fn on_started(&mut self, track: Track) -> Result<()> {
        self.guard.clear();
        if self.watchdog.cancel() {
            debug!("Start watchdog cancelled");
        }
        self.player
            .confirm_started()
            .await
            .map_err(PlaybackError::player("confirm_started"))?;

        info!(track = %track.display_name(), remote = track.is_remote(), "Playing");
        if let Some(queue) = self.queue.as_mut() {
            queue.set_now_playing(track.clone());
        }
        self.set_state(DeviceState::Playing);
        self.events
            .publish(CoreEvent::Playback(PlaybackEvent::TrackStarted {
                title: track.display_name().to_string(),
                source: track.source().to_string(),
            }));
        self.notify(Notification::Playing(track.clone()));

        self.apply_gain(&track).await?;

        if track.is_remote() {
            self.submit_to_cache(track);
        }
        Ok(())
    }

    async fn apply_gain(&self, track: &Track) -> Result<()> {
        let delta = self.settings.gain.delta_for(track);
        match self.mixer.adjust_gain(delta).await {
            Ok(()) => {
                debug!(delta_db = delta, "Gain adjusted");
                Ok(())
            }
            Err(e) if e.is_local_io() => Err(PlaybackError::Mixer(e)),
            Err(e) => {
                warn!(delta_db = delta, error = %e, "Gain adjustment failed");
                Ok(())
            }
        }
    }

    fn finish_queue(&mut self) {
        let Some(queue) = self.queue.take() else {
            return;
        };
        info!(tracks = queue.tracks().len(), "Reached end of playlist");
        self.cancel_timers();
        self.guard.clear();
        self.set_state(DeviceState::Idle);
        self.events
            .publish(CoreEvent::Playback(PlaybackEvent::QueueEnded {
                tracks: queue.tracks().len(),
            }));
        self.notify(Notification::PlaylistEnd(queue.playlist().to_vec()));
    }

    // ========================================================================
    // Cache
    // ========================================================================

    fn submit_to_cache(&self, track: Track) {
        let cache = Arc::clone(&self.cache);
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = cache.store_if_eligible(&track).await;
            let _ = inbox.send(CoordinatorInput::CacheFinished { track, result });
        });
    }

    fn handle_cache_result(
        &self,
        track: Track,
        result: std::result::Result<CacheOutcome, CacheError>,
    ) -> Result<()> {
        let name = track.display_name().to_string();
        match result {
            Ok(CacheOutcome::Stored { path, bytes }) => {
                self.events.publish(CoreEvent::Cache(CacheEvent::Stored {
                    path: path.display().to_string(),
                    bytes,
                }));
                Ok(())
            }
            Ok(CacheOutcome::Skipped(reason)) => {
                debug!(track = %name, %reason, "Track not cached");
                self.events.publish(CoreEvent::Cache(CacheEvent::Skipped {
                    track: name,
                    reason: reason.to_string(),
                }));
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(PlaybackError::Cache(e)),
            Err(e) => {
                warn!(track = %name, error = %e, "Caching failed");
                self.events.publish(CoreEvent::Cache(CacheEvent::Failed {
                    track: name,
                    message: e.to_string(),
                }));
                Ok(())
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn handle_link_status(&self, status: LinkStatus) {
        match status {
            LinkStatus::Connected => info!(state = %self.state, "Control server connected"),
            LinkStatus::Disconnected { reason } => {
                warn!(%reason, state = %self.state, "Control server disconnected, playback continues")
            }
        }
    }

    async fn load_current(&self) -> Result<()> {
        let Some(queue) = self.queue.as_ref() else {
            return Err(PlaybackError::Internal("no queue to load".to_string()));
        };
        self.player
            .load_queue(queue.id(), queue.tracks())
            .await
            .map_err(PlaybackError::player("load_queue"))?;
        self.player
            .play()
            .await
            .map_err(PlaybackError::player("play"))
    }

    fn is_current(&self, queue_id: QueueId) -> bool {
        self.queue.as_ref().is_some_and(|queue| queue.id() == queue_id)
    }

    fn set_state(&mut self, next: DeviceState) {
        if self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, "State changed");
        self.events
            .publish(CoreEvent::Playback(PlaybackEvent::StateChanged {
                from: self.state.to_string(),
                to: next.to_string(),
            }));
        self.state = next;
    }

    fn ignore(&self, command: &'static str, reason: &str) {
        info!(command, reason, state = %self.state, "Command ignored");
        self.events
            .publish(CoreEvent::Playback(PlaybackEvent::CommandIgnored {
                command: command.to_string(),
                reason: reason.to_string(),
            }));
    }

    fn notify(&self, notification: Notification) {
        let event = notification.event_name();
        if self.notifier.send(notification).is_err() {
            debug!(event, "Remote link gone, dropping notification");
        }
    }

    async fn teardown(&mut self) {
        self.cancel_timers();
        if let Err(e) = self.player.shutdown().await {
            warn!(error = %e, "Player shutdown failed");
        }
        info!("Playback coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{DownloadStream, HttpClient};
    use bridge_traits::playback::BackendKind;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CallLog(Mutex<Vec<&'static str>>);

    struct LoggingPlayer {
        calls: Arc<CallLog>,
    }

    #[async_trait]
    impl PlayerBackend for LoggingPlayer {
        fn kind(&self) -> BackendKind {
            BackendKind::Queue
        }
        async fn load_queue(&self, _queue: QueueId, _tracks: &[Track]) -> BridgeResult<()> {
            self.calls.0.lock().push("load");
            Ok(())
        }
        async fn play(&self) -> BridgeResult<()> {
            self.calls.0.lock().push("play");
            Ok(())
        }
        async fn pause(&self) -> BridgeResult<()> {
            self.calls.0.lock().push("pause");
            Ok(())
        }
        async fn resume(&self) -> BridgeResult<()> {
            self.calls.0.lock().push("resume");
            Ok(())
        }
        async fn stop(&self) -> BridgeResult<()> {
            self.calls.0.lock().push("stop");
            Ok(())
        }
        async fn advance(&self) -> BridgeResult<()> {
            self.calls.0.lock().push("advance");
            Ok(())
        }
    }

    struct SilentMixer;

    #[async_trait]
    impl MixerControl for SilentMixer {
        async fn adjust_gain(&self, _delta_db: i32) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NoNetwork;

    #[async_trait]
    impl HttpClient for NoNetwork {
        async fn download_stream(&self, url: String) -> BridgeResult<DownloadStream> {
            Err(bridge_traits::BridgeError::NotAvailable(url))
        }
    }

    fn coordinator() -> (PlaybackCoordinator, Arc<CallLog>) {
        let calls = Arc::new(CallLog::default());
        let (_player_tx, player_rx) = mpsc::unbounded_channel();
        let (notify_tx, _notify_rx) = mpsc::unbounded_channel();
        let cache = CacheStore::new(CacheConfig::new("/nonexistent"), Arc::new(NoNetwork));
        let (coordinator, _handle) = PlaybackCoordinator::new(
            CoordinatorSettings::new("0042"),
            Arc::new(LoggingPlayer {
                calls: Arc::clone(&calls),
            }),
            player_rx,
            Arc::new(SilentMixer),
            Arc::new(cache),
            notify_tx,
            EventBus::default(),
        );
        (coordinator, calls)
    }

    #[tokio::test]
    async fn test_commands_while_idle_do_nothing() {
        let (mut coordinator, calls) = coordinator();
        for command in [
            RemoteCommand::Stop,
            RemoteCommand::Pause,
            RemoteCommand::Resume,
            RemoteCommand::Next,
        ] {
            coordinator
                .handle_input(CoordinatorInput::Command(command))
                .await
                .unwrap();
        }
        assert_eq!(coordinator.state(), DeviceState::Idle);
        assert!(calls.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_playlist_is_ignored() {
        let (mut coordinator, calls) = coordinator();
        coordinator
            .handle_input(CoordinatorInput::Command(RemoteCommand::Play(
                QueueSpec::default(),
            )))
            .await
            .unwrap();
        assert_eq!(coordinator.state(), DeviceState::Idle);
        assert!(!coordinator.is_busy());
        assert!(calls.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_play_loads_then_plays() {
        let (mut coordinator, calls) = coordinator();
        coordinator
            .handle_input(CoordinatorInput::Command(RemoteCommand::Play(
                QueueSpec::new(vec!["http://h/m/42/a.mp3".into()]),
            )))
            .await
            .unwrap();
        assert_eq!(*calls.0.lock(), vec!["load", "play"]);
        assert_eq!(coordinator.state(), DeviceState::Fetching);
        assert!(coordinator.is_busy());
        // Queue-object players report their own start; no watchdog.
        assert!(!coordinator.watchdog_active());
    }

    #[tokio::test]
    async fn test_shutdown_input_ends_step() {
        let (mut coordinator, _calls) = coordinator();
        coordinator.handle().shutdown().unwrap();
        assert!(!coordinator.step().await.unwrap());
    }
}
