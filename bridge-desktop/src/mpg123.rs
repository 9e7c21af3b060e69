//! Queue-object player driving `mpg123 -R`.
//!
//! The track list stays in memory; the adapter loads one track at a time and
//! moves on by itself when mpg123 reports the end of a track.

use crate::driver::{spawn_reader, spawn_writer, CommandSender, Reaction};
use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    playback::{BackendKind, PlayerBackend, PlayerEvent, PlayerEventSender, PlayerFailure, QueueId, Track},
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

const PLAYER: &str = "mpg123";

/// One line of mpg123 remote-control output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mpg123Message {
    Ready,
    /// Stream header decoded: audio is about to come out.
    StreamStarted,
    /// `@P 0` stopped, `@P 1` paused, `@P 2` playing.
    Status(u8),
    Error(String),
    Other,
}

impl Mpg123Message {
    pub(crate) fn parse(line: &str) -> Self {
        let line = line.trim_end();
        let (tag, rest) = line.split_once(' ').unwrap_or((line, ""));
        match tag {
            "@R" => Mpg123Message::Ready,
            "@S" => Mpg123Message::StreamStarted,
            "@P" => rest
                .trim()
                .parse()
                .map(Mpg123Message::Status)
                .unwrap_or(Mpg123Message::Other),
            "@E" => Mpg123Message::Error(rest.trim().to_string()),
            _ => Mpg123Message::Other,
        }
    }
}

fn load_command(track: &Track) -> String {
    format!("LOAD {}", track.source())
}

/// Outcome of a skip request.
#[derive(Debug, PartialEq)]
pub(crate) enum Skip {
    Load(String),
    Exhausted(QueueId),
    Idle,
}

/// Queue position as seen by mpg123.
#[derive(Debug, Default)]
pub(crate) struct Mpg123Queue {
    id: Option<QueueId>,
    tracks: Vec<Track>,
    position: usize,
    /// A LOAD was sent and its stream has not started yet.
    loading: bool,
    paused: bool,
    active: bool,
}

impl Mpg123Queue {
    pub(crate) fn load(&mut self, id: QueueId, tracks: Vec<Track>) {
        *self = Self {
            id: Some(id),
            tracks,
            ..Self::default()
        };
    }

    /// LOAD command for the current track, marking the queue active.
    pub(crate) fn start(&mut self) -> Option<String> {
        let command = load_command(self.tracks.get(self.position)?);
        self.active = true;
        self.loading = true;
        self.paused = false;
        Some(command)
    }

    pub(crate) fn stop(&mut self) {
        *self = Self::default();
    }

    /// Record a pause state change. Returns whether mpg123 must toggle.
    pub(crate) fn set_paused(&mut self, paused: bool) -> bool {
        if !self.active || self.paused == paused {
            return false;
        }
        self.paused = paused;
        true
    }

    pub(crate) fn skip(&mut self) -> Skip {
        let Some(id) = self.id.filter(|_| self.active) else {
            return Skip::Idle;
        };
        if self.position + 1 >= self.tracks.len() {
            self.active = false;
            return Skip::Exhausted(id);
        }
        self.position += 1;
        self.start().map(Skip::Load).unwrap_or(Skip::Idle)
    }

    pub(crate) fn on_line(&mut self, line: &str) -> Reaction {
        let Some(id) = self.id.filter(|_| self.active) else {
            return Reaction::none();
        };

        match Mpg123Message::parse(line) {
            Mpg123Message::StreamStarted if self.loading => {
                self.loading = false;
                match self.tracks.get(self.position) {
                    Some(track) => Reaction::event(PlayerEvent::Started {
                        queue: id,
                        track: track.clone(),
                    }),
                    None => Reaction::none(),
                }
            }
            Mpg123Message::Status(0) if !self.loading => {
                let finished = self.tracks.get(self.position).cloned();
                let exhausted = self.position + 1 >= self.tracks.len();
                let mut reaction = Reaction::event(PlayerEvent::Ended {
                    queue: id,
                    track: finished,
                    exhausted,
                });
                if exhausted {
                    self.active = false;
                } else {
                    self.position += 1;
                    reaction.commands.extend(self.start());
                }
                reaction
            }
            Mpg123Message::Status(1) if !self.loading => {
                Reaction::event(PlayerEvent::Paused { queue: id })
            }
            Mpg123Message::Status(2) if !self.loading => {
                Reaction::event(PlayerEvent::Resumed { queue: id })
            }
            Mpg123Message::Error(message) => {
                self.active = false;
                Reaction::event(PlayerEvent::Errored {
                    queue: id,
                    cause: PlayerFailure::from_message(message),
                })
            }
            _ => Reaction::none(),
        }
    }

    /// The player process went away.
    pub(crate) fn on_exit(&mut self) -> Option<PlayerEvent> {
        let id = self.id.filter(|_| self.active)?;
        self.active = false;
        Some(PlayerEvent::Errored {
            queue: id,
            cause: PlayerFailure::Backend("mpg123 exited".into()),
        })
    }
}

struct Mpg123Process {
    child: Child,
    commands: CommandSender,
}

/// [`PlayerBackend`] for mpg123 in remote-control mode.
pub struct Mpg123Player {
    binary: PathBuf,
    events: PlayerEventSender,
    queue: Arc<Mutex<Mpg123Queue>>,
    process: tokio::sync::Mutex<Option<Mpg123Process>>,
}

impl Mpg123Player {
    pub fn new(binary: impl Into<PathBuf>, events: PlayerEventSender) -> Self {
        Self {
            binary: binary.into(),
            events,
            queue: Arc::new(Mutex::new(Mpg123Queue::default())),
            process: tokio::sync::Mutex::new(None),
        }
    }

    /// Start mpg123 unless it is already running.
    async fn ensure_process(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        if let Some(running) = process.as_mut() {
            if matches!(running.child.try_wait(), Ok(None)) {
                return Ok(());
            }
            warn!("mpg123 is gone, starting a new one");
        }

        let mut child = Command::new(&self.binary)
            .arg("-R")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::OperationFailed("mpg123 stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::OperationFailed("mpg123 stdout unavailable".into()))?;

        let commands = spawn_writer(PLAYER, stdin);
        // No per-frame progress lines.
        let _ = commands.send("SILENCE".to_string());

        let on_line = Arc::clone(&self.queue);
        let on_exit = Arc::clone(&self.queue);
        spawn_reader(
            PLAYER,
            stdout,
            commands.clone(),
            self.events.clone(),
            move |line| on_line.lock().on_line(line),
            move || on_exit.lock().on_exit(),
        );

        info!(binary = %self.binary.display(), pid = ?child.id(), "mpg123 started");
        *process = Some(Mpg123Process { child, commands });
        Ok(())
    }

    async fn send(&self, command: String) -> Result<()> {
        let process = self.process.lock().await;
        let running = process
            .as_ref()
            .ok_or_else(|| BridgeError::NotAvailable("mpg123 is not running".into()))?;
        running
            .commands
            .send(command)
            .map_err(|_| BridgeError::OperationFailed("mpg123 input closed".into()))
    }
}

#[async_trait]
impl PlayerBackend for Mpg123Player {
    fn kind(&self) -> BackendKind {
        BackendKind::Queue
    }

    async fn load_queue(&self, queue: QueueId, tracks: &[Track]) -> Result<()> {
        self.ensure_process().await?;
        debug!(%queue, tracks = tracks.len(), "Queue loaded");
        self.queue.lock().load(queue, tracks.to_vec());
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        let command = self
            .queue
            .lock()
            .start()
            .ok_or_else(|| BridgeError::OperationFailed("no queue loaded".into()))?;
        self.send(command).await
    }

    async fn pause(&self) -> Result<()> {
        let toggle = self.queue.lock().set_paused(true);
        if toggle {
            self.send("PAUSE".to_string()).await?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        let toggle = self.queue.lock().set_paused(false);
        if toggle {
            self.send("PAUSE".to_string()).await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.queue.lock().stop();
        self.send("STOP".to_string()).await
    }

    async fn advance(&self) -> Result<()> {
        let skip = self.queue.lock().skip();
        match skip {
            Skip::Load(command) => self.send(command).await,
            Skip::Exhausted(queue) => {
                let _ = self.events.send(PlayerEvent::Errored {
                    queue,
                    cause: PlayerFailure::EndOfQueue,
                });
                Ok(())
            }
            Skip::Idle => Ok(()),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        self.queue.lock().stop();
        let Some(mut running) = self.process.lock().await.take() else {
            return Ok(());
        };
        let _ = running.commands.send("QUIT".to_string());
        match tokio::time::timeout(Duration::from_secs(1), running.child.wait()).await {
            Ok(status) => debug!(status = ?status, "mpg123 exited"),
            Err(_) => {
                warn!("mpg123 did not quit, killing it");
                running.child.kill().await?;
            }
        }
        Ok(())
    }
}
