//! File-backed player driving mpv over its JSON IPC socket.
//!
//! The queue is written to a scratch playlist file and handed to mpv with
//! `loadlist`. mpv occasionally fails to pick up a freshly written list, so the
//! coordinator keeps re-issuing the load until a start is confirmed; the
//! scratch file is removed once that happens.

use crate::driver::{spawn_reader, spawn_writer, CommandSender, Reaction};
use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    playback::{BackendKind, PlayerBackend, PlayerEvent, PlayerEventSender, PlayerFailure, QueueId, Track},
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

const PLAYER: &str = "mpv";

/// Request id used to ask which playlist entry was just loaded.
const POSITION_REQUEST: u64 = 1;

/// How long mpv gets to create its IPC socket.
const SOCKET_ATTEMPTS: u32 = 50;
const SOCKET_RETRY: Duration = Duration::from_millis(100);

/// Where mpv and its scratch playlist live.
#[derive(Debug, Clone)]
pub struct MpvOptions {
    pub binary: PathBuf,
    pub scratch_playlist: PathBuf,
    pub ipc_socket: PathBuf,
}

fn ipc(command: Value) -> String {
    json!({ "command": command }).to_string()
}

/// Queue position as seen by mpv.
#[derive(Debug, Default)]
pub(crate) struct MpvQueue {
    id: Option<QueueId>,
    tracks: Vec<Track>,
    position: usize,
    active: bool,
}

impl MpvQueue {
    pub(crate) fn load(&mut self, id: QueueId, tracks: Vec<Track>) {
        *self = Self {
            id: Some(id),
            tracks,
            ..Self::default()
        };
    }

    pub(crate) fn start(&mut self) -> bool {
        self.active = self.id.is_some() && !self.tracks.is_empty();
        self.active
    }

    pub(crate) fn stop(&mut self) {
        *self = Self::default();
    }

    /// Queue to report end-of-queue for, when no entry follows the current one.
    pub(crate) fn last_entry(&mut self) -> Option<QueueId> {
        let id = self.id.filter(|_| self.active)?;
        if self.position + 1 >= self.tracks.len() {
            self.active = false;
            Some(id)
        } else {
            None
        }
    }

    pub(crate) fn on_line(&mut self, line: &str) -> Reaction {
        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Ignoring non-JSON mpv output");
                return Reaction::none();
            }
        };
        let Some(id) = self.id.filter(|_| self.active) else {
            return Reaction::none();
        };

        if message["request_id"].as_u64() == Some(POSITION_REQUEST) {
            return self.on_position(id, &message);
        }

        match message["event"].as_str() {
            Some("file-loaded") => Reaction::command(
                json!({
                    "command": ["get_property", "playlist-pos"],
                    "request_id": POSITION_REQUEST,
                })
                .to_string(),
            ),
            Some("end-file") => self.on_end_file(id, &message),
            _ => Reaction::none(),
        }
    }

    fn on_position(&mut self, id: QueueId, reply: &Value) -> Reaction {
        if reply["error"].as_str() != Some("success") {
            warn!(reply = %reply, "mpv did not report a playlist position");
            return Reaction::none();
        }
        let Some(position) = reply["data"].as_u64().map(|p| p as usize) else {
            return Reaction::none();
        };
        let Some(track) = self.tracks.get(position) else {
            return Reaction::none();
        };
        self.position = position;
        Reaction::event(PlayerEvent::Started {
            queue: id,
            track: track.clone(),
        })
    }

    fn on_end_file(&mut self, id: QueueId, message: &Value) -> Reaction {
        match message["reason"].as_str() {
            Some("eof") => {
                let exhausted = self.position + 1 >= self.tracks.len();
                if exhausted {
                    self.active = false;
                }
                Reaction::event(PlayerEvent::Ended {
                    queue: id,
                    track: self.tracks.get(self.position).cloned(),
                    exhausted,
                })
            }
            Some("error") => {
                self.active = false;
                let cause = message["file_error"]
                    .as_str()
                    .unwrap_or("playback error")
                    .to_string();
                Reaction::event(PlayerEvent::Errored {
                    queue: id,
                    cause: PlayerFailure::Backend(cause),
                })
            }
            // stop, quit and redirect follow our own commands.
            _ => Reaction::none(),
        }
    }

    pub(crate) fn on_exit(&mut self) -> Option<PlayerEvent> {
        let id = self.id.filter(|_| self.active)?;
        self.active = false;
        Some(PlayerEvent::Errored {
            queue: id,
            cause: PlayerFailure::Backend("mpv IPC connection closed".into()),
        })
    }
}

struct MpvProcess {
    child: Child,
    commands: CommandSender,
}

/// [`PlayerBackend`] for mpv with a scratch playlist file.
pub struct MpvPlayer {
    options: MpvOptions,
    events: PlayerEventSender,
    queue: Arc<Mutex<MpvQueue>>,
    process: tokio::sync::Mutex<Option<MpvProcess>>,
}

impl MpvPlayer {
    pub fn new(options: MpvOptions, events: PlayerEventSender) -> Self {
        Self {
            options,
            events,
            queue: Arc::new(Mutex::new(MpvQueue::default())),
            process: tokio::sync::Mutex::new(None),
        }
    }

    async fn ensure_process(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        if let Some(running) = process.as_mut() {
            if matches!(running.child.try_wait(), Ok(None)) && !running.commands.is_closed() {
                return Ok(());
            }
            warn!("mpv is gone, starting a new one");
        }

        let mut child = Command::new(&self.options.binary)
            .arg("--idle=yes")
            .arg("--no-video")
            .arg("--no-terminal")
            .arg(format!(
                "--input-ipc-server={}",
                self.options.ipc_socket.display()
            ))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stream = match self.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };
        let (reader, writer) = stream.into_split();

        let commands = spawn_writer(PLAYER, writer);
        let on_line = Arc::clone(&self.queue);
        let on_exit = Arc::clone(&self.queue);
        spawn_reader(
            PLAYER,
            reader,
            commands.clone(),
            self.events.clone(),
            move |line| on_line.lock().on_line(line),
            move || on_exit.lock().on_exit(),
        );

        info!(
            binary = %self.options.binary.display(),
            socket = %self.options.ipc_socket.display(),
            pid = ?child.id(),
            "mpv started"
        );
        *process = Some(MpvProcess { child, commands });
        Ok(())
    }

    /// Wait for mpv to accept connections on its IPC socket.
    async fn connect(&self) -> Result<UnixStream> {
        let mut last_error = None;
        for _ in 0..SOCKET_ATTEMPTS {
            match UnixStream::connect(&self.options.ipc_socket).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
            tokio::time::sleep(SOCKET_RETRY).await;
        }
        Err(BridgeError::Io(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::TimedOut, "mpv IPC socket never appeared")
        })))
    }

    async fn send(&self, commands: Vec<String>) -> Result<()> {
        let process = self.process.lock().await;
        let running = process
            .as_ref()
            .ok_or_else(|| BridgeError::NotAvailable("mpv is not running".into()))?;
        for command in commands {
            running
                .commands
                .send(command)
                .map_err(|_| BridgeError::OperationFailed("mpv IPC closed".into()))?;
        }
        Ok(())
    }

    fn playlist_contents(tracks: &[Track]) -> String {
        tracks
            .iter()
            .map(|track| format!("{}\n", track.source()))
            .collect()
    }
}

#[async_trait]
impl PlayerBackend for MpvPlayer {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    async fn load_queue(&self, queue: QueueId, tracks: &[Track]) -> Result<()> {
        self.ensure_process().await?;
        tokio::fs::write(&self.options.scratch_playlist, Self::playlist_contents(tracks)).await?;
        debug!(
            %queue,
            tracks = tracks.len(),
            playlist = %self.options.scratch_playlist.display(),
            "Scratch playlist written"
        );
        self.queue.lock().load(queue, tracks.to_vec());
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        if !self.queue.lock().start() {
            return Err(BridgeError::OperationFailed("no queue loaded".into()));
        }
        let playlist = self.options.scratch_playlist.to_string_lossy().into_owned();
        self.send(vec![
            ipc(json!(["loadlist", playlist, "replace"])),
            ipc(json!(["set_property", "pause", false])),
        ])
        .await
    }

    async fn pause(&self) -> Result<()> {
        self.send(vec![ipc(json!(["set_property", "pause", true]))])
            .await
    }

    async fn resume(&self) -> Result<()> {
        self.send(vec![ipc(json!(["set_property", "pause", false]))])
            .await
    }

    async fn stop(&self) -> Result<()> {
        self.queue.lock().stop();
        self.send(vec![ipc(json!(["stop"]))]).await
    }

    async fn advance(&self) -> Result<()> {
        let last = self.queue.lock().last_entry();
        if let Some(queue) = last {
            let _ = self.events.send(PlayerEvent::Errored {
                queue,
                cause: PlayerFailure::EndOfQueue,
            });
            return Ok(());
        }
        self.send(vec![
            ipc(json!(["playlist-next", "force"])),
            ipc(json!(["set_property", "pause", false])),
        ])
        .await
    }

    async fn confirm_started(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.options.scratch_playlist).await {
            Ok(()) => {
                debug!("Scratch playlist removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        self.queue.lock().stop();
        let Some(mut running) = self.process.lock().await.take() else {
            return Ok(());
        };
        let _ = running.commands.send(ipc(json!(["quit"])));
        match tokio::time::timeout(Duration::from_secs(1), running.child.wait()).await {
            Ok(status) => debug!(status = ?status, "mpv exited"),
            Err(_) => {
                warn!("mpv did not quit, killing it");
                running.child.kill().await?;
            }
        }
        let _ = tokio::fs::remove_file(&self.options.ipc_socket).await;
        Ok(())
    }
}
