//! Line-oriented plumbing shared by the player adapters.
//!
//! Both players are controlled with one command per line and answer with one
//! message per line. The writer task serializes commands; the reader task
//! hands every line to a state machine and forwards what it produces.

use bridge_traits::playback::{PlayerEvent, PlayerEventSender};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// What a state machine wants done after seeing a line.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Reaction {
    pub events: Vec<PlayerEvent>,
    pub commands: Vec<String>,
}

impl Reaction {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn event(event: PlayerEvent) -> Self {
        Self {
            events: vec![event],
            commands: Vec::new(),
        }
    }

    pub fn command(command: String) -> Self {
        Self {
            events: Vec::new(),
            commands: vec![command],
        }
    }
}

pub(crate) type CommandSender = mpsc::UnboundedSender<String>;

/// Spawn a task writing each queued command as one line.
pub(crate) fn spawn_writer<W>(player: &'static str, mut writer: W) -> CommandSender
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            trace!(player, command = %line, "Player command");
            let written = async {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = written {
                warn!(player, error = %e, "Player input closed");
                break;
            }
        }
    });
    tx
}

/// Spawn a task feeding every output line to `on_line`.
///
/// Lines are decoded lossily, so only end of output or a read error stops the
/// task. `on_exit` runs then and may report the loss.
pub(crate) fn spawn_reader<R, F, E>(
    player: &'static str,
    reader: R,
    commands: CommandSender,
    events: PlayerEventSender,
    mut on_line: F,
    on_exit: E,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: FnMut(&str) -> Reaction + Send + 'static,
    E: FnOnce() -> Option<PlayerEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    // ID3 tags come through as raw bytes in whatever encoding the file uses.
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    trace!(player, %line, "Player output");
                    let reaction = on_line(line);
                    for command in reaction.commands {
                        let _ = commands.send(command);
                    }
                    for event in reaction.events {
                        let _ = events.send(event);
                    }
                }
                Err(e) => {
                    warn!(player, error = %e, "Failed to read player output");
                    break;
                }
            }
        }
        if let Some(event) = on_exit() {
            let _ = events.send(event);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::playback::{PlayerFailure, QueueId};

    #[tokio::test]
    async fn test_reader_survives_invalid_utf8() {
        let output: &'static [u8] = b"@I ID3:Can\xe7\xe3o\r\n@S 1.0\n";
        let (commands, _command_rx) = mpsc::unbounded_channel();
        let (events, mut event_rx) = mpsc::unbounded_channel();
        let queue = QueueId::new();

        let mut seen = Vec::new();
        let reader = spawn_reader(
            "test",
            output,
            commands,
            events,
            move |line| {
                seen.push(line.to_string());
                if line.starts_with("@S") {
                    assert_eq!(seen[0], "@I ID3:Can\u{fffd}\u{fffd}o");
                    Reaction::event(PlayerEvent::Errored {
                        queue,
                        cause: PlayerFailure::Backend("second line".into()),
                    })
                } else {
                    Reaction::none()
                }
            },
            || None,
        );
        reader.await.unwrap();

        assert_eq!(
            event_rx.recv().await,
            Some(PlayerEvent::Errored {
                queue,
                cause: PlayerFailure::Backend("second line".into()),
            })
        );
        assert!(event_rx.recv().await.is_none());
    }
}
