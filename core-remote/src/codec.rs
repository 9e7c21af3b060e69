//! Wire shape of the control protocol.
//!
//! Inbound events carry at most one JSON argument:
//!
//! | event     | argument                                    |
//! |-----------|---------------------------------------------|
//! | `play`    | `{ "playlist": [...], "playlistLocal": [...] }` |
//! | `shuffle` | same as `play`                              |
//! | `stop`, `pause`, `resume`, `next` | none                |
//!
//! Outbound events always lead with the device id.

use crate::error::{RemoteError, Result};
use core_playback::{Notification, QueueSpec, RemoteCommand};
use serde_json::{json, Value};

pub const JOIN_ROOM: &str = "joinRoom";

/// Decode an inbound event. Unknown events decode to `None`.
pub fn decode_command(event: &str, args: &[Value]) -> Result<Option<RemoteCommand>> {
    let command = match event {
        "play" => RemoteCommand::Play(queue_spec(event, args)?),
        "shuffle" => RemoteCommand::Shuffle(queue_spec(event, args)?),
        "stop" => RemoteCommand::Stop,
        "pause" => RemoteCommand::Pause,
        "resume" => RemoteCommand::Resume,
        "next" => RemoteCommand::Next,
        _ => return Ok(None),
    };
    Ok(Some(command))
}

fn queue_spec(event: &str, args: &[Value]) -> Result<QueueSpec> {
    let payload = args.first().ok_or_else(|| RemoteError::Decode {
        event: event.to_string(),
        message: "missing playlist payload".to_string(),
    })?;
    serde_json::from_value(payload.clone()).map_err(|e| RemoteError::Decode {
        event: event.to_string(),
        message: e.to_string(),
    })
}

/// `joinRoom(deviceId)`
pub fn join_room(device_id: &str) -> (&'static str, Vec<Value>) {
    (JOIN_ROOM, vec![json!(device_id)])
}

/// Event name and arguments for an outbound notification.
pub fn encode_notification(device_id: &str, notification: &Notification) -> (&'static str, Vec<Value>) {
    let mut args = vec![json!(device_id)];
    match notification {
        Notification::Playing(track) => args.push(json!({
            "_name": track.display_name(),
            "src": track.source(),
            "isRemote": track.is_remote(),
        })),
        Notification::PlaylistEnd(playlist) => args.push(json!(playlist)),
        Notification::Paused | Notification::Stopped | Notification::Resumed => {}
    }
    (notification.event_name(), args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::playback::Track;

    #[test]
    fn test_decode_play_with_local_list() {
        let args = vec![json!({
            "playlist": ["https://h/music/42/a.mp3", "https://h/music/42/b.mp3"],
            "playlistLocal": ["../cache/42/a.mp3", ""]
        })];
        let command = decode_command("play", &args).unwrap().unwrap();
        let RemoteCommand::Play(spec) = command else {
            panic!("expected play, got {command:?}");
        };
        assert_eq!(spec.playlist.len(), 2);
        assert_eq!(spec.playlist_local, vec!["../cache/42/a.mp3", ""]);
    }

    #[test]
    fn test_decode_shuffle_without_local_list() {
        let args = vec![json!({ "playlist": ["https://h/music/42/a.mp3"] })];
        let command = decode_command("shuffle", &args).unwrap().unwrap();
        assert!(matches!(command, RemoteCommand::Shuffle(ref spec) if spec.playlist_local.is_empty()));
    }

    #[test]
    fn test_decode_simple_commands() {
        assert_eq!(decode_command("stop", &[]).unwrap(), Some(RemoteCommand::Stop));
        assert_eq!(decode_command("pause", &[]).unwrap(), Some(RemoteCommand::Pause));
        assert_eq!(decode_command("resume", &[json!(null)]).unwrap(), Some(RemoteCommand::Resume));
        assert_eq!(decode_command("next", &[]).unwrap(), Some(RemoteCommand::Next));
    }

    #[test]
    fn test_unknown_event_is_not_a_command() {
        assert_eq!(decode_command("volume", &[json!(3)]).unwrap(), None);
    }

    #[test]
    fn test_malformed_play_is_an_error() {
        assert!(matches!(
            decode_command("play", &[]),
            Err(RemoteError::Decode { .. })
        ));
        assert!(decode_command("play", &[json!({ "playlist": "nope" })]).is_err());
    }

    #[test]
    fn test_encode_playing_uses_server_field_names() {
        let track = Track::remote("https://h/music/42/Spot.mp3");
        let (event, args) = encode_notification("0042", &Notification::Playing(track));
        assert_eq!(event, "playing");
        assert_eq!(
            args,
            vec![
                json!("0042"),
                json!({ "_name": "Spot.mp3", "src": "https://h/music/42/Spot.mp3", "isRemote": true })
            ]
        );
    }

    #[test]
    fn test_encode_playlist_end_and_plain_notifications() {
        let playlist = vec!["https://h/music/42/a.mp3".to_string()];
        let (event, args) = encode_notification("0042", &Notification::PlaylistEnd(playlist));
        assert_eq!(event, "playlistEnd");
        assert_eq!(args, vec![json!("0042"), json!(["https://h/music/42/a.mp3"])]);

        let (event, args) = encode_notification("0042", &Notification::Stopped);
        assert_eq!(event, "stopped");
        assert_eq!(args, vec![json!("0042")]);

        assert_eq!(join_room("0042"), ("joinRoom", vec![json!("0042")]));
    }
}
