use serde::{Deserialize, Serialize};
use soundstage_core::{StreamQuality, SyncAction};
use soundstage_rooms::{AudioMode, AudioRole, DeviceId, RoomId};

/// Messages a device sends to the gateway.
///
/// Anything that does not parse into one of these is dropped by the
/// gateway without affecting the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Binds the connection to a device in a room.
    JoinRoom { room_id: RoomId, device_id: DeviceId },
    /// A playback action with the deadline every device applies it at.
    AudioSync {
        action: SyncAction,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<f64>,
    },
    /// The sending device moved, or claims a role.
    DevicePosition {
        x: f64,
        y: f64,
        #[serde(default)]
        audio_role: Option<AudioRole>,
    },
    VolumeChange { volume: u8, is_muted: bool },
    ModeChange { mode: AudioMode },
    /// What the host is playing, for display on participants.
    CurrentSongUpdate {
        title: String,
        artist: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thumbnail: Option<String>,
    },
    /// One captured frame of the host's live stream.
    AudioStreamData {
        buffer: Vec<u8>,
        timestamp: i64,
        quality: StreamQuality,
    },
    StreamStarted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality: Option<StreamQuality>,
    },
    StreamStopped,
    StreamQualityChange { quality: StreamQuality },
}

/// Messages the gateway pushes to devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    DeviceConnected { device_id: DeviceId },
    DeviceDisconnected { device_id: DeviceId },
    /// Relayed verbatim from the issuing device.
    AudioSync {
        action: SyncAction,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<f64>,
    },
    PositionUpdate {
        device_id: DeviceId,
        x: f64,
        y: f64,
        #[serde(default)]
        audio_role: Option<AudioRole>,
    },
    DeviceUpdate {
        device_id: DeviceId,
        volume: u8,
        is_muted: bool,
    },
    ModeChange { mode: AudioMode },
    CurrentSongUpdate {
        title: String,
        artist: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thumbnail: Option<String>,
    },
    AudioStreamData {
        buffer: Vec<u8>,
        timestamp: i64,
        quality: StreamQuality,
    },
    StreamStarted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality: Option<StreamQuality>,
    },
    StreamStopped,
    StreamQualityChange { quality: StreamQuality },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_client_messages_match_the_wire_format() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"join-room","roomId":3,"deviceId":7}"#)
                .expect("join-room parses");

        assert!(
            matches!(parsed, ClientMessage::JoinRoom { .. }),
            "kebab-case tag and camelCase fields are understood"
        );

        let parsed: ClientMessage = serde_json::from_str(
            r#"{"type":"audio-sync","action":"play","timestamp":1700000000000,"position":12.5}"#,
        )
        .expect("audio-sync parses");

        assert_eq!(
            parsed,
            ClientMessage::AudioSync {
                action: SyncAction::Play,
                timestamp: 1_700_000_000_000,
                position: Some(12.5),
            },
            "sync fields travel through intact"
        );

        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"audio-sync","action":"pause","timestamp":5}"#)
                .expect("audio-sync without position parses");

        assert!(
            matches!(parsed, ClientMessage::AudioSync { position: None, .. }),
            "position is optional"
        );
    }

    #[test]
    fn test_server_messages_serialize_with_tag_and_camel_case() {
        let message = ServerMessage::DeviceUpdate {
            device_id: DeviceId::none(),
            volume: 80,
            is_muted: false,
        };

        assert_eq!(
            serde_json::to_string(&message).expect("message serializes"),
            r#"{"type":"device-update","deviceId":0,"volume":80,"isMuted":false}"#,
        );
    }

    #[test]
    fn test_malformed_messages_are_rejected() {
        let unknown = serde_json::from_str::<ClientMessage>(r#"{"type":"reboot-universe"}"#);
        assert!(unknown.is_err(), "unknown types fail to parse");

        let missing = serde_json::from_str::<ClientMessage>(r#"{"type":"volume-change"}"#);
        assert!(missing.is_err(), "missing required fields fail to parse");
    }
}
