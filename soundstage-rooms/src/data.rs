use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use soundstage_core::Id;

pub type RoomId = Id<RoomData>;
pub type DeviceId = Id<DeviceData>;

/// How audio is distributed across the devices of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioMode {
    /// Every device plays identical audio.
    Monopoly,
    /// Devices render spatially assigned roles for surround-like playback.
    Stereo,
}

/// Where a room's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioSource {
    Upload,
    ExternalCatalog,
}

/// The discrete spatial role a non-host device renders in stereo mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioRole {
    Center,
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl AudioRole {
    /// The stereo pan a device rendering this role applies to its output.
    pub fn pan(&self) -> f32 {
        match self {
            Self::FrontLeft | Self::RearLeft => -0.8,
            Self::FrontRight | Self::RearRight => 0.8,
            Self::Center => 0.,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    Mobile,
    Tablet,
    Desktop,
}

/// A playback room, discovered by participants via its OTP code.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomData {
    pub id: RoomId,
    /// The 6-digit code participants join with.
    pub otp: String,
    pub name: String,
    /// Back-reference to the device that created the room. Fixed for the
    /// room's entire lifetime.
    pub host_device_id: DeviceId,
    pub audio_mode: AudioMode,
    pub audio_source: AudioSource,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RoomData {
    /// Whether the room is logically present at the given time. A retired
    /// or expired room may still be physically stored.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// A device participating in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceData {
    pub id: DeviceId,
    pub room_id: RoomId,
    pub name: String,
    pub kind: DeviceKind,
    pub is_host: bool,
    /// Normalized 0–1, unset until a placement is assigned.
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub audio_role: Option<AudioRole>,
    /// 0–100
    pub volume: u8,
    pub is_muted: bool,
    pub is_connected: bool,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DeviceData {
    /// Effective output gain for this device.
    pub fn gain(&self) -> f32 {
        if self.is_muted {
            return 0.;
        }

        self.volume as f32 / 100.
    }
}

#[derive(Debug)]
pub struct NewRoom {
    pub name: String,
    pub audio_mode: AudioMode,
    pub audio_source: AudioSource,
}

#[derive(Debug)]
pub struct NewDevice {
    /// The owning room. A host device is created before its room exists
    /// and starts out with [RoomId::none].
    pub room_id: RoomId,
    pub name: String,
    pub kind: DeviceKind,
    pub is_host: bool,
}

#[derive(Debug, Default)]
pub struct RoomUpdate {
    pub audio_mode: Option<AudioMode>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default)]
pub struct DeviceUpdate {
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub audio_role: Option<AudioRole>,
    pub volume: Option<u8>,
    pub is_muted: Option<bool>,
    pub is_connected: Option<bool>,
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    fn device(volume: u8, is_muted: bool) -> DeviceData {
        let now = Utc::now();

        DeviceData {
            id: DeviceId::new(),
            room_id: RoomId::new(),
            name: "Phone".to_string(),
            kind: DeviceKind::Mobile,
            is_host: false,
            position_x: None,
            position_y: None,
            audio_role: None,
            volume,
            is_muted,
            is_connected: true,
            connected_at: now,
            last_seen: now,
        }
    }

    #[test]
    fn test_gain_follows_volume_until_muted() {
        assert_eq!(device(75, false).gain(), 0.75, "gain scales with volume");
        assert_eq!(device(75, true).gain(), 0., "muting silences the device");
    }

    #[test]
    fn test_roles_pan_to_their_side() {
        assert_eq!(AudioRole::FrontLeft.pan(), -0.8);
        assert_eq!(AudioRole::RearLeft.pan(), -0.8);
        assert_eq!(AudioRole::FrontRight.pan(), 0.8);
        assert_eq!(AudioRole::RearRight.pan(), 0.8);
        assert_eq!(AudioRole::Center.pan(), 0.);
    }

    #[test]
    fn test_room_liveness() {
        let now = Utc::now();

        let room = RoomData {
            id: RoomId::new(),
            otp: "123456".to_string(),
            name: "Room".to_string(),
            host_device_id: DeviceId::new(),
            audio_mode: AudioMode::Monopoly,
            audio_source: AudioSource::ExternalCatalog,
            is_active: true,
            created_at: now,
            expires_at: now + Duration::hours(24),
        };

        assert!(room.is_live(now), "a fresh room is live");
        assert!(
            !room.is_live(room.expires_at),
            "a room is absent from its expiry onwards"
        );

        let retired = RoomData {
            is_active: false,
            ..room
        };
        assert!(!retired.is_live(now), "a retired room is absent");
    }
}
