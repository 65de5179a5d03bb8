use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::debug;
use rand::{thread_rng, Rng};
use thiserror::Error;

use crate::{
    assign_placements, DeviceData, DeviceId, DeviceUpdate, NewDevice, NewRoom, RoomData, RoomId,
    RoomUpdate,
};

pub type Result<T> = std::result::Result<T, RegistryError>;

/// How long a room lives after creation.
const ROOM_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A record doesn't exist, or a room is expired or retired.
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    /// A room can only ever have the host it was created with.
    #[error("room:{room} already has a host device")]
    HostExists { room: RoomId },
}

fn not_found(resource: &'static str, identifier: impl ToString) -> RegistryError {
    RegistryError::NotFound {
        resource,
        identifier: identifier.to_string(),
    }
}

/// The authoritative in-memory store of rooms and devices.
///
/// The registry exclusively owns all room and device records; everything
/// else refers to them by id. Storage is volatile and time-bounded: rooms
/// expire 24 hours after creation and are reaped by [Registry::sweep_expired].
#[derive(Debug, Default)]
pub struct Registry {
    rooms: DashMap<RoomId, RoomData>,
    devices: DashMap<DeviceId, DeviceData>,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a room owned by an already-created host device, patching
    /// that device's room reference in the same step.
    pub fn create_room(&self, new_room: NewRoom, host_device_id: DeviceId) -> RoomData {
        let now = Utc::now();

        let room = RoomData {
            id: RoomId::new(),
            otp: self.generate_otp(now),
            name: new_room.name,
            host_device_id,
            audio_mode: new_room.audio_mode,
            audio_source: new_room.audio_source,
            is_active: true,
            created_at: now,
            expires_at: now + Duration::hours(ROOM_LIFETIME_HOURS),
        };

        if let Some(mut host) = self.devices.get_mut(&host_device_id) {
            host.room_id = room.id;
            host.last_seen = now;
        }

        self.rooms.insert(room.id, room.clone());
        room
    }

    /// Looks up a room by its join code. Retired and expired rooms are
    /// never returned.
    pub fn room_by_otp(&self, otp: &str) -> Result<RoomData> {
        let now = Utc::now();

        self.rooms
            .iter()
            .find(|room| room.otp == otp && room.is_live(now))
            .map(|room| room.value().clone())
            .ok_or_else(|| not_found("room", otp))
    }

    /// Looks up a live room by id.
    pub fn room_by_id(&self, id: RoomId) -> Result<RoomData> {
        self.rooms
            .get(&id)
            .filter(|room| room.is_live(Utc::now()))
            .map(|room| room.value().clone())
            .ok_or_else(|| not_found("room", id))
    }

    pub fn update_room(&self, id: RoomId, update: RoomUpdate) -> Result<RoomData> {
        let mut room = self.rooms.get_mut(&id).ok_or_else(|| not_found("room", id))?;

        if let Some(audio_mode) = update.audio_mode {
            room.audio_mode = audio_mode;
        }

        if let Some(is_active) = update.is_active {
            room.is_active = is_active;
        }

        Ok(room.value().clone())
    }

    /// Deletes a room and every device that belongs to it.
    pub fn delete_room(&self, id: RoomId) -> bool {
        let deleted = self.rooms.remove(&id).is_some();
        self.devices.retain(|_, device| device.room_id != id);

        deleted
    }

    /// Creates a device. Participant devices get a fresh spatial placement
    /// for their room, since every join shifts the whole arrangement.
    pub fn create_device(&self, new_device: NewDevice) -> Result<DeviceData> {
        let room_id = new_device.room_id;

        if new_device.is_host && self.room_has_host(room_id) {
            return Err(RegistryError::HostExists { room: room_id });
        }

        let now = Utc::now();

        let device = DeviceData {
            id: DeviceId::new(),
            room_id,
            name: new_device.name,
            kind: new_device.kind,
            is_host: new_device.is_host,
            position_x: None,
            position_y: None,
            audio_role: None,
            volume: 75,
            is_muted: false,
            is_connected: true,
            connected_at: now,
            last_seen: now,
        };

        self.devices.insert(device.id, device.clone());

        if !device.is_host {
            self.reassign_placements(room_id);
        }

        Ok(self
            .devices
            .get(&device.id)
            .map(|device| device.value().clone())
            .unwrap_or(device))
    }

    pub fn device_by_id(&self, id: DeviceId) -> Result<DeviceData> {
        self.devices
            .get(&id)
            .map(|device| device.value().clone())
            .ok_or_else(|| not_found("device", id))
    }

    /// All devices of a room, in join order.
    pub fn devices_by_room(&self, room_id: RoomId) -> Vec<DeviceData> {
        let mut devices: Vec<_> = self
            .devices
            .iter()
            .filter(|device| device.room_id == room_id)
            .map(|device| device.value().clone())
            .collect();

        devices.sort_by_key(|device| device.id);
        devices
    }

    /// Applies a partial update, always refreshing the device's last-seen
    /// time.
    pub fn update_device(&self, id: DeviceId, update: DeviceUpdate) -> Result<DeviceData> {
        let mut device = self
            .devices
            .get_mut(&id)
            .ok_or_else(|| not_found("device", id))?;

        if let Some(x) = update.position_x {
            device.position_x = Some(x);
        }

        if let Some(y) = update.position_y {
            device.position_y = Some(y);
        }

        if let Some(role) = update.audio_role {
            device.audio_role = Some(role);
        }

        if let Some(volume) = update.volume {
            device.volume = volume.min(100);
        }

        if let Some(is_muted) = update.is_muted {
            device.is_muted = is_muted;
        }

        if let Some(is_connected) = update.is_connected {
            device.is_connected = is_connected;
        }

        device.last_seen = Utc::now();
        Ok(device.value().clone())
    }

    /// Removes a device, re-placing the remaining participants of its room.
    pub fn remove_device(&self, id: DeviceId) -> bool {
        let Some((_, device)) = self.devices.remove(&id) else {
            return false;
        };

        if !device.is_host {
            self.reassign_placements(device.room_id);
        }

        true
    }

    /// Deletes every room past its expiry, cascading device deletion, and
    /// returns what was deleted. Invoked on a fixed interval; the only
    /// autonomous action in the registry.
    pub fn sweep_expired(&self) -> Vec<RoomData> {
        let now = Utc::now();

        let expired: Vec<_> = self
            .rooms
            .iter()
            .filter(|room| room.expires_at <= now)
            .map(|room| room.value().clone())
            .collect();

        for room in &expired {
            self.delete_room(room.id);
            debug!("Swept expired room {} ({})", room.name, room.id);
        }

        expired
    }

    fn room_has_host(&self, room_id: RoomId) -> bool {
        room_id != RoomId::none()
            && self
                .devices
                .iter()
                .any(|device| device.room_id == room_id && device.is_host)
    }

    /// Recomputes positions and roles for all participants of a room.
    /// Indices shift on every membership change, so everyone moves.
    fn reassign_placements(&self, room_id: RoomId) {
        let mut participants: Vec<_> = self
            .devices
            .iter()
            .filter(|device| device.room_id == room_id && !device.is_host)
            .map(|device| device.id)
            .collect();

        // Ids are allocated monotonically, so this is join order.
        participants.sort();

        let placements = assign_placements(participants.len());
        let now = Utc::now();

        for (id, placement) in participants.into_iter().zip(placements) {
            if let Some(mut device) = self.devices.get_mut(&id) {
                device.position_x = Some(placement.x);
                device.position_y = Some(placement.y);
                device.audio_role = Some(placement.role);
                device.last_seen = now;
            }
        }
    }

    /// Draws codes until one is free among the rooms still live. Retired
    /// codes are fair game again.
    fn generate_otp(&self, now: DateTime<Utc>) -> String {
        let mut rng = thread_rng();

        loop {
            let code = rng.gen_range(100_000..=999_999).to_string();

            let taken = self
                .rooms
                .iter()
                .any(|room| room.otp == code && room.is_live(now));

            if !taken {
                return code;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn force_expire(&self, id: RoomId) {
        if let Some(mut room) = self.rooms.get_mut(&id) {
            room.expires_at = Utc::now() - Duration::hours(1);
        }
    }
}
