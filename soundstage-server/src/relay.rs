use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use soundstage_core::Id;
use soundstage_rooms::{DeviceId, RoomId};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::protocol::ServerMessage;

pub type SessionId = Id<Session>;

/// A live gateway connection. Until a join binds it to a room and device,
/// all room-scoped traffic from it is ignored.
pub struct Session {
    pub id: SessionId,
    outgoing: UnboundedSender<ServerMessage>,
    binding: Mutex<Option<Binding>>,
}

/// The room and device a session speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub room_id: RoomId,
    pub device_id: DeviceId,
}

/// Owns every live session and the room-indexed broadcast table.
///
/// Sessions carry room and device ids only; registry records are never
/// held here. Messages sent through one session's channel arrive in send
/// order, so per-sender ordering survives the fan-out.
pub struct Relay {
    sessions: DashMap<SessionId, Arc<Session>>,
    rooms: DashMap<RoomId, Vec<SessionId>>,
}

impl Relay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: Default::default(),
            rooms: Default::default(),
        })
    }

    /// Registers a connection, returning its session and the receiving
    /// half the socket writer drains.
    pub fn open(&self) -> (Arc<Session>, UnboundedReceiver<ServerMessage>) {
        let (outgoing, receiver) = unbounded_channel();

        let session = Arc::new(Session {
            id: SessionId::new(),
            outgoing,
            binding: Default::default(),
        });

        self.sessions.insert(session.id, session.clone());
        (session, receiver)
    }

    /// Binds a session to a room and device. A session that was already
    /// bound leaves its previous room first.
    pub fn bind(&self, session: &Session, room_id: RoomId, device_id: DeviceId) {
        let previous = session.binding.lock().replace(Binding { room_id, device_id });

        if let Some(previous) = previous {
            self.remove_from_room(previous.room_id, session.id);
        }

        self.rooms.entry(room_id).or_default().push(session.id);
    }

    /// Removes a session entirely, returning the binding it held.
    pub fn close(&self, id: SessionId) -> Option<Binding> {
        let (_, session) = self.sessions.remove(&id)?;
        let binding = session.binding.lock().take();

        if let Some(binding) = binding {
            self.remove_from_room(binding.room_id, id);
        }

        binding
    }

    /// Unbinds every session of a room that no longer exists. The
    /// connections themselves stay open.
    pub fn close_room(&self, room_id: RoomId) {
        let Some((_, ids)) = self.rooms.remove(&room_id) else {
            return;
        };

        for id in ids {
            if let Some(session) = self.sessions.get(&id) {
                *session.binding.lock() = None;
            }
        }
    }

    /// Delivers a message to every session bound to the room, except the
    /// excluded one. A recipient that cannot receive anymore is skipped;
    /// its own socket task cleans it up.
    pub fn broadcast(&self, room_id: RoomId, message: ServerMessage, exclude: Option<SessionId>) {
        let ids: Vec<_> = match self.rooms.get(&room_id) {
            Some(ids) => ids.value().clone(),
            None => return,
        };

        for id in ids {
            if Some(id) == exclude {
                continue;
            }

            if let Some(session) = self.sessions.get(&id) {
                session.send(message.clone());
            }
        }
    }

    fn remove_from_room(&self, room_id: RoomId, id: SessionId) {
        if let Some(mut ids) = self.rooms.get_mut(&room_id) {
            ids.retain(|other| *other != id);
        }

        self.rooms.remove_if(&room_id, |_, ids| ids.is_empty());
    }
}

impl Session {
    /// Queues a message for this session's socket. Returns false if the
    /// session is tearing down.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outgoing.send(message).is_ok()
    }

    pub fn binding(&self) -> Option<Binding> {
        *self.binding.lock()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bound_session(
        relay: &Relay,
        room_id: RoomId,
    ) -> (Arc<Session>, UnboundedReceiver<ServerMessage>) {
        let (session, receiver) = relay.open();
        relay.bind(&session, room_id, DeviceId::new());

        (session, receiver)
    }

    fn notice() -> ServerMessage {
        ServerMessage::DeviceConnected {
            device_id: DeviceId::none(),
        }
    }

    #[test]
    fn test_broadcast_reaches_the_room_but_never_the_sender() {
        let relay = Relay::new();
        let room_a = RoomId::new();
        let room_b = RoomId::new();

        let (a1, mut a1_rx) = bound_session(&relay, room_a);
        let (_a2, mut a2_rx) = bound_session(&relay, room_a);
        let (_a3, mut a3_rx) = bound_session(&relay, room_a);
        let (_b1, mut b1_rx) = bound_session(&relay, room_b);

        relay.broadcast(room_a, notice(), Some(a1.id));

        assert!(a2_rx.try_recv().is_ok(), "the second room member receives");
        assert!(a3_rx.try_recv().is_ok(), "the third room member receives");
        assert!(a1_rx.try_recv().is_err(), "the sender is never echoed");
        assert!(b1_rx.try_recv().is_err(), "other rooms hear nothing");
    }

    #[test]
    fn test_broadcast_without_exclusion_includes_the_sender() {
        let relay = Relay::new();
        let room = RoomId::new();

        let (_sender, mut sender_rx) = bound_session(&relay, room);

        relay.broadcast(room, notice(), None);

        assert!(
            sender_rx.try_recv().is_ok(),
            "durable self-updates reach the sender too"
        );
    }

    #[test]
    fn test_unbound_sessions_receive_nothing() {
        let relay = Relay::new();
        let room = RoomId::new();

        let (_bound, mut bound_rx) = bound_session(&relay, room);
        let (_unbound, mut unbound_rx) = relay.open();

        relay.broadcast(room, notice(), None);

        assert!(bound_rx.try_recv().is_ok(), "bound sessions receive");
        assert!(
            unbound_rx.try_recv().is_err(),
            "unbound sessions are not part of any room"
        );
    }

    #[test]
    fn test_closed_sessions_leave_the_room() {
        let relay = Relay::new();
        let room = RoomId::new();

        let (leaving, mut leaving_rx) = bound_session(&relay, room);
        let (_staying, mut staying_rx) = bound_session(&relay, room);

        let binding = relay.close(leaving.id).expect("binding is returned");
        assert_eq!(binding.room_id, room, "the binding names the room");

        relay.broadcast(room, notice(), None);

        assert!(staying_rx.try_recv().is_ok(), "remaining sessions receive");
        assert!(
            leaving_rx.try_recv().is_err(),
            "closed sessions receive nothing"
        );
        assert!(relay.close(leaving.id).is_none(), "closing twice is a no-op");
    }

    #[test]
    fn test_rebinding_moves_a_session_between_rooms() {
        let relay = Relay::new();
        let old_room = RoomId::new();
        let new_room = RoomId::new();

        let (session, mut rx) = bound_session(&relay, old_room);
        relay.bind(&session, new_room, DeviceId::new());

        relay.broadcast(old_room, notice(), None);
        assert!(rx.try_recv().is_err(), "the old room no longer reaches it");

        relay.broadcast(new_room, notice(), None);
        assert!(rx.try_recv().is_ok(), "the new room does");
    }

    #[test]
    fn test_close_room_unbinds_its_sessions() {
        let relay = Relay::new();
        let room = RoomId::new();

        let (session, mut rx) = bound_session(&relay, room);

        relay.close_room(room);

        assert_eq!(session.binding(), None, "the session is unbound");

        relay.broadcast(room, notice(), None);
        assert!(rx.try_recv().is_err(), "the dead room reaches nobody");
    }
}
