use std::{sync::Arc, time::Duration};

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

mod scheduler;
pub use scheduler::*;

use crate::{now_millis, Config};

/// The local audio session a [Synchronizer] drives. Implemented by
/// whatever actually produces sound on the device.
pub trait AudioSession: Send + Sync {
    /// Starts playback, seeking first when a position is given.
    fn play(&self, position: Option<f64>);
    /// Stops playback in place.
    fn pause(&self);
    /// Moves the play head without changing the play/pause state.
    fn seek(&self, position: f64);
}

/// A playback action every device in a room applies at the same deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Play,
    Pause,
    Seek,
}

/// A host-issued playback command, stamped with the absolute wall-clock
/// deadline at which it takes effect.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCommand {
    pub action: SyncAction,
    /// Unix milliseconds at which the action takes visible effect.
    pub timestamp: i64,
    /// Seconds into the track, for play and seek.
    pub position: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No track is loaded.
    #[default]
    Idle,
    /// A track is loaded but has not started playing yet.
    Loaded,
    Playing,
    Paused,
}

/// Keeps one device's playback in lock-step with the rest of its room.
///
/// Commands carry a deadline in the future; deferring each command until
/// that deadline converts uneven network delay into a common convergence
/// point. Clock drift between devices is not corrected for.
pub struct Synchronizer {
    config: Config,
    state: Arc<AtomicCell<SyncState>>,
    session: Arc<Mutex<Option<Arc<dyn AudioSession>>>>,
    scheduler: Scheduler,
    pending: Mutex<Vec<TaskId>>,
}

impl Synchronizer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Default::default(),
            session: Default::default(),
            scheduler: Scheduler::new(),
            pending: Default::default(),
        }
    }

    /// Attaches the local audio session a loaded track plays through.
    pub fn load(&self, session: Arc<dyn AudioSession>) {
        *self.session.lock() = Some(session);
        self.state.store(SyncState::Loaded);
    }

    /// Tears down the local audio session. Pending deferred commands are
    /// cancelled; any that already came due find no session and do nothing.
    pub fn unload(&self) {
        *self.session.lock() = None;
        self.state.store(SyncState::Idle);

        for id in self.pending.lock().drain(..) {
            self.scheduler.cancel(id);
        }
    }

    /// Defers a received command until its deadline. A deadline already in
    /// the past applies immediately.
    pub fn handle(&self, command: SyncCommand) {
        let delay = (command.timestamp - now_millis()).max(0) as u64;

        let state = self.state.clone();
        let session = self.session.clone();

        let id = self
            .scheduler
            .schedule_in(Duration::from_millis(delay), move || {
                apply(&state, &session, &command)
            });

        self.pending.lock().push(id);
    }

    /// Stamps a local action with the configured lead and schedules it
    /// through the same deferred path as received commands, keeping the
    /// issuing device time-aligned with the rest of the room. Returns the
    /// command so it can be relayed.
    pub fn issue(&self, action: SyncAction, position: Option<f64>) -> SyncCommand {
        let command = SyncCommand {
            action,
            timestamp: now_millis() + self.config.sync_lead_millis(),
            position,
        };

        self.handle(command.clone());
        command
    }

    pub fn state(&self) -> SyncState {
        self.state.load()
    }
}

fn apply(
    state: &AtomicCell<SyncState>,
    session: &Mutex<Option<Arc<dyn AudioSession>>>,
    command: &SyncCommand,
) {
    let session = session.lock().clone();

    // The session may have been torn down since this was scheduled.
    let Some(session) = session else { return };

    match command.action {
        SyncAction::Play => {
            session.play(command.position);
            state.store(SyncState::Playing);
        }
        SyncAction::Pause => {
            session.pause();
            state.store(SyncState::Paused);
        }
        SyncAction::Seek => {
            if let Some(position) = command.position {
                session.seek(position);
            }
        }
    }
}
