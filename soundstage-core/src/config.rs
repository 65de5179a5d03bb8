use std::mem::size_of;
use std::time::Duration;

/// A single audio sample
pub type Sample = f32;

/// The configuration of the playback coordination engine
#[derive(Debug, Clone)]
pub struct Config {
    /// How far in the future playback actions are scheduled, so that every
    /// device in a room reaches the deadline before it fires
    pub sync_lead: Duration,
    /// How long before a scheduled segment ends the next drain is attempted
    pub drain_lookahead: Duration,
}

impl Config {
    pub const SAMPLE_BYTES: usize = size_of::<Sample>();

    /// The sync lead in milliseconds, as carried by the wire format
    pub fn sync_lead_millis(&self) -> i64 {
        self.sync_lead.as_millis() as i64
    }

    /// The drain lookahead in seconds of audio-clock time
    pub fn drain_lookahead_secs(&self) -> f64 {
        self.drain_lookahead.as_secs_f64()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Enough headroom for a round trip on a local network
            sync_lead: Duration::from_millis(100),
            // Re-arming this close to the end avoids audible gaps from
            // scheduling latency
            drain_lookahead: Duration::from_millis(50),
        }
    }
}
