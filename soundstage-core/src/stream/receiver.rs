use serde::Serialize;

use crate::{now_millis, AudioChunk, AudioSegment, Config, JitterBuffer, ScheduledSegment};

/// Connection quality derived from the measured stream latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Disconnected,
}

impl ConnectionQuality {
    /// Classifies a latency measurement in milliseconds. No measurement
    /// means no stream is arriving.
    pub fn classify(latency: Option<i64>) -> Self {
        let Some(latency) = latency else {
            return Self::Disconnected;
        };

        match latency {
            ..=49 => Self::Excellent,
            50..=99 => Self::Good,
            100..=199 => Self::Fair,
            _ => Self::Poor,
        }
    }
}

/// The receiving end of the streaming path: decodes arriving chunks into
/// the jitter buffer and measures how far behind the sender they are.
pub struct StreamReceiver {
    jitter: JitterBuffer,
    latency: Option<i64>,
    receiving: bool,
}

impl StreamReceiver {
    pub fn new(config: Config) -> Self {
        Self {
            jitter: JitterBuffer::new(config),
            latency: None,
            receiving: false,
        }
    }

    /// Handles the sender announcing its stream.
    pub fn start(&mut self) {
        self.receiving = true;
    }

    /// Handles the sender stopping its stream.
    pub fn stop(&mut self) {
        self.receiving = false;
        self.latency = None;
        self.jitter.clear();
    }

    /// Decodes an arriving chunk into the queue and updates the latency
    /// measurement.
    pub fn receive(&mut self, chunk: &AudioChunk) {
        self.receiving = true;
        self.latency = Some(now_millis() - chunk.timestamp);
        self.jitter.push(AudioSegment::decode(chunk));
    }

    /// Drains the next segment for output. See [JitterBuffer::drain_next].
    pub fn drain_next(&mut self, clock: f64) -> Option<ScheduledSegment> {
        self.jitter.drain_next(clock)
    }

    /// The last measured latency in milliseconds, if a stream is arriving.
    pub fn latency(&self) -> Option<i64> {
        self.latency
    }

    pub fn quality(&self) -> ConnectionQuality {
        if !self.receiving {
            return ConnectionQuality::Disconnected;
        }

        ConnectionQuality::classify(self.latency)
    }

    /// Buffer health as a saturating percentage. See [JitterBuffer::health].
    pub fn health(&self) -> u8 {
        self.jitter.health()
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving
    }
}
