use std::{collections::VecDeque, time::Duration};

use crate::{decode_samples, AudioChunk, Config, Sample};

/// A decoded segment of streamed audio awaiting playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub samples: Vec<Sample>,
    pub sample_rate: u32,
}

impl AudioSegment {
    /// Decodes the payload of a relayed chunk.
    pub fn decode(chunk: &AudioChunk) -> Self {
        Self {
            samples: decode_samples(&chunk.buffer),
            sample_rate: chunk.quality.sample_rate(),
        }
    }

    /// Length of the segment in seconds of audio-clock time.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// FIFO of decoded segments, absorbing irregular chunk arrival so output
/// stays gapless as long as the queue does not run dry.
///
/// Draining is pure: the caller passes the current audio-clock time and
/// performs the actual output scheduling with the returned instruction.
#[derive(Debug)]
pub struct JitterBuffer {
    config: Config,
    queue: VecDeque<AudioSegment>,
    /// Audio-clock time the next segment is due to start at.
    next_play_time: f64,
}

/// Instructs the caller when to start a drained segment, and when to
/// attempt the next drain.
#[derive(Debug)]
pub struct ScheduledSegment {
    pub segment: AudioSegment,
    /// Audio-clock time the segment starts at.
    pub starts_at: f64,
    /// How long to wait before draining again, slightly less than the
    /// segment's duration so scheduling latency cannot open a gap.
    pub rearm_after: Duration,
}

impl JitterBuffer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            queue: Default::default(),
            next_play_time: 0.,
        }
    }

    /// Appends an arrived segment to the queue.
    pub fn push(&mut self, segment: AudioSegment) {
        self.queue.push_back(segment);
    }

    /// Dequeues the next segment, placing it back-to-back with the
    /// previously scheduled one. Returns [None] when the queue is empty,
    /// in which case nothing happens until the next segment arrives.
    pub fn drain_next(&mut self, clock: f64) -> Option<ScheduledSegment> {
        let segment = self.queue.pop_front()?;
        let duration = segment.duration();

        let starts_at = clock.max(self.next_play_time);
        self.next_play_time = starts_at + duration;

        let rearm_after =
            Duration::from_secs_f64((duration - self.config.drain_lookahead_secs()).max(0.));

        Some(ScheduledSegment {
            segment,
            starts_at,
            rearm_after,
        })
    }

    /// Buffer health as a saturating percentage of queued segments.
    pub fn health(&self) -> u8 {
        (self.queue.len() * 10).min(100) as u8
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Discards everything queued, for when the stream stops.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.next_play_time = 0.;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn segment(seconds: f64) -> AudioSegment {
        let sample_rate = 1000;

        AudioSegment {
            samples: vec![0.; (seconds * sample_rate as f64) as usize],
            sample_rate,
        }
    }

    #[test]
    fn test_segments_never_overlap() {
        let mut buffer = JitterBuffer::new(Config::default());

        buffer.push(segment(0.5));
        buffer.push(segment(0.25));

        let first = buffer.drain_next(1.0).expect("first segment drains");
        let second = buffer.drain_next(1.0).expect("second segment drains");

        assert_eq!(first.starts_at, 1.0, "first segment starts immediately");
        assert_eq!(
            second.starts_at, 1.5,
            "second segment starts exactly at the end of the first"
        );
    }

    #[test]
    fn test_playback_is_gapless_despite_late_drains() {
        let mut buffer = JitterBuffer::new(Config::default());

        buffer.push(segment(0.5));
        buffer.push(segment(0.5));

        let first = buffer.drain_next(0.0).expect("first segment drains");

        // Drained again slightly before the first segment ends, as the
        // lookahead re-arm would.
        let second = buffer.drain_next(0.45).expect("second segment drains");

        assert_eq!(
            second.starts_at,
            first.starts_at + 0.5,
            "the second segment is back to back with the first"
        );
    }

    #[test]
    fn test_drain_resumes_at_clock_after_running_dry() {
        let mut buffer = JitterBuffer::new(Config::default());

        buffer.push(segment(0.5));
        buffer.drain_next(0.0);

        assert!(buffer.drain_next(0.5).is_none(), "an empty queue drains nothing");

        // A segment arriving after the queue ran dry starts at the clock.
        buffer.push(segment(0.5));
        let late = buffer.drain_next(2.0).expect("late segment drains");

        assert_eq!(late.starts_at, 2.0, "playback resumes at the current clock");
    }

    #[test]
    fn test_rearm_is_lookahead_before_segment_end() {
        let mut buffer = JitterBuffer::new(Config::default());

        buffer.push(segment(0.5));
        let scheduled = buffer.drain_next(0.0).expect("segment drains");

        assert_eq!(
            scheduled.rearm_after,
            Duration::from_millis(450),
            "rearm fires one lookahead before the segment ends"
        );

        // A segment shorter than the lookahead re-arms immediately.
        buffer.push(segment(0.02));
        let short = buffer.drain_next(0.0).expect("short segment drains");

        assert_eq!(short.rearm_after, Duration::ZERO, "rearm never goes negative");
    }

    #[test]
    fn test_health_saturates() {
        let mut buffer = JitterBuffer::new(Config::default());
        assert_eq!(buffer.health(), 0, "empty buffer has no health");

        for _ in 0..3 {
            buffer.push(segment(0.1));
        }
        assert_eq!(buffer.health(), 30, "health grows with queued segments");

        for _ in 0..20 {
            buffer.push(segment(0.1));
        }
        assert_eq!(buffer.health(), 100, "health saturates at 100");
    }
}
