use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;

use crate::{
    AudioChunk, AudioSegment, Config, ConnectionQuality, Scheduler, StreamReceiver,
};

/// The output an incoming stream plays through. Implemented by whatever
/// renders audio on the device.
pub trait SegmentSink: Send + Sync {
    /// The current audio-clock time in seconds.
    fn clock(&self) -> f64;
    /// Starts a segment at the given audio-clock time.
    fn schedule(&self, segment: AudioSegment, starts_at: f64);
}

/// Drives a [StreamReceiver] against a [SegmentSink]: every arriving
/// chunk is queued, and a deferred drain keeps handing segments to the
/// sink back to back, re-arming itself shortly before each segment ends.
///
/// When the queue runs dry the cycle simply stops until the next chunk
/// arrives; the resulting audible gap is the accepted degradation mode.
pub struct StreamPlayer {
    inner: Arc<PlayerInner>,
}

struct PlayerInner {
    receiver: Mutex<StreamReceiver>,
    sink: Arc<dyn SegmentSink>,
    scheduler: Scheduler,
    /// True while a drain cycle is running or re-armed.
    drain_armed: AtomicCell<bool>,
}

impl StreamPlayer {
    pub fn new(config: Config, sink: Arc<dyn SegmentSink>) -> Self {
        Self {
            inner: Arc::new(PlayerInner {
                receiver: Mutex::new(StreamReceiver::new(config)),
                sink,
                scheduler: Scheduler::new(),
                drain_armed: AtomicCell::new(false),
            }),
        }
    }

    /// Handles the sender announcing its stream.
    pub fn start(&self) {
        self.inner.receiver.lock().start();
    }

    /// Handles the sender stopping its stream. Anything still queued is
    /// discarded.
    pub fn stop(&self) {
        self.inner.receiver.lock().stop();
    }

    /// Queues an arriving chunk and kicks the drain cycle if it is idle.
    pub fn receive(&self, chunk: &AudioChunk) {
        self.inner.receiver.lock().receive(chunk);

        if !self.inner.drain_armed.swap(true) {
            drain(&self.inner);
        }
    }

    pub fn latency(&self) -> Option<i64> {
        self.inner.receiver.lock().latency()
    }

    pub fn quality(&self) -> ConnectionQuality {
        self.inner.receiver.lock().quality()
    }

    pub fn health(&self) -> u8 {
        self.inner.receiver.lock().health()
    }
}

fn drain(inner: &Arc<PlayerInner>) {
    let next = inner.receiver.lock().drain_next(inner.sink.clock());

    let Some(scheduled) = next else {
        // Queue ran dry; the next chunk restarts the cycle.
        inner.drain_armed.store(false);
        return;
    };

    inner.sink.schedule(scheduled.segment, scheduled.starts_at);

    let rearm = inner.clone();
    inner
        .scheduler
        .schedule_in(scheduled.rearm_after, move || drain(&rearm));
}

#[cfg(test)]
mod test {
    use std::{thread, time::Duration};

    use crate::{now_millis, StreamQuality};

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        scheduled: Mutex<Vec<(f64, f64)>>,
    }

    impl SegmentSink for RecordingSink {
        fn clock(&self) -> f64 {
            0.
        }

        fn schedule(&self, segment: AudioSegment, starts_at: f64) {
            self.scheduled.lock().push((starts_at, segment.duration()));
        }
    }

    fn chunk_of(seconds: f64) -> AudioChunk {
        let quality = StreamQuality::Low;
        let samples = (seconds * quality.sample_rate() as f64) as usize;

        AudioChunk {
            buffer: vec![0; samples * 4],
            timestamp: now_millis(),
            quality,
        }
    }

    #[test]
    fn test_player_schedules_segments_back_to_back() {
        let sink = Arc::new(RecordingSink::default());
        let player = StreamPlayer::new(Config::default(), sink.clone());

        for _ in 0..3 {
            player.receive(&chunk_of(0.1));
        }

        thread::sleep(Duration::from_millis(400));

        let scheduled = sink.scheduled.lock();
        assert_eq!(scheduled.len(), 3, "every queued segment is played");

        for window in scheduled.windows(2) {
            let (start, duration) = window[0];
            let (next_start, _) = window[1];

            assert!(
                next_start >= start + duration - 1e-9,
                "segments never overlap"
            );
            assert!(
                next_start - (start + duration) < 1e-9,
                "segments are gapless while the queue holds out"
            );
        }
    }

    #[test]
    fn test_player_goes_idle_when_the_queue_runs_dry() {
        let sink = Arc::new(RecordingSink::default());
        let player = StreamPlayer::new(Config::default(), sink.clone());

        player.receive(&chunk_of(0.05));
        thread::sleep(Duration::from_millis(150));

        assert_eq!(sink.scheduled.lock().len(), 1, "the lone segment plays");
        assert_eq!(player.health(), 0, "the queue is empty");

        // A later chunk restarts the cycle.
        player.receive(&chunk_of(0.05));
        thread::sleep(Duration::from_millis(150));

        assert_eq!(
            sink.scheduled.lock().len(),
            2,
            "arrivals after a dry spell still play"
        );
    }
}
