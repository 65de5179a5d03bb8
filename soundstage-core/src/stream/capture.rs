use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::{now_millis, AudioChunk, Config, Sample, StreamQuality};

/// Splits a live sample feed into fixed-size frames and emits each one as
/// an [AudioChunk] for the relay path.
///
/// Samples are accumulated until a full frame is available; a trailing
/// partial frame stays pending until more samples arrive.
pub struct StreamCapture {
    quality: StreamQuality,
    pending: Vec<Sample>,
    chunks: Sender<AudioChunk>,
}

impl StreamCapture {
    pub fn new(quality: StreamQuality) -> (Self, Receiver<AudioChunk>) {
        let (chunks, receiver) = unbounded();

        let capture = Self {
            quality,
            pending: Vec::with_capacity(quality.frame_size()),
            chunks,
        };

        (capture, receiver)
    }

    /// Feeds captured samples, emitting a chunk for every completed frame.
    pub fn push(&mut self, samples: &[Sample]) {
        self.pending.extend_from_slice(samples);

        let frame_size = self.quality.frame_size();

        while self.pending.len() >= frame_size {
            let frame: Vec<_> = self.pending.drain(..frame_size).collect();

            let buffer: Vec<u8> = frame
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect();

            let chunk = AudioChunk {
                buffer,
                timestamp: now_millis(),
                quality: self.quality,
            };

            // The receiving end dropping means capture is shutting down.
            self.chunks.send(chunk).ok();
        }
    }

    pub fn quality(&self) -> StreamQuality {
        self.quality
    }
}

/// Decodes a chunk's little-endian f32 payload back into samples.
/// A trailing partial sample is dropped.
pub fn decode_samples(buffer: &[u8]) -> Vec<Sample> {
    buffer
        .chunks_exact(Config::SAMPLE_BYTES)
        .map(|bytes| Sample::from_le_bytes(bytes.try_into().expect("chunk is exact")))
        .collect()
}
