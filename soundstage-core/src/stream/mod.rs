use serde::{Deserialize, Serialize};

mod capture;
mod jitter;
mod player;
mod receiver;

pub use capture::*;
pub use jitter::*;
pub use player::*;
pub use receiver::*;

/// Capture quality of a live audio stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl StreamQuality {
    /// Samples per second captured at this quality.
    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Low => 22050,
            Self::Medium => 44100,
            Self::High => 48000,
        }
    }

    /// Samples per captured frame.
    pub fn frame_size(&self) -> usize {
        match self {
            Self::Low => 1024,
            Self::Medium => 2048,
            Self::High => 4096,
        }
    }
}

/// One captured frame of audio, as relayed between devices.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Little-endian f32 samples.
    pub buffer: Vec<u8>,
    /// Unix milliseconds at capture time.
    pub timestamp: i64,
    pub quality: StreamQuality,
}
