//! Output formats and the fixed PCM capture format.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Capture sample rate used when nothing else is configured.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
/// Capture channel count used when nothing else is configured.
pub const DEFAULT_CHANNELS: u16 = 2;
/// Every sample is a signed 16-bit integer.
pub const BYTES_PER_SAMPLE: u16 = 2;

/// Encoded container written by a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Opus,
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Opus => "opus",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Opus => "opus",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interleaved signed 16-bit PCM at a fixed rate and channel count.
///
/// Chosen once per session; sinks and the capture stream share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes per frame (one sample for every channel).
    pub fn block_align(&self) -> u16 {
        self.channels * BYTES_PER_SAMPLE
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Duration in seconds of `samples` interleaved samples.
    pub fn duration_secs(&self, samples: u64) -> f64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        samples as f64 / self.channels as f64 / self.sample_rate as f64
    }
}
