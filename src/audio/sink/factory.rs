//! Builds ready-to-write sinks for a requested format.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AudioSink, Mp3Sink, OpusSink, WavSink};
use crate::audio::error::CaptureError;
use crate::audio::format::{AudioFormat, PcmFormat};

/// Opus bitrate target in bits per second.
pub const DEFAULT_OPUS_BITRATE: i32 = 192_000;
/// MP3 constant bitrate in kbps.
pub const DEFAULT_MP3_BITRATE_KBPS: u32 = 192;

/// Creates a fully initialized sink bound to a fresh file.
///
/// Creation may block on file and codec setup, so it must not be treated
/// as a cheap call on the capture thread.
pub trait SinkFactory: Send + Sync {
    fn create(&self, path: &Path, format: AudioFormat) -> Result<Box<dyn AudioSink>, CaptureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingSettings {
    pub opus_bitrate: i32,
    pub mp3_bitrate_kbps: u32,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            opus_bitrate: DEFAULT_OPUS_BITRATE,
            mp3_bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
        }
    }
}

/// Factory producing the Opus, MP3 and WAV sinks for one PCM format.
#[derive(Debug, Clone)]
pub struct EncoderSinkFactory {
    pcm: PcmFormat,
    settings: EncodingSettings,
}

impl EncoderSinkFactory {
    pub fn new(pcm: PcmFormat, settings: EncodingSettings) -> Self {
        Self { pcm, settings }
    }

    pub fn pcm_format(&self) -> PcmFormat {
        self.pcm
    }
}

impl SinkFactory for EncoderSinkFactory {
    fn create(&self, path: &Path, format: AudioFormat) -> Result<Box<dyn AudioSink>, CaptureError> {
        debug!(path = %path.display(), %format, "creating sink");

        let sink: Box<dyn AudioSink> = match format {
            AudioFormat::Opus => Box::new(OpusSink::create(
                path,
                self.pcm,
                self.settings.opus_bitrate,
            )?),
            AudioFormat::Mp3 => Box::new(Mp3Sink::create(
                path,
                self.pcm,
                self.settings.mp3_bitrate_kbps,
            )?),
            AudioFormat::Wav => Box::new(WavSink::create(path, self.pcm)?),
        };
        Ok(sink)
    }
}
