//! MP3 sink backed by LAME.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use mp3lame_encoder::{Bitrate, Builder, Encoder, FlushNoGap, InterleavedPcm, MonoPcm};

use super::{create_output, AudioSink};
use crate::audio::error::CaptureError;
use crate::audio::format::PcmFormat;

/// LAME needs at least this much room to flush its final frames.
const FLUSH_BUFFER_SIZE: usize = 7_200;

/// Constant bitrates LAME accepts, in kbps.
pub const SUPPORTED_BITRATES_KBPS: &[u32] = &[
    8, 16, 24, 32, 40, 48, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

pub struct Mp3Sink {
    path: PathBuf,
    channels: u16,
    encoder: Encoder,
    out: BufWriter<File>,
    scratch: Vec<u8>,
}

// SAFETY: the LAME context is heap state with no thread affinity. The sink is
// owned by one thread at a time and never shared.
unsafe impl Send for Mp3Sink {}

impl Mp3Sink {
    pub fn create(path: &Path, format: PcmFormat, bitrate_kbps: u32) -> Result<Self, CaptureError> {
        let channels = match format.channels {
            1 | 2 => format.channels,
            n => {
                return Err(CaptureError::Encode(format!(
                    "mp3 supports 1 or 2 channels, got {n}"
                )))
            }
        };

        let mut builder = Builder::new()
            .ok_or_else(|| CaptureError::Encode("failed to allocate LAME encoder".into()))?;
        builder
            .set_num_channels(channels as u8)
            .map_err(CaptureError::encode)?;
        builder
            .set_sample_rate(format.sample_rate)
            .map_err(CaptureError::encode)?;
        builder
            .set_brate(bitrate_from_kbps(bitrate_kbps)?)
            .map_err(CaptureError::encode)?;
        let encoder = builder.build().map_err(CaptureError::encode)?;

        Ok(Self {
            path: path.to_path_buf(),
            channels,
            encoder,
            out: create_output(path)?,
            scratch: Vec::new(),
        })
    }
}

impl AudioSink for Mp3Sink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, pcm: &[i16]) -> Result<(), CaptureError> {
        let frames = pcm.len() / self.channels as usize;
        self.scratch.clear();
        self.scratch
            .reserve(mp3lame_encoder::max_required_buffer_size(frames));

        let encoded = if self.channels == 1 {
            self.encoder
                .encode(MonoPcm(pcm), self.scratch.spare_capacity_mut())
        } else {
            self.encoder
                .encode(InterleavedPcm(pcm), self.scratch.spare_capacity_mut())
        }
        .map_err(CaptureError::encode)?;

        // SAFETY: the encoder initialized exactly `encoded` bytes of spare capacity.
        unsafe { self.scratch.set_len(encoded) };

        self.out
            .write_all(&self.scratch)
            .map_err(|e| CaptureError::io(&self.path, e))
    }

    fn finalize(mut self: Box<Self>) -> Result<(), CaptureError> {
        self.scratch.clear();
        self.scratch.reserve(FLUSH_BUFFER_SIZE);
        let flushed = self
            .encoder
            .flush::<FlushNoGap>(self.scratch.spare_capacity_mut())
            .map_err(CaptureError::encode)?;

        // SAFETY: the encoder initialized exactly `flushed` bytes of spare capacity.
        unsafe { self.scratch.set_len(flushed) };

        let Mp3Sink {
            path,
            mut out,
            scratch,
            ..
        } = *self;
        out.write_all(&scratch)
            .and_then(|_| out.flush())
            .map_err(|e| CaptureError::io(&path, e))
    }
}

fn bitrate_from_kbps(kbps: u32) -> Result<Bitrate, CaptureError> {
    let bitrate = match kbps {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => {
            return Err(CaptureError::Encode(format!(
                "unsupported mp3 bitrate {other} kbps"
            )))
        }
    };
    Ok(bitrate)
}
