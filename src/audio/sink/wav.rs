//! Raw PCM WAV sink.
//!
//! Writes a placeholder 44-byte RIFF header on creation, appends
//! little-endian samples, and patches the header sizes on finalize.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{create_output, AudioSink};
use crate::audio::error::CaptureError;
use crate::audio::format::{PcmFormat, BYTES_PER_SAMPLE};

/// Size of the canonical PCM WAV header.
pub const WAV_HEADER_SIZE: usize = 44;

/// Largest data chunk the 32-bit RIFF size fields can describe.
const MAX_DATA_BYTES: u64 = u32::MAX as u64 - (WAV_HEADER_SIZE as u64 - 8);

/// Build a canonical 44-byte WAV header.
///
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM fmt chunk size)
/// [20-21]  1 (PCM format tag)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * 2
/// [32-33]  block_align = channels * 2
/// [34-35]  16 (bits per sample)
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn wav_header(format: PcmFormat, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&format.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&(BYTES_PER_SAMPLE * 8).to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

pub struct WavSink {
    path: PathBuf,
    format: PcmFormat,
    out: BufWriter<File>,
    data_bytes: u64,
    scratch: Vec<u8>,
}

impl WavSink {
    pub fn create(path: &Path, format: PcmFormat) -> Result<Self, CaptureError> {
        let mut out = create_output(path)?;
        out.write_all(&wav_header(format, 0))
            .map_err(|e| CaptureError::io(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            format,
            out,
            data_bytes: 0,
            scratch: Vec::new(),
        })
    }

    /// Bytes of sample data written so far.
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }
}

impl AudioSink for WavSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, pcm: &[i16]) -> Result<(), CaptureError> {
        let len = (pcm.len() * BYTES_PER_SAMPLE as usize) as u64;
        if self.data_bytes + len > MAX_DATA_BYTES {
            return Err(CaptureError::Encode(format!(
                "WAV data for {} would exceed the 4 GiB RIFF limit",
                self.path.display()
            )));
        }

        self.scratch.clear();
        self.scratch.reserve(len as usize);
        for sample in pcm {
            self.scratch.extend_from_slice(&sample.to_le_bytes());
        }
        self.out
            .write_all(&self.scratch)
            .map_err(|e| CaptureError::io(&self.path, e))?;
        self.data_bytes += len;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<(), CaptureError> {
        let WavSink {
            path,
            format,
            out,
            data_bytes,
            ..
        } = *self;

        let mut file = out
            .into_inner()
            .map_err(|e| CaptureError::io(&path, e.into_error()))?;

        // Bounded by MAX_DATA_BYTES in write().
        let header = wav_header(format, data_bytes as u32);
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&header))
            .and_then(|_| file.flush())
            .map_err(|e| CaptureError::io(&path, e))?;

        Ok(())
    }
}
