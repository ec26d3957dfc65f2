//! Ogg/Opus sink.
//!
//! Input is cut into 20 ms frames and each frame becomes one Ogg packet.
//! One encoded packet is always held back so that the final packet of the
//! stream can be flagged end-of-stream when the sink is finalized.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ogg::writing::{PacketWriteEndInfo, PacketWriter};
use opus::{Application, Bitrate, Channels, Encoder};
use tracing::debug;

use super::{create_output, AudioSink};
use crate::audio::error::CaptureError;
use crate::audio::format::PcmFormat;

/// Largest packet libopus will emit for one frame.
const MAX_PACKET_SIZE: usize = 4_000;

/// Encoder delay in 48 kHz samples, advertised in OpusHead.
const PRE_SKIP: u16 = 312;

/// Granule positions are always counted at 48 kHz.
const GRANULE_RATE: u64 = 48_000;

/// Packets per second (20 ms frames).
const FRAMES_PER_SECOND: u32 = 50;

const STREAM_SERIAL: u32 = 1;

const VENDOR: &[u8] = b"songbreak";

pub struct OpusSink {
    path: PathBuf,
    format: PcmFormat,
    encoder: Encoder,
    writer: PacketWriter<'static, BufWriter<File>>,
    /// Interleaved samples waiting for a full frame.
    pending: Vec<i16>,
    /// Interleaved samples per encoded frame.
    frame_samples: usize,
    /// Last encoded packet and its granule position.
    held: Option<(Vec<u8>, u64)>,
    packets: u64,
    frames_in: u64,
}

impl OpusSink {
    pub fn create(path: &Path, format: PcmFormat, bitrate: i32) -> Result<Self, CaptureError> {
        let channels = match format.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            n => {
                return Err(CaptureError::Encode(format!(
                    "opus supports 1 or 2 channels, got {n}"
                )))
            }
        };

        let mut encoder = Encoder::new(format.sample_rate, channels, Application::Audio)
            .map_err(CaptureError::encode)?;
        encoder
            .set_bitrate(Bitrate::Bits(bitrate))
            .map_err(CaptureError::encode)?;

        let mut writer = PacketWriter::new(create_output(path)?);
        writer
            .write_packet(
                opus_head(format),
                STREAM_SERIAL,
                PacketWriteEndInfo::EndPage,
                0,
            )
            .map_err(|e| CaptureError::io(path, e))?;
        writer
            .write_packet(opus_tags(), STREAM_SERIAL, PacketWriteEndInfo::EndPage, 0)
            .map_err(|e| CaptureError::io(path, e))?;

        let frame_samples =
            (format.sample_rate / FRAMES_PER_SECOND) as usize * format.channels as usize;

        Ok(Self {
            path: path.to_path_buf(),
            format,
            encoder,
            writer,
            pending: Vec::with_capacity(frame_samples * 2),
            frame_samples,
            held: None,
            packets: 0,
            frames_in: 0,
        })
    }

    fn encode_frame(&mut self, frame: &[i16]) -> Result<(), CaptureError> {
        let packet = self
            .encoder
            .encode_vec(frame, MAX_PACKET_SIZE)
            .map_err(CaptureError::encode)?;
        self.packets += 1;
        let granule = PRE_SKIP as u64 + self.packets * GRANULE_RATE / FRAMES_PER_SECOND as u64;

        if let Some((previous, previous_granule)) = self.held.replace((packet, granule)) {
            self.writer
                .write_packet(
                    previous,
                    STREAM_SERIAL,
                    PacketWriteEndInfo::NormalPacket,
                    previous_granule,
                )
                .map_err(|e| CaptureError::io(&self.path, e))?;
        }
        Ok(())
    }

    /// Granule position of the last real sample, which trims padding on playback.
    fn final_granule(&self) -> u64 {
        PRE_SKIP as u64 + self.frames_in * GRANULE_RATE / self.format.sample_rate as u64
    }
}

impl AudioSink for OpusSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, pcm: &[i16]) -> Result<(), CaptureError> {
        self.frames_in += (pcm.len() / self.format.channels as usize) as u64;
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(pcm);

        let mut frames = pending.chunks_exact(self.frame_samples);
        for frame in &mut frames {
            self.encode_frame(frame)?;
        }
        let consumed = pending.len() - frames.remainder().len();
        pending.drain(..consumed);
        self.pending = pending;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<(), CaptureError> {
        if !self.pending.is_empty() || self.held.is_none() {
            let mut frame = std::mem::take(&mut self.pending);
            frame.resize(self.frame_samples, 0);
            self.encode_frame(&frame)?;
        }

        let granule = self.final_granule();
        let OpusSink {
            path,
            mut writer,
            held,
            packets,
            ..
        } = *self;

        if let Some((last, _)) = held {
            writer
                .write_packet(last, STREAM_SERIAL, PacketWriteEndInfo::EndStream, granule)
                .map_err(|e| CaptureError::io(&path, e))?;
        }

        writer
            .into_inner()
            .flush()
            .map_err(|e| CaptureError::io(&path, e))?;

        debug!(path = %path.display(), packets, granule, "opus stream finalized");
        Ok(())
    }
}

/// OpusHead identification header (RFC 7845, 19 bytes).
fn opus_head(format: PcmFormat) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(format.channels as u8);
    head.extend_from_slice(&PRE_SKIP.to_le_bytes());
    head.extend_from_slice(&format.sample_rate.to_le_bytes());
    head.extend_from_slice(&0u16.to_le_bytes()); // output gain
    head.push(0); // mapping family
    head
}

/// OpusTags comment header with a vendor string and no comments.
fn opus_tags() -> Vec<u8> {
    let mut tags = Vec::with_capacity(8 + 4 + VENDOR.len() + 4);
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&(VENDOR.len() as u32).to_le_bytes());
    tags.extend_from_slice(VENDOR);
    tags.extend_from_slice(&0u32.to_le_bytes());
    tags
}
