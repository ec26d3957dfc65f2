//! Encoding sinks: one open output file plus one encoder.

pub mod factory;
pub mod mp3;
pub mod opus;
pub mod wav;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::error::CaptureError;

pub use factory::{EncoderSinkFactory, EncodingSettings, SinkFactory};
pub use mp3::Mp3Sink;
pub use opus::OpusSink;
pub use wav::WavSink;

/// Accepts interleaved 16-bit PCM and eventually finalizes one file.
///
/// Sinks are written sequentially from the capture thread and never shared.
/// `finalize` consumes the sink, so a write after finalize does not compile.
pub trait AudioSink: Send {
    /// Output file this sink is bound to.
    fn path(&self) -> &Path;

    /// Append one buffer of interleaved samples.
    fn write(&mut self, pcm: &[i16]) -> Result<(), CaptureError>;

    /// Write any trailing codec data and close the file.
    fn finalize(self: Box<Self>) -> Result<(), CaptureError>;
}

/// Create (or truncate) `path` for buffered writing.
pub(crate) fn create_output(path: &Path) -> Result<BufWriter<File>, CaptureError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| CaptureError::io(path, e))
}
