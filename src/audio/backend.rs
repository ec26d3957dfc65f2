//! Seam between the capture session and the audio host.
//!
//! The session only needs to open a stream that delivers interleaved i16
//! buffers to a callback, start it, and stop it. `CpalBackend` implements
//! this against real hardware; tests drive the session with scripted backends.

use super::devices::CaptureDevice;
use super::error::CaptureError;
use super::format::PcmFormat;

/// What the buffer callback tells the stream after each invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFlow {
    Continue,
    /// No further buffers should be processed.
    Complete,
}

/// Invoked once per hardware buffer with `frames * channels` samples that
/// are only valid for the duration of the call.
pub type BufferCallback = Box<dyn FnMut(&[i16]) -> CallbackFlow + Send + 'static>;

/// Invoked when the stream reports a fatal error.
pub type ErrorCallback = Box<dyn FnMut(CaptureError) + Send + 'static>;

/// Stream parameters requested from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub format: PcmFormat,
    /// Fixed buffer period in frames; `None` lets the device pick its
    /// suggested low-latency size.
    pub buffer_frames: Option<u32>,
}

impl StreamSpec {
    pub fn new(format: PcmFormat, buffer_frames: Option<u32>) -> Self {
        Self {
            format,
            buffer_frames,
        }
    }
}

pub trait CaptureBackend: Send {
    /// Open (but do not start) an input stream on `device`.
    fn open_stream(
        &self,
        device: &CaptureDevice,
        spec: &StreamSpec,
        on_buffer: BufferCallback,
        on_error: ErrorCallback,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// An opened input stream. Dropping it closes it.
pub trait CaptureStream {
    fn start(&mut self) -> Result<(), CaptureError>;
    fn stop(&mut self) -> Result<(), CaptureError>;
}
