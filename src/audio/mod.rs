pub mod backend;
pub mod cancel;
pub mod cpal_backend;
pub mod devices;
pub mod error;
pub mod format;
pub mod paths;
pub mod recorder;
pub mod rotation;
pub mod session;
pub mod sink;
pub mod status;

pub use backend::{
    BufferCallback, CallbackFlow, CaptureBackend, CaptureStream, ErrorCallback, StreamSpec,
};
pub use cancel::CancellationGate;
pub use cpal_backend::CpalBackend;
pub use devices::{CaptureDevice, DeviceEnumerator};
pub use error::CaptureError;
pub use format::{AudioFormat, PcmFormat};
pub use paths::{PathGenerator, SequentialPaths};
pub use recorder::{Recorder, SessionReport};
pub use rotation::RotationController;
pub use session::{CaptureSession, SessionControl};
pub use sink::{AudioSink, EncoderSinkFactory, EncodingSettings, SinkFactory};
pub use status::{RecordedFile, SessionPhase, SessionStatus, SessionStatusHandle};
