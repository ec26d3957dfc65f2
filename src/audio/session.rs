//! Capture session lifecycle: Idle -> Capturing -> Stopped.
//!
//! `CaptureSession::run` is synchronous. It creates the first sink, opens
//! the device, starts the stream, and then blocks until the cancellation
//! gate is raised (by the operator or by a fatal capture error). On every
//! exit path the stream is stopped and closed and the last sink finalized.
//!
//! The sink exists before the stream because some hosts deliver buffers as
//! soon as a stream is built, before `start` is called.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::backend::{BufferCallback, CaptureBackend, ErrorCallback, StreamSpec};
use super::cancel::CancellationGate;
use super::devices::CaptureDevice;
use super::error::CaptureError;
use super::format::AudioFormat;
use super::paths::PathGenerator;
use super::recorder::{Recorder, SessionReport};
use super::rotation::RotationController;
use super::sink::SinkFactory;
use super::status::{SessionPhase, SessionStatus, SessionStatusHandle};

/// Operator-side handle for a session: request breaks, cancel, read status.
///
/// Cheap to clone and safe to use from any thread.
#[derive(Clone)]
pub struct SessionControl {
    rotation: Arc<RotationController>,
    gate: Arc<CancellationGate>,
    status: SessionStatusHandle,
}

impl SessionControl {
    /// Ask for the current file to be closed and a new one opened.
    ///
    /// Requests made before the previous one is serviced coalesce. Has no
    /// effect once the session has stopped, and requests made before
    /// capture begins are discarded.
    pub fn request_break(&self) {
        if self.status.phase() == SessionPhase::Stopped {
            debug!("Break requested after session stopped; ignoring");
            return;
        }
        self.rotation.request_break();
    }

    /// End the session. Idempotent.
    pub fn cancel(&self) {
        self.gate.raise();
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.is_raised()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.get()
    }

    pub fn status_handle(&self) -> SessionStatusHandle {
        self.status.clone()
    }
}

pub struct CaptureSession<B: CaptureBackend> {
    backend: B,
    factory: Arc<dyn SinkFactory>,
    spec: StreamSpec,
    control: SessionControl,
}

impl<B: CaptureBackend> CaptureSession<B> {
    pub fn new(backend: B, factory: Arc<dyn SinkFactory>, spec: StreamSpec) -> Self {
        Self {
            backend,
            factory,
            spec,
            control: SessionControl {
                rotation: Arc::new(RotationController::new()),
                gate: Arc::new(CancellationGate::new()),
                status: SessionStatusHandle::default(),
            },
        }
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Capture from `device` until cancelled, rotating files on request.
    ///
    /// Blocks the calling thread for the whole session. Returns the finished
    /// files, or the single fatal error that ended the session early. Output
    /// written before a failure is kept on disk.
    pub fn run(
        self,
        device: &CaptureDevice,
        format: AudioFormat,
        paths: impl PathGenerator + 'static,
    ) -> Result<SessionReport, CaptureError> {
        let CaptureSession {
            backend,
            factory,
            spec,
            control,
        } = self;

        if control.gate.is_raised() {
            info!("Session cancelled before capture started");
            control.status.stopped(None);
            return Ok(SessionReport::default());
        }

        let recorder = Arc::new(Mutex::new(Recorder::new(
            factory,
            format,
            Box::new(paths),
            Arc::clone(&control.rotation),
            Arc::clone(&control.gate),
            control.status.clone(),
        )));

        let on_buffer: BufferCallback = {
            let recorder = Arc::clone(&recorder);
            Box::new(move |pcm: &[i16]| lock(&recorder).on_buffer(pcm))
        };
        let on_error: ErrorCallback = {
            let recorder = Arc::clone(&recorder);
            Box::new(move |err: CaptureError| lock(&recorder).fail(err))
        };

        if let Err(err) = lock(&recorder).open_first() {
            control.status.stopped(Some(err.to_string()));
            return Err(err);
        }
        control.rotation.clear();

        let mut stream = match backend.open_stream(device, &spec, on_buffer, on_error) {
            Ok(stream) => stream,
            Err(err) => {
                lock(&recorder).discard();
                control.status.stopped(Some(err.to_string()));
                return Err(err);
            }
        };

        control.status.start_capturing(&device.display_name, format);

        match stream.start() {
            Ok(()) => {
                info!(
                    "Capturing from '{}' as {} ({} Hz, {} ch)",
                    device.display_name, format, spec.format.sample_rate, spec.format.channels
                );
                control.gate.wait();
                debug!("Session gate raised, stopping stream");

                if let Err(err) = stream.stop() {
                    warn!("Failed to stop capture stream: {}", err);
                    lock(&recorder).fail(err);
                }
            }
            Err(err) => lock(&recorder).fail(err),
        }
        drop(stream);

        let result = lock(&recorder).finish();
        match &result {
            Ok(report) => info!(
                "Session stopped: {} file(s), {} buffer(s)",
                report.files.len(),
                report.buffers
            ),
            Err(err) => warn!("Session ended with error: {}", err),
        }
        result
    }
}

fn lock(recorder: &Mutex<Recorder>) -> MutexGuard<'_, Recorder> {
    recorder.lock().unwrap_or_else(PoisonError::into_inner)
}
