//! Per-buffer state machine that runs on the capture thread.
//!
//! For every buffer delivered by the stream:
//! 1. empty buffers are skipped without touching the rotation state,
//! 2. a pending break retires the active sink and installs a new one,
//! 3. the buffer is written to the active sink,
//! 4. a raised cancellation gate completes the stream.
//!
//! A write, finalize or create failure is fatal: the first error is kept,
//! the gate is raised so the session thread wakes, and no further buffers
//! are processed.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::backend::CallbackFlow;
use super::cancel::CancellationGate;
use super::error::CaptureError;
use super::format::AudioFormat;
use super::paths::PathGenerator;
use super::rotation::RotationController;
use super::sink::{AudioSink, SinkFactory};
use super::status::{RecordedFile, SessionStatusHandle};

/// Files produced by a session that ended by cancellation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Finished files in the order they were activated.
    pub files: Vec<RecordedFile>,
    /// Non-empty buffers written across all files.
    pub buffers: u64,
}

impl SessionReport {
    pub fn total_samples(&self) -> u64 {
        self.files.iter().map(|f| f.samples).sum()
    }
}

struct ActiveSink {
    sink: Box<dyn AudioSink>,
    samples: u64,
}

pub struct Recorder {
    factory: Arc<dyn SinkFactory>,
    format: AudioFormat,
    paths: Box<dyn PathGenerator>,
    rotation: Arc<RotationController>,
    gate: Arc<CancellationGate>,
    status: SessionStatusHandle,
    active: Option<ActiveSink>,
    completed: Vec<RecordedFile>,
    failure: Option<CaptureError>,
    finished: bool,
    buffers: u64,
}

impl Recorder {
    pub fn new(
        factory: Arc<dyn SinkFactory>,
        format: AudioFormat,
        paths: Box<dyn PathGenerator>,
        rotation: Arc<RotationController>,
        gate: Arc<CancellationGate>,
        status: SessionStatusHandle,
    ) -> Self {
        Self {
            factory,
            format,
            paths,
            rotation,
            gate,
            status,
            active: None,
            completed: Vec::new(),
            failure: None,
            finished: false,
            buffers: 0,
        }
    }

    /// Create the first sink. Runs before the stream starts.
    pub fn open_first(&mut self) -> Result<(), CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::InvalidState(
                "first sink already opened".into(),
            ));
        }
        let path = self.paths.next_path();
        let sink = self.factory.create(&path, self.format)?;
        info!("Recording to {}", path.display());
        self.install(sink);
        Ok(())
    }

    /// Handle one buffer from the capture stream.
    pub fn on_buffer(&mut self, pcm: &[i16]) -> CallbackFlow {
        if self.finished {
            return CallbackFlow::Complete;
        }
        if pcm.is_empty() {
            return CallbackFlow::Continue;
        }

        if self.rotation.poll_and_clear() {
            if let Err(err) = self.rotate() {
                self.fail(err);
                return CallbackFlow::Complete;
            }
        }

        let Some(active) = self.active.as_mut() else {
            self.fail(CaptureError::InvalidState(
                "buffer delivered with no active sink".into(),
            ));
            return CallbackFlow::Complete;
        };

        if let Err(err) = active.sink.write(pcm) {
            self.fail(err);
            return CallbackFlow::Complete;
        }
        active.samples += pcm.len() as u64;
        self.buffers += 1;

        if self.gate.is_raised() {
            self.finished = true;
            return CallbackFlow::Complete;
        }
        CallbackFlow::Continue
    }

    /// Record a fatal error and stop processing.
    ///
    /// Only the first error is kept; the gate is raised so the thread
    /// waiting on the session wakes up.
    pub fn fail(&mut self, err: CaptureError) {
        self.finished = true;
        if self.failure.is_none() {
            error!("Capture failed: {}", err);
            self.failure = Some(err);
        } else {
            warn!("Additional capture error after failure: {}", err);
        }
        self.gate.raise();
    }

    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Finalize the active sink and return the session outcome.
    ///
    /// Called once the stream is stopped. The active sink is finalized even
    /// after a write failure so partial output keeps a valid trailer.
    pub fn finish(&mut self) -> Result<SessionReport, CaptureError> {
        self.finished = true;

        if let Err(err) = self.retire() {
            if self.failure.is_none() {
                error!("Failed to finalize last file: {}", err);
                self.failure = Some(err);
            } else {
                warn!("Failed to finalize file after earlier failure: {}", err);
            }
        }

        let error = self.failure.take();
        self.status.stopped(error.as_ref().map(|e| e.to_string()));

        match error {
            Some(err) => Err(err),
            None => Ok(SessionReport {
                files: std::mem::take(&mut self.completed),
                buffers: self.buffers,
            }),
        }
    }

    /// Close the stream's sink and delete its file.
    ///
    /// For a session that never started capturing: the file holds no audio
    /// the operator asked for, so it is not reported.
    pub fn discard(&mut self) {
        let Some(ActiveSink { sink, samples }) = self.active.take() else {
            return;
        };
        let path = sink.path().to_path_buf();
        if let Err(err) = sink.finalize() {
            warn!("Failed to close unused file {}: {}", path.display(), err);
        }
        if let Err(err) = std::fs::remove_file(&path) {
            warn!("Failed to remove unused file {}: {}", path.display(), err);
        }
        debug!(path = %path.display(), samples, "discarded first sink");
    }

    /// Retire the active sink and install the next one.
    ///
    /// The break is only counted once the new sink is installed.
    fn rotate(&mut self) -> Result<(), CaptureError> {
        let previous = self.retire()?;
        let path = self.paths.next_path();
        let sink = self.factory.create(&path, self.format)?;
        match previous {
            Some(previous) => info!(
                "Break: {} -> {}",
                previous.display(),
                path.display()
            ),
            None => info!("Recording to {}", path.display()),
        }
        self.install(sink);
        self.status.break_applied();
        Ok(())
    }

    /// Finalize the active sink, if any, and move it to the completed list.
    fn retire(&mut self) -> Result<Option<PathBuf>, CaptureError> {
        let Some(ActiveSink { sink, samples }) = self.active.take() else {
            return Ok(None);
        };
        let path = sink.path().to_path_buf();
        let result = sink.finalize();

        self.completed.push(RecordedFile {
            path: path.clone(),
            samples,
        });
        self.status.file_closed(path.clone());
        result.map(|_| Some(path))
    }

    fn install(&mut self, sink: Box<dyn AudioSink>) {
        self.status.file_opened(sink.path().to_path_buf());
        self.active = Some(ActiveSink { sink, samples: 0 });
    }
}
