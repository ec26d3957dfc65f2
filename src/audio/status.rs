//! Session status types and the shared status handle.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use super::format::AudioFormat;

/// Lifecycle phase of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Capturing,
    Stopped,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Stopped => "stopped",
        }
    }
}

/// One finished output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedFile {
    pub path: PathBuf,
    /// Interleaved samples written to the file.
    pub samples: u64,
}

/// Snapshot of a session, readable from the operator side.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub device: Option<String>,
    pub format: Option<AudioFormat>,
    pub started_at: Option<chrono::DateTime<chrono::Local>>,
    pub current_file: Option<PathBuf>,
    pub completed_files: Vec<PathBuf>,
    pub breaks: u32,
    pub last_error: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            device: None,
            format: None,
            started_at: None,
            current_file: None,
            completed_files: Vec::new(),
            breaks: 0,
            last_error: None,
        }
    }
}

impl SessionStatus {
    /// Seconds since capture started.
    pub fn duration_seconds(&self) -> Option<u64> {
        self.started_at.map(|started| {
            let elapsed = chrono::Local::now() - started;
            elapsed.num_seconds().max(0) as u64
        })
    }
}

/// Thread-safe handle shared between the session, the capture thread and
/// operator-facing surfaces.
///
/// The capture thread only touches it when a file is opened or closed,
/// never per buffer.
#[derive(Clone, Default)]
pub struct SessionStatusHandle {
    inner: Arc<Mutex<SessionStatus>>,
}

impl SessionStatusHandle {
    pub fn get(&self) -> SessionStatus {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .phase
    }

    pub fn update(&self, f: impl FnOnce(&mut SessionStatus)) {
        let mut status = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    pub(crate) fn start_capturing(&self, device: &str, format: AudioFormat) {
        self.update(|status| {
            status.phase = SessionPhase::Capturing;
            status.device = Some(device.to_string());
            status.format = Some(format);
            status.started_at = Some(chrono::Local::now());
        });
    }

    pub(crate) fn file_opened(&self, path: PathBuf) {
        self.update(|status| status.current_file = Some(path));
    }

    pub(crate) fn file_closed(&self, path: PathBuf) {
        self.update(|status| {
            if status.current_file.as_ref() == Some(&path) {
                status.current_file = None;
            }
            status.completed_files.push(path);
        });
    }

    /// Count a break once its replacement file is open.
    pub(crate) fn break_applied(&self) {
        self.update(|status| status.breaks += 1);
    }

    pub(crate) fn stopped(&self, error: Option<String>) {
        self.update(|status| {
            status.phase = SessionPhase::Stopped;
            status.current_file = None;
            if error.is_some() {
                status.last_error = error;
            }
        });
    }
}
