//! Error type shared by the capture core.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by devices, sinks and the capture session.
///
/// A session ends with at most one of these: the first fatal error seen on
/// the capture thread wins and later ones are only logged.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Host initialization, enumeration, or stream open/start/stop failure.
    #[error("audio device error: {0}")]
    Device(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The codec rejected input or failed to finish its stream.
    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),
}

impl CaptureError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn device(err: impl std::fmt::Display) -> Self {
        Self::Device(err.to_string())
    }

    pub fn encode(err: impl std::fmt::Display) -> Self {
        Self::Encode(err.to_string())
    }
}
