//! Pending file-break request shared between the operator and the capture thread.

use std::sync::atomic::{AtomicBool, Ordering};

/// Coalescing break request.
///
/// Any number of `request_break` calls between two polls collapse into one
/// rotation. A request that happens-before a poll is observed by that poll
/// or a later one.
#[derive(Debug, Default)]
pub struct RotationController {
    pending: AtomicBool,
}

impl RotationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_break(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Atomically read and reset the flag.
    pub fn poll_and_clear(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Drop a stale request without acting on it.
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}
