//! One-shot cancellation signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Raised once by the operator (or by a fatal capture error), checked by
/// the capture callback every buffer, and waited on by the thread running
/// the session.
///
/// The flag is an atomic so the per-buffer check never takes a lock. It is
/// only ever set while holding `lock`, which keeps `wait` from missing it.
#[derive(Debug, Default)]
pub struct CancellationGate {
    raised: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl CancellationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the gate. Later calls are no-ops.
    pub fn raise(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.raised.store(true, Ordering::Release);
        self.cond.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Block until the gate is raised.
    pub fn wait(&self) {
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !self.is_raised() {
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the gate is raised or `timeout` elapses. Returns whether it was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (_guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |_| !self.is_raised())
            .unwrap_or_else(PoisonError::into_inner);
        self.is_raised()
    }
}
