//! Cooperative pause gate and cancellation signal.
//!
//! Workers call [`RunSignals::checkpoint`] before and after each unit of I/O.
//! A checkpoint blocks while the gate is closed (paused) and returns
//! [`Cancelled`] once cancellation has been requested. Cancelling always
//! opens the gate so paused workers can unwind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Marker returned from a checkpoint after cancellation was requested.
///
/// Cancellation is a deliberate unwind, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Default)]
struct GateState {
    paused: bool,
    cancelled: bool,
}

/// Pause gate plus cancellation flag for one operation run.
///
/// The atomics give workers a lock-free fast path when the gate is open;
/// the mutex and condvar are only touched while paused.
#[derive(Debug, Default)]
pub struct RunSignals {
    paused: AtomicBool,
    cancelled: AtomicBool,
    state: Mutex<GateState>,
    cv: Condvar,
}

impl RunSignals {
    /// Create signals with the gate open and no cancellation requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the gate. Workers block at their next checkpoint.
    pub fn pause(&self) {
        let mut state = self.lock();
        if state.cancelled {
            return;
        }
        state.paused = true;
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Open the gate and wake every blocked worker.
    pub fn resume(&self) {
        let mut state = self.lock();
        state.paused = false;
        self.paused.store(false, Ordering::SeqCst);
        drop(state);
        self.cv.notify_all();
    }

    /// Request cancellation. Also opens the gate.
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.cancelled = true;
        state.paused = false;
        self.cancelled.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        drop(state);
        self.cv.notify_all();
    }

    /// Whether the gate is currently closed.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Block while paused. Returns without checking cancellation.
    pub fn wait_while_paused(&self) {
        if !self.is_paused() {
            return;
        }
        let mut state = self.lock();
        while state.paused && !state.cancelled {
            state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block while paused, then fail if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] once [`cancel`](Self::cancel) has been called.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        self.wait_while_paused();
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
