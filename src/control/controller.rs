//! The process-wide operation controller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::gate::{Cancelled, RunSignals};
use super::progress::{ProgressSnapshot, ProgressTracker};
use super::state::{OperationKind, OperationState};

/// Errors from controller commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// Another operation already owns the controller.
    #[error("cannot start {requested}: a {running} operation is {state}")]
    Busy {
        /// The operation that was requested.
        requested: OperationKind,
        /// The operation currently running.
        running: OperationKind,
        /// Its current state.
        state: OperationState,
    },
}

/// How a run ended, as reported by the operation itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    /// The operation ran to the end.
    Completed,
    /// The operation observed cancellation and unwound.
    Cancelled,
    /// The operation stopped on an unrecovered failure.
    Failed(String),
}

impl From<Cancelled> for RunResult {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Handle given to an operation when it starts.
///
/// Cloning is cheap; every clone shares the same signals and tracker.
#[derive(Debug, Clone)]
pub struct RunContext {
    kind: OperationKind,
    signals: Arc<RunSignals>,
    progress: Arc<ProgressTracker>,
}

impl RunContext {
    /// A context that is not attached to any controller.
    ///
    /// Useful for driving pipeline pieces directly.
    #[must_use]
    pub fn detached(kind: OperationKind, steps: u32) -> Self {
        let progress = Arc::new(ProgressTracker::new());
        progress.reset(steps);
        Self {
            kind,
            signals: Arc::new(RunSignals::new()),
            progress,
        }
    }

    /// The operation this context was created for.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Pause gate and cancellation signal for this run.
    #[must_use]
    pub fn signals(&self) -> &Arc<RunSignals> {
        &self.signals
    }

    /// Progress tracker for this run.
    #[must_use]
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Block while paused, then fail if cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] once cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        self.signals.checkpoint()
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signals.is_cancelled()
    }
}

#[derive(Debug)]
struct Inner {
    state: OperationState,
    kind: Option<OperationKind>,
    signals: Option<Arc<RunSignals>>,
    last_error: Option<String>,
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

/// Owns the single [`OperationState`] and the per-run signals.
///
/// Only one operation may be active at a time. Every transition happens under
/// one lock, so concurrent pause/cancel/finish requests serialize cleanly.
#[derive(Debug)]
pub struct OperationController {
    inner: Mutex<Inner>,
    progress: Arc<ProgressTracker>,
}

impl Default for OperationController {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationController {
    /// Create an idle controller.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: OperationState::Idle,
                kind: None,
                signals: None,
                last_error: None,
                started: None,
                elapsed: None,
            }),
            progress: Arc::new(ProgressTracker::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `Running` for a new operation with `steps` progress steps.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Busy`] if an operation is already active.
    pub fn begin(&self, kind: OperationKind, steps: u32) -> Result<RunContext, ControlError> {
        let mut inner = self.lock();
        if !inner.state.can_start() {
            return Err(ControlError::Busy {
                requested: kind,
                running: inner.kind.unwrap_or(kind),
                state: inner.state,
            });
        }

        let signals = Arc::new(RunSignals::new());
        self.progress.reset(steps);
        inner.state = OperationState::Running;
        inner.kind = Some(kind);
        inner.signals = Some(Arc::clone(&signals));
        inner.last_error = None;
        inner.started = Some(Instant::now());
        inner.elapsed = None;

        log::debug!("Operation {kind} started ({steps} steps)");
        Ok(RunContext {
            kind,
            signals,
            progress: Arc::clone(&self.progress),
        })
    }

    /// `Running → Paused`. Returns `false` when not running.
    pub fn pause(&self) -> bool {
        let mut inner = self.lock();
        if !inner.state.can_pause() {
            return false;
        }
        if let Some(signals) = &inner.signals {
            signals.pause();
        }
        self.progress.pause();
        inner.state = OperationState::Paused;
        log::debug!("Operation paused");
        true
    }

    /// `Paused → Running`. Returns `false` when not paused.
    pub fn resume(&self) -> bool {
        let mut inner = self.lock();
        if !inner.state.can_resume() {
            return false;
        }
        self.progress.resume();
        if let Some(signals) = &inner.signals {
            signals.resume();
        }
        inner.state = OperationState::Running;
        log::debug!("Operation resumed");
        true
    }

    /// `Running|Paused → Cancelling`. Returns `false` otherwise.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if !inner.state.can_cancel() {
            return false;
        }
        self.progress.resume();
        if let Some(signals) = &inner.signals {
            signals.cancel();
        }
        inner.state = OperationState::Cancelling;
        log::info!("Cancellation requested");
        true
    }

    /// Record how the active operation ended.
    ///
    /// A run that was asked to cancel always ends `Cancelled`. Calls made
    /// when no operation is active are ignored and return `false`.
    pub fn finish(&self, result: RunResult) -> bool {
        let mut inner = self.lock();
        if !inner.state.is_active() {
            return false;
        }
        if inner.state == OperationState::Paused {
            // Workers may finish their last item after the gate closed.
            // Reopen it so the run leaves through Running.
            self.progress.resume();
            if let Some(signals) = &inner.signals {
                signals.resume();
            }
            inner.state = OperationState::Running;
            log::debug!("Operation resumed to finish");
        }

        let next = match (&result, inner.state) {
            (_, OperationState::Cancelling) | (RunResult::Cancelled, _) => {
                OperationState::Cancelled
            }
            (RunResult::Failed(message), _) => {
                inner.last_error = Some(message.clone());
                OperationState::Error
            }
            (RunResult::Completed, _) => {
                self.progress.complete();
                OperationState::Completed
            }
        };

        if next != OperationState::Completed {
            self.progress.resume();
        }
        inner.state = next;
        inner.signals = None;
        inner.elapsed = inner.started.map(|s| s.elapsed());
        log::debug!("Operation finished: {next}");
        true
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> OperationState {
        self.lock().state
    }

    /// The active or most recent operation.
    #[must_use]
    pub fn kind(&self) -> Option<OperationKind> {
        self.lock().kind
    }

    /// Failure message of the most recent run, if it ended in `Error`.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Wall-clock duration of the active or most recent run.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        inner
            .elapsed
            .or_else(|| inner.started.map(|s| s.elapsed()))
    }

    /// Overall progress fraction in `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        self.progress.fraction()
    }

    /// Estimated time left in the current step.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        self.progress.eta()
    }

    /// Full progress snapshot.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }
}
