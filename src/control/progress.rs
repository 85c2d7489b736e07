//! Step-based progress with a per-step ETA.
//!
//! An operation declares how many steps it has. Within each step the caller
//! reports a total and advances a position. The overall fraction is
//! `(completed_steps + position / total) / steps`.
//!
//! The ETA only looks at the current step: active (unpaused) time spent in
//! the step, scaled by the remaining fraction of that step. No extrapolation
//! across steps is attempted since stages have very different costs.
//!
//! While paused, advances are buffered and applied on resume, so a snapshot
//! taken while paused never moves.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug)]
struct Inner {
    steps: u32,
    step: u32,
    label: String,
    total: u64,
    done: u64,
    pending: u64,
    step_started: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
    finished: bool,
}

impl Inner {
    fn new(steps: u32) -> Self {
        Self {
            steps: steps.max(1),
            step: 0,
            label: String::new(),
            total: 0,
            done: 0,
            pending: 0,
            step_started: Instant::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
            finished: false,
        }
    }

    fn within_step(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.done.min(self.total) as f64) / (self.total as f64)
        }
    }

    fn fraction(&self) -> f64 {
        if self.finished {
            return 1.0;
        }
        let completed = f64::from(self.step.min(self.steps));
        ((completed + self.within_step()) / f64::from(self.steps)).clamp(0.0, 1.0)
    }

    fn active_elapsed(&self, now: Instant) -> Duration {
        let mut paused = self.paused_total;
        if let Some(at) = self.paused_at {
            paused += now.saturating_duration_since(at);
        }
        now.saturating_duration_since(self.step_started)
            .saturating_sub(paused)
    }

    fn eta(&self, now: Instant) -> Option<Duration> {
        if self.finished {
            return Some(Duration::ZERO);
        }
        let f = self.within_step();
        if f <= 0.0 {
            return None;
        }
        let elapsed = self.active_elapsed(now).as_secs_f64();
        Some(Duration::from_secs_f64(elapsed * (1.0 - f) / f))
    }
}

/// A point-in-time view of a [`ProgressTracker`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Zero-based index of the current step.
    pub step: u32,
    /// Declared number of steps.
    pub steps: u32,
    /// Label of the current step.
    pub label: String,
    /// Position within the current step.
    pub done: u64,
    /// Total work units in the current step.
    pub total: u64,
    /// Overall fraction in `[0, 1]`.
    pub fraction: f64,
    /// Estimated time left in the current step.
    #[serde(skip)]
    pub eta: Option<Duration>,
    /// Whether progress is frozen by a pause.
    pub paused: bool,
}

impl ProgressSnapshot {
    /// Overall completion as a percentage.
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }
}

/// Thread-safe progress tracker shared between an operation and its observers.
#[derive(Debug)]
pub struct ProgressTracker {
    inner: Mutex<Inner>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Create an idle tracker with a single step.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset for a new run with the given number of steps.
    pub fn reset(&self, steps: u32) {
        *self.lock() = Inner::new(steps);
    }

    /// Move to step `index` (zero-based) and reset the within-step position.
    pub fn begin_step(&self, index: u32, label: &str) {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.step = index.min(inner.steps);
        inner.label.clear();
        inner.label.push_str(label);
        inner.total = 0;
        inner.done = 0;
        inner.pending = 0;
        inner.step_started = now;
        inner.paused_total = Duration::ZERO;
        if inner.paused_at.is_some() {
            inner.paused_at = Some(now);
        }
    }

    /// Declare the number of work units in the current step.
    pub fn set_total(&self, total: u64) {
        self.lock().total = total;
    }

    /// Advance the current step's position by `n` units.
    pub fn advance(&self, n: u64) {
        let mut inner = self.lock();
        if inner.paused_at.is_some() {
            inner.pending = inner.pending.saturating_add(n);
        } else {
            inner.done = inner.done.saturating_add(n);
        }
    }

    /// Freeze the clock and buffer further advances.
    pub fn pause(&self) {
        let mut inner = self.lock();
        if inner.paused_at.is_none() {
            inner.paused_at = Some(Instant::now());
        }
    }

    /// Unfreeze, apply buffered advances, and exclude the paused time from
    /// the ETA.
    pub fn resume(&self) {
        let mut inner = self.lock();
        if let Some(at) = inner.paused_at.take() {
            inner.paused_total += at.elapsed();
            let pending = std::mem::take(&mut inner.pending);
            inner.done = inner.done.saturating_add(pending);
        }
    }

    /// Mark the run as fully complete.
    pub fn complete(&self) {
        let mut inner = self.lock();
        inner.paused_at = None;
        inner.step = inner.steps;
        inner.finished = true;
    }

    /// Overall fraction in `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        self.lock().fraction()
    }

    /// Estimated remaining time in the current step, if any progress exists.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        self.lock().eta(Instant::now())
    }

    /// Take a consistent snapshot of every field.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.lock();
        ProgressSnapshot {
            step: inner.step,
            steps: inner.steps,
            label: inner.label.clone(),
            done: inner.done,
            total: inner.total,
            fraction: inner.fraction(),
            eta: inner.eta(Instant::now()),
            paused: inner.paused_at.is_some(),
        }
    }
}
