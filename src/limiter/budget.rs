//! Blocking in-flight cap.
//!
//! Bounds how many files on one volume may hold open read buffers at once.
//! `acquire` blocks on a condvar until a permit is free; the returned
//! [`InFlightPermit`] releases on drop, including during unwinding.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct State {
    avail: usize,
}

/// Fixed-capacity blocking counter.
#[derive(Debug)]
pub struct InFlightCap {
    total: usize,
    state: Mutex<State>,
    cv: Condvar,
}

impl InFlightCap {
    /// Create a cap of `total` permits. A zero capacity is raised to one.
    #[must_use]
    pub fn new(total: usize) -> Self {
        let total = total.max(1);
        Self {
            total,
            state: Mutex::new(State { avail: total }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capacity of this cap.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Permits currently held. A snapshot only.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.total - self.lock().avail
    }

    /// Take a permit without blocking.
    pub fn try_acquire(&self) -> Option<InFlightPermit<'_>> {
        let mut st = self.lock();
        if st.avail == 0 {
            return None;
        }
        st.avail -= 1;
        Some(InFlightPermit { cap: self })
    }

    /// Take a permit, blocking until one is released.
    pub fn acquire(&self) -> InFlightPermit<'_> {
        let mut st = self.lock();
        while st.avail == 0 {
            st = self.cv.wait(st).unwrap_or_else(PoisonError::into_inner);
        }
        st.avail -= 1;
        InFlightPermit { cap: self }
    }

    fn release(&self) {
        let mut st = self.lock();
        st.avail += 1;
        debug_assert!(
            st.avail <= self.total || std::thread::panicking(),
            "in-flight over-release: {} > {}",
            st.avail,
            self.total
        );
        drop(st);
        self.cv.notify_one();
    }
}

/// RAII permit from an [`InFlightCap`].
#[derive(Debug)]
#[must_use = "the permit is released as soon as it is dropped"]
pub struct InFlightPermit<'a> {
    cap: &'a InFlightCap,
}

impl Drop for InFlightPermit<'_> {
    fn drop(&mut self) {
        self.cap.release();
    }
}
