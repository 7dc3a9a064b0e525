//! Counting semaphore
//!
//! std has no counting semaphore, so this is the classic mutex + condition
//! variable pair. One `post()` releases at most one `wait()`er; the count
//! never goes negative. Used by the task queue to park idle worker threads
//! until work arrives.

use std::sync::{Condvar, Mutex, PoisonError};

/// A counting semaphore built from a `Mutex<usize>` and a `Condvar`.
///
/// `wait()` blocks the calling OS thread until the count is positive,
/// then decrements it. `post()` increments the count and wakes one waiter.
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore with the given initial count.
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Block until the count is positive, then take one unit.
    ///
    /// A poisoned mutex is recovered: the count is a plain integer and
    /// remains valid whatever a panicking thread was doing.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count == 0 {
            count = self
                .available
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
    }

    /// Take one unit if immediately available. Never blocks.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Release one unit and wake a single waiter.
    pub fn post(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        self.available.notify_one();
    }

    /// Current count. Only a snapshot; another thread may change it
    /// before the caller acts on the value.
    pub fn count(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
