//! Bounded FIFO task queue
//!
//! The hand-off point between the reactor thread (producer) and the worker
//! pool (consumers). The producer side is non-blocking by contract: a full
//! queue is a rejection the caller must handle, never a stall of the event
//! loop. Consumers block on a semaphore that is posted exactly once per
//! successful insert, so a wakeup always finds an item.

use crate::semaphore::Semaphore;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Returned by [`TaskQueue::push`] when the queue is at capacity.
/// Carries the rejected value back to the caller.
pub struct QueueFull<T>(pub T);

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueFull(..)")
    }
}

/// Bounded multi-consumer FIFO queue.
///
/// Mutation of the deque always happens under the mutex; the semaphore
/// carries the "items available" count so that `pop()` can park without
/// holding the lock.
pub struct TaskQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Semaphore,
    capacity: usize,
}

impl<T> TaskQueue<T> {
    /// Create a queue that holds at most `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Semaphore::new(0),
            capacity,
        }
    }

    /// Append an item. Fails immediately when the queue is at capacity,
    /// returning the item so the caller can dispose of it.
    pub fn push(&self, item: T) -> Result<(), QueueFull<T>> {
        {
            let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
            if items.len() >= self.capacity {
                return Err(QueueFull(item));
            }
            items.push_back(item);
        }
        // Post outside the lock: the woken consumer takes the lock next.
        self.ready.post();
        Ok(())
    }

    /// Remove and return the oldest item, blocking while the queue is
    /// empty.
    pub fn pop(&self) -> T {
        self.ready.wait();
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        // One semaphore unit per queued item, so the deque cannot be empty.
        items.pop_front().expect("task queue accounting broken")
    }

    /// Remove and return the oldest item if one is immediately available.
    pub fn try_pop(&self) -> Option<T> {
        if !self.ready.try_wait() {
            return None;
        }
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Some(items.pop_front().expect("task queue accounting broken"))
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured capacity bound.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
