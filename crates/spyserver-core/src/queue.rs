//! Capacity-bounded, thread-safe FIFO used to hand sample batches from the
//! network receive task to a consumer thread.
//!
//! The producer side never blocks: when the queue is full, the oldest entry
//! is discarded to make room and the overflow flag is raised. The consumer
//! side can block indefinitely ([`CappedQueue::dequeue`]) or with a deadline
//! ([`CappedQueue::dequeue_timeout`]).
//!
//! A single mutex guards the contents and a single condition variable
//! signals availability. Any number of producers and consumers may share
//! one queue through an `Arc`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// A FIFO queue with a hard capacity that evicts its oldest entry on overflow.
#[derive(Debug)]
pub struct CappedQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    capacity: usize,
    overflow: AtomicBool,
}

impl<T> CappedQueue<T> {
    /// Create an empty queue holding at most `capacity` items.
    ///
    /// Returns [`Error::InvalidParameter`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidParameter(
                "queue capacity must be greater than zero".into(),
            ));
        }
        Ok(Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
            overflow: AtomicBool::new(false),
        })
    }

    /// Insert `item` at the tail.
    ///
    /// If the queue is already at capacity the head item is dropped first and
    /// the overflow flag is set. Wakes one waiting consumer.
    pub fn enqueue(&self, item: T) {
        {
            let mut items = self.items.lock();
            debug_assert!(items.len() <= self.capacity);
            if items.len() == self.capacity {
                items.pop_front();
                self.overflow.store(true, Ordering::SeqCst);
                tracing::trace!(capacity = self.capacity, "Queue full, evicted oldest entry");
            }
            items.push_back(item);
        }
        self.available.notify_one();
    }

    /// Pop the head item, blocking the calling thread until one is available.
    pub fn dequeue(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.available.wait(&mut items);
        }
    }

    /// Pop the head item if one becomes available within `timeout`.
    ///
    /// Every call clears the overflow flag, whether or not an item is
    /// returned. Poll [`overflow`](Self::overflow) before calling this if the
    /// eviction indicator matters to you.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        self.overflow.store(false, Ordering::SeqCst);

        let mut items = self.items.lock();
        if items.is_empty() {
            self.available
                .wait_while_for(&mut items, |items| items.is_empty(), timeout);
        }
        items.pop_front()
    }

    /// Whether an item has been evicted since the flag was last cleared.
    pub fn overflow(&self) -> bool {
        self.overflow.load(Ordering::SeqCst)
    }

    /// Clear the overflow flag.
    pub fn reset_overflow(&self) {
        self.overflow.store(false, Ordering::SeqCst);
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Remove every queued item. The capacity is unchanged.
    pub fn clear(&self) {
        self.items.lock().clear();
    }

    /// Maximum number of items the queue holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
