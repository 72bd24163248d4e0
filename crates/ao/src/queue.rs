//! Blocking FIFO used as the inbound command queue of every active object.
//!
//! Any number of producers, one consumer. A mutex guards the items and a
//! condition variable wakes the consumer. Once closed, the queue hands items
//! back to their producer instead of accepting them.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Returned by [`BlockingQueue::put`] when the queue no longer accepts items.
pub struct Closed<T>(pub T);

impl<T> Closed<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Closed(..)")
    }
}

impl<T> fmt::Display for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is closed")
    }
}

impl<T> std::error::Error for Closed<T> {}

struct QueueInner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Condition-variable guarded FIFO.
pub struct BlockingQueue<T> {
    inner: Mutex<QueueInner<T>>,
    available: Condvar,
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Appends an item and wakes one waiting consumer.
    pub fn put(&self, item: T) -> Result<(), Closed<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Closed(item));
        }
        inner.items.push_back(item);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Blocks until an item is available.
    ///
    /// Returns `None` only once the queue is closed and empty.
    pub fn get(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Like [`get`](Self::get), but gives up once `live` is false and the
    /// queue is empty.
    ///
    /// The flag is only re-checked when the consumer wakes, so whoever clears
    /// it from another thread must follow up with a `put` or a `close`.
    pub fn get_while(&self, live: &AtomicBool) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed || !live.load(Ordering::Acquire) {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Blocks for at most `timeout` waiting for an item.
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            if self.available.wait_until(&mut inner, deadline).timed_out() {
                return inner.items.pop_front();
            }
        }
    }

    /// Non-blocking poll.
    pub fn try_get(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Stops accepting items. Items already queued can still be taken.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    /// Closes the queue only if nothing is pending, atomically with respect
    /// to producers. Returns whether the queue is now closed.
    pub fn close_if_empty(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.items.is_empty() {
            inner.closed = true;
            drop(inner);
            self.available.notify_all();
            true
        } else {
            false
        }
    }

    /// Removes every pending item in FIFO order.
    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().items.drain(..).collect()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BlockingQueue")
            .field("len", &inner.items.len())
            .field("closed", &inner.closed)
            .finish()
    }
}
