//! A [`CallQueue`] shared between producer and consumer threads.

use std::fmt;
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::arena::CallQueue;
use crate::error::{CallQueueError, CallQueueResult, PutError};

/// Mutex-guarded call queue whose blocking operations wait on a condition
/// variable for space or entries.
///
/// Queued calls run while the lock is held: a call must not touch the queue
/// that is running it, or it deadlocks.
pub struct SharedCallQueue {
    queue: Mutex<CallQueue>,
    changed: Condvar,
}

impl SharedCallQueue {
    pub fn new(queue: CallQueue) -> Self {
        Self {
            queue: Mutex::new(queue),
            changed: Condvar::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> CallQueueResult<Self> {
        CallQueue::with_capacity(capacity).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.lock().capacity()
    }

    /// Stores `value` if it fits right now.
    pub fn try_put<T: Send + 'static>(&self, value: T) -> Result<(), PutError<T>> {
        let result = self.queue.lock().put(value);
        if result.is_ok() {
            self.changed.notify_all();
        }
        result
    }

    /// Stores `value`, waiting for the consumer to free space.
    ///
    /// Values that can never fit are handed back immediately.
    pub fn put_blocking<T: Send + 'static>(&self, value: T) -> Result<(), PutError<T>> {
        self.retry_while_full(value, |queue, value| queue.put(value))
    }

    /// Queues a call, waiting for the consumer to free space.
    pub fn enqueue_blocking<A: Send + 'static>(
        &self,
        func: fn(A),
        args: A,
    ) -> Result<(), PutError<A>> {
        self.retry_while_full(args, |queue, args| queue.enqueue(func, args))
    }

    /// Queues a closure, waiting for the consumer to free space.
    pub fn enqueue_fn_blocking<F>(&self, func: F) -> Result<(), PutError<F>>
    where
        F: FnOnce() + Send + 'static,
    {
        self.retry_while_full(func, |queue, func| queue.enqueue_fn(func))
    }

    /// Takes the next value, waiting until one is stored.
    pub fn get_blocking<T: 'static>(&self) -> CallQueueResult<T> {
        let mut queue = self.queue.lock();
        while queue.is_empty() {
            self.changed.wait(&mut queue);
        }
        let value = queue.get::<T>();
        drop(queue);
        if value.is_ok() {
            self.changed.notify_all();
        }
        value
    }

    /// Runs the next queued call, waiting until one is queued.
    pub fn process_blocking(&self) -> CallQueueResult<()> {
        let mut queue = self.queue.lock();
        while queue.is_empty() {
            self.changed.wait(&mut queue);
        }
        let result = queue.process().map(|_| ());
        drop(queue);
        self.changed.notify_all();
        result
    }

    /// Runs the next queued call, waiting at most `timeout` for one.
    ///
    /// Returns `Ok(false)` if nothing was queued in time.
    pub fn process_timeout(&self, timeout: Duration) -> CallQueueResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        while queue.is_empty() {
            if self.changed.wait_until(&mut queue, deadline).timed_out() && queue.is_empty() {
                return Ok(false);
            }
        }
        let result = queue.process();
        drop(queue);
        self.changed.notify_all();
        result
    }

    /// Runs every queued call without waiting.
    pub fn process_all(&self) -> CallQueueResult<usize> {
        let result = self.queue.lock().process_all();
        self.changed.notify_all();
        result
    }

    pub fn into_inner(self) -> CallQueue {
        self.queue.into_inner()
    }

    fn retry_while_full<V>(
        &self,
        mut value: V,
        mut attempt: impl FnMut(&mut CallQueue, V) -> Result<(), PutError<V>>,
    ) -> Result<(), PutError<V>> {
        let mut queue = self.queue.lock();
        loop {
            match attempt(&mut *queue, value) {
                Ok(()) => {
                    drop(queue);
                    self.changed.notify_all();
                    return Ok(());
                }
                Err(err) if err.is_full() && !queue.is_empty() => {
                    if let CallQueueError::Full { needed, free } = err.kind() {
                        debug!("call queue full ({needed} needed, {free} free), waiting");
                    }
                    value = err.into_inner();
                    self.changed.wait(&mut queue);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl fmt::Debug for SharedCallQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.queue.try_lock() {
            Some(queue) => f.debug_tuple("SharedCallQueue").field(&*queue).finish(),
            None => f.write_str("SharedCallQueue(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn blocked_producer_resumes_when_consumer_drains() {
        let shared = Arc::new(SharedCallQueue::with_capacity(256).unwrap());
        let producer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for value in 0..200u64 {
                    shared.put_blocking(value).unwrap();
                }
            })
        };

        for expected in 0..200u64 {
            assert_eq!(shared.get_blocking::<u64>(), Ok(expected));
        }
        producer.join().unwrap();
        assert!(shared.is_empty());
    }

    #[test]
    fn process_timeout_on_an_idle_queue() {
        let shared = SharedCallQueue::with_capacity(256).unwrap();
        assert_eq!(shared.process_timeout(Duration::from_millis(10)), Ok(false));
    }

    #[test]
    fn oversized_value_is_not_waited_for() {
        let shared = SharedCallQueue::with_capacity(128).unwrap();
        let err = shared.put_blocking([0u8; 256]).unwrap_err();
        assert!(matches!(err.kind(), CallQueueError::TooLarge { .. }));
    }
}
