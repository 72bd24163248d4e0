//! One-shot result channel between a worker and the call site.
//!
//! The [`Promise`] side is consumed when fulfilled and fulfills
//! [`CallError::Abandoned`] if dropped unused, so a waiting [`CallFuture`]
//! is always released. The shared slot refuses a second fulfillment instead
//! of overwriting the first outcome.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::error;
use parking_lot::{Condvar, Mutex};

use crate::error::{CallError, CallResult};

enum SlotState<R> {
    Pending,
    Ready(CallResult<R>),
    Taken,
}

struct Slot<R> {
    state: Mutex<SlotState<R>>,
    ready: Condvar,
}

impl<R> Slot<R> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        }
    }

    fn fulfill(&self, result: CallResult<R>) -> Result<(), CallError> {
        let mut state = self.state.lock();
        if !matches!(*state, SlotState::Pending) {
            error!("result slot fulfilled twice; keeping the first outcome");
            return Err(CallError::AlreadyFulfilled);
        }
        *state = SlotState::Ready(result);
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    fn is_ready(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Ready(_))
    }
}

fn take_ready<R>(state: &mut SlotState<R>) -> Option<CallResult<R>> {
    match mem::replace(state, SlotState::Taken) {
        SlotState::Ready(result) => Some(result),
        other => {
            *state = other;
            None
        }
    }
}

/// Producer side of a one-shot result channel.
pub struct Promise<R> {
    slot: Option<Arc<Slot<R>>>,
}

impl<R> Promise<R> {
    /// Delivers the outcome to the paired future.
    pub fn fulfill(mut self, result: CallResult<R>) -> Result<(), CallError> {
        match self.slot.take() {
            Some(slot) => slot.fulfill(result),
            None => Err(CallError::AlreadyFulfilled),
        }
    }

    pub fn set(self, value: R) -> Result<(), CallError> {
        self.fulfill(Ok(value))
    }
}

impl<R> Drop for Promise<R> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let _ = slot.fulfill(Err(CallError::Abandoned));
        }
    }
}

impl<R> fmt::Debug for Promise<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("fulfilled", &self.slot.is_none())
            .finish()
    }
}

/// Consumer side of a one-shot result channel.
#[must_use = "dropping a CallFuture discards the call's outcome"]
pub struct CallFuture<R> {
    slot: Arc<Slot<R>>,
}

impl<R> CallFuture<R> {
    /// Blocks until the outcome is delivered.
    pub fn wait(self) -> CallResult<R> {
        let mut state = self.slot.state.lock();
        loop {
            if let Some(result) = take_ready(&mut state) {
                return result;
            }
            self.slot.ready.wait(&mut state);
        }
    }

    /// Blocks for at most `timeout`; hands the future back if it is still
    /// pending.
    pub fn wait_timeout(self, timeout: Duration) -> Result<CallResult<R>, Self> {
        let deadline = Instant::now() + timeout;
        {
            let mut state = self.slot.state.lock();
            loop {
                if let Some(result) = take_ready(&mut state) {
                    return Ok(result);
                }
                if self.slot.ready.wait_until(&mut state, deadline).timed_out() {
                    if let Some(result) = take_ready(&mut state) {
                        return Ok(result);
                    }
                    break;
                }
            }
        }
        Err(self)
    }

    /// Takes the outcome without blocking, or hands the future back.
    pub fn try_take(self) -> Result<CallResult<R>, Self> {
        let taken = take_ready(&mut self.slot.state.lock());
        match taken {
            Some(result) => Ok(result),
            None => Err(self),
        }
    }

    /// Returns whether an outcome is waiting to be taken.
    pub fn is_ready(&self) -> bool {
        self.slot.is_ready()
    }
}

impl<R> fmt::Debug for CallFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Creates a connected promise/future pair.
pub fn channel<R>() -> (Promise<R>, CallFuture<R>) {
    let slot = Arc::new(Slot::new());
    (
        Promise {
            slot: Some(Arc::clone(&slot)),
        },
        CallFuture { slot },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn promise_delivers_value_across_threads() {
        let (promise, future) = channel();
        let producer = thread::spawn(move || promise.set(42u32));

        assert_eq!(future.wait(), Ok(42));
        assert_eq!(producer.join().unwrap(), Ok(()));
    }

    #[test]
    fn dropped_promise_abandons_future() {
        let (promise, future) = channel::<u8>();
        drop(promise);
        assert!(future.is_ready());
        assert_eq!(future.wait(), Err(CallError::Abandoned));
    }

    #[test]
    fn slot_refuses_second_fulfillment() {
        let slot = Slot::new();
        assert_eq!(slot.fulfill(Ok(1)), Ok(()));
        assert_eq!(slot.fulfill(Ok(2)), Err(CallError::AlreadyFulfilled));

        let future = CallFuture {
            slot: Arc::new(slot),
        };
        assert_eq!(future.wait(), Ok(1));
    }

    #[test]
    fn wait_timeout_returns_pending_future() {
        let (promise, future) = channel::<&'static str>();
        let future = future
            .wait_timeout(Duration::from_millis(5))
            .expect_err("nothing fulfilled yet");

        promise.set("done").unwrap();
        assert_eq!(future.wait_timeout(Duration::from_secs(1)).ok(), Some(Ok("done")));
    }

    #[test]
    fn try_take_polls_without_blocking() {
        let (promise, future) = channel::<u8>();
        let future = future.try_take().expect_err("still pending");
        promise.set(3).unwrap();
        assert_eq!(future.try_take().ok(), Some(Ok(3)));
    }

    #[test]
    fn failure_travels_through_the_channel() {
        let (promise, future) = channel::<()>();
        promise
            .fulfill(Err(CallError::Failed("no route".into())))
            .unwrap();
        assert_eq!(future.wait(), Err(CallError::Failed("no route".into())));
    }
}
