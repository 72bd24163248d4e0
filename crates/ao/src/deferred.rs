//! Completion plumbing shared by all calling conventions, and the deferred
//! call handle.
//!
//! A [`Completion`] is where a call's outcome goes: a promise, a reply onto
//! another active object, or nowhere. A [`Deferred`] hands that completion to
//! the bound method so the result can be supplied later, from any thread.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use log::{error, warn};

use crate::active::{ActiveContext, Behavior};
use crate::command::Command;
use crate::error::{panic_message, CallError, CallResult};
use crate::promise::Promise;

pub(crate) type Reply<R> = Box<dyn FnOnce(CallResult<R>) + Send>;

pub(crate) enum Sink<R> {
    Promise(Promise<R>),
    Reply(Reply<R>),
    Discard,
}

impl<R> Sink<R> {
    fn deliver(self, result: CallResult<R>) {
        match self {
            Sink::Promise(promise) => {
                let _ = promise.fulfill(result);
            }
            Sink::Reply(reply) => reply(result),
            Sink::Discard => {
                if let Err(err) = result {
                    warn!("fire-and-forget call failed: {err}");
                }
            }
        }
    }
}

/// Destination of exactly one call outcome.
pub(crate) struct Completion<R> {
    sink: Option<Sink<R>>,
}

impl<R> Completion<R> {
    pub(crate) fn new(sink: Sink<R>) -> Self {
        Self { sink: Some(sink) }
    }

    pub(crate) fn finish(mut self, result: CallResult<R>) {
        if let Some(sink) = self.sink.take() {
            sink.deliver(result);
        }
    }

    pub(crate) fn reject(self) {
        self.finish(Err(CallError::NotAccepting));
    }
}

impl<R> Drop for Completion<R> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            let outcome = if thread::panicking() {
                CallError::Panicked("call panicked before delivering a result".into())
            } else {
                warn!("call dropped without a result");
                CallError::Abandoned
            };
            sink.deliver(Err(outcome));
        }
    }
}

/// Handle to a pending call whose result is supplied later.
///
/// Completing consumes the handle, so a call is fulfilled at most once.
/// Dropping it uncompleted delivers [`CallError::Abandoned`].
#[must_use = "a dropped Deferred abandons its call"]
pub struct Deferred<R> {
    completion: Completion<R>,
}

impl<R> Deferred<R> {
    pub(crate) fn new(completion: Completion<R>) -> Self {
        Self { completion }
    }

    /// Fulfills the call with a value.
    pub fn complete(self, value: R) {
        self.completion.finish(Ok(value));
    }

    /// Fulfills the call with an application failure.
    pub fn fail(self, reason: impl Into<String>) {
        self.completion.finish(Err(CallError::Failed(reason.into())));
    }

    /// Fulfills the call with an arbitrary outcome.
    pub fn finish(self, result: CallResult<R>) {
        self.completion.finish(result);
    }
}

impl<R> fmt::Debug for Deferred<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

/// Signature of a method whose result is delivered through a [`Deferred`].
pub type DeferredFn<T, A, R> = fn(&mut T, Deferred<R>, A);

/// Command running a deferred method on the owner's thread.
pub(crate) struct DeferredCall<T, A, R> {
    func: DeferredFn<T, A, R>,
    args: A,
    completion: Completion<R>,
}

impl<T, A, R> DeferredCall<T, A, R> {
    pub(crate) fn new(func: DeferredFn<T, A, R>, args: A, completion: Completion<R>) -> Self {
        Self {
            func,
            args,
            completion,
        }
    }
}

impl<T, A, R> Command<T> for DeferredCall<T, A, R>
where
    T: Behavior,
    A: Send,
    R: Send,
{
    fn execute(self: Box<Self>, object: &mut T, ctx: &mut ActiveContext<T>) {
        let DeferredCall {
            func,
            args,
            completion,
        } = *self;
        let deferred = Deferred::new(completion);
        // a panic drops `deferred` mid-unwind, which reports it to the caller
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| func(object, deferred, args)));
        if let Err(payload) = outcome {
            error!(
                "deferred call on `{}` panicked: {}",
                ctx.name(),
                panic_message(&*payload)
            );
        }
    }

    fn reject(self: Box<Self>) {
        self.completion.reject();
    }
}
