//! Typed dispatch wrappers binding one method of one active object.
//!
//! A wrapper turns a typed call into a queued command and offers the
//! calling conventions per call:
//!
//! | convention       | method             | outcome delivered to          |
//! |------------------|--------------------|-------------------------------|
//! | synchronous      | `call`             | the blocked caller            |
//! | future           | `call_async`       | a [`CallFuture`]              |
//! | continuation     | `call_then`        | a reply on the callback owner |
//! | fire-and-forget  | `call_and_forget`  | the log, on failure only      |
//!
//! Methods take their arguments as a single value; use a tuple for several.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::active::{ActiveContext, Behavior, Handle};
use crate::command::Command;
use crate::deferred::{Completion, DeferredCall, DeferredFn, Sink};
use crate::error::{panic_message, CallError, CallResult};
use crate::promise::{self, CallFuture};

/// Signature of a method bound by [`Method`].
pub type MethodFn<T, A, R> = fn(&mut T, A) -> R;

/// Continuation run on the thread of the active object that owns it.
pub struct Callback<U: Behavior, R> {
    owner: Handle<U>,
    reply: Box<dyn FnOnce(&mut U, CallResult<R>) + Send>,
}

impl<U: Behavior, R: Send + 'static> Callback<U, R> {
    /// Binds `reply` to `owner`; the outcome is delivered by enqueuing a
    /// command on `owner`, never by running `reply` on the callee's thread.
    pub fn new<F>(owner: Handle<U>, reply: F) -> Self
    where
        F: FnOnce(&mut U, CallResult<R>) + Send + 'static,
    {
        Self {
            owner,
            reply: Box::new(reply),
        }
    }

    fn into_sink(self) -> Sink<R> {
        let Callback { owner, reply } = self;
        Sink::Reply(Box::new(move |result| {
            // a closed owner logs the rejection; there is nobody left to notify
            let _ = owner.send(move |object, _ctx| reply(object, result));
        }))
    }
}

impl<U: Behavior, R> fmt::Debug for Callback<U, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("owner", &self.owner.name())
            .finish_non_exhaustive()
    }
}

struct MethodCall<T, A, R> {
    func: MethodFn<T, A, R>,
    args: A,
    completion: Completion<R>,
}

impl<T, A, R> Command<T> for MethodCall<T, A, R>
where
    T: Behavior,
    A: Send,
    R: Send,
{
    fn execute(self: Box<Self>, object: &mut T, _ctx: &mut ActiveContext<T>) {
        let MethodCall {
            func,
            args,
            completion,
        } = *self;
        let result = panic::catch_unwind(AssertUnwindSafe(|| func(object, args)))
            .map_err(|payload| CallError::Panicked(panic_message(&*payload)));
        completion.finish(result);
    }

    fn reject(self: Box<Self>) {
        self.completion.reject();
    }
}

/// Proxy for a method returning its result directly.
pub struct Method<T: Behavior, A, R> {
    target: Handle<T>,
    func: MethodFn<T, A, R>,
}

impl<T, A, R> Method<T, A, R>
where
    T: Behavior,
    A: Send + 'static,
    R: Send + 'static,
{
    pub fn new(target: Handle<T>, func: MethodFn<T, A, R>) -> Self {
        Self { target, func }
    }

    pub fn target(&self) -> &Handle<T> {
        &self.target
    }

    /// Blocks until the owner's thread has run the method.
    pub fn call(&self, args: A) -> CallResult<R> {
        if self.target.is_worker_thread() {
            return Err(CallError::Reentrant);
        }
        self.call_async(args).wait()
    }

    /// Queues the call and returns immediately.
    pub fn call_async(&self, args: A) -> CallFuture<R> {
        let (promise, future) = promise::channel();
        self.submit(args, Sink::Promise(promise));
        future
    }

    /// Queues the call; its outcome is handed to `callback` on the
    /// callback owner's thread.
    pub fn call_then<U: Behavior>(&self, args: A, callback: Callback<U, R>) {
        self.submit(args, callback.into_sink());
    }

    /// Queues the call and discards its result.
    pub fn call_and_forget(&self, args: A) {
        self.submit(args, Sink::Discard);
    }

    fn submit(&self, args: A, sink: Sink<R>) {
        let call = MethodCall {
            func: self.func,
            args,
            completion: Completion::new(sink),
        };
        // rejection is reported through the completion
        let _ = self.target.enqueue(Box::new(call));
    }
}

impl<T: Behavior, A, R> Clone for Method<T, A, R> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            func: self.func,
        }
    }
}

impl<T: Behavior, A, R> fmt::Debug for Method<T, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("target", &self.target.name())
            .finish_non_exhaustive()
    }
}

/// Proxy for a method that delivers its result through a
/// [`Deferred`](crate::Deferred) handle, possibly after it returns.
pub struct DeferredMethod<T: Behavior, A, R> {
    target: Handle<T>,
    func: DeferredFn<T, A, R>,
}

impl<T, A, R> DeferredMethod<T, A, R>
where
    T: Behavior,
    A: Send + 'static,
    R: Send + 'static,
{
    pub fn new(target: Handle<T>, func: DeferredFn<T, A, R>) -> Self {
        Self { target, func }
    }

    pub fn target(&self) -> &Handle<T> {
        &self.target
    }

    /// Blocks until the deferred handle is completed.
    pub fn call(&self, args: A) -> CallResult<R> {
        if self.target.is_worker_thread() {
            return Err(CallError::Reentrant);
        }
        self.call_async(args).wait()
    }

    pub fn call_async(&self, args: A) -> CallFuture<R> {
        let (promise, future) = promise::channel();
        self.submit(args, Sink::Promise(promise));
        future
    }

    pub fn call_then<U: Behavior>(&self, args: A, callback: Callback<U, R>) {
        self.submit(args, callback.into_sink());
    }

    pub fn call_and_forget(&self, args: A) {
        self.submit(args, Sink::Discard);
    }

    fn submit(&self, args: A, sink: Sink<R>) {
        let call = DeferredCall::new(self.func, args, Completion::new(sink));
        let _ = self.target.enqueue(Box::new(call));
    }
}

impl<T: Behavior, A, R> Clone for DeferredMethod<T, A, R> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            func: self.func,
        }
    }
}

impl<T: Behavior, A, R> fmt::Debug for DeferredMethod<T, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredMethod")
            .field("target", &self.target.name())
            .finish_non_exhaustive()
    }
}
