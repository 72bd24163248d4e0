//! Error types for active object lifecycles and dispatched calls.

use std::any::Any;
use std::io;

use thiserror::Error;

/// Errors reported by active object lifecycle and enqueue operations.
#[derive(Error, Debug)]
pub enum ActiveError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("active object `{0}` is not accepting work")]
    NotAccepting(String),
    #[error("worker of active object `{name}` died: {message}")]
    WorkerFault { name: String, message: String },
}

pub type ActiveResult<T> = Result<T, ActiveError>;

/// Fault side of a dispatched call's outcome.
///
/// Every calling convention delivers `Result<R, CallError>`: the blocking
/// call returns it, futures resolve to it, callbacks receive it and
/// fire-and-forget calls log it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The target's worker has terminated and its queue is closed.
    #[error("target is not accepting work")]
    NotAccepting,
    /// The call was dropped before anyone delivered a result.
    #[error("call was dropped before its result was delivered")]
    Abandoned,
    /// A result slot was fulfilled a second time; the first outcome is kept.
    #[error("result slot was already fulfilled")]
    AlreadyFulfilled,
    /// A blocking call was issued from the target's own worker thread.
    #[error("blocking call issued from the target's own worker thread")]
    Reentrant,
    /// The bound method panicked.
    #[error("call panicked: {0}")]
    Panicked(String),
    /// A deferred call was completed with an application failure.
    #[error("call failed: {0}")]
    Failed(String),
}

pub type CallResult<T> = Result<T, CallError>;

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
