//! Errors reported by the call queue.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallQueueError {
    #[error("not enough contiguous space: need {needed} bytes, {free} free")]
    Full { needed: usize, free: usize },
    #[error("call queue is empty")]
    Empty,
    #[error("entry of {size} bytes can never fit a {capacity} byte arena")]
    TooLarge { size: usize, capacity: usize },
    #[error("alignment {align} exceeds the arena alignment {max}")]
    Overaligned { align: usize, max: usize },
    #[error("capacity {capacity} must be a power of two of at least {min} bytes")]
    InvalidCapacity { capacity: usize, min: usize },
    #[error("type mismatch: requested `{expected}`, next entry holds `{found}`")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

pub type CallQueueResult<T> = Result<T, CallQueueError>;

/// A rejected `put`, handing the value back to the caller.
pub struct PutError<T> {
    value: T,
    kind: CallQueueError,
}

impl<T> PutError<T> {
    pub(crate) fn new(value: T, kind: CallQueueError) -> Self {
        Self { value, kind }
    }

    pub fn kind(&self) -> &CallQueueError {
        &self.kind
    }

    /// True when retrying after the consumer frees space can succeed.
    pub fn is_full(&self) -> bool {
        matches!(self.kind, CallQueueError::Full { .. })
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, CallQueueError) {
        (self.value, self.kind)
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutError")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl<T> std::error::Error for PutError<T> {}

impl<T> From<PutError<T>> for CallQueueError {
    fn from(err: PutError<T>) -> Self {
        err.kind
    }
}
