//! Commands: the unit of work handed to an active object's worker.
//!
//! A command is owned by exactly one party at a time: the enqueuer, the
//! queue, the worker executing it, or whoever completes it later. Both
//! terminal steps take `Box<Self>`, so a command is consumed exactly once.

use crate::active::{ActiveContext, Behavior};

/// Type-erased unit of work executed on the worker thread that owns `T`.
pub trait Command<T: Behavior>: Send {
    /// Runs the command against the object's state.
    fn execute(self: Box<Self>, object: &mut T, ctx: &mut ActiveContext<T>);

    /// Called instead of `execute` when the command will never run, for
    /// example because the target stopped accepting work.
    fn reject(self: Box<Self>) {}
}

pub type BoxedCommand<T> = Box<dyn Command<T>>;

/// Closure-backed command.
pub struct FnCommand<F> {
    func: F,
}

impl<T, F> Command<T> for FnCommand<F>
where
    T: Behavior,
    F: FnOnce(&mut T, &mut ActiveContext<T>) + Send,
{
    fn execute(self: Box<Self>, object: &mut T, ctx: &mut ActiveContext<T>) {
        let FnCommand { func } = *self;
        func(object, ctx)
    }
}

/// Wraps a closure into a boxed command.
pub fn command<T, F>(func: F) -> BoxedCommand<T>
where
    T: Behavior,
    F: FnOnce(&mut T, &mut ActiveContext<T>) + Send + 'static,
{
    Box::new(FnCommand { func })
}
