//! # ao
//!
//! In-process active objects. Each object owns one worker thread that
//! serially drains a queue of commands, so the object's state is only ever
//! touched by that thread and needs no locking. Other threads reach it
//! through typed dispatch wrappers.
//!
//! ## Module Overview
//! - [`queue`]    – Blocking FIFO, the only cross-thread synchronization point.
//! - [`command`]  – Type-erased units of work moved through the queue.
//! - [`promise`]  – One-shot result channel (`Promise` / `CallFuture`).
//! - [`deferred`] – Deferred call handles completed after the method returns.
//! - [`active`]   – Active object lifecycle and worker loop.
//! - [`dispatch`] – `Method` / `DeferredMethod` proxies and their calling
//!   conventions.
//! - [`config`]   – Worker configuration.
//!
//! ```no_run
//! use ao::{ActiveObject, Behavior, Method};
//!
//! struct Counter {
//!     value: u64,
//! }
//!
//! impl Behavior for Counter {}
//!
//! impl Counter {
//!     fn add(&mut self, amount: u64) -> u64 {
//!         self.value += amount;
//!         self.value
//!     }
//! }
//!
//! let counter = ActiveObject::spawn(Counter { value: 0 })?;
//! let add = Method::new(counter.handle(), Counter::add);
//! assert_eq!(add.call(2)?, 2);
//! let pending = add.call_async(3);
//! assert_eq!(pending.wait()?, 5);
//! counter.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod active;
pub mod command;
pub mod config;
pub mod deferred;
pub mod dispatch;
pub mod error;
pub mod promise;
pub mod queue;

pub use active::{ActiveContext, ActiveObject, ActiveState, Behavior, Handle};
pub use command::{command, BoxedCommand, Command};
pub use config::{ActiveConfig, ActiveConfigBuilder};
pub use deferred::{Deferred, DeferredFn};
pub use dispatch::{Callback, DeferredMethod, Method, MethodFn};
pub use error::{ActiveError, ActiveResult, CallError, CallResult};
pub use promise::{CallFuture, Promise};
pub use queue::{BlockingQueue, Closed};

#[cfg(test)]
mod tests;
