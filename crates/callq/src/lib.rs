//! # callq
//!
//! A fixed-capacity ring buffer that stores values of different types
//! back to back in one aligned byte arena, and a call queue built on it.
//!
//! Every entry is tagged with its type. Reads must name the type of the
//! next entry; a wrong guess is reported as
//! [`CallQueueError::TypeMismatch`] and leaves the entry in place.
//!
//! ```
//! use callq::CallQueue;
//!
//! let mut queue = CallQueue::with_capacity(1024)?;
//! queue.put(1234i32)?;
//! queue.put(0.5f64)?;
//! assert_eq!(queue.get::<i32>()?, 1234);
//! assert_eq!(queue.get::<f64>()?, 0.5);
//!
//! queue.enqueue(|n: u32| println!("called with {n}"), 7)?;
//! assert_eq!(queue.process_all()?, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Modules
//!
//! - [`arena`]: the single-threaded [`CallQueue`]
//! - [`shared`]: [`SharedCallQueue`], a lock plus condition variable for
//!   producers and consumers on different threads
//! - [`error`]: error types

pub mod arena;
pub mod error;
pub mod shared;

pub use arena::{CallQueue, ARENA_ALIGN, DEFAULT_CAPACITY};
pub use error::{CallQueueError, CallQueueResult, PutError};
pub use shared::SharedCallQueue;
