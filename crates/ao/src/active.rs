//! Active objects: application state owned by one dedicated worker thread.
//!
//! The behavior value is moved onto the worker when the object spawns and is
//! only ever touched there. Everything else reaches it through commands sent
//! over the object's [`BlockingQueue`].
//!
//! Lifecycle: `Created → Starting → Active → ShuttingDown → Terminated`.
//! Construction enqueues the startup command before the worker exists, so
//! startup always runs first. Shutdown runs after every command enqueued
//! strictly before it, and the worker keeps draining until the queue can be
//! closed empty, so no accepted command is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use log::{debug, error, trace, warn};
use parking_lot::Mutex;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::command::{command, BoxedCommand, Command};
use crate::config::ActiveConfig;
use crate::error::{panic_message, ActiveError, ActiveResult};
use crate::queue::{BlockingQueue, Closed};

/// Application state hosted by an active object.
pub trait Behavior: Send + Sized + 'static {
    /// Runs on the worker before any other command.
    fn on_start(&mut self, _ctx: &mut ActiveContext<Self>) {}

    /// Runs on the worker when shutdown is observed.
    fn on_stop(&mut self, _ctx: &mut ActiveContext<Self>) {}
}

/// Active object lifecycle states.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActiveState {
    /// Shared state published, worker not spawned yet.
    Created,
    /// Worker spawned, startup pending.
    Starting,
    /// Startup executed, processing commands.
    Active,
    /// Shutdown observed, draining remaining commands.
    ShuttingDown,
    /// Worker exited and joined.
    Terminated,
}

impl ActiveState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ActiveState::Created,
            1 => ActiveState::Starting,
            2 => ActiveState::Active,
            3 => ActiveState::ShuttingDown,
            _ => ActiveState::Terminated,
        }
    }
}

impl fmt::Display for ActiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveState::Created => write!(f, "Created"),
            ActiveState::Starting => write!(f, "Starting"),
            ActiveState::Active => write!(f, "Active"),
            ActiveState::ShuttingDown => write!(f, "ShuttingDown"),
            ActiveState::Terminated => write!(f, "Terminated"),
        }
    }
}

struct Shared<T: Behavior> {
    name: String,
    queue: BlockingQueue<BoxedCommand<T>>,
    state: AtomicU8,
    worker: OnceLock<ThreadId>,
}

impl<T: Behavior> Shared<T> {
    fn state(&self) -> ActiveState {
        ActiveState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ActiveState) {
        trace!("active object `{}` -> {state}", self.name);
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Cloneable sending side of an active object.
///
/// Handles can be passed to any thread. They do not keep the worker alive:
/// once it terminates, everything sent through a handle is rejected.
pub struct Handle<T: Behavior> {
    shared: Arc<Shared<T>>,
}

impl<T: Behavior> Handle<T> {
    /// Transfers a command to the object.
    ///
    /// If the object no longer accepts work the command's `reject` runs and
    /// [`ActiveError::NotAccepting`] is returned.
    pub fn enqueue(&self, command: BoxedCommand<T>) -> ActiveResult<()> {
        match self.shared.queue.put(command) {
            Ok(()) => Ok(()),
            Err(Closed(command)) => {
                warn!(
                    "active object `{}` is not accepting work; command rejected",
                    self.shared.name
                );
                command.reject();
                Err(ActiveError::NotAccepting(self.shared.name.clone()))
            }
        }
    }

    /// Enqueues a closure to run on the worker.
    pub fn send<F>(&self, func: F) -> ActiveResult<()>
    where
        F: FnOnce(&mut T, &mut ActiveContext<T>) + Send + 'static,
    {
        self.enqueue(command(func))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ActiveState {
        self.shared.state()
    }

    pub fn is_accepting(&self) -> bool {
        !self.shared.queue.is_closed()
    }

    /// Number of commands waiting for the worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Returns whether the caller is running on this object's worker.
    pub fn is_worker_thread(&self) -> bool {
        self.shared.worker.get() == Some(&thread::current().id())
    }

    /// Asks the worker to shut down without waiting for it.
    pub fn request_stop(&self) {
        if let Err(Closed(command)) = self.shared.queue.put(Box::new(Shutdown)) {
            command.reject();
        }
    }
}

impl<T: Behavior> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Behavior> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.shared.name)
            .field("state", &self.shared.state())
            .finish()
    }
}

/// Per-worker context passed to every command.
pub struct ActiveContext<T: Behavior> {
    handle: Handle<T>,
    active: AtomicBool,
}

impl<T: Behavior> ActiveContext<T> {
    fn new(handle: Handle<T>) -> Self {
        Self {
            handle,
            active: AtomicBool::new(true),
        }
    }

    /// Handle to the object this worker serves, for posting to itself.
    pub fn handle(&self) -> &Handle<T> {
        &self.handle
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// False once shutdown has been observed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Requests shutdown from inside the object. The owner still joins the
    /// worker through [`ActiveObject::shutdown`] or drop.
    pub fn stop(&self) {
        self.handle.request_stop();
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

struct Startup;

impl<T: Behavior> Command<T> for Startup {
    fn execute(self: Box<Self>, object: &mut T, ctx: &mut ActiveContext<T>) {
        debug!("active object `{}` starting", ctx.name());
        object.on_start(ctx);
        // a stop requested from on_start has not run yet, so this cannot regress
        ctx.handle.shared.set_state(ActiveState::Active);
    }
}

struct Shutdown;

impl<T: Behavior> Command<T> for Shutdown {
    fn execute(self: Box<Self>, object: &mut T, ctx: &mut ActiveContext<T>) {
        if !ctx.is_active() {
            return;
        }
        debug!("active object `{}` shutting down", ctx.name());
        ctx.handle.shared.set_state(ActiveState::ShuttingDown);
        object.on_stop(ctx);
        ctx.deactivate();
    }
}

/// Closes the queue and rejects leftovers on every worker exit path.
struct ExitGuard<'a, T: Behavior> {
    shared: &'a Shared<T>,
}

impl<T: Behavior> Drop for ExitGuard<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(
                "worker of active object `{}` panicked; rejecting pending commands",
                self.shared.name
            );
        }
        self.shared.queue.close();
        for command in self.shared.queue.drain() {
            command.reject();
        }
    }
}

fn run_worker<T: Behavior>(handle: Handle<T>, mut behavior: T) {
    let shared = Arc::clone(&handle.shared);
    let _ = shared.worker.set(thread::current().id());
    let _exit = ExitGuard { shared: &shared };
    let mut ctx = ActiveContext::new(handle);

    loop {
        while let Some(command) = shared.queue.get_while(&ctx.active) {
            trace!("active object `{}` executing command", shared.name);
            command.execute(&mut behavior, &mut ctx);
        }
        if shared.queue.close_if_empty() {
            break;
        }
    }
    debug!("active object `{}` drained", shared.name);
}

/// Owner of an active object's worker thread.
///
/// Dropping the owner shuts the object down and joins the worker.
pub struct ActiveObject<T: Behavior> {
    handle: Handle<T>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Behavior> ActiveObject<T> {
    /// Spawns an object with the default configuration.
    pub fn spawn(behavior: T) -> ActiveResult<Self> {
        Self::with_config(ActiveConfig::default(), behavior)
    }

    /// Spawns an object and its worker thread.
    pub fn with_config(config: ActiveConfig, behavior: T) -> ActiveResult<Self> {
        let shared = Arc::new(Shared {
            name: config.name.clone(),
            queue: BlockingQueue::new(),
            state: AtomicU8::new(ActiveState::Created as u8),
            worker: OnceLock::new(),
        });
        let handle = Handle { shared };
        handle.enqueue(Box::new(Startup))?;

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(bytes) = config.stack_size {
            builder = builder.stack_size(bytes);
        }

        handle.shared.set_state(ActiveState::Starting);
        let worker_handle = handle.clone();
        let worker = match builder.spawn(move || run_worker(worker_handle, behavior)) {
            Ok(worker) => worker,
            Err(err) => {
                error!("failed to spawn worker for `{}`: {err}", config.name);
                handle.shared.queue.close();
                for command in handle.shared.queue.drain() {
                    command.reject();
                }
                handle.shared.set_state(ActiveState::Terminated);
                return Err(ActiveError::Spawn(err));
            }
        };
        debug!("active object `{}` spawned", config.name);

        Ok(Self {
            handle,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Returns a new handle for sending work to this object.
    pub fn handle(&self) -> Handle<T> {
        self.handle.clone()
    }

    pub fn enqueue(&self, command: BoxedCommand<T>) -> ActiveResult<()> {
        self.handle.enqueue(command)
    }

    pub fn send<F>(&self, func: F) -> ActiveResult<()>
    where
        F: FnOnce(&mut T, &mut ActiveContext<T>) + Send + 'static,
    {
        self.handle.send(func)
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn state(&self) -> ActiveState {
        self.handle.state()
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == ActiveState::Terminated
    }

    /// Identity of the worker thread.
    pub fn thread_id(&self) -> Option<ThreadId> {
        if let Some(id) = self.handle.shared.worker.get() {
            return Some(*id);
        }
        self.worker.lock().as_ref().map(|worker| worker.thread().id())
    }

    /// Stops the object and waits for the worker to drain and exit.
    ///
    /// Idempotent and callable from any thread; concurrent callers all return
    /// after the worker has been joined. Called from the object's own worker
    /// it only requests the stop, since joining would deadlock.
    pub fn shutdown(&self) -> ActiveResult<()> {
        // checked before locking: an owner may hold the lock while joining us
        if self.handle.is_worker_thread() {
            self.handle.request_stop();
            return Ok(());
        }

        let mut slot = self.worker.lock();
        let Some(worker) = slot.take() else {
            return Ok(());
        };

        debug!("shutdown of `{}` requested", self.name());
        self.handle.request_stop();
        let outcome = worker.join();
        self.handle.shared.set_state(ActiveState::Terminated);

        match outcome {
            Ok(()) => {
                debug!("active object `{}` terminated", self.name());
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                error!("worker of `{}` died: {message}", self.name());
                Err(ActiveError::WorkerFault {
                    name: self.name().to_string(),
                    message,
                })
            }
        }
    }
}

impl<T: Behavior> Drop for ActiveObject<T> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!("shutdown on drop failed: {err}");
        }
    }
}

impl<T: Behavior> fmt::Debug for ActiveObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveObject")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
