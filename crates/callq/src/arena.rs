//! Ring-buffer arena holding heterogeneous values in place.
//!
//! Each entry is a [`Header`] followed by the value, both written
//! contiguously at the write cursor. An entry never straddles the end of the
//! arena: when it does not fit in the tail, the tail is consumed as padding
//! and the entry goes to offset zero. Tails too short for a header are
//! skipped implicitly by both cursors.
//!
//! Invariant: `used` counts every byte between the read and write cursors,
//! live entries and padding alike, and `used + free() == capacity`.

use std::alloc::{self, Layout};
use std::any::{type_name, TypeId};
use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr::{self, NonNull};

use log::{error, trace};

use crate::error::{CallQueueError, CallQueueResult, PutError};

/// Alignment of the arena base; the largest value alignment accepted.
pub const ARENA_ALIGN: usize = 64;

/// Capacity used by [`CallQueue::new`].
pub const DEFAULT_CAPACITY: usize = 4096;

#[derive(Clone, Copy)]
#[repr(C)]
struct Header {
    type_id: TypeId,
    type_name: &'static str,
    /// Bytes from this header to the next entry.
    span: usize,
    /// Bytes from this header to the value.
    offset: usize,
    drop_fn: unsafe fn(*mut u8),
}

const HEADER_SIZE: usize = size_of::<Header>();
const HEADER_ALIGN: usize = align_of::<Header>();

/// Tag of the tail filler written when an entry wraps.
struct Padding;

impl Header {
    fn of<T: 'static>(offset: usize, span: usize) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            span,
            offset,
            drop_fn: drop_value::<T>,
        }
    }

    fn padding(span: usize) -> Self {
        Self {
            type_id: TypeId::of::<Padding>(),
            type_name: "padding",
            span,
            offset: 0,
            drop_fn: drop_nothing,
        }
    }

    fn is_padding(&self) -> bool {
        self.type_id == TypeId::of::<Padding>()
    }
}

unsafe fn drop_value<T>(value: *mut u8) {
    ptr::drop_in_place(value.cast::<T>());
}

unsafe fn drop_nothing(_: *mut u8) {}

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Where the next entry goes.
#[derive(Debug, Clone, Copy)]
struct Placement {
    /// Tail bytes skipped before the entry; the entry then starts at zero.
    pad: usize,
    start: usize,
    offset: usize,
    span: usize,
}

/// Next readable entry, after skipping any padding.
#[derive(Clone, Copy)]
struct Front {
    pad: usize,
    pos: usize,
    header: Header,
}

/// Stored ahead of every queued call: knows how to pop and run its payload.
#[derive(Clone, Copy)]
struct Invoke(fn(&mut CallQueue) -> CallQueueResult<()>);

/// Function pointer bound to its arguments.
struct Bound<A> {
    func: fn(A),
    args: A,
}

fn invoke_bound<A: Send + 'static>(queue: &mut CallQueue) -> CallQueueResult<()> {
    let Bound { func, args } = queue.get::<Bound<A>>()?;
    func(args);
    Ok(())
}

fn invoke_closure<F: FnOnce() + Send + 'static>(queue: &mut CallQueue) -> CallQueueResult<()> {
    let func = queue.get::<F>()?;
    func();
    Ok(())
}

/// Fixed-capacity circular byte arena of tagged, heterogeneous values.
///
/// Not thread-safe on its own; wrap it in
/// [`SharedCallQueue`](crate::SharedCallQueue) to share it between threads.
pub struct CallQueue {
    buf: NonNull<u8>,
    capacity: usize,
    read: usize,
    write: usize,
    used: usize,
    entries: usize,
}

// Every stored value is `Send`, and the arena is only reachable through
// `&mut self` for anything that touches values.
unsafe impl Send for CallQueue {}

impl CallQueue {
    /// Creates a queue of [`DEFAULT_CAPACITY`] bytes.
    pub fn new() -> Self {
        match Self::with_capacity(DEFAULT_CAPACITY) {
            Ok(queue) => queue,
            Err(err) => unreachable!("default capacity is valid: {err}"),
        }
    }

    /// Creates a queue over `capacity` bytes, which must be a power of two
    /// large enough for one header.
    pub fn with_capacity(capacity: usize) -> CallQueueResult<Self> {
        let min = HEADER_SIZE.next_power_of_two();
        if !capacity.is_power_of_two() || capacity < min {
            return Err(CallQueueError::InvalidCapacity { capacity, min });
        }
        let layout = Layout::from_size_align(capacity, ARENA_ALIGN)
            .map_err(|_| CallQueueError::InvalidCapacity { capacity, min })?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        let Some(buf) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        Ok(Self {
            buf,
            capacity,
            read: 0,
            write: 0,
            used: 0,
            entries: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes held by live entries and wraparound padding.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn free(&self) -> usize {
        self.capacity - self.used
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Type name of the next entry, if any.
    pub fn peek_type_name(&self) -> Option<&'static str> {
        self.front().map(|front| front.header.type_name)
    }

    /// Returns whether the next entry holds a `T`.
    pub fn next_is<T: 'static>(&self) -> bool {
        self.front()
            .is_some_and(|front| front.header.type_id == TypeId::of::<T>())
    }

    /// Moves `value` into the arena.
    ///
    /// Fails without touching stored entries when there is not enough
    /// contiguous space; the value is handed back so the caller can retry,
    /// block or drop it.
    pub fn put<T: Send + 'static>(&mut self, value: T) -> Result<(), PutError<T>> {
        let layout = Layout::new::<T>();
        let placement = self
            .check_align(layout)
            .and_then(|()| self.place(self.write, self.free(), layout));
        let placement = match placement {
            Ok(placement) => placement,
            Err(kind) => return Err(PutError::new(value, kind)),
        };
        // SAFETY: `place` reserved a properly aligned, unoccupied region.
        unsafe { self.commit(placement, value) };
        Ok(())
    }

    /// Moves the next value out of the arena.
    ///
    /// The next entry must hold a `T`; otherwise
    /// [`CallQueueError::TypeMismatch`] is returned and the entry stays.
    pub fn get<T: 'static>(&mut self) -> CallQueueResult<T> {
        let front = self.front().ok_or(CallQueueError::Empty)?;
        if front.header.type_id != TypeId::of::<T>() {
            let err = CallQueueError::TypeMismatch {
                expected: type_name::<T>(),
                found: front.header.type_name,
            };
            error!("call queue read out of sequence: {err}");
            return Err(err);
        }
        // SAFETY: the tag proves a live `T` sits at this offset, and
        // `consume` retires the entry so it is never read or dropped again.
        let value = unsafe { ptr::read(self.at(front.pos + front.header.offset).cast::<T>()) };
        self.consume(front);
        Ok(value)
    }

    /// Queues a call of `func` with `args` as one unit: either both the
    /// call identity and its arguments are stored, or nothing is.
    pub fn enqueue<A: Send + 'static>(&mut self, func: fn(A), args: A) -> Result<(), PutError<A>> {
        self.put_call(Invoke(invoke_bound::<A>), Bound { func, args })
            .map_err(|err| {
                let (bound, kind) = err.into_parts();
                PutError::new(bound.args, kind)
            })
    }

    /// Queues a closure as one call.
    pub fn enqueue_fn<F>(&mut self, func: F) -> Result<(), PutError<F>>
    where
        F: FnOnce() + Send + 'static,
    {
        self.put_call(Invoke(invoke_closure::<F>), func)
    }

    /// Pops the next call identity and lets it pop and run its payload.
    ///
    /// Returns `Ok(false)` when the queue is empty.
    pub fn process(&mut self) -> CallQueueResult<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        let Invoke(run) = self.get::<Invoke>()?;
        run(self)?;
        Ok(true)
    }

    /// Runs queued calls until the queue is empty; returns how many ran.
    pub fn process_all(&mut self) -> CallQueueResult<usize> {
        let mut ran = 0;
        while self.process()? {
            ran += 1;
        }
        Ok(ran)
    }

    /// Destructs every live entry in place.
    pub fn clear(&mut self) {
        while let Some(front) = self.front() {
            self.consume(front);
            // SAFETY: the entry was live and is now retired; its value is
            // dropped exactly once here.
            unsafe { (front.header.drop_fn)(self.at(front.pos + front.header.offset)) };
        }
    }

    fn put_call<P: Send + 'static>(
        &mut self,
        invoke: Invoke,
        payload: P,
    ) -> Result<(), PutError<P>> {
        let head = Layout::new::<Invoke>();
        let body = Layout::new::<P>();
        let plan = self.check_align(body).and_then(|()| {
            let first = self.place(self.write, self.free(), head)?;
            let write = (first.start + first.span) & (self.capacity - 1);
            let free = self.free() - first.pad - first.span;
            let second = self.place(write, free, body)?;
            Ok((first, second))
        });
        let (first, second) = match plan {
            Ok(plan) => plan,
            Err(kind) => return Err(PutError::new(payload, kind)),
        };
        // SAFETY: both regions were reserved in sequence from the current
        // cursor and free space.
        unsafe {
            self.commit(first, invoke);
            self.commit(second, payload);
        }
        Ok(())
    }

    fn check_align(&self, layout: Layout) -> CallQueueResult<()> {
        if layout.align() > ARENA_ALIGN {
            return Err(CallQueueError::Overaligned {
                align: layout.align(),
                max: ARENA_ALIGN,
            });
        }
        Ok(())
    }

    /// Offset and span of an entry for `layout` whose header sits at `pos`.
    fn entry_extent(pos: usize, layout: Layout) -> (usize, usize) {
        let offset = align_up(pos + HEADER_SIZE, layout.align()) - pos;
        let span = align_up(offset + layout.size(), HEADER_ALIGN);
        (offset, span)
    }

    fn place(&self, write: usize, free: usize, layout: Layout) -> CallQueueResult<Placement> {
        let (offset0, span0) = Self::entry_extent(0, layout);
        if span0 > self.capacity {
            return Err(CallQueueError::TooLarge {
                size: span0,
                capacity: self.capacity,
            });
        }

        let tail = self.capacity - write;
        let (offset, span) = Self::entry_extent(write, layout);
        if span <= tail {
            if span > free {
                return Err(CallQueueError::Full { needed: span, free });
            }
            return Ok(Placement {
                pad: 0,
                start: write,
                offset,
                span,
            });
        }

        if tail + span0 > free {
            return Err(CallQueueError::Full {
                needed: tail + span0,
                free,
            });
        }
        Ok(Placement {
            pad: tail,
            start: 0,
            offset: offset0,
            span: span0,
        })
    }

    /// # Safety
    /// `placement` must come from `place` against the current cursors.
    unsafe fn commit<T: 'static>(&mut self, placement: Placement, value: T) {
        if placement.pad > 0 {
            trace!("call queue wraps, padding {} tail bytes", placement.pad);
            if placement.pad >= HEADER_SIZE {
                ptr::write(
                    self.at(self.write).cast::<Header>(),
                    Header::padding(placement.pad),
                );
            }
        }
        ptr::write(
            self.at(placement.start).cast::<Header>(),
            Header::of::<T>(placement.offset, placement.span),
        );
        ptr::write(
            self.at(placement.start + placement.offset).cast::<T>(),
            value,
        );
        self.write = (placement.start + placement.span) & (self.capacity - 1);
        self.used += placement.pad + placement.span;
        self.entries += 1;
    }

    fn front(&self) -> Option<Front> {
        if self.entries == 0 {
            return None;
        }
        let tail = self.capacity - self.read;
        if tail < HEADER_SIZE {
            return Some(Front {
                pad: tail,
                pos: 0,
                header: self.header_at(0),
            });
        }
        let header = self.header_at(self.read);
        if header.is_padding() {
            return Some(Front {
                pad: header.span,
                pos: 0,
                header: self.header_at(0),
            });
        }
        Some(Front {
            pad: 0,
            pos: self.read,
            header,
        })
    }

    fn consume(&mut self, front: Front) {
        self.used -= front.pad + front.header.span;
        self.entries -= 1;
        if self.entries == 0 {
            debug_assert_eq!(self.used, 0);
            self.read = 0;
            self.write = 0;
        } else {
            self.read = (front.pos + front.header.span) & (self.capacity - 1);
        }
    }

    fn header_at(&self, pos: usize) -> Header {
        // SAFETY: callers only pass entry boundaries, where a header was
        // written by `commit`.
        unsafe { ptr::read(self.at(pos).cast::<Header>()) }
    }

    fn at(&self, pos: usize) -> *mut u8 {
        debug_assert!(pos <= self.capacity);
        // SAFETY: `pos` stays within the allocation.
        unsafe { self.buf.as_ptr().add(pos) }
    }
}

impl Default for CallQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CallQueue {
    fn drop(&mut self) {
        self.clear();
        // SAFETY: `buf` was allocated in `with_capacity` with this layout.
        unsafe {
            alloc::dealloc(
                self.buf.as_ptr(),
                Layout::from_size_align_unchecked(self.capacity, ARENA_ALIGN),
            );
        }
    }
}

impl fmt::Debug for CallQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallQueue")
            .field("capacity", &self.capacity)
            .field("entries", &self.entries)
            .field("used", &self.used)
            .field("read", &self.read)
            .field("write", &self.write)
            .finish()
    }
}
