//! Object stack - incremental growth, stable finished addresses, unwind
//!
//! Design: three layers sharing one control block:
//! 1. Checked grow primitives append to the pending object (fast path, one
//!    room compare)
//! 2. Newchunk promotion relocates the pending object into a larger chunk
//!    when growth outstrips the current one (slow path, amortized)
//! 3. Free-to-mark releases every chunk newer than a finished address
//!    (bulk unwind)
//!
//! One object is pending per stack at any time. Its address is provisional
//! until [`Obstack::finish`] freezes it; from then on the address never
//! changes until a covering [`Obstack::free`].

mod chunk;
mod hooks;
mod room;


pub use chunk::{system_chunk_alloc, system_chunk_free, ChunkHeader};
pub use hooks::{
    set_exit_code, set_failed_handler, AllocFailedHandler, ChunkAllocArgFn, ChunkAllocFn,
    ChunkAllocator, ChunkFreeArgFn, ChunkFreeFn,
};
pub use room::Room;

use core::fmt;
use core::ptr;
use std::process;

use chunk::{align_up, DEFAULT_ALIGNMENT, DEFAULT_CHUNK_SIZE, HEADER_SIZE};

use crate::logging::{debug, error, log_chunk_alloc, log_chunk_free};

/// A stack of objects carved out of allocator-supplied chunks.
///
/// Grow the pending object byte by byte (or in larger pieces), freeze it
/// with [`finish`](Self::finish), and unwind whole regions with
/// [`free`](Self::free). Finished objects never move; the pending object may
/// be relocated by any grow until it is finished.
///
/// A stack is a sequential structure: it is neither `Send` nor `Sync`, and
/// every operation is bounded and non-blocking modulo the injected chunk
/// source.
///
/// # Examples
///
/// ```
/// use obstack::Obstack;
///
/// let mut stack = Obstack::new();
/// stack.grow(b"sym");
/// stack.grow(b"bol");
/// let name = stack.finish();
///
/// let bytes = unsafe { core::slice::from_raw_parts(name, 6) };
/// assert_eq!(bytes, b"symbol");
/// ```
pub struct Obstack {
    /// Preferred size for new chunks.
    chunk_size: usize,
    /// Newest chunk, or null once the stack has been torn down.
    chunk: *mut ChunkHeader,
    /// Start of the pending object.
    pub(crate) object_base: *mut u8,
    /// Next byte to write in the current chunk.
    pub(crate) next_free: *mut u8,
    /// Cached end of the current chunk.
    chunk_limit: *mut u8,
    /// Low bits that must be clear in every finished address.
    alignment_mask: usize,
    allocator: ChunkAllocator,
    /// Arena-local override for the failure handler.
    failed_handler: Option<AllocFailedHandler>,
    /// The current chunk may end in a zero-length finished object; such a
    /// chunk must survive promotion even when the pending object starts at
    /// its payload.
    maybe_empty_object: bool,
}

impl Obstack {
    /// Create a stack with the default chunk size, alignment, and the
    /// system chunk source.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(0, 0, ChunkAllocator::system())
    }

    /// Create a stack with an explicit preferred chunk size (0 means
    /// default) and the system chunk source.
    #[must_use]
    pub fn begin(chunk_size: usize) -> Self {
        Self::with_allocator(chunk_size, 0, ChunkAllocator::system())
    }

    /// Create a stack with full control over chunk size, object alignment,
    /// and the chunk source.
    ///
    /// `alignment == 0` selects the default (the strictest natural alignment
    /// among integers, pointers, and the widest float); otherwise it must be
    /// a power of two. `chunk_size == 0` selects a default near 4 KiB minus
    /// modest allocator overhead; tiny sizes are floored so a chunk always
    /// holds its own header plus alignment padding.
    ///
    /// The initial chunk is requested immediately. A null return invokes
    /// the failure handler, which does not return.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is nonzero and not a power of two.
    #[must_use]
    pub fn with_allocator(chunk_size: usize, alignment: usize, allocator: ChunkAllocator) -> Self {
        let alignment = if alignment == 0 { DEFAULT_ALIGNMENT } else { alignment };
        assert!(alignment.is_power_of_two(), "alignment must be a power of two");

        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size.max(HEADER_SIZE + alignment)
        };

        let mut stack = Obstack {
            chunk_size,
            chunk: ptr::null_mut(),
            object_base: ptr::null_mut(),
            next_free: ptr::null_mut(),
            chunk_limit: ptr::null_mut(),
            alignment_mask: alignment - 1,
            allocator,
            failed_handler: None,
            maybe_empty_object: false,
        };

        let chunk = stack.request_chunk(chunk_size);
        unsafe {
            (*chunk).limit = (chunk as *mut u8).add(chunk_size);
            (*chunk).prev = ptr::null_mut();
        }
        stack.chunk = chunk;
        stack.chunk_limit = unsafe { (*chunk).limit };
        stack.object_base = ChunkHeader::object_start(chunk, stack.alignment_mask);
        stack.next_free = stack.object_base;

        debug!(chunk_size, alignment, "object stack initialized");
        stack
    }

    /// Install an arena-local allocation-failure handler, overriding the
    /// process-global one for this stack.
    pub fn set_failed_handler(&mut self, handler: AllocFailedHandler) {
        self.failed_handler = Some(handler);
    }

    /// The chunk source, for swapping its hooks after construction.
    pub fn allocator_mut(&mut self) -> &mut ChunkAllocator {
        &mut self.allocator
    }

    // ===== Observers =====

    /// Provisional address of the pending object. A grow that promotes may
    /// still move it; only [`finish`](Self::finish) freezes it.
    #[inline]
    #[must_use]
    pub fn base(&self) -> *mut u8 {
        self.object_base
    }

    /// Bytes accumulated in the pending object.
    #[inline]
    #[must_use]
    pub fn object_size(&self) -> usize {
        self.next_free as usize - self.object_base as usize
    }

    /// Bytes left in the current chunk.
    #[inline]
    #[must_use]
    pub fn room(&self) -> usize {
        self.chunk_limit as usize - self.next_free as usize
    }

    /// Raw write cursor within the current chunk.
    #[inline]
    #[must_use]
    pub fn next_free(&self) -> *mut u8 {
        self.next_free
    }

    /// Preferred size for new chunks.
    #[inline]
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Mask of low bits clear in every finished address.
    #[inline]
    #[must_use]
    pub fn alignment_mask(&self) -> usize {
        self.alignment_mask
    }

    /// True when nothing has been grown or finished since construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.chunk.is_null()
            && unsafe { (*self.chunk).prev.is_null() }
            && self.next_free == ChunkHeader::object_start(self.chunk, self.alignment_mask)
    }

    /// Total bytes held in live chunks, headers included.
    #[must_use]
    pub fn memory_used(&self) -> usize {
        let mut total = 0;
        let mut chunk = self.chunk;
        while !chunk.is_null() {
            unsafe {
                total += (*chunk).limit as usize - chunk as usize;
                chunk = (*chunk).prev;
            }
        }
        total
    }

    /// Whether `addr` falls inside any live chunk. Debugging aid; an
    /// address can test true without ever having been returned by
    /// [`finish`](Self::finish).
    #[must_use]
    pub fn contains(&self, addr: *const u8) -> bool {
        let mut chunk = self.chunk;
        while !chunk.is_null() {
            unsafe {
                if (chunk as usize) < addr as usize && addr as usize <= (*chunk).limit as usize {
                    return true;
                }
                chunk = (*chunk).prev;
            }
        }
        false
    }

    // ===== Grow primitives =====

    /// Append `bytes` to the pending object.
    pub fn grow(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        if self.room() < len {
            self.newchunk(len);
        }
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.next_free, len);
            self.next_free = self.next_free.add(len);
        }
    }

    /// Append `bytes` followed by a single zero byte.
    pub fn grow0(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        if self.room() < len + 1 {
            self.newchunk(len + 1);
        }
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.next_free, len);
            self.next_free = self.next_free.add(len);
            *self.next_free = 0;
            self.next_free = self.next_free.add(1);
        }
    }

    /// Append one byte.
    #[inline]
    pub fn grow1(&mut self, byte: u8) {
        if self.room() < 1 {
            self.newchunk(1);
        }
        unsafe {
            *self.next_free = byte;
            self.next_free = self.next_free.add(1);
        }
    }

    /// Append a pointer-sized value.
    ///
    /// No padding is inserted: the value reads back aligned only if the
    /// bytes grown since the last finish keep pointer alignment.
    pub fn grow_ptr(&mut self, value: *const u8) {
        const LEN: usize = core::mem::size_of::<*const u8>();
        if self.room() < LEN {
            self.newchunk(LEN);
        }
        unsafe {
            (self.next_free as *mut *const u8).write_unaligned(value);
            self.next_free = self.next_free.add(LEN);
        }
    }

    /// Append an int-sized value. Same alignment contract as
    /// [`grow_ptr`](Self::grow_ptr).
    pub fn grow_int(&mut self, value: i32) {
        const LEN: usize = core::mem::size_of::<i32>();
        if self.room() < LEN {
            self.newchunk(LEN);
        }
        unsafe {
            (self.next_free as *mut i32).write_unaligned(value);
            self.next_free = self.next_free.add(LEN);
        }
    }

    /// Ensure at least `len` bytes of room without advancing the cursor.
    pub fn make_room(&mut self, len: usize) {
        if self.room() < len {
            self.newchunk(len);
        }
    }

    /// Reserve `len` bytes and return a handle that appends without room
    /// checks. The exclusive borrow keeps promotion from moving the pending
    /// object while the handle is alive.
    pub fn reserve(&mut self, len: usize) -> Room<'_> {
        self.make_room(len);
        Room::new(self, len)
    }

    /// Advance the cursor by `len`, leaving the bytes uninitialised.
    pub fn blank(&mut self, len: usize) {
        if self.room() < len {
            self.newchunk(len);
        }
        self.next_free = unsafe { self.next_free.add(len) };
    }

    // ===== Finish and one-shot allocation =====

    /// Freeze the pending object and return its now-stable address. The
    /// next pending object starts at the cursor rounded up to alignment.
    pub fn finish(&mut self) -> *mut u8 {
        if self.next_free == self.object_base {
            self.maybe_empty_object = true;
        }

        let chunk_base = self.chunk as usize;
        let mut next = align_up(self.next_free as usize, self.alignment_mask);
        // Alignment padding must not spill past the chunk; the next grow
        // promotes instead.
        if next - chunk_base > self.chunk_limit as usize - chunk_base {
            next = self.chunk_limit as usize;
        }

        let value = self.object_base;
        self.next_free = next as *mut u8;
        self.object_base = self.next_free;
        value
    }

    /// Reserve `len` uninitialised bytes as one finished object.
    pub fn alloc(&mut self, len: usize) -> *mut u8 {
        self.blank(len);
        self.finish()
    }

    /// Copy `bytes` into the stack as one finished object.
    pub fn copy(&mut self, bytes: &[u8]) -> *mut u8 {
        self.grow(bytes);
        self.finish()
    }

    /// Like [`copy`](Self::copy), with a trailing zero byte.
    pub fn copy0(&mut self, bytes: &[u8]) -> *mut u8 {
        self.grow0(bytes);
        self.finish()
    }

    // ===== Free-to-mark =====

    /// Release every finished object whose address is at or above `mark`
    /// and restart the pending object exactly there. `mark` must have been
    /// returned by [`finish`](Self::finish) on this stack and not yet be
    /// unwound; a nonzero address in no live chunk aborts the process.
    ///
    /// A null `mark` releases every chunk and leaves the stack torn down.
    pub fn free(&mut self, mark: *mut u8) {
        // Mark strictly inside the current chunk: a plain cursor reset.
        if !mark.is_null()
            && (self.chunk as usize) < mark as usize
            && (mark as usize) < self.chunk_limit as usize
        {
            self.object_base = mark;
            self.next_free = mark;
            return;
        }
        self.free_walk(mark);
    }

    fn free_walk(&mut self, mark: *mut u8) {
        let target = mark as usize;
        let mut chunk = self.chunk;
        while !chunk.is_null()
            && (chunk as usize >= target || (unsafe { (*chunk).limit } as usize) < target)
        {
            let prev = unsafe { (*chunk).prev };
            log_chunk_free(chunk as *const u8);
            self.allocator.release(chunk as *mut u8);
            chunk = prev;
            // The chunk we switch to may end in a zero-length object that
            // is indistinguishable from its own limit.
            self.maybe_empty_object = true;
        }

        if !chunk.is_null() {
            self.object_base = mark;
            self.next_free = mark;
            self.chunk_limit = unsafe { (*chunk).limit };
            self.chunk = chunk;
        } else if !mark.is_null() {
            error!(mark = ?mark, "free target is not in any live chunk");
            process::abort();
        } else {
            self.chunk = ptr::null_mut();
            self.chunk_limit = ptr::null_mut();
            self.object_base = ptr::null_mut();
            self.next_free = ptr::null_mut();
        }
    }

    // ===== Promotion =====

    /// Move the pending object into a fresh chunk big enough for `length`
    /// more bytes.
    #[cold]
    fn newchunk(&mut self, length: usize) {
        let old_chunk = self.chunk;
        let pending = self.object_size();

        // The pending/8 + 100 term gives geometric growth so repeated
        // spills do not re-copy the same bytes quadratically.
        let new_size = pending
            .checked_add(length)
            .and_then(|sum| sum.checked_add(self.alignment_mask))
            .map(|sum| sum.saturating_add((pending >> 3) + 100))
            .unwrap_or_else(|| self.alloc_failed())
            .max(self.chunk_size);

        let new_chunk = self.request_chunk(new_size);
        let limit = unsafe { (new_chunk as *mut u8).add(new_size) };
        unsafe {
            (*new_chunk).limit = limit;
            (*new_chunk).prev = old_chunk;
        }
        self.chunk = new_chunk;
        self.chunk_limit = limit;

        let object_base = ChunkHeader::object_start(new_chunk, self.alignment_mask);
        unsafe {
            ptr::copy_nonoverlapping(self.object_base, object_base, pending);
        }

        // The old chunk held nothing but the pending object: splice it out
        // and recycle it. A possibly-empty object pins it in place.
        if !self.maybe_empty_object
            && self.object_base == ChunkHeader::object_start(old_chunk, self.alignment_mask)
        {
            unsafe {
                (*new_chunk).prev = (*old_chunk).prev;
            }
            log_chunk_free(old_chunk as *const u8);
            self.allocator.release(old_chunk as *mut u8);
        }

        self.object_base = object_base;
        self.next_free = unsafe { object_base.add(pending) };
        self.maybe_empty_object = false;

        debug!(
            requested = length,
            pending,
            new_size,
            "pending object promoted to a new chunk"
        );
    }

    fn request_chunk(&self, size: usize) -> *mut ChunkHeader {
        let chunk = self.allocator.allocate(size);
        if chunk.is_null() {
            self.alloc_failed();
        }
        log_chunk_alloc(size, chunk);
        chunk as *mut ChunkHeader
    }

    #[cold]
    fn alloc_failed(&self) -> ! {
        match self.failed_handler {
            Some(handler) => handler(),
            None => hooks::failed_handler()(),
        }
    }
}

impl Default for Obstack {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Obstack {
    fn drop(&mut self) {
        if !self.chunk.is_null() {
            self.free(ptr::null_mut());
        }
    }
}

/// Formatted output accretes onto the pending object, so `write!` composes
/// with [`Obstack::grow`] and [`Obstack::finish`]. Growth always covers the
/// full formatted length; nothing is truncated.
impl fmt::Write for Obstack {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.grow(s.as_bytes());
        Ok(())
    }
}
