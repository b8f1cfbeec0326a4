//! obstack - a region-based incremental object allocator
//!
//! A "stack of objects": build many small, variable-length objects whose
//! final size is unknown up front. Grow the pending object in amortised
//! O(1), finish it to freeze its address for the rest of its life, and
//! unwind the whole stack back to any finished object's address in one
//! call.
//!
//! The classic use is a symbol table: read an identifier of unknown length
//! byte by byte into the stack, finish it once the end is found, and throw
//! it away again (free to the mark) if the symbol already exists.
//!
//! # Architecture
//!
//! 1. Checked grow primitives append to the pending object (fast path)
//! 2. Newchunk promotion relocates it to a larger chunk when the current
//!    one runs out (slow path, amortized)
//! 3. Free-to-mark walks the chunk chain and releases whole regions by
//!    address (bulk release)
//!
//! Chunks come from an injected source ([`ChunkAllocator`]), so stacks can
//! be embedded in multi-heap environments; the default source is the global
//! allocator. Allocation failure routes to a non-returning handler policy.
//!
//! # Examples
//!
//! ```
//! use obstack::Obstack;
//!
//! let mut stack = Obstack::new();
//!
//! let hello = stack.copy(b"hello");
//! let world = stack.copy(b"world");
//!
//! // Finished objects have stable, aligned, distinct addresses.
//! assert_ne!(hello, world);
//! assert_eq!(hello as usize & stack.alignment_mask(), 0);
//!
//! // Unwind back to `hello`, reclaiming `world` and everything after it.
//! stack.free(hello);
//! assert_eq!(stack.base(), hello);
//! ```

pub mod logging;
pub mod stack;

// Re-export core types
pub use stack::{
    set_exit_code, set_failed_handler, system_chunk_alloc, system_chunk_free,
    AllocFailedHandler, ChunkAllocArgFn, ChunkAllocFn, ChunkAllocator, ChunkFreeArgFn,
    ChunkFreeFn, ChunkHeader, Obstack, Room,
};

// Re-export logging for convenience
pub use logging::init_logging;
