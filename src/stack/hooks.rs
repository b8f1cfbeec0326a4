//! Allocator hooks - chunk source dispatch and failure policy
//!
//! Design: the two chunk-function calling conventions (plain, and with a
//! threaded heap context) are a two-variant enum dispatched on every chunk
//! request and release. A null chunk routes to a non-returning failure
//! handler: the arena-local one when installed, otherwise the process-global
//! default, which prints a diagnostic and exits.

use std::process;
use std::sync::atomic::{AtomicI32, Ordering};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::chunk::{system_chunk_alloc, system_chunk_free};
use crate::logging::error;

/// Plain chunk request: size in, region address (or null) out.
pub type ChunkAllocFn = fn(usize) -> *mut u8;
/// Plain chunk release.
pub type ChunkFreeFn = fn(*mut u8);
/// Chunk request threading a user context as its first argument.
pub type ChunkAllocArgFn = fn(*mut (), usize) -> *mut u8;
/// Chunk release threading a user context as its first argument.
pub type ChunkFreeArgFn = fn(*mut (), *mut u8);

/// Handler invoked when a chunk request returns null. Must not return
/// normally; conforming handlers panic, jump, or terminate the process.
pub type AllocFailedHandler = fn() -> !;

/// Chunk source for an arena.
///
/// Arenas embedded in multi-heap environments thread a heap context through
/// allocation with [`ChunkAllocator::WithArg`] without forcing the context
/// into public call sites.
#[derive(Clone, Copy, Debug)]
pub enum ChunkAllocator {
    /// `alloc(size)` / `free(addr)`.
    Plain { alloc: ChunkAllocFn, free: ChunkFreeFn },
    /// `alloc(ctx, size)` / `free(ctx, addr)`.
    WithArg {
        alloc: ChunkAllocArgFn,
        free: ChunkFreeArgFn,
        arg: *mut (),
    },
}

impl ChunkAllocator {
    /// The default source backed by the global allocator.
    pub fn system() -> Self {
        ChunkAllocator::Plain {
            alloc: system_chunk_alloc,
            free: system_chunk_free,
        }
    }

    #[inline]
    pub(crate) fn allocate(&self, size: usize) -> *mut u8 {
        match self {
            ChunkAllocator::Plain { alloc, .. } => alloc(size),
            ChunkAllocator::WithArg { alloc, arg, .. } => alloc(*arg, size),
        }
    }

    #[inline]
    pub(crate) fn release(&self, chunk: *mut u8) {
        match self {
            ChunkAllocator::Plain { free, .. } => free(chunk),
            ChunkAllocator::WithArg { free, arg, .. } => free(*arg, chunk),
        }
    }
}

/// Exit status used by the default failure handler.
static EXIT_CODE: AtomicI32 = AtomicI32::new(1);

static FAILED_HANDLER: Lazy<RwLock<AllocFailedHandler>> =
    Lazy::new(|| RwLock::new(exhausted_and_exit as AllocFailedHandler));

/// Install a process-global handler for chunk-allocation failure.
///
/// Arenas without a local handler route failures here. The default prints
/// `memory exhausted` to stderr and exits.
pub fn set_failed_handler(handler: AllocFailedHandler) {
    *FAILED_HANDLER.write() = handler;
}

pub(crate) fn failed_handler() -> AllocFailedHandler {
    *FAILED_HANDLER.read()
}

/// Change the exit status the default failure handler uses.
pub fn set_exit_code(code: i32) {
    EXIT_CODE.store(code, Ordering::Relaxed);
}

fn exhausted_and_exit() -> ! {
    error!("chunk allocation failed");
    eprintln!("memory exhausted");
    process::exit(EXIT_CODE.load(Ordering::Relaxed))
}
