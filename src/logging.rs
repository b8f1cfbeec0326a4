//! Logging utilities
//!
//! Lightweight structured logging for chunk traffic and failure paths.
//! Uses `tracing` with minimal overhead; the grow fast paths stay silent
//! and only chunk-granularity events are emitted.

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn, Level};

/// Initialize logging with sensible defaults.
///
/// Call early, once per process. Honors `RUST_LOG`; without it, debug
/// builds log at DEBUG and release builds at INFO for this crate.
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            EnvFilter::new("obstack=debug")
        }
        #[cfg(not(debug_assertions))]
        {
            EnvFilter::new("obstack=info")
        }
    });

    fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .ok(); // Ignore error if already initialized
}

/// Log a chunk acquisition.
#[inline]
pub fn log_chunk_alloc(size: usize, chunk: *const u8) {
    trace!(
        target: "obstack",
        size,
        chunk = ?chunk,
        "chunk acquired"
    );
}

/// Log a chunk release.
#[inline]
pub fn log_chunk_free(chunk: *const u8) {
    trace!(
        target: "obstack",
        chunk = ?chunk,
        "chunk released"
    );
}
