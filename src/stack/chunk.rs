//! Chunk layout - backing regions and their headers
//!
//! Design: a small header lives at the low address of every chunk; the
//! payload follows it and objects start at the payload rounded up to the
//! arena's alignment. The default chunk source is the global allocator,
//! with the release side recovering the layout from the still-intact header.

use std::alloc::{alloc, dealloc, Layout};

use crate::logging::warn;

/// Alignment of every chunk request made by the default source. Covers the
/// header and the default object alignment.
pub(crate) const CHUNK_ALIGN: usize = 16;

const fn const_max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Default object alignment: the strictest natural alignment among
/// integers, pointers, and the widest float.
pub(crate) const DEFAULT_ALIGNMENT: usize = const_max(
    const_max(core::mem::align_of::<u64>(), core::mem::align_of::<*const u8>()),
    core::mem::align_of::<f64>(),
);

/// Default preferred chunk size: what the system allocator can carve out of
/// a 4 KiB block without spilling into the next one.
pub(crate) const DEFAULT_CHUNK_SIZE: usize = 4096 - 64;

/// Lives at the front of each chunk.
#[repr(C)]
pub struct ChunkHeader {
    /// One past the last usable byte of this chunk.
    pub(crate) limit: *mut u8,
    /// Next older chunk, or null for the oldest.
    pub(crate) prev: *mut ChunkHeader,
}

pub(crate) const HEADER_SIZE: usize = core::mem::size_of::<ChunkHeader>();

/// Round `addr` up to the next multiple of `mask + 1`.
///
/// `mask` is one less than a power of two, so adding it and clearing its
/// bits is branch-free round-up.
#[inline(always)]
pub(crate) const fn align_up(addr: usize, mask: usize) -> usize {
    addr.wrapping_add(mask) & !mask
}

impl ChunkHeader {
    /// First payload byte, before object alignment.
    #[inline]
    pub(crate) fn payload(chunk: *mut ChunkHeader) -> *mut u8 {
        unsafe { (chunk as *mut u8).add(HEADER_SIZE) }
    }

    /// First address in `chunk` where an object may start.
    #[inline]
    pub(crate) fn object_start(chunk: *mut ChunkHeader, alignment_mask: usize) -> *mut u8 {
        align_up(Self::payload(chunk) as usize, alignment_mask) as *mut u8
    }
}

/// Default chunk source: the global allocator.
///
/// Returns null when the allocator fails or the size cannot be expressed as
/// a layout; the caller routes null through the failure policy.
pub fn system_chunk_alloc(size: usize) -> *mut u8 {
    let Ok(layout) = Layout::from_size_align(size, CHUNK_ALIGN) else {
        return core::ptr::null_mut();
    };
    let chunk = unsafe { alloc(layout) };
    if chunk.is_null() {
        warn!(size_bytes = size, "failed to allocate chunk from the system");
    }
    chunk
}

/// Default chunk release. Valid only for chunks obtained from
/// [`system_chunk_alloc`]; the size is read back from the header, which is
/// intact at release time.
pub fn system_chunk_free(chunk: *mut u8) {
    unsafe {
        let size = (*(chunk as *const ChunkHeader)).limit as usize - chunk as usize;
        dealloc(chunk, Layout::from_size_align_unchecked(size, CHUNK_ALIGN));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_mask() {
        assert_eq!(align_up(0, 7), 0);
        assert_eq!(align_up(1, 7), 8);
        assert_eq!(align_up(8, 7), 8);
        assert_eq!(align_up(9, 7), 16);
        assert_eq!(align_up(23, 0), 23);
    }

    #[test]
    fn default_alignment_covers_pointers() {
        assert!(DEFAULT_ALIGNMENT.is_power_of_two());
        assert!(DEFAULT_ALIGNMENT >= core::mem::align_of::<*const u8>());
    }
}
