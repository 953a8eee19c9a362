//! Low-level primitives for arena memory operations.
//!
//! Everything that touches raw memory without going through a handle lives
//! here: reserving the arena buffer, the platform-allocator fallback, and
//! the fill/scan pair used by verification mode. Each `unsafe` block carries
//! a `// SAFETY:` comment.
//!
//! No function in this module ever forms a reference to arena memory. Other
//! threads write their own payloads through handles while the allocator
//! fills or scans released regions, so all access is through raw pointers
//! confined to the region being operated on.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

/// Round `n` up to the next multiple of `align` (a power of two).
pub(crate) const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// [`align_up`] that reports overflow instead of wrapping.
pub(crate) fn checked_align_up(n: usize, align: usize) -> Option<usize> {
    Some(n.checked_add(align - 1)? & !(align - 1))
}

/// The single contiguous buffer all managed blocks live in.
pub(crate) struct ArenaBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    leaked: bool,
}

// SAFETY: the buffer is plain owned memory. The allocator serialises its own
// accesses behind its lock; payload access by handle holders is their
// responsibility, exactly as with memory from the global allocator.
unsafe impl Send for ArenaBuffer {}
// SAFETY: see `Send` above. `&ArenaBuffer` never hands out references.
unsafe impl Sync for ArenaBuffer {}

impl ArenaBuffer {
    /// Reserve `size` bytes aligned to `align`, every byte initialised to
    /// `fill` (or zero).
    ///
    /// `size` and `align` must already be validated by
    /// [`MemConfig::validate`](crate::MemConfig::validate).
    pub(crate) fn new(size: usize, align: usize, fill: Option<u8>) -> Self {
        let layout = Layout::from_size_align(size, align)
            .unwrap_or_else(|e| panic!("[memledger] invalid arena layout ({size}, {align}): {e}"));
        if size == 0 {
            return Self {
                ptr: NonNull::<u8>::dangling(),
                layout,
                leaked: false,
            };
        }
        Self {
            ptr: system_alloc(layout, fill),
            layout,
            leaked: false,
        }
    }

    /// Address of arena offset 0.
    pub(crate) fn base(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Arena size in bytes.
    pub(crate) fn len(&self) -> usize {
        self.layout.size()
    }

    /// Arena offset of `addr`, if it lies inside the arena.
    pub(crate) fn offset_of(&self, addr: usize) -> Option<usize> {
        let base = self.ptr.as_ptr() as usize;
        (addr >= base && addr < base + self.len()).then(|| addr - base)
    }

    /// Overwrite `[offset, offset + len)` with `byte`.
    pub(crate) fn fill(&self, offset: usize, len: usize, byte: u8) {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len()),
            "[memledger] fill {offset}+{len} outside arena of {} bytes",
            self.len()
        );
        // SAFETY: the range was just checked to lie inside the live buffer.
        unsafe { ptr::write_bytes(self.ptr.as_ptr().add(offset), byte, len) }
    }

    /// Arena offset of the first byte in `[offset, offset + len)` that is not
    /// `byte`, or `None` if the whole range holds `byte`.
    pub(crate) fn scan(&self, offset: usize, len: usize, byte: u8) -> Option<usize> {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len()),
            "[memledger] scan {offset}+{len} outside arena of {} bytes",
            self.len()
        );
        // SAFETY: in range per the assertion above; every arena byte is
        // initialised at construction, so reads never see uninit memory.
        let start = unsafe { self.ptr.as_ptr().add(offset) };
        let expected = u64::from_ne_bytes([byte; 8]);
        let words = len / 8;
        for w in 0..words {
            // SAFETY: `w * 8 + 8 <= len`.
            let word = unsafe { start.add(w * 8).cast::<u64>().read_unaligned() };
            if word != expected {
                return (w * 8..w * 8 + 8)
                    .find(|&i| {
                        // SAFETY: inside the word just read.
                        let b = unsafe { start.add(i).read() };
                        b != byte
                    })
                    .map(|i| offset + i);
            }
        }
        (words * 8..len)
            .find(|&i| {
                // SAFETY: the tail is inside `[0, len)`.
                let b = unsafe { start.add(i).read() };
                b != byte
            })
            .map(|i| offset + i)
    }

    /// Byte at arena `offset`.
    pub(crate) fn byte_at(&self, offset: usize) -> u8 {
        assert!(offset < self.len(), "[memledger] read at {offset} outside arena");
        // SAFETY: in range; arena bytes are initialised at construction.
        unsafe { self.ptr.as_ptr().add(offset).read() }
    }

    /// Keep the buffer alive past the allocator's drop. Used when blocks
    /// are still outstanding at teardown so their handles stay readable.
    pub(crate) fn leak(&mut self) {
        self.leaked = true;
    }
}

impl Drop for ArenaBuffer {
    fn drop(&mut self) {
        if self.leaked || self.layout.size() == 0 {
            return;
        }
        // SAFETY: allocated in `new` with this exact layout and not freed since.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Allocate from the platform allocator, initialising every byte to `fill`
/// (or zero). Aborts through [`alloc::handle_alloc_error`] on failure.
pub(crate) fn system_alloc(layout: Layout, fill: Option<u8>) -> NonNull<u8> {
    debug_assert!(layout.size() > 0);
    // SAFETY: callers never pass a zero-sized layout.
    let raw = unsafe {
        match fill {
            Some(byte) => {
                let p = alloc::alloc(layout);
                if !p.is_null() {
                    ptr::write_bytes(p, byte, layout.size());
                }
                p
            }
            None => alloc::alloc_zeroed(layout),
        }
    };
    NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout))
}

/// Return a block obtained from [`system_alloc`].
///
/// # Safety
///
/// `ptr` must come from `system_alloc(layout, _)` with the same `layout`
/// and must not have been released already.
pub(crate) unsafe fn system_free(ptr: NonNull<u8>, layout: Layout) {
    // SAFETY: forwarded from the caller's contract.
    unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
}
