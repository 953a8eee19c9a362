//! Allocator configuration parameters.

use std::mem::{align_of, size_of};

use memledger_core::ConfigError;

use crate::header::BlockHeader;
use crate::raw::align_up;

/// Configuration for a [`MemoryManager`](crate::MemoryManager).
///
/// Validated at construction; all values are immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemConfig {
    /// Arena size in bytes. Rounded down to a multiple of `align`.
    ///
    /// Zero is valid: every request then goes to the platform allocator.
    pub total_bytes: usize,

    /// Alignment boundary in bytes for every block and payload.
    ///
    /// Default: 64. Must be a power of two and at least the header's
    /// own alignment (8).
    pub align: usize,

    /// Leftover bytes a free block must exceed before malloc splits it.
    ///
    /// Smaller leftovers are handed out with the allocation instead of
    /// becoming an unusable fragment. Default: 64.
    pub min_split: usize,

    /// Byte written over released memory in verification mode.
    ///
    /// Default: 42.
    pub fill_byte: u8,

    /// Verification mode: fill released blocks with `fill_byte`, confirm
    /// a reused block still holds the fill on malloc, and let
    /// [`MemoryManager::check`](crate::MemoryManager::check) scan free
    /// regions. Defaults to on in debug builds.
    pub verify: bool,
}

impl MemConfig {
    /// Default alignment boundary in bytes.
    pub const DEFAULT_ALIGN: usize = 64;

    /// Default split threshold in bytes.
    pub const DEFAULT_MIN_SPLIT: usize = 64;

    /// Default fill byte for released memory.
    pub const DEFAULT_FILL_BYTE: u8 = 42;

    /// Arena size of the process-wide instance, in megabytes.
    pub const DEFAULT_GLOBAL_MB: usize = 64;

    /// Create a config for an arena of `total_bytes`, defaults elsewhere.
    pub fn new(total_bytes: usize) -> Self {
        Self {
            total_bytes,
            align: Self::DEFAULT_ALIGN,
            min_split: Self::DEFAULT_MIN_SPLIT,
            fill_byte: Self::DEFAULT_FILL_BYTE,
            verify: cfg!(debug_assertions),
        }
    }

    /// Config used by [`glb_mem_mgr`](crate::glb_mem_mgr).
    pub fn global() -> Self {
        Self::new(Self::DEFAULT_GLOBAL_MB * 1024 * 1024)
    }

    /// Check the config for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.align.is_power_of_two() {
            return Err(ConfigError::AlignNotPowerOfTwo { align: self.align });
        }
        let minimum = align_of::<BlockHeader>();
        if self.align < minimum {
            return Err(ConfigError::AlignTooSmall {
                align: self.align,
                minimum,
            });
        }
        if self.total_bytes > isize::MAX as usize - self.align {
            return Err(ConfigError::ArenaTooLarge {
                total_bytes: self.total_bytes,
            });
        }
        Ok(())
    }

    /// Bytes reserved in front of each payload: the header rounded up to
    /// the alignment boundary.
    pub fn header_bytes(&self) -> usize {
        align_up(size_of::<BlockHeader>(), self.align)
    }

    /// Usable arena size: `total_bytes` rounded down to the alignment.
    pub fn arena_bytes(&self) -> usize {
        self.total_bytes & !(self.align - 1)
    }
}

impl Default for MemConfig {
    fn default() -> Self {
        Self::global()
    }
}
