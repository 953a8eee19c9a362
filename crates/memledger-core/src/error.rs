//! Error types for the memledger allocator.
//!
//! The allocator treats every one of these as an invariant violation: the
//! fatal entry points (`free`, `check`, handle dereference) panic with the
//! error's `Display` text. The structured values are returned by the
//! diagnostic entry points (`try_check`, `try_elem_ptr`, `verify`) so callers can
//! inspect a failure without unwinding.

use std::error::Error;
use std::fmt;

use crate::id::{Generation, NodeIndex, TypeTag};

/// A block header failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderError {
    /// The stored checksum does not match the header fields. The header was
    /// overwritten, or the address never came from this allocator.
    ChecksumMismatch {
        /// Payload address the header belongs to.
        addr: usize,
        /// Checksum stored in the header.
        stored: u64,
        /// Checksum recomputed from the header fields.
        computed: u64,
    },
    /// The header is intact but its block is not currently allocated:
    /// a double free, or a pointer into the middle of another block.
    NotAllocated {
        /// Payload address passed to `free`.
        addr: usize,
        /// Ledger owner recorded in the header.
        node: NodeIndex,
    },
    /// A typed release named a different element type than the allocation.
    TypeMismatch {
        /// Payload address.
        addr: usize,
        /// Tag of the type the caller released as.
        expected: TypeTag,
        /// Tag recorded at allocation.
        found: TypeTag,
    },
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChecksumMismatch {
                addr,
                stored,
                computed,
            } => write!(
                f,
                "header checksum mismatch at {addr:#x}: stored {stored:#018x}, computed {computed:#018x}"
            ),
            Self::NotAllocated { addr, node } => {
                write!(f, "double free or invalid pointer at {addr:#x} (owner {node})")
            }
            Self::TypeMismatch {
                addr,
                expected,
                found,
            } => write!(
                f,
                "type mismatch at {addr:#x}: released as {expected}, allocated as {found}"
            ),
        }
    }
}

impl Error for HeaderError {}

/// A handle dereference or arithmetic step failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessError {
    /// Dereference of the null handle.
    Null,
    /// The element lies outside `[0, len)` of the handle's allocation.
    OutOfBounds {
        /// Element index relative to the allocation base.
        index: isize,
        /// Allocation length in elements.
        len: usize,
    },
    /// The computed address is not aligned for the element type.
    Misaligned {
        /// Offending address.
        addr: usize,
        /// Required alignment in bytes.
        align: usize,
    },
    /// The allocation was released (or recycled) after the handle was made.
    Stale {
        /// Generation recorded in the handle.
        expected: Generation,
        /// Generation currently stored in the block header.
        found: Generation,
    },
    /// Two handles are not a whole number of elements apart.
    InexactDistance {
        /// Byte distance between the handles.
        bytes: isize,
        /// Element size in bytes.
        elem_size: usize,
    },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "dereference of null handle"),
            Self::OutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for allocation of {len} elements")
            }
            Self::Misaligned { addr, align } => {
                write!(f, "address {addr:#x} misaligned for {align}-byte alignment")
            }
            Self::Stale { expected, found } => write!(
                f,
                "access after free: handle generation {expected}, header generation {found}"
            ),
            Self::InexactDistance { bytes, elem_size } => write!(
                f,
                "handles {bytes} bytes apart, not a multiple of element size {elem_size}"
            ),
        }
    }
}

impl Error for AccessError {}

/// A free region of the arena no longer holds the fill value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntegrityError {
    /// A byte inside a free block was modified after the block was released.
    WriteAfterFree {
        /// Arena offset of the first modified byte.
        offset: usize,
        /// Arena offset of the free block containing it.
        block_offset: usize,
        /// Size of that free block in bytes.
        block_size: usize,
        /// Value found.
        found: u8,
        /// Fill value expected.
        expected: u8,
    },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteAfterFree {
                offset,
                block_offset,
                block_size,
                found,
                expected,
            } => write!(
                f,
                "write after free at arena offset {offset} (free block {block_offset}+{block_size}): \
                 found {found:#04x}, expected {expected:#04x}"
            ),
        }
    }
}

impl Error for IntegrityError {}

/// Invalid allocator configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The alignment boundary is not a power of two.
    AlignNotPowerOfTwo {
        /// Requested alignment.
        align: usize,
    },
    /// The alignment boundary is below the header's own alignment.
    AlignTooSmall {
        /// Requested alignment.
        align: usize,
        /// Smallest accepted alignment.
        minimum: usize,
    },
    /// The arena size cannot be represented as a layout.
    ArenaTooLarge {
        /// Requested arena size in bytes.
        total_bytes: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlignNotPowerOfTwo { align } => {
                write!(f, "alignment {align} is not a power of two")
            }
            Self::AlignTooSmall { align, minimum } => {
                write!(f, "alignment {align} is below the minimum of {minimum}")
            }
            Self::ArenaTooLarge { total_bytes } => {
                write!(f, "arena of {total_bytes} bytes exceeds the addressable layout size")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_message_names_index_and_len() {
        let e = AccessError::OutOfBounds { index: -1, len: 4 };
        assert_eq!(
            e.to_string(),
            "index -1 out of bounds for allocation of 4 elements"
        );
    }

    #[test]
    fn checksum_message_is_hex() {
        let e = HeaderError::ChecksumMismatch {
            addr: 0x1000,
            stored: 1,
            computed: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("checksum mismatch at 0x1000"));
    }
}
