//! Block headers.
//!
//! Every payload handed out by the allocator is immediately preceded by a
//! [`BlockHeader`]. `free` locates the header from the payload address alone,
//! so the header sits at `payload - size_of::<BlockHeader>()` regardless of
//! the configured alignment; any padding goes in front of it.
//!
//! ```text
//! block start                                   payload
//! │ padding │ node │ n_elem │ type_size │ generation │ type_tag │ checksum │ data…
//! ```

#![allow(unsafe_code)]

use std::mem::size_of;

use memledger_core::{Generation, HeaderError, NodeIndex, TypeTag};

/// Metadata prefixed to every payload.
///
/// All fields are `u64` so the struct has no padding bytes: every byte is
/// covered by the checksum.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    node: u64,
    n_elem: u64,
    type_size: u64,
    generation: u64,
    type_tag: u64,
    checksum: u64,
}

/// Seed for the header checksum.
const CHECKSUM_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Single-round multiply + xor-shift.
fn mix(x: u64) -> u64 {
    let h = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^ (h >> 31)
}

impl BlockHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = size_of::<Self>();

    /// Build a header and seal it with its checksum.
    pub fn new(
        node: NodeIndex,
        n_elem: usize,
        type_size: usize,
        generation: Generation,
        type_tag: TypeTag,
    ) -> Self {
        let mut header = Self {
            node: u64::from(node.0),
            n_elem: n_elem as u64,
            type_size: type_size as u64,
            generation: generation.0,
            type_tag: type_tag.0,
            checksum: 0,
        };
        header.checksum = header.compute_checksum();
        header
    }

    /// Checksum over every field except `checksum` itself.
    pub fn compute_checksum(&self) -> u64 {
        [
            self.node,
            self.n_elem,
            self.type_size,
            self.generation,
            self.type_tag,
        ]
        .iter()
        .fold(CHECKSUM_SEED, |h, &field| mix(h ^ field))
    }

    /// Confirm the stored checksum matches the fields.
    ///
    /// `addr` is the payload address, used only for the error report.
    pub fn verify(&self, addr: usize) -> Result<(), HeaderError> {
        let computed = self.compute_checksum();
        if computed == self.checksum {
            Ok(())
        } else {
            Err(HeaderError::ChecksumMismatch {
                addr,
                stored: self.checksum,
                computed,
            })
        }
    }

    /// Ledger descriptor owning the block, or [`NodeIndex::FOREIGN`].
    pub fn node(&self) -> NodeIndex {
        NodeIndex(self.node as u32)
    }

    /// Whether the block came from the platform allocator.
    pub fn is_foreign(&self) -> bool {
        self.node().is_foreign()
    }

    /// Number of elements requested.
    pub fn n_elem(&self) -> usize {
        self.n_elem as usize
    }

    /// Size of one element in bytes.
    pub fn type_size(&self) -> usize {
        self.type_size as usize
    }

    /// Payload size in bytes (`n_elem * type_size`).
    pub fn payload_bytes(&self) -> usize {
        self.n_elem() * self.type_size()
    }

    /// Allocation counter value captured at malloc.
    pub fn generation(&self) -> Generation {
        Generation(self.generation)
    }

    /// Element type recorded at malloc.
    pub fn type_tag(&self) -> TypeTag {
        TypeTag(self.type_tag)
    }

    /// Stored checksum.
    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    /// Copy of this header marked as released: generation set to
    /// [`Generation::DEAD`] and the checksum resealed.
    pub fn released(&self) -> Self {
        let mut header = *self;
        header.generation = Generation::DEAD.0;
        header.checksum = header.compute_checksum();
        header
    }
}

/// Address of the header belonging to `payload`.
pub(crate) fn header_ptr(payload: *const u8) -> *const BlockHeader {
    payload.wrapping_sub(BlockHeader::SIZE).cast()
}

/// Read the header in front of `payload`.
///
/// # Safety
///
/// `payload` must be a payload address returned by an allocator whose
/// memory is still mapped (the arena outlives its handles; foreign blocks
/// must not have been released).
pub(crate) unsafe fn read(payload: *const u8) -> BlockHeader {
    // SAFETY: caller contract; payloads are aligned to at least 8 bytes so
    // the header slot is aligned for `BlockHeader`.
    unsafe { header_ptr(payload).read() }
}

/// Write `header` in front of `payload`.
///
/// # Safety
///
/// `payload - BlockHeader::SIZE .. payload` must be writable memory owned by
/// the calling allocator for the block being initialised or released.
pub(crate) unsafe fn write(payload: *mut u8, header: &BlockHeader) {
    // SAFETY: caller contract, alignment as in `read`.
    unsafe { header_ptr(payload).cast_mut().write(*header) }
}

/// Read only the generation field of the header at `head`.
///
/// # Safety
///
/// `head` must point at a header slot inside memory that is still mapped.
pub(crate) unsafe fn read_generation(head: *const BlockHeader) -> Generation {
    // SAFETY: caller contract; `addr_of!` avoids creating a reference.
    Generation(unsafe { std::ptr::addr_of!((*head).generation).read() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlockHeader {
        BlockHeader::new(NodeIndex(3), 10, 8, Generation(77), TypeTag(0xabc))
    }

    #[test]
    fn header_has_no_padding() {
        assert_eq!(BlockHeader::SIZE, 6 * size_of::<u64>());
    }

    #[test]
    fn fresh_header_verifies() {
        let h = sample();
        assert!(h.verify(0).is_ok());
        assert_eq!(h.node(), NodeIndex(3));
        assert_eq!(h.payload_bytes(), 80);
        assert_eq!(h.generation(), Generation(77));
        assert_eq!(h.type_tag(), TypeTag(0xabc));
    }

    #[test]
    fn any_single_field_change_is_detected() {
        let base = sample();
        let variants = [
            BlockHeader { node: 4, ..base },
            BlockHeader { n_elem: 11, ..base },
            BlockHeader { type_size: 4, ..base },
            BlockHeader {
                generation: 78,
                ..base
            },
            BlockHeader {
                type_tag: 0xabd,
                ..base
            },
            BlockHeader {
                checksum: base.checksum ^ 1,
                ..base
            },
        ];
        for v in variants {
            assert!(matches!(
                v.verify(0x40),
                Err(HeaderError::ChecksumMismatch { addr: 0x40, .. })
            ));
        }
    }

    #[test]
    fn released_header_is_dead_but_intact() {
        let dead = sample().released();
        assert_eq!(dead.generation(), Generation::DEAD);
        assert!(dead.verify(0).is_ok());
    }

    #[test]
    fn foreign_owner_round_trips() {
        let h = BlockHeader::new(NodeIndex::FOREIGN, 1, 1, Generation(1), TypeTag::UNTYPED);
        assert!(h.is_foreign());
    }

    #[test]
    fn read_write_through_payload_address() {
        let mut buf = [0u64; 8];
        let payload = buf.as_mut_ptr().wrapping_add(6).cast::<u8>();
        let h = sample();
        // SAFETY: the six words in front of `payload` lie inside `buf`.
        unsafe {
            write(payload, &h);
            assert_eq!(read(payload), h);
            assert_eq!(read_generation(header_ptr(payload)), Generation(77));
        }
    }
}
