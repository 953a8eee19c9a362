//! Strongly-typed identifiers shared by the allocator and its handles.

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Index of a block descriptor in the block ledger.
///
/// Index 0 is the ledger's sentinel node and never owns memory.
/// [`NodeIndex::FOREIGN`] marks blocks served by the platform allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// The ledger's sentinel node.
    pub const SENTINEL: Self = Self(0);

    /// Owner recorded in the header of a platform-allocator fallback block.
    pub const FOREIGN: Self = Self(u32::MAX);

    /// Whether this index marks a foreign (platform allocator) block.
    pub fn is_foreign(self) -> bool {
        self == Self::FOREIGN
    }

    /// The index as a `usize`, for descriptor table lookups.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_foreign() {
            write!(f, "foreign")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u32> for NodeIndex {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Counter backing [`Generation::next`]. Starts at 1 so that
/// [`Generation::DEAD`] is never handed out.
static ALLOC_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-wide allocation counter value captured when a block is allocated.
///
/// Every allocation, from every allocator instance, receives a distinct
/// generation. A checked handle remembers the generation it was created
/// with and compares it against the block header on each access, so a
/// handle that outlives its allocation is caught once the header changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    /// Written into a header when its block is released.
    pub const DEAD: Self = Self(0);

    /// Allocate a fresh generation. Thread-safe and strictly increasing.
    pub fn next() -> Self {
        Self(ALLOC_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The most recently issued generation (0 if none has been issued).
    pub fn current() -> Self {
        Self(ALLOC_COUNTER.load(Ordering::Relaxed) - 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Generation {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies the element type stored in an allocation.
///
/// Typed allocations derive the tag from the element's [`TypeId`] with
/// [`TypeTag::of`]; raw byte allocations may pass any caller-chosen value.
/// The allocator only ever compares tags for equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(pub u64);

impl TypeTag {
    /// Tag for untyped byte allocations.
    pub const UNTYPED: Self = Self(0);

    /// Tag for the element type `T`.
    pub fn of<T: 'static>() -> Self {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<T>().hash(&mut hasher);
        // Keep clear of UNTYPED.
        Self(hasher.finish() | 1)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl From<u64> for TypeTag {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
