//! Bookkeeping for allocations served by the platform allocator.
//!
//! When the arena cannot satisfy a request the allocator falls back to
//! `std::alloc`. Those blocks get no ledger entry; instead their payload
//! address and layout are recorded here so `free` can route them back to
//! the platform allocator with the layout they were created with.

use std::alloc::Layout;

use indexmap::IndexMap;

/// Live foreign allocations keyed by payload address.
///
/// `IndexMap` keeps insertion order, so diagnostics list foreign blocks in
/// the order they were allocated.
#[derive(Debug, Default)]
pub struct ForeignSet {
    live: IndexMap<usize, Layout>,
}

impl ForeignSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a foreign block.
    ///
    /// # Panics
    ///
    /// Panics if `payload` is already recorded: the platform allocator
    /// handed out a live address twice, which means its heap is corrupt.
    pub fn insert(&mut self, payload: usize, layout: Layout) {
        let previous = self.live.insert(payload, layout);
        assert!(
            previous.is_none(),
            "[memledger] platform allocator returned live address {payload:#x} twice"
        );
    }

    /// Forget a foreign block, returning the layout it was allocated with.
    pub fn remove(&mut self, payload: usize) -> Option<Layout> {
        self.live.shift_remove(&payload)
    }

    /// Whether `payload` is a live foreign block.
    pub fn contains(&self, payload: usize) -> bool {
        self.live.contains_key(&payload)
    }

    /// Number of live foreign blocks.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no foreign block is live.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Total bytes held by live foreign blocks, headers included.
    pub fn bytes(&self) -> usize {
        self.live.values().map(Layout::size).sum()
    }

    /// `(payload address, layout)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Layout)> + '_ {
        self.live.iter().map(|(&addr, &layout)| (addr, layout))
    }
}
