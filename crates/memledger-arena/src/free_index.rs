//! Size-ordered index over free blocks.
//!
//! Entries are `(size, node)` pairs kept in a `BTreeSet`, so several free
//! blocks of the same size coexist and [`FreeIndex::best_fit`] is a single
//! ordered range lookup. Among equally sized blocks the lowest ledger index
//! wins; callers must not rely on that.

use std::collections::BTreeSet;

use memledger_core::NodeIndex;

/// Multi-valued `size → node` index of free blocks.
#[derive(Clone, Debug, Default)]
pub struct FreeIndex {
    entries: BTreeSet<(usize, NodeIndex)>,
}

impl FreeIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a free block. Returns `false` if it was already present.
    pub fn insert(&mut self, size: usize, node: NodeIndex) -> bool {
        self.entries.insert((size, node))
    }

    /// Drop a block's entry. Returns `false` if it was not present.
    pub fn remove(&mut self, size: usize, node: NodeIndex) -> bool {
        self.entries.remove(&(size, node))
    }

    /// Smallest free block of at least `size` bytes.
    pub fn best_fit(&self, size: usize) -> Option<(usize, NodeIndex)> {
        self.entries.range((size, NodeIndex(0))..).next().copied()
    }

    /// Whether `node` is indexed under `size`.
    pub fn contains(&self, size: usize, node: NodeIndex) -> bool {
        self.entries.contains(&(size, node))
    }

    /// Number of free blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no block is free.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Largest free block size, if any.
    pub fn largest(&self) -> Option<usize> {
        self.entries.last().map(|&(size, _)| size)
    }

    /// Entries in ascending size order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, NodeIndex)> + '_ {
        self.entries.iter().copied()
    }
}
