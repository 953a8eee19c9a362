//! Block ledger: address-ordered doubly linked list of block descriptors.
//!
//! Descriptors live in a table that only grows; links are table indices,
//! never addresses. Retired descriptors go on a free-node stack and are
//! handed out again by [`BlockLedger::new_node`]. Node 0 is a sentinel that
//! anchors the list, owns no memory and is never free, so merging never has
//! to special-case the head of the list.
//!
//! Split and merge are O(1): each touches the node, one neighbour and one
//! back-link.

use memledger_core::NodeIndex;
use smallvec::SmallVec;

/// Descriptor for one contiguous region of the arena.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemNode {
    /// Whether the block is available.
    pub free: bool,
    /// Block size in bytes, header included.
    pub size: usize,
    /// Arena offset of the first byte of the block.
    pub offset: usize,
    /// Physically preceding block (the sentinel for the first block).
    pub prev: Option<NodeIndex>,
    /// Physically following block.
    pub next: Option<NodeIndex>,
}

/// Descriptor table plus free-node stack.
#[derive(Clone, Debug)]
pub struct BlockLedger {
    nodes: Vec<MemNode>,
    node_stack: SmallVec<[NodeIndex; 16]>,
}

impl BlockLedger {
    /// Ledger covering an arena of `arena_bytes`: the sentinel followed by
    /// one free block spanning the whole arena (or nothing if empty).
    pub fn new(arena_bytes: usize) -> Self {
        let mut ledger = Self {
            nodes: vec![MemNode {
                free: false,
                size: 0,
                offset: 0,
                prev: None,
                next: None,
            }],
            node_stack: SmallVec::new(),
        };
        if arena_bytes > 0 {
            let first = ledger.new_node(MemNode {
                free: true,
                size: arena_bytes,
                offset: 0,
                prev: Some(NodeIndex::SENTINEL),
                next: None,
            });
            ledger.nodes[0].next = Some(first);
        }
        ledger
    }

    /// Store `node`, reusing a retired slot when one is available.
    pub fn new_node(&mut self, node: MemNode) -> NodeIndex {
        if let Some(idx) = self.node_stack.pop() {
            self.nodes[idx.as_usize()] = node;
            return idx;
        }
        let idx = NodeIndex(
            u32::try_from(self.nodes.len())
                .ok()
                .filter(|&i| i != NodeIndex::FOREIGN.0)
                .unwrap_or_else(|| panic!("[memledger] block ledger exhausted")),
        );
        self.nodes.push(node);
        idx
    }

    /// Retire a descriptor slot for reuse.
    pub fn delete_node(&mut self, idx: NodeIndex) {
        debug_assert_ne!(idx, NodeIndex::SENTINEL);
        let node = &mut self.nodes[idx.as_usize()];
        node.free = false;
        node.size = 0;
        node.prev = None;
        node.next = None;
        self.node_stack.push(idx);
    }

    /// Look up a live descriptor.
    ///
    /// Returns `None` for indices outside the table or retired slots.
    pub fn get(&self, idx: NodeIndex) -> Option<&MemNode> {
        if idx == NodeIndex::SENTINEL {
            return None;
        }
        self.nodes
            .get(idx.as_usize())
            .filter(|n| n.size > 0 && n.prev.is_some())
    }

    /// Mutable descriptor access.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is outside the table.
    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut MemNode {
        &mut self.nodes[idx.as_usize()]
    }

    /// Descriptor access without the liveness filter of [`BlockLedger::get`].
    ///
    /// # Panics
    ///
    /// Panics if `idx` is outside the table.
    pub fn node(&self, idx: NodeIndex) -> &MemNode {
        &self.nodes[idx.as_usize()]
    }

    /// Shrink block `idx` to `size` bytes and link a new free block covering
    /// the remainder directly after it. Returns the new block's index.
    ///
    /// # Panics
    ///
    /// Panics unless `0 < size < node.size`.
    pub fn split(&mut self, idx: NodeIndex, size: usize) -> NodeIndex {
        let node = self.node(idx).clone();
        assert!(
            size > 0 && size < node.size,
            "[memledger] split of {}-byte block at {size}",
            node.size
        );
        let rest = self.new_node(MemNode {
            free: true,
            size: node.size - size,
            offset: node.offset + size,
            prev: Some(idx),
            next: node.next,
        });
        if let Some(next) = node.next {
            self.nodes[next.as_usize()].prev = Some(rest);
        }
        let node = &mut self.nodes[idx.as_usize()];
        node.size = size;
        node.next = Some(rest);
        rest
    }

    /// Fold the block following `idx` into `idx` and retire its descriptor.
    /// Returns the retired index.
    ///
    /// # Panics
    ///
    /// Panics if `idx` has no successor.
    pub fn absorb_next(&mut self, idx: NodeIndex) -> NodeIndex {
        let next = self.nodes[idx.as_usize()]
            .next
            .unwrap_or_else(|| panic!("[memledger] block {idx} has no successor to absorb"));
        let absorbed = self.nodes[next.as_usize()].clone();
        debug_assert_eq!(
            self.nodes[idx.as_usize()].offset + self.nodes[idx.as_usize()].size,
            absorbed.offset
        );
        if let Some(after) = absorbed.next {
            self.nodes[after.as_usize()].prev = Some(idx);
        }
        let node = &mut self.nodes[idx.as_usize()];
        node.size += absorbed.size;
        node.next = absorbed.next;
        self.delete_node(next);
        next
    }

    /// Blocks in address order, sentinel excluded.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &MemNode)> + '_ {
        let mut cursor = self.nodes[0].next;
        std::iter::from_fn(move || {
            let idx = cursor?;
            let node = &self.nodes[idx.as_usize()];
            cursor = node.next;
            Some((idx, node))
        })
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1 - self.node_stack.len()
    }

    /// Whether the ledger tracks no blocks (empty arena).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the descriptor table, retired slots included.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }
}
