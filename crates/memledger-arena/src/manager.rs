//! The allocator: malloc/free over the arena with a platform fallback.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::fmt::Write as _;
use std::ptr::NonNull;

use log::{debug, info, trace, warn};
use memledger_core::{ConfigError, Generation, HeaderError, IntegrityError, NodeIndex, TypeTag};
use parking_lot::Mutex;

use crate::config::MemConfig;
use crate::foreign::ForeignSet;
use crate::free_index::FreeIndex;
use crate::header::{self, BlockHeader};
use crate::ledger::{BlockLedger, MemNode};
use crate::ptr::{ElemPtr, Ptr};
use crate::raw::{self, checked_align_up, ArenaBuffer};

/// Everything the allocator mutates, guarded by one lock.
struct LedgerState {
    ledger: BlockLedger,
    free_index: FreeIndex,
    foreign: ForeignSet,
}

/// Point-in-time allocator statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemStats {
    /// Arena size in bytes.
    pub total_bytes: usize,
    /// Bytes in occupied arena blocks, headers included.
    pub used_bytes: usize,
    /// Bytes in free arena blocks.
    pub free_bytes: usize,
    /// Arena blocks, free and occupied.
    pub blocks: usize,
    /// Free arena blocks.
    pub free_blocks: usize,
    /// Live platform-allocator blocks.
    pub foreign_blocks: usize,
    /// Bytes held by live platform-allocator blocks.
    pub foreign_bytes: usize,
    /// Most recently issued allocation generation (process-wide).
    pub generation: Generation,
}

/// One arena block as seen by [`MemoryManager::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Arena offset of the block start.
    pub offset: usize,
    /// Block size in bytes, header included.
    pub size: usize,
    /// Whether the block is available.
    pub free: bool,
}

/// Block-splitting, coalescing allocator over one fixed arena.
///
/// Requests are served best-fit from a size-ordered index of free blocks;
/// oversize leftovers are split off and released blocks merge with free
/// physical neighbours. Every payload is preceded by a checksummed
/// [`BlockHeader`]. Requests the arena cannot satisfy go to the platform
/// allocator.
///
/// The manager is `Sync`: one mutex guards the ledger, the free index and
/// the foreign set. Header writes and fill scans happen outside it.
pub struct MemoryManager {
    config: MemConfig,
    header_bytes: usize,
    arena: ArenaBuffer,
    state: Mutex<LedgerState>,
}

impl MemoryManager {
    /// Allocator over an arena of `total_bytes` with default settings.
    ///
    /// # Panics
    ///
    /// Panics if the arena size cannot be represented as a layout.
    pub fn new(total_bytes: usize) -> Self {
        Self::with_config(MemConfig::new(total_bytes))
            .unwrap_or_else(|e| panic!("[memledger] {e}"))
    }

    /// Allocator with an explicit configuration.
    pub fn with_config(config: MemConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let arena_bytes = config.arena_bytes();
        let fill = config.verify.then_some(config.fill_byte);
        let arena = ArenaBuffer::new(arena_bytes, config.align, fill);
        let ledger = BlockLedger::new(arena_bytes);
        let mut free_index = FreeIndex::new();
        for (idx, node) in ledger.iter() {
            free_index.insert(node.size, idx);
        }
        debug!(
            "[memledger] arena of {arena_bytes} bytes at {:p} (align {}, verify {})",
            arena.base(),
            config.align,
            config.verify
        );
        Ok(Self {
            header_bytes: config.header_bytes(),
            config,
            arena,
            state: Mutex::new(LedgerState {
                ledger,
                free_index,
                foreign: ForeignSet::new(),
            }),
        })
    }

    /// The configuration this allocator was built with.
    pub fn config(&self) -> &MemConfig {
        &self.config
    }

    /// Alignment boundary of every payload.
    pub fn align(&self) -> usize {
        self.config.align
    }

    /// Arena bytes a request for `payload_bytes` occupies, header included,
    /// or `None` if the size overflows.
    pub fn block_bytes_for(&self, payload_bytes: usize) -> Option<usize> {
        payload_bytes
            .checked_add(self.header_bytes)
            .and_then(|n| checked_align_up(n, self.config.align))
            .filter(|&n| n <= isize::MAX as usize - self.config.align)
    }

    /// Allocate `n_elem * type_size` bytes aligned to [`MemoryManager::align`].
    ///
    /// Returns the null handle when either count is zero. Never fails:
    /// when no free arena block is large enough the request goes to the
    /// platform allocator.
    ///
    /// # Panics
    ///
    /// Panics if the byte count overflows. In verification mode, panics if
    /// the reused arena block was written after it was freed.
    #[track_caller]
    pub fn malloc(&self, n_elem: usize, type_size: usize, type_tag: TypeTag) -> Ptr<u8> {
        if n_elem == 0 || type_size == 0 {
            return Ptr::null();
        }
        let payload_bytes = n_elem
            .checked_mul(type_size)
            .unwrap_or_else(|| panic!("[memledger] allocation of {n_elem} x {type_size} bytes overflows"));
        let Some(size) = self.block_bytes_for(payload_bytes) else {
            panic!("[memledger] allocation of {payload_bytes} bytes overflows");
        };
        let generation = Generation::next();

        let (payload, node) = match self.take_block(size) {
            Some((node, offset, block_size)) => {
                if self.config.verify {
                    self.verify_fill(offset, block_size)
                        .unwrap_or_else(|e| panic!("[memledger] {e}"));
                }
                let payload = self.arena.base().wrapping_add(offset + self.header_bytes);
                trace!("[memledger] malloc {payload_bytes} bytes -> arena block {node} at {offset}+{block_size}");
                (payload, node)
            }
            None => {
                let layout = Layout::from_size_align(size, self.config.align)
                    .unwrap_or_else(|e| panic!("[memledger] invalid fallback layout: {e}"));
                let block = raw::system_alloc(layout, None);
                let payload = block.as_ptr().wrapping_add(self.header_bytes);
                self.state.lock().foreign.insert(payload as usize, layout);
                debug!("[memledger] arena exhausted, {size} bytes from the platform allocator at {payload:p}");
                (payload, NodeIndex::FOREIGN)
            }
        };

        let head = BlockHeader::new(node, n_elem, type_size, generation, type_tag);
        // SAFETY: `payload - header_bytes .. payload + payload_bytes` was
        // just reserved for this request and `header_bytes >= SIZE`.
        unsafe {
            header::write(payload, &head);
            Ptr::from_allocation(payload, payload_bytes, generation, !node.is_foreign())
        }
    }

    /// Best-fit a free arena block of `size` bytes, splitting off the
    /// remainder when it exceeds the split threshold. Returns the block's
    /// descriptor, offset and (possibly larger) size.
    fn take_block(&self, size: usize) -> Option<(NodeIndex, usize, usize)> {
        let mut state = self.state.lock();
        let (block_size, idx) = state.free_index.best_fit(size)?;
        state.free_index.remove(block_size, idx);
        let leftover = block_size - size;
        if leftover > self.config.min_split {
            let rest = state.ledger.split(idx, size);
            state.free_index.insert(leftover, rest);
        }
        let node = state.ledger.node_mut(idx);
        node.free = false;
        Some((idx, node.offset, node.size))
    }

    /// Release an allocation made by this manager.
    ///
    /// Freeing the null handle is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the header in front of `p` is corrupt, or the block is not
    /// currently allocated (double free or a pointer this manager never
    /// returned).
    ///
    /// # Safety
    ///
    /// `p` must be null or point at the start of a payload returned by
    /// [`MemoryManager::malloc`] on this manager. The payload must not be
    /// accessed afterwards.
    #[track_caller]
    pub unsafe fn free(&self, p: Ptr<u8>) {
        if p.is_null() {
            return;
        }
        let payload = p.as_ptr();
        let addr = payload as usize;
        let in_arena = self.arena.offset_of(addr).is_some();
        // A released foreign block is no longer mapped: consult the set
        // before touching its header.
        if !in_arena && !self.state.lock().foreign.contains(addr) {
            not_allocated(addr, NodeIndex::FOREIGN);
        }
        // SAFETY: caller contract.
        let head = unsafe { self.mem_head(payload) };
        self.check_mem_head(addr, &head);
        if let Some(generation) = p.alloc_generation() {
            if generation != head.generation() {
                not_allocated(addr, head.node());
            }
        }

        if head.is_foreign() != !in_arena {
            not_allocated(addr, head.node());
        }
        if head.is_foreign() {
            let layout = self.state.lock().foreign.remove(addr);
            let Some(layout) = layout else {
                not_allocated(addr, head.node());
            };
            trace!("[memledger] free foreign block at {payload:p}");
            let block = NonNull::new(payload.wrapping_sub(self.header_bytes))
                .unwrap_or_else(|| not_allocated(addr, head.node()));
            // SAFETY: the foreign set recorded this payload with `layout`
            // and the entry was just removed, so this is the only release.
            unsafe { raw::system_free(block, layout) };
            return;
        }

        let idx = head.node();
        let (offset, size) = {
            let state = self.state.lock();
            match self.owned_block(&state, idx, addr) {
                Some(node) => (node.offset, node.size),
                None => not_allocated(addr, idx),
            }
        };
        if self.config.verify {
            self.arena.fill(offset, size, self.config.fill_byte);
        } else {
            // SAFETY: the header slot belongs to the block being released.
            unsafe { header::write(payload, &head.released()) };
        }
        trace!("[memledger] free arena block {idx} at {offset}+{size}");

        let mut state = self.state.lock();
        Self::release_block(&mut state, idx);
    }

    /// Descriptor `idx` if it is live, occupied and its payload is `addr`.
    fn owned_block<'a>(&self, state: &'a LedgerState, idx: NodeIndex, addr: usize) -> Option<&'a MemNode> {
        let offset = self.arena.offset_of(addr)?;
        state
            .ledger
            .get(idx)
            .filter(|n| !n.free && n.offset + self.header_bytes == offset)
    }

    /// Mark `idx` free and merge it with free physical neighbours.
    fn release_block(state: &mut LedgerState, idx: NodeIndex) {
        let LedgerState {
            ledger, free_index, ..
        } = state;
        ledger.node_mut(idx).free = true;

        if let Some(next) = ledger.node(idx).next {
            let neighbour = ledger.node(next);
            if neighbour.free {
                free_index.remove(neighbour.size, next);
                ledger.absorb_next(idx);
            }
        }
        let mut merged = idx;
        if let Some(prev) = ledger.node(idx).prev {
            let neighbour = ledger.node(prev);
            if neighbour.free {
                free_index.remove(neighbour.size, prev);
                ledger.absorb_next(prev);
                merged = prev;
            }
        }
        free_index.insert(ledger.node(merged).size, merged);
    }

    /// Read the header in front of `payload`.
    ///
    /// # Safety
    ///
    /// `payload` must be a payload address returned by this manager that
    /// has not been freed.
    pub unsafe fn mem_head(&self, payload: *const u8) -> BlockHeader {
        // SAFETY: caller contract.
        unsafe { header::read(payload) }
    }

    /// Validate a header's checksum.
    ///
    /// # Panics
    ///
    /// Panics on mismatch.
    #[track_caller]
    pub fn check_mem_head(&self, addr: usize, head: &BlockHeader) {
        if let Err(e) = head.verify(addr) {
            panic!("[memledger] {e}");
        }
    }

    /// Validate the header in front of `p` without panicking.
    ///
    /// # Safety
    ///
    /// As [`MemoryManager::mem_head`].
    pub unsafe fn verify(&self, p: Ptr<u8>) -> Result<BlockHeader, HeaderError> {
        let payload = p.as_ptr();
        // SAFETY: caller contract.
        let head = unsafe { self.mem_head(payload) };
        head.verify(payload as usize)?;
        Ok(head)
    }

    fn verify_fill(&self, offset: usize, size: usize) -> Result<(), IntegrityError> {
        let expected = self.config.fill_byte;
        match self.arena.scan(offset, size, expected) {
            None => Ok(()),
            Some(bad) => Err(IntegrityError::WriteAfterFree {
                offset: bad,
                block_offset: offset,
                block_size: size,
                found: self.arena.byte_at(bad),
                expected,
            }),
        }
    }

    /// Scan every free arena block for bytes that no longer hold the fill
    /// value. Always `Ok` when verification mode is off.
    pub fn try_check(&self) -> Result<(), IntegrityError> {
        if !self.config.verify {
            return Ok(());
        }
        let state = self.state.lock();
        let result = state
            .ledger
            .iter()
            .filter(|(_, n)| n.free)
            .try_for_each(|(_, n)| self.verify_fill(n.offset, n.size));
        result
    }

    /// [`MemoryManager::try_check`], panicking on the first violation.
    #[track_caller]
    pub fn check(&self) {
        if let Err(e) = self.try_check() {
            panic!("[memledger] {e}");
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> MemStats {
        let state = self.state.lock();
        let mut stats = MemStats {
            total_bytes: self.arena.len(),
            foreign_blocks: state.foreign.len(),
            foreign_bytes: state.foreign.bytes(),
            generation: Generation::current(),
            ..MemStats::default()
        };
        for (_, node) in state.ledger.iter() {
            stats.blocks += 1;
            if node.free {
                stats.free_blocks += 1;
                stats.free_bytes += node.size;
            } else {
                stats.used_bytes += node.size;
            }
        }
        stats
    }

    /// Sizes of the free arena blocks in address order.
    pub fn free_block_sizes(&self) -> Vec<usize> {
        let state = self.state.lock();
        state
            .ledger
            .iter()
            .filter(|(_, n)| n.free)
            .map(|(_, n)| n.size)
            .collect()
    }

    /// Every arena block in address order.
    pub fn blocks(&self) -> Vec<BlockInfo> {
        let state = self.state.lock();
        state
            .ledger
            .iter()
            .map(|(_, n)| BlockInfo {
                offset: n.offset,
                size: n.size,
                free: n.free,
            })
            .collect()
    }

    /// Outstanding allocations, arena and foreign.
    pub fn outstanding(&self) -> usize {
        let state = self.state.lock();
        state.ledger.iter().filter(|(_, n)| !n.free).count() + state.foreign.len()
    }

    /// Ledger dump: one line per block plus live foreign blocks.
    pub fn report(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "memledger arena {:p}, {} bytes, align {}",
            self.arena.base(),
            self.arena.len(),
            self.config.align
        );
        for (idx, node) in state.ledger.iter() {
            let _ = writeln!(
                out,
                "  {:>6} {:>12}+{:<10} {}",
                idx.to_string(),
                node.offset,
                node.size,
                if node.free { "free" } else { "used" }
            );
        }
        for (addr, layout) in state.foreign.iter() {
            let _ = writeln!(out, "  foreign {addr:#x} {} bytes", layout.size());
        }
        out
    }

    /// Log [`MemoryManager::report`] at info level.
    pub fn print(&self) {
        info!("[memledger] {}", self.report());
    }
}

#[cold]
#[track_caller]
fn not_allocated(addr: usize, node: NodeIndex) -> ! {
    panic!("[memledger] {}", HeaderError::NotAllocated { addr, node })
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let leaked = state.ledger.iter().filter(|(_, n)| !n.free).count();
        if leaked > 0 || !state.foreign.is_empty() {
            warn!(
                "[memledger] teardown with {leaked} arena and {} foreign blocks outstanding; arena leaked",
                state.foreign.len()
            );
            self.arena.leak();
        }
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("config", &self.config)
            .field("base", &self.arena.base())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(mgr: &MemoryManager, n: usize) -> Ptr<u8> {
        mgr.malloc(n, 1, TypeTag::UNTYPED)
    }

    fn verifying(total: usize) -> MemoryManager {
        MemoryManager::with_config(MemConfig {
            verify: true,
            ..MemConfig::new(total)
        })
        .unwrap()
    }

    #[test]
    fn concrete_4096_scenario() {
        let mgr = verifying(4096);
        // 10 x 8 = 80 payload bytes + 64 header -> 192; 20 x 8 -> 256.
        let a = mgr.malloc(10, 8, TypeTag::UNTYPED);
        let b = mgr.malloc(20, 8, TypeTag::UNTYPED);
        assert_eq!(mgr.free_block_sizes(), vec![3648]);
        // SAFETY: both blocks are live.
        let (ha, hb) = unsafe { (mgr.verify(a).unwrap(), mgr.verify(b).unwrap()) };
        assert_eq!((ha.n_elem(), ha.type_size()), (10, 8));
        assert_eq!((hb.n_elem(), hb.type_size()), (20, 8));
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 192);
        let sizes: Vec<_> = mgr.blocks().iter().map(|b| (b.size, b.free)).collect();
        assert_eq!(sizes, vec![(192, false), (256, false), (3648, true)]);

        // SAFETY: both handles came from `mgr` and are freed once.
        unsafe {
            mgr.free(a);
            mgr.free(b);
        }
        assert_eq!(mgr.free_block_sizes(), vec![4096]);
        mgr.check();
    }

    #[test]
    fn coalesces_in_either_order() {
        for order in [[0, 1, 2], [2, 1, 0], [1, 0, 2], [0, 2, 1]] {
            let mgr = MemoryManager::new(8192);
            let ptrs = [bytes(&mgr, 100), bytes(&mgr, 200), bytes(&mgr, 300)];
            for i in order {
                // SAFETY: each handle is freed exactly once.
                unsafe { mgr.free(ptrs[i]) };
            }
            assert_eq!(mgr.free_block_sizes(), vec![8192], "order {order:?}");
            assert_eq!(mgr.stats().blocks, 1);
        }
    }

    #[test]
    fn payload_is_aligned_and_usable() {
        let mgr = MemoryManager::new(4096);
        let p = bytes(&mgr, 10);
        assert_eq!(p.as_ptr() as usize % 64, 0);
        // SAFETY: the block is live and every index is in range.
        unsafe {
            for i in 0..10 {
                p.write(i, i as u8);
            }
            assert_eq!(p.read(9), 9);
        }
        // SAFETY: allocated above.
        let head = unsafe { mgr.verify(p) }.unwrap();
        assert_eq!(head.n_elem(), 10);
        assert_eq!(head.type_size(), 1);
        // SAFETY: freed once.
        unsafe { mgr.free(p) };
    }

    #[test]
    fn zero_sized_request_is_null() {
        let mgr = MemoryManager::new(4096);
        let p = mgr.malloc(0, 8, TypeTag::UNTYPED);
        assert!(p.is_null());
        assert!(mgr.malloc(8, 0, TypeTag::UNTYPED).is_null());
        // SAFETY: freeing null is a no-op.
        unsafe { mgr.free(p) };
        assert_eq!(mgr.outstanding(), 0);
    }

    #[test]
    fn small_leftover_is_not_split() {
        let mgr = MemoryManager::new(256);
        // 64 header + 128 payload = 192; leftover 64 is not above the threshold.
        let p = bytes(&mgr, 128);
        assert_eq!(mgr.blocks(), vec![BlockInfo { offset: 0, size: 256, free: false }]);
        // SAFETY: freed once.
        unsafe { mgr.free(p) };
        assert_eq!(mgr.free_block_sizes(), vec![256]);
    }

    #[test]
    fn exhaustion_falls_back_to_platform() {
        let mgr = MemoryManager::new(1024);
        let p = bytes(&mgr, 4096);
        assert!(!p.is_null());
        let stats = mgr.stats();
        assert_eq!(stats.foreign_blocks, 1);
        assert_eq!(stats.used_bytes, 0);
        // SAFETY: the foreign block is live; index in range.
        unsafe {
            p.write(4095, 7);
            assert_eq!(p.read(4095), 7);
        }
        // SAFETY: freed once.
        unsafe { mgr.free(p) };
        assert_eq!(mgr.stats().foreign_blocks, 0);
    }

    #[test]
    fn empty_arena_serves_everything_from_platform() {
        let mgr = MemoryManager::new(0);
        let p = bytes(&mgr, 16);
        assert_eq!(mgr.stats().foreign_blocks, 1);
        // SAFETY: freed once.
        unsafe { mgr.free(p) };
    }

    #[test]
    fn reuse_does_not_grow_ledger() {
        let mgr = MemoryManager::new(1 << 16);
        for _ in 0..100 {
            let a = bytes(&mgr, 500);
            let b = bytes(&mgr, 70);
            // SAFETY: each freed once.
            unsafe {
                mgr.free(b);
                mgr.free(a);
            }
        }
        let state = mgr.state.lock();
        assert!(state.ledger.capacity() <= 4);
        assert_eq!(state.free_index.len(), 1);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_without_verification_is_fatal() {
        let mgr = MemoryManager::with_config(MemConfig {
            verify: false,
            ..MemConfig::new(4096)
        })
        .unwrap();
        let p = bytes(&mgr, 32);
        // SAFETY: deliberately freed twice; the second call must panic.
        unsafe {
            mgr.free(p);
            mgr.free(p);
        }
    }

    #[test]
    #[should_panic(expected = "checksum mismatch")]
    fn double_free_with_verification_is_fatal() {
        let mgr = verifying(4096);
        let p = bytes(&mgr, 32);
        // SAFETY: deliberately freed twice; the second call must panic.
        unsafe {
            mgr.free(p);
            mgr.free(p);
        }
    }

    #[test]
    fn try_check_reports_write_after_free() {
        let mgr = verifying(4096);
        let p = bytes(&mgr, 32);
        let raw = p.as_ptr();
        // SAFETY: freed once.
        unsafe { mgr.free(p) };
        // SAFETY: the arena is still mapped; this simulates a stray write.
        unsafe { raw.add(3).write(0) };
        match mgr.try_check() {
            Err(IntegrityError::WriteAfterFree { offset, found, expected, .. }) => {
                assert_eq!(offset, 64 + 3);
                assert_eq!(found, 0);
                assert_eq!(expected, MemConfig::DEFAULT_FILL_BYTE);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn report_lists_blocks() {
        let mgr = MemoryManager::new(4096);
        let p = bytes(&mgr, 1);
        let report = mgr.report();
        assert!(report.contains("used"));
        assert!(report.contains("free"));
        // SAFETY: freed once.
        unsafe { mgr.free(p) };
    }

    #[test]
    fn leak_at_teardown_keeps_memory_readable() {
        let mgr = MemoryManager::new(4096);
        let p = bytes(&mgr, 8);
        let raw = p.as_ptr();
        // SAFETY: in bounds.
        unsafe { raw.write(5) };
        drop(mgr);
        // SAFETY: the arena was leaked because `p` was outstanding.
        assert_eq!(unsafe { raw.read() }, 5);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn assert_partition(mgr: &MemoryManager) {
            let blocks = mgr.blocks();
            let mut cursor = 0;
            for b in &blocks {
                assert_eq!(b.offset, cursor, "gap or overlap at {cursor}");
                cursor += b.size;
            }
            assert_eq!(cursor, mgr.stats().total_bytes);
            for pair in blocks.windows(2) {
                assert!(!(pair[0].free && pair[1].free), "adjacent free blocks");
            }
        }

        proptest! {
            #[test]
            fn blocks_partition_arena(
                sizes in prop::collection::vec(1usize..600, 1..40),
                frees in prop::collection::vec(any::<prop::sample::Index>(), 0..40),
            ) {
                let mgr = MemoryManager::new(16 * 1024);
                let mut live: Vec<Ptr<u8>> = sizes.iter().map(|&n| bytes(&mgr, n)).collect();
                assert_partition(&mgr);
                for ix in frees {
                    if live.is_empty() {
                        break;
                    }
                    let p = live.swap_remove(ix.index(live.len()));
                    // SAFETY: each handle is removed from `live` before freeing.
                    unsafe { mgr.free(p) };
                    assert_partition(&mgr);
                }
                for p in live.drain(..) {
                    // SAFETY: as above.
                    unsafe { mgr.free(p) };
                }
                prop_assert_eq!(mgr.free_block_sizes(), vec![16 * 1024]);
                prop_assert_eq!(mgr.stats().foreign_blocks, 0);
            }

            #[test]
            fn live_payloads_do_not_overlap(sizes in prop::collection::vec(1usize..300, 1..30)) {
                let mgr = MemoryManager::new(8 * 1024);
                let ptrs: Vec<_> = sizes.iter().map(|&n| bytes(&mgr, n)).collect();
                // SAFETY: every block is live and `k < n` stays in range.
                unsafe {
                    for (i, (&p, &n)) in ptrs.iter().zip(&sizes).enumerate() {
                        for k in 0..n {
                            p.write(k as isize, i as u8);
                        }
                    }
                    for (i, (&p, &n)) in ptrs.iter().zip(&sizes).enumerate() {
                        for k in 0..n {
                            prop_assert_eq!(p.read(k as isize), i as u8);
                        }
                    }
                }
                for p in ptrs {
                    // SAFETY: each freed once.
                    unsafe { mgr.free(p) };
                }
            }
        }
    }
}
