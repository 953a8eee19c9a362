//! Seeded workloads for benchmarking and stress-testing the allocator.
//!
//! - [`random_ops`]: a deterministic sequence of malloc/free requests
//! - [`run_workload`]: replay a sequence against a [`MemoryManager`],
//!   stamping and re-checking every payload

#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use memledger_arena::{ElemPtr, MemoryManager, Ptr};
use memledger_core::TypeTag;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// One step of a workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    /// Allocate into `slot`, releasing whatever the slot held first.
    Alloc {
        /// Slot index.
        slot: usize,
        /// Element count.
        n_elem: usize,
        /// Element size in bytes.
        type_size: usize,
    },
    /// Release the allocation in `slot`, if any.
    Free {
        /// Slot index.
        slot: usize,
    },
}

/// Counters collected by [`run_workload`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkloadReport {
    /// Successful allocations.
    pub allocs: usize,
    /// Releases.
    pub frees: usize,
    /// Allocations that were still live when the sequence ended.
    pub live_at_end: usize,
    /// Peak number of platform-allocator blocks observed.
    pub peak_foreign: usize,
}

const TYPE_SIZES: [usize; 5] = [1, 2, 4, 8, 16];

/// Deterministic workload of `count` operations over `slots` slots.
///
/// Roughly 60% allocations; requests are skewed toward small sizes with an
/// occasional one up to `max_bytes`.
pub fn random_ops(seed: u64, count: usize, slots: usize, max_bytes: usize) -> Vec<Op> {
    assert!(slots > 0 && max_bytes > 0);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut below = |n: usize| (rng.next_u64() % n as u64) as usize;
    (0..count)
        .map(|_| {
            let slot = below(slots);
            if below(10) < 6 {
                let type_size = TYPE_SIZES[below(TYPE_SIZES.len())];
                let cap = if below(16) == 0 { max_bytes } else { max_bytes.min(512) };
                let n_elem = 1 + below((cap / type_size).max(1));
                Op::Alloc {
                    slot,
                    n_elem,
                    type_size,
                }
            } else {
                Op::Free { slot }
            }
        })
        .collect()
}

struct Live {
    ptr: Ptr<u8>,
    bytes: usize,
    stamp: u8,
}

impl Live {
    #[allow(unsafe_code)]
    fn intact(&self) -> bool {
        // SAFETY: a `Live` entry owns an allocated block of `bytes >= 1`
        // bytes until it is released.
        unsafe {
            self.ptr.read(0) == self.stamp
                && self.ptr.read(self.bytes as isize - 1) == self.stamp
        }
    }
}

/// Replay `ops` against `mgr`.
///
/// Each payload gets its first and last byte stamped on allocation, and
/// both are checked on release.
///
/// # Panics
///
/// Panics if a payload lost its stamp (another allocation overlapped it).
#[allow(unsafe_code)]
pub fn run_workload(mgr: &MemoryManager, ops: &[Op]) -> WorkloadReport {
    let slots = ops
        .iter()
        .map(|op| match *op {
            Op::Alloc { slot, .. } | Op::Free { slot } => slot + 1,
        })
        .max()
        .unwrap_or(0);
    let mut live: Vec<Option<Live>> = (0..slots).map(|_| None).collect();
    let mut report = WorkloadReport::default();

    let release = |entry: Live, report: &mut WorkloadReport| {
        assert!(entry.intact(), "payload at {} lost its stamp", entry.ptr);
        // SAFETY: every live entry was allocated from `mgr` and is taken out
        // of its slot before release.
        unsafe { mgr.free(entry.ptr) };
        report.frees += 1;
    };

    for (step, op) in ops.iter().enumerate() {
        match *op {
            Op::Alloc {
                slot,
                n_elem,
                type_size,
            } => {
                if let Some(old) = live[slot].take() {
                    release(old, &mut report);
                }
                let ptr = mgr.malloc(n_elem, type_size, TypeTag::UNTYPED);
                let bytes = n_elem * type_size;
                let stamp = (step % 251) as u8 + 1;
                // SAFETY: fresh block of `bytes >= 1` bytes.
                unsafe {
                    ptr.write(0, stamp);
                    ptr.write(bytes as isize - 1, stamp);
                }
                live[slot] = Some(Live { ptr, bytes, stamp });
                report.allocs += 1;
                report.peak_foreign = report.peak_foreign.max(mgr.stats().foreign_blocks);
            }
            Op::Free { slot } => {
                if let Some(old) = live[slot].take() {
                    release(old, &mut report);
                }
            }
        }
    }

    report.live_at_end = live.iter().flatten().count();
    for entry in live.into_iter().flatten() {
        release(entry, &mut report);
    }
    report
}
