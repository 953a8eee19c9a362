//! Integration test: corrupted headers, double frees, writes after free
//! and out-of-range access are all fatal.

use memledger_arena::{ElemPtr, MemConfig, MemoryManager};
use memledger_core::{HeaderError, TypeTag};

fn verifying(total: usize) -> MemoryManager {
    MemoryManager::with_config(MemConfig {
        verify: true,
        ..MemConfig::new(total)
    })
    .unwrap()
}

fn quiet(total: usize) -> MemoryManager {
    MemoryManager::with_config(MemConfig {
        verify: false,
        ..MemConfig::new(total)
    })
    .unwrap()
}

#[test]
#[should_panic(expected = "checksum mismatch")]
fn overwritten_header_is_detected_on_free() {
    let mgr = quiet(4096);
    let p = mgr.malloc(16, 1, TypeTag::UNTYPED);
    // SAFETY: the header lies in the arena directly before the payload.
    unsafe { p.as_ptr().sub(20).write(0xff) };
    // SAFETY: allocated above.
    unsafe { mgr.free(p) };
}

#[test]
fn verify_reports_corruption_without_panicking() {
    let mgr = quiet(4096);
    let p = mgr.malloc(16, 4, TypeTag::of::<u32>());
    // SAFETY: allocated above.
    let head = unsafe { mgr.verify(p) }.unwrap();
    assert_eq!(head.type_tag(), TypeTag::of::<u32>());

    // SAFETY: the header's first byte lies in the arena before the payload.
    unsafe { p.as_ptr().sub(48).write(0x55) };
    // SAFETY: the header slot is still mapped.
    let err = unsafe { mgr.verify(p) }.unwrap_err();
    assert!(matches!(err, HeaderError::ChecksumMismatch { .. }));
}

#[test]
#[should_panic(expected = "double free")]
fn foreign_double_free_is_detected() {
    let mgr = quiet(256);
    let p = mgr.malloc(4096, 1, TypeTag::UNTYPED);
    assert_eq!(mgr.stats().foreign_blocks, 1);
    // SAFETY: deliberately freed twice; the second call must panic before
    // touching the released block.
    unsafe {
        mgr.free(p);
        mgr.free(p);
    }
}

#[test]
#[should_panic(expected = "write after free")]
fn write_after_free_is_caught_on_reuse() {
    let mgr = verifying(4096);
    let p = mgr.malloc(100, 1, TypeTag::UNTYPED);
    let raw = p.as_ptr();
    // SAFETY: freed once.
    unsafe { mgr.free(p) };
    // SAFETY: the arena stays mapped; simulates a stale raw write.
    unsafe { raw.add(50).write(1) };
    let _ = mgr.malloc(100, 1, TypeTag::UNTYPED);
}

#[test]
#[should_panic(expected = "write after free")]
fn check_scans_free_regions() {
    let mgr = verifying(4096);
    let keep = mgr.malloc(8, 1, TypeTag::UNTYPED);
    let p = mgr.malloc(8, 1, TypeTag::UNTYPED);
    let raw = p.as_ptr();
    // SAFETY: freed once.
    unsafe { mgr.free(p) };
    // SAFETY: as above.
    unsafe { raw.write(0) };
    assert!(!keep.is_null());
    mgr.check();
}

#[cfg(any(debug_assertions, feature = "checked"))]
mod checked {
    use super::*;

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn read_at_len_panics() {
        let mgr = quiet(4096);
        let p = mgr.malloc(10, 1, TypeTag::UNTYPED);
        // SAFETY: the block is live; the index is rejected before any read.
        unsafe { p.read(10) };
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn read_before_start_panics() {
        let mgr = quiet(4096);
        let p = mgr.malloc(10, 1, TypeTag::UNTYPED);
        // SAFETY: as above.
        unsafe { p.read(-1) };
    }

    #[test]
    #[should_panic(expected = "access after free")]
    fn stale_handle_panics() {
        let mgr = quiet(4096);
        let p = mgr.malloc(10, 1, TypeTag::UNTYPED);
        let copy = p;
        // SAFETY: freed once; `copy` is only used to observe staleness
        // while `mgr`, and so the header slot, is still alive.
        unsafe {
            mgr.free(p);
            copy.read(0);
        }
    }

    #[test]
    #[should_panic(expected = "access after free")]
    fn stale_handle_panics_after_reuse() {
        let mgr = verifying(4096);
        let p = mgr.malloc(10, 1, TypeTag::UNTYPED);
        // SAFETY: freed once.
        unsafe { mgr.free(p) };
        let q = mgr.malloc(10, 1, TypeTag::UNTYPED);
        assert_eq!(q.as_ptr(), p.as_ptr());
        // SAFETY: `mgr` is alive; the stale generation is rejected first.
        unsafe { p.write(0, 1) };
    }

    #[test]
    fn stale_access_is_reported_without_panicking() {
        let mgr = quiet(4096);
        let p = mgr.malloc(4, 1, TypeTag::UNTYPED);
        // SAFETY: `mgr` outlives every access below.
        unsafe {
            assert!(p.try_elem_ptr(3).is_ok());
            mgr.free(p);
            assert!(matches!(
                p.try_elem_ptr(0),
                Err(memledger_core::AccessError::Stale { .. })
            ));
        }
        // Bounds checks need no memory access and stay available.
        assert!(p.locate(3).is_ok());
        assert!(p.locate(4).is_err());
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn free_through_stale_handle_after_reuse_panics() {
        let mgr = quiet(4096);
        let p = mgr.malloc(10, 1, TypeTag::UNTYPED);
        // SAFETY: deliberately freed through a stale handle once the block
        // has been reused; the generation mismatch must be caught.
        unsafe {
            mgr.free(p);
            let _q = mgr.malloc(10, 1, TypeTag::UNTYPED);
            mgr.free(p);
        }
    }
}
