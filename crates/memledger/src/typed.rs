//! Typed allocation on top of the byte allocator.
//!
//! [`aligned_new`] allocates and default-constructs `n` elements;
//! [`aligned_delete`] checks the element type recorded in the block header,
//! drops the elements in order and releases the block. [`memcopy`] and
//! [`memset`] are the bulk operations over handles.
//!
//! The `_default` variants bind [`glb_mem_mgr`].

#![allow(unsafe_code)]

use std::convert::Infallible;
use std::mem::{align_of, size_of};
use std::ptr;

use log::trace;
use memledger_arena::{glb_mem_mgr, ConstPtr, ElemPtr, MemoryManager, Pod, Ptr};
use memledger_core::{HeaderError, TypeTag};

/// Drops constructed elements and frees the block unless disarmed.
struct InitGuard<'a, T> {
    mgr: &'a MemoryManager,
    block: Ptr<u8>,
    elems: Ptr<T>,
    done: usize,
}

impl<T> Drop for InitGuard<'_, T> {
    fn drop(&mut self) {
        for i in 0..self.done {
            // SAFETY: elements `0..done` were written and not yet dropped.
            unsafe { ptr::drop_in_place(self.elems.elem_ptr(i as isize)) };
        }
        // SAFETY: `block` came from `malloc` on `mgr` and nothing else
        // releases it once the guard is armed.
        unsafe { self.mgr.free(self.block) };
    }
}

/// Allocate `n` elements of `T` from `mgr`, each set to `T::default()`.
///
/// Returns the null handle for `n == 0`.
///
/// # Panics
///
/// Panics if `T` needs a stricter alignment than the allocator provides.
/// A panic in `T::default()` drops the elements built so far and frees the
/// block before unwinding further.
#[track_caller]
pub fn aligned_new<T: Default + 'static>(n: usize, mgr: &MemoryManager) -> Ptr<T> {
    match try_aligned_new_with(n, mgr, |_| Ok::<T, Infallible>(T::default())) {
        Ok(p) => p,
        Err(never) => match never {},
    }
}

/// Allocate `n` elements of `T` from `mgr`, building element `i` with
/// `init(i)`.
///
/// On the first `Err` the elements built so far are dropped, the block is
/// freed and the error is returned.
///
/// # Panics
///
/// As [`aligned_new`].
#[track_caller]
pub fn try_aligned_new_with<T, E, F>(n: usize, mgr: &MemoryManager, mut init: F) -> Result<Ptr<T>, E>
where
    T: 'static,
    F: FnMut(usize) -> Result<T, E>,
{
    assert!(
        align_of::<T>() <= mgr.align(),
        "[memledger] {} needs {}-byte alignment, allocator provides {}",
        std::any::type_name::<T>(),
        align_of::<T>(),
        mgr.align()
    );
    let block = mgr.malloc(n, size_of::<T>(), TypeTag::of::<T>());
    if block.is_null() {
        return Ok(Ptr::null());
    }
    // SAFETY: the payload is aligned to `mgr.align() >= align_of::<T>()`
    // and sized for `n` elements; elements are written before being read.
    let elems = unsafe { block.cast_raw::<T>() };
    let mut guard = InitGuard {
        mgr,
        block,
        elems,
        done: 0,
    };
    for i in 0..n {
        let value = init(i)?;
        // SAFETY: slot `i` is inside the fresh block and uninitialised.
        unsafe { elems.elem_ptr(i as isize).write(value) };
        guard.done += 1;
    }
    std::mem::forget(guard);
    trace!(
        "[memledger] aligned_new {n} x {}",
        std::any::type_name::<T>()
    );
    Ok(elems)
}

/// Drop the elements behind `p` and release the block.
///
/// Releasing the null handle is a no-op.
///
/// # Panics
///
/// Panics if the block header is corrupt, if the block was allocated for a
/// different element type, or if it is not currently allocated.
///
/// # Safety
///
/// `p` must be null or a handle returned by [`aligned_new`] (or
/// [`try_aligned_new_with`]) on `mgr`, not yet released, and no element may
/// be used afterwards.
#[track_caller]
pub unsafe fn aligned_delete<T: 'static>(p: Ptr<T>, mgr: &MemoryManager) {
    if p.is_null() {
        return;
    }
    // SAFETY: a byte view of the same block.
    let block = unsafe { p.cast_raw::<u8>() };
    // SAFETY: caller contract.
    let head = match unsafe { mgr.verify(block) } {
        Ok(head) => head,
        Err(e) => panic!("[memledger] {e}"),
    };
    let expected = TypeTag::of::<T>();
    if head.type_tag() != expected {
        panic!(
            "[memledger] {}",
            HeaderError::TypeMismatch {
                addr: block.as_ptr() as usize,
                expected,
                found: head.type_tag(),
            }
        );
    }
    for i in 0..head.n_elem() {
        // SAFETY: every element was built by `aligned_new` and is dropped once.
        unsafe { ptr::drop_in_place(p.elem_ptr(i as isize)) };
    }
    // SAFETY: caller contract.
    unsafe { mgr.free(block) };
}

/// [`aligned_new`] on the process-wide allocator.
#[track_caller]
pub fn aligned_new_default<T: Default + 'static>(n: usize) -> Ptr<T> {
    aligned_new(n, glb_mem_mgr())
}

/// [`try_aligned_new_with`] on the process-wide allocator.
#[track_caller]
pub fn try_aligned_new_with_default<T, E, F>(n: usize, init: F) -> Result<Ptr<T>, E>
where
    T: 'static,
    F: FnMut(usize) -> Result<T, E>,
{
    try_aligned_new_with(n, glb_mem_mgr(), init)
}

/// [`aligned_delete`] on the process-wide allocator.
///
/// # Safety
///
/// As [`aligned_delete`], with `p` allocated from [`glb_mem_mgr`].
#[track_caller]
pub unsafe fn aligned_delete_default<T: 'static>(p: Ptr<T>) {
    // SAFETY: forwarded.
    unsafe { aligned_delete(p, glb_mem_mgr()) }
}

/// Copy `n` elements from `src` to `dst`; returns `dst`.
///
/// `src` is read-only: pass a [`ConstPtr`] or any [`Ptr`]. A no-op when
/// `n == 0` or both handles point at the same address. The ranges may
/// overlap. With checked handles both ranges are validated first.
///
/// # Safety
///
/// Both handles must cover live memory, and the `n` source elements must be
/// initialised. With unchecked handles both ranges must also be in bounds
/// and aligned.
#[track_caller]
pub unsafe fn memcopy<T: Copy>(dst: Ptr<T>, src: impl Into<ConstPtr<T>>, n: usize) -> Ptr<T> {
    let src = src.into();
    if n == 0 || dst.as_ptr().cast_const() == src.as_ptr() {
        return dst;
    }
    // SAFETY: caller contract; the checked build validated both spans.
    unsafe {
        let to = dst.span_ptr(n);
        let from = src.span_ptr(n);
        ptr::copy(from, to, n);
    }
    dst
}

/// Set every byte of `n` elements at `dst` to `value`; returns `dst`.
///
/// Restricted to [`Pod`] element types, for which any byte pattern is a
/// valid value.
///
/// # Safety
///
/// As [`memcopy`] for the destination range.
#[track_caller]
pub unsafe fn memset<T: Pod>(dst: Ptr<T>, value: u8, n: usize) -> Ptr<T> {
    if n == 0 {
        return dst;
    }
    // SAFETY: as in `memcopy`; `T: Pod` accepts the resulting bytes.
    unsafe {
        let to = dst.span_ptr(n);
        ptr::write_bytes(to, value, n);
    }
    dst
}
