//! Validating handle.

use std::fmt;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};

use memledger_core::{AccessError, Generation};

use super::{impl_ptr_arith, ElemPtr, Pod};
use crate::header::{self, BlockHeader};

/// Pointer-equivalent handle that validates every dereference.
///
/// Carries the allocation's base address and byte length, a byte offset
/// from the base, and, for allocator-owned memory, the generation stamped
/// into the block header at malloc together with the header's address.
/// Arithmetic never fails; validation happens when an element is accessed.
pub struct CheckedPtr<T> {
    base: *mut u8,
    len: usize,
    offset: isize,
    generation: Generation,
    head: *const BlockHeader,
    _marker: PhantomData<*mut T>,
}

impl<T> CheckedPtr<T> {
    const ELEM: usize = {
        assert!(size_of::<T>() != 0, "handles over zero-sized types are not supported");
        size_of::<T>()
    };

    fn addr(&self) -> usize {
        (self.base as usize).wrapping_add_signed(self.offset)
    }

    /// Address of element `i` after the checks that need no memory access:
    /// null, bounds and alignment.
    pub fn locate(&self, i: isize) -> Result<*mut T, AccessError> {
        if self.base.is_null() {
            return Err(AccessError::Null);
        }
        let elem = Self::ELEM as isize;
        let out_of_bounds = |off: isize| AccessError::OutOfBounds {
            index: off.div_euclid(elem),
            len: self.len(),
        };
        let off = i
            .checked_mul(elem)
            .and_then(|b| b.checked_add(self.offset))
            .ok_or(AccessError::OutOfBounds {
                index: i,
                len: self.len(),
            })?;
        if off < 0 || off as usize + Self::ELEM > self.len {
            return Err(out_of_bounds(off));
        }
        let addr = self.base as usize + off as usize;
        if addr % align_of::<T>() != 0 {
            return Err(AccessError::Misaligned {
                addr,
                align: align_of::<T>(),
            });
        }
        Ok(self.base.wrapping_add(off as usize).cast())
    }

    /// Validated address of element `i`, or the reason it is inaccessible.
    ///
    /// Runs [`CheckedPtr::locate`], then compares the block header's
    /// generation with the handle's for tracked handles.
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::elem_ptr`]: for tracked handles the allocator must not
    /// have been dropped after the block was released.
    pub unsafe fn try_elem_ptr(&self, i: isize) -> Result<*mut T, AccessError> {
        let p = self.locate(i)?;
        if !self.head.is_null() {
            // SAFETY: tracked handles only come from arena allocations, and
            // the caller guarantees the arena is still mapped.
            let found = unsafe { header::read_generation(self.head) };
            if found != self.generation {
                return Err(AccessError::Stale {
                    expected: self.generation,
                    found,
                });
            }
        }
        Ok(p)
    }

    /// Allocation length in elements.
    pub fn len(&self) -> usize {
        self.len / Self::ELEM
    }

    /// Whether the allocation holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len < Self::ELEM
    }

    /// Current position relative to the allocation base, in elements.
    pub fn index(&self) -> isize {
        self.offset.div_euclid(Self::ELEM as isize)
    }

    /// Generation the handle was created with ([`Generation::DEAD`] for
    /// untracked memory).
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether staleness is checked on access.
    pub fn is_tracked(&self) -> bool {
        !self.head.is_null()
    }

    /// Reinterpret as a handle over `U`, keeping base, length and tracking.
    ///
    /// # Panics
    ///
    /// Panics if the current address is not aligned for `U`.
    #[track_caller]
    pub fn cast<U: Pod>(self) -> CheckedPtr<U>
    where
        T: Pod,
    {
        // SAFETY: both types accept every bit pattern, so reinterpreting the
        // bytes cannot produce an invalid value.
        unsafe { self.cast_raw() }
    }

    /// [`CheckedPtr::cast`] without the plain-data bound.
    ///
    /// # Safety
    ///
    /// Bytes read through the new handle must be valid values of `U`.
    #[track_caller]
    pub unsafe fn cast_raw<U>(self) -> CheckedPtr<U> {
        let addr = self.addr();
        if !self.base.is_null() && addr % align_of::<U>() != 0 {
            fail(AccessError::Misaligned {
                addr,
                align: align_of::<U>(),
            });
        }
        CheckedPtr {
            base: self.base,
            len: self.len,
            offset: self.offset,
            generation: self.generation,
            head: self.head,
            _marker: PhantomData,
        }
    }
}

#[cold]
#[track_caller]
fn fail(e: AccessError) -> ! {
    panic!("[memledger] {e}")
}

impl<T> ElemPtr<T> for CheckedPtr<T> {
    fn null() -> Self {
        Self {
            base: std::ptr::null_mut(),
            len: 0,
            offset: 0,
            generation: Generation::DEAD,
            head: std::ptr::null(),
            _marker: PhantomData,
        }
    }

    unsafe fn from_raw_parts(ptr: *mut T, len: usize) -> Self {
        if ptr.is_null() {
            return Self::null();
        }
        Self {
            base: ptr.cast(),
            len: len * Self::ELEM,
            ..Self::null()
        }
    }

    unsafe fn from_allocation(ptr: *mut T, len: usize, generation: Generation, track: bool) -> Self {
        if ptr.is_null() {
            return Self::null();
        }
        Self {
            base: ptr.cast(),
            len: len * Self::ELEM,
            offset: 0,
            generation,
            head: if track {
                header::header_ptr(ptr.cast())
            } else {
                std::ptr::null()
            },
            _marker: PhantomData,
        }
    }

    fn is_null(&self) -> bool {
        self.base.is_null() && self.offset == 0
    }

    fn alloc_generation(&self) -> Option<Generation> {
        (self.generation != Generation::DEAD).then_some(self.generation)
    }

    fn as_ptr(&self) -> *mut T {
        self.base.wrapping_offset(self.offset).cast()
    }

    #[track_caller]
    unsafe fn elem_ptr(&self, i: isize) -> *mut T {
        // SAFETY: forwarded.
        match unsafe { self.try_elem_ptr(i) } {
            Ok(p) => p,
            Err(e) => fail(e),
        }
    }

    #[track_caller]
    unsafe fn span_ptr(&self, n: usize) -> *mut T {
        if n == 0 {
            return self.as_ptr();
        }
        let Ok(last) = isize::try_from(n - 1) else {
            fail(AccessError::OutOfBounds {
                index: isize::MAX,
                len: self.len(),
            })
        };
        // SAFETY: forwarded.
        unsafe {
            self.elem_ptr(last);
            self.elem_ptr(0)
        }
    }

    fn offset(self, n: isize) -> Self {
        Self {
            offset: self
                .offset
                .wrapping_add(n.wrapping_mul(Self::ELEM as isize)),
            ..self
        }
    }

    #[track_caller]
    fn distance(&self, origin: &Self) -> isize {
        let bytes = (self.addr() as isize).wrapping_sub(origin.addr() as isize);
        let elem = Self::ELEM as isize;
        if bytes % elem != 0 {
            fail(AccessError::InexactDistance {
                bytes,
                elem_size: Self::ELEM,
            });
        }
        bytes / elem
    }
}

impl_ptr_arith!(CheckedPtr);

impl<T> fmt::Debug for CheckedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckedPtr")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("offset", &self.offset)
            .field("generation", &self.generation)
            .field("tracked", &self.is_tracked())
            .finish()
    }
}

impl<T> fmt::Display for CheckedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#x}+{}:{})", self.base as usize, self.offset, self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memledger_core::{NodeIndex, TypeTag};

    fn over<T>(buf: &mut [T]) -> CheckedPtr<T> {
        // SAFETY: every test keeps `buf` alive while the handle is used.
        unsafe { CheckedPtr::from_raw_parts(buf.as_mut_ptr(), buf.len()) }
    }

    #[test]
    fn indexes_within_bounds() {
        let mut buf = [1i32, 2, 3, 4];
        let p = over(&mut buf);
        assert_eq!(p.len(), 4);
        // SAFETY: `buf` is live.
        unsafe {
            assert_eq!(p.read(3), 4);
            p.write(0, 10);
        }
        assert_eq!(buf[0], 10);
    }

    #[test]
    fn reports_bounds_at_len_and_minus_one() {
        let mut buf = [0u16; 5];
        let p = over(&mut buf);
        assert_eq!(
            p.locate(5),
            Err(AccessError::OutOfBounds { index: 5, len: 5 })
        );
        assert_eq!(
            p.locate(-1),
            Err(AccessError::OutOfBounds { index: -1, len: 5 })
        );
        let end = p + 5;
        // SAFETY: `buf` is live.
        assert_eq!(unsafe { end.read(-1) }, 0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn read_past_end_panics() {
        let mut buf = [0u8; 3];
        // SAFETY: `buf` is live; the index is rejected before any read.
        unsafe { over(&mut buf).read(3) };
    }

    #[test]
    #[should_panic(expected = "null handle")]
    fn null_dereference_panics() {
        // SAFETY: a null handle covers no memory; the check fires first.
        unsafe { CheckedPtr::<u64>::null().read(0) };
    }

    #[test]
    fn locate_never_touches_memory() {
        let p = CheckedPtr::<u64>::null() + 3;
        assert_eq!(p.locate(0), Err(AccessError::Null));
    }

    #[test]
    fn arithmetic_leaves_range_freely() {
        let mut buf = [0u32; 2];
        let p = over(&mut buf);
        let far = p + 100;
        assert_eq!(far - p, 100);
        // SAFETY: `buf` is live.
        assert_eq!(unsafe { (far - 99).read(-1) }, 0);
    }

    #[test]
    fn span_checks_both_ends() {
        let mut buf = [0u8; 8];
        let p = over(&mut buf) + 2;
        // SAFETY: `buf` is live for every call below.
        unsafe {
            assert_eq!(p.span_ptr(6), p.as_ptr());
            assert!(std::panic::catch_unwind(|| p.span_ptr(7)).is_err());
            assert_eq!(p.span_ptr(0), p.as_ptr());
        }
    }

    #[test]
    fn cast_checks_target_alignment() {
        let mut buf = [0u64; 2];
        let bytes = over(&mut buf).cast::<u8>();
        assert_eq!(bytes.len(), 16);
        let words = (bytes + 8).cast::<u32>();
        assert_eq!(words.index(), 2);
        assert!(std::panic::catch_unwind(|| (bytes + 3).cast::<u32>()).is_err());
    }

    #[test]
    #[should_panic(expected = "not a multiple")]
    fn distance_between_misaligned_views_panics() {
        let mut buf = [0u64; 2];
        let bytes = over(&mut buf).cast::<u8>();
        // SAFETY: both views cover the same initialised buffer.
        let a = unsafe { bytes.cast_raw::<[u8; 3]>() };
        let b = unsafe { (bytes + 4).cast_raw::<[u8; 3]>() };
        let _ = b - a;
    }

    #[test]
    fn tracked_handle_sees_generation_change() {
        let mut buf = [0u64; 8];
        let payload = buf.as_mut_ptr().wrapping_add(6).cast::<u8>();
        let h = BlockHeader::new(NodeIndex(1), 2, 8, Generation(9), TypeTag::UNTYPED);
        // SAFETY: the header slot and the two payload words lie inside `buf`,
        // which outlives every access below.
        unsafe {
            header::write(payload, &h);
            let p = CheckedPtr::from_allocation(payload.cast::<u64>(), 2, Generation(9), true);
            p.write(1, 5);
            assert_eq!(p.read(1), 5);
            header::write(payload, &h.released());
            assert_eq!(
                p.try_elem_ptr(0),
                Err(AccessError::Stale {
                    expected: Generation(9),
                    found: Generation::DEAD,
                })
            );
            // Bounds are still reported without consulting the header.
            assert!(p.locate(1).is_ok());
        }
    }

    #[test]
    fn display_shows_base_offset_len() {
        let mut buf = [0u8; 4];
        let p = over(&mut buf) + 2;
        assert_eq!(
            p.to_string(),
            format!("({:#x}+2:4)", buf.as_ptr() as usize)
        );
    }
}
