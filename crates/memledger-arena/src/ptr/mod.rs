//! Pointer-equivalent handles.
//!
//! Two implementations of one capability interface, [`ElemPtr`]:
//!
//! - [`CheckedPtr`] carries the base address, length, offset and the
//!   owning allocation's generation, and validates every dereference:
//!   bounds, alignment, and (for allocator-owned memory) staleness.
//! - [`RawPtr`] is a bare address with the same arithmetic and no checks.
//!
//! [`ConstPtr`] is the read-only counterpart of either; every [`Ptr`]
//! converts into one.
//!
//! [`Ptr`] names whichever one the build selects: the checked handle in
//! debug builds or with the `checked` feature, the raw one otherwise.
//! Code written against [`Ptr`] and [`ElemPtr`] compiles unchanged under
//! both.
//!
//! # Soundness
//!
//! Handles are `Copy` and do not own memory, exactly like the raw pointers
//! they replace. Creating, moving and comparing them is safe; touching the
//! pointee is not. [`ElemPtr::elem_ptr`], [`ElemPtr::read`],
//! [`ElemPtr::write`] and the rest are `unsafe fn` whose contract is that
//! the memory the handle was created over is still live. Within that
//! contract [`CheckedPtr`] turns an out-of-range, misaligned or stale
//! access into a panic, while for [`RawPtr`] the caller also guarantees the
//! index is valid. Release builds that have not been validated under the
//! checked configuration should enable `checked`.
//!
//! Handles are neither `Send` nor `Sync`.

#![allow(unsafe_code)]

mod checked;
mod constant;
mod unchecked;

pub use checked::CheckedPtr;
pub use constant::ConstPtr;
pub use unchecked::RawPtr;

use std::fmt;

use memledger_core::Generation;

/// Whether [`Ptr`] is the validating handle in this build.
pub const CHECKED: bool = cfg!(any(debug_assertions, feature = "checked"));

/// Handle type selected for this build.
#[cfg(any(debug_assertions, feature = "checked"))]
pub type Ptr<T> = CheckedPtr<T>;

/// Handle type selected for this build.
#[cfg(not(any(debug_assertions, feature = "checked")))]
pub type Ptr<T> = RawPtr<T>;

/// Element types for which every byte pattern is a valid value and which
/// contain no padding.
///
/// Byte buffers may be reinterpreted as slices of `Pod` types, and `Pod`
/// buffers may be filled with arbitrary bytes.
///
/// # Safety
///
/// Implementors must be inhabited by every bit pattern of their size and
/// have no padding bytes.
pub unsafe trait Pod: Copy + 'static {}

macro_rules! impl_pod {
    ($($t:ty),* $(,)?) => {
        $(
            // SAFETY: primitive integer/float: every bit pattern is valid.
            unsafe impl Pod for $t {}
        )*
    };
}

impl_pod!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

// SAFETY: arrays of `Pod` have no padding between elements.
unsafe impl<T: Pod, const N: usize> Pod for [T; N] {}

/// Pointer-like access to a run of `T`.
///
/// Indices and offsets are in elements. `i` may be negative: a handle that
/// has been advanced can index backwards into its allocation.
pub trait ElemPtr<T>:
    Copy + Eq + Ord + Default + fmt::Debug + fmt::Display + Sized
{
    /// The null handle. Compares equal only to other null handles.
    fn null() -> Self;

    /// Handle over `len` elements of caller-owned memory at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` elements for as
    /// long as the handle or any copy of it is dereferenced.
    unsafe fn from_raw_parts(ptr: *mut T, len: usize) -> Self;

    /// Handle over an allocator payload whose [`BlockHeader`] sits directly
    /// in front of `ptr` and was stamped with `generation`.
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::from_raw_parts`]; additionally the header slot in front
    /// of `ptr` must stay mapped while the handle is in use (arena memory
    /// does; foreign blocks must be created with `track = false` by the
    /// allocator).
    ///
    /// [`BlockHeader`]: crate::header::BlockHeader
    unsafe fn from_allocation(ptr: *mut T, len: usize, generation: Generation, track: bool) -> Self;

    /// Whether this is the null handle.
    fn is_null(&self) -> bool;

    /// Generation of the allocator block the handle was created over.
    ///
    /// `None` for raw handles and for handles over caller-owned memory.
    fn alloc_generation(&self) -> Option<Generation>;

    /// Current address (base plus offset). Never validated.
    fn as_ptr(&self) -> *mut T;

    /// Address of element `i` relative to the current position.
    ///
    /// Validated by the checked handle; panics on violation.
    ///
    /// # Safety
    ///
    /// The memory the handle was created over must still be live: the
    /// caller-owned buffer not dropped, or the allocator not dropped after
    /// the block was released. The checked handle reads the block header to
    /// detect staleness.
    unsafe fn elem_ptr(&self, i: isize) -> *mut T;

    /// Address of the current position after validating that the next `n`
    /// elements are all accessible. `n == 0` validates nothing.
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::elem_ptr`].
    unsafe fn span_ptr(&self, n: usize) -> *mut T;

    /// Handle advanced by `n` elements (negative moves backwards).
    fn offset(self, n: isize) -> Self;

    /// Element distance from `origin` to `self`.
    ///
    /// Meaningful only when both handles point into the same allocation;
    /// unrelated handles yield their raw address difference.
    fn distance(&self, origin: &Self) -> isize;

    /// Copy element `i` out.
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::elem_ptr`], and element `i` must be initialised. With
    /// [`RawPtr`] the element must also be in bounds and aligned.
    unsafe fn read(&self, i: isize) -> T
    where
        T: Copy,
    {
        // SAFETY: caller contract; `elem_ptr` validated the rest in the
        // checked build.
        unsafe { self.elem_ptr(i).read() }
    }

    /// Overwrite element `i`.
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::elem_ptr`]. With [`RawPtr`] the element must also be in
    /// bounds and aligned.
    unsafe fn write(&self, i: isize, value: T)
    where
        T: Copy,
    {
        // SAFETY: as in `read`; `T: Copy` so nothing is dropped in place.
        unsafe { self.elem_ptr(i).write(value) }
    }

    /// Shared reference to element `i`.
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::read`]; additionally the element must stay allocated
    /// for `'a` and not be mutated through any other handle while the
    /// reference lives.
    unsafe fn get<'a>(&self, i: isize) -> &'a T {
        // SAFETY: caller contract.
        unsafe { &*self.elem_ptr(i) }
    }

    /// Exclusive reference to element `i`.
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::read`]; additionally the element must stay allocated
    /// for `'a` and not be accessed through any other handle while the
    /// reference lives.
    unsafe fn get_mut<'a>(&self, i: isize) -> &'a mut T {
        // SAFETY: caller contract.
        unsafe { &mut *self.elem_ptr(i) }
    }

    /// Advance by one element.
    fn inc(&mut self) {
        *self = self.offset(1);
    }

    /// Step back by one element.
    fn dec(&mut self) {
        *self = self.offset(-1);
    }
}

/// Wrap caller-owned memory in a handle of the active configuration.
///
/// # Safety
///
/// See [`ElemPtr::from_raw_parts`].
pub unsafe fn from_raw_parts<T>(ptr: *mut T, len: usize) -> Ptr<T> {
    // SAFETY: forwarded.
    unsafe { <Ptr<T> as ElemPtr<T>>::from_raw_parts(ptr, len) }
}

/// `+`, `-`, `+=`, `-=` by element counts and handle subtraction, shared by
/// every handle type. Expects `null`, `offset`, `distance` and `addr` to
/// resolve as methods at the expansion site.
macro_rules! impl_ptr_arith {
    ($ptr:ident) => {
        impl<T> std::ops::Add<isize> for $ptr<T> {
            type Output = Self;

            fn add(self, n: isize) -> Self {
                self.offset(n)
            }
        }

        impl<T> std::ops::Sub<isize> for $ptr<T> {
            type Output = Self;

            fn sub(self, n: isize) -> Self {
                self.offset(n.wrapping_neg())
            }
        }

        impl<T> std::ops::AddAssign<isize> for $ptr<T> {
            fn add_assign(&mut self, n: isize) {
                *self = *self + n;
            }
        }

        impl<T> std::ops::SubAssign<isize> for $ptr<T> {
            fn sub_assign(&mut self, n: isize) {
                *self = *self - n;
            }
        }

        impl<T> std::ops::Sub for $ptr<T> {
            type Output = isize;

            fn sub(self, origin: Self) -> isize {
                self.distance(&origin)
            }
        }

        impl<T> PartialEq for $ptr<T> {
            fn eq(&self, other: &Self) -> bool {
                self.addr() == other.addr()
            }
        }

        impl<T> Eq for $ptr<T> {}

        impl<T> PartialOrd for $ptr<T> {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl<T> Ord for $ptr<T> {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.addr().cmp(&other.addr())
            }
        }

        impl<T> std::hash::Hash for $ptr<T> {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.addr().hash(state);
            }
        }

        impl<T> Clone for $ptr<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $ptr<T> {}

        impl<T> Default for $ptr<T> {
            fn default() -> Self {
                Self::null()
            }
        }
    };
}

pub(crate) use impl_ptr_arith;

#[cfg(test)]
mod tests {
    use super::*;

    /// Arithmetic must agree between the two handle types.
    fn walk<P: ElemPtr<u32>>(mut p: P) -> Vec<u32> {
        let mut out = Vec::new();
        // SAFETY: callers pass handles over four live `u32`s; every index
        // below stays inside them.
        unsafe {
            for i in 0..4 {
                p.write(i, (i as u32 + 1) * 10);
            }
            let start = p;
            p.inc();
            p = p.offset(2);
            out.push(p.read(0));
            out.push(p.read(-3));
            p.dec();
            out.push(p.read(0));
            out.push(p.distance(&start) as u32);
        }
        out
    }

    #[test]
    fn checked_and_raw_share_arithmetic() {
        let mut a = [0u32; 4];
        let mut b = [0u32; 4];
        // SAFETY: both arrays outlive the handles.
        let (checked, raw) = unsafe {
            (
                CheckedPtr::from_raw_parts(a.as_mut_ptr(), 4),
                RawPtr::from_raw_parts(b.as_mut_ptr(), 4),
            )
        };
        let expected = vec![40, 10, 30, 2];
        assert_eq!(walk(checked), expected);
        assert_eq!(walk(raw), expected);
        assert_eq!(a, b);
    }

    #[test]
    fn null_handles_are_default() {
        assert!(CheckedPtr::<f64>::default().is_null());
        assert!(RawPtr::<f64>::default().is_null());
        assert!(Ptr::<u8>::null().is_null());
        assert!(ConstPtr::<u8>::default().is_null());
    }

    #[test]
    fn null_handles_support_arithmetic_without_access() {
        // Moving and comparing a handle never touches the pointee.
        let raw = RawPtr::<u64>::null();
        let moved = raw + 4;
        assert_eq!(moved - raw, 4);
        assert!(moved > raw);
        assert_eq!(moved - 4, raw);
    }

    #[test]
    fn operators_follow_elements() {
        let mut buf = [0u64; 8];
        // SAFETY: `buf` outlives the handle.
        let p = unsafe { from_raw_parts(buf.as_mut_ptr(), 8) };
        let mut q = p + 5;
        assert_eq!(q - p, 5);
        q -= 2;
        assert_eq!(q - p, 3);
        q += 1;
        assert!(q > p);
        assert_eq!((q - 4), p);
        assert_eq!(q.as_ptr() as usize - p.as_ptr() as usize, 4 * 8);
    }
}
