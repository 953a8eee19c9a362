//! Bare-address handle for unchecked builds.

use std::fmt;
use std::marker::PhantomData;

use memledger_core::Generation;

use super::{impl_ptr_arith, ElemPtr, Pod};

/// Pointer-equivalent handle with no validation.
///
/// Same API and arithmetic as [`CheckedPtr`](super::CheckedPtr); indexing
/// compiles to plain pointer offsetting, so every access carries the full
/// raw-pointer contract.
#[repr(transparent)]
pub struct RawPtr<T> {
    ptr: *mut T,
    _marker: PhantomData<*mut T>,
}

impl<T> RawPtr<T> {
    fn addr(&self) -> usize {
        self.ptr as usize
    }

    /// Reinterpret as a handle over `U`.
    pub fn cast<U: Pod>(self) -> RawPtr<U>
    where
        T: Pod,
    {
        RawPtr {
            ptr: self.ptr.cast(),
            _marker: PhantomData,
        }
    }

    /// [`RawPtr::cast`] without the plain-data bound.
    ///
    /// # Safety
    ///
    /// Bytes read through the new handle must be valid values of `U`.
    pub unsafe fn cast_raw<U>(self) -> RawPtr<U> {
        RawPtr {
            ptr: self.ptr.cast(),
            _marker: PhantomData,
        }
    }
}

impl<T> ElemPtr<T> for RawPtr<T> {
    fn null() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    unsafe fn from_raw_parts(ptr: *mut T, _len: usize) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    unsafe fn from_allocation(ptr: *mut T, _len: usize, _generation: Generation, _track: bool) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    fn alloc_generation(&self) -> Option<Generation> {
        None
    }

    fn as_ptr(&self) -> *mut T {
        self.ptr
    }

    #[inline]
    unsafe fn elem_ptr(&self, i: isize) -> *mut T {
        self.ptr.wrapping_offset(i)
    }

    #[inline]
    unsafe fn span_ptr(&self, _n: usize) -> *mut T {
        self.ptr
    }

    #[inline]
    fn offset(self, n: isize) -> Self {
        Self {
            ptr: self.ptr.wrapping_offset(n),
            _marker: PhantomData,
        }
    }

    fn distance(&self, origin: &Self) -> isize {
        let bytes = (self.addr() as isize).wrapping_sub(origin.addr() as isize);
        match std::mem::size_of::<T>() {
            0 => 0,
            size => bytes / size as isize,
        }
    }
}

impl_ptr_arith!(RawPtr);

impl<T> fmt::Debug for RawPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawPtr").field(&self.ptr).finish()
    }
}

impl<T> fmt::Display for RawPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#x})", self.addr())
    }
}
