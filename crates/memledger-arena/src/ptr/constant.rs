//! Read-only handle.

use std::fmt;

use super::{impl_ptr_arith, ElemPtr, Ptr};

/// Read-only view of the active [`Ptr`].
///
/// Same arithmetic and validation as the handle it wraps; access yields
/// `*const T` and shared references only. Built from any [`Ptr`] with
/// [`From`], or over caller-owned read-only memory with
/// [`ConstPtr::from_raw_parts`].
#[repr(transparent)]
pub struct ConstPtr<T> {
    inner: Ptr<T>,
}

impl<T> ConstPtr<T> {
    /// The null handle.
    pub fn null() -> Self {
        Self { inner: Ptr::null() }
    }

    /// Read-only handle over `len` elements of caller-owned memory at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` elements for as long as the
    /// handle or any copy of it is dereferenced.
    pub unsafe fn from_raw_parts(ptr: *const T, len: usize) -> Self {
        Self {
            // SAFETY: forwarded; nothing writes through the wrapped handle.
            inner: unsafe { <Ptr<T> as ElemPtr<T>>::from_raw_parts(ptr.cast_mut(), len) },
        }
    }

    fn addr(&self) -> usize {
        self.inner.as_ptr() as usize
    }

    /// Whether this is the null handle.
    pub fn is_null(&self) -> bool {
        self.inner.is_null()
    }

    /// Current address. Never validated.
    pub fn as_ptr(&self) -> *const T {
        self.inner.as_ptr().cast_const()
    }

    /// Address of element `i`, validated as by [`ElemPtr::elem_ptr`].
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::elem_ptr`].
    #[track_caller]
    pub unsafe fn elem_ptr(&self, i: isize) -> *const T {
        // SAFETY: forwarded.
        unsafe { self.inner.elem_ptr(i).cast_const() }
    }

    /// Address of the current position after validating the next `n`
    /// elements.
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::span_ptr`].
    #[track_caller]
    pub unsafe fn span_ptr(&self, n: usize) -> *const T {
        // SAFETY: forwarded.
        unsafe { self.inner.span_ptr(n).cast_const() }
    }

    /// Handle advanced by `n` elements.
    pub fn offset(self, n: isize) -> Self {
        Self {
            inner: self.inner.offset(n),
        }
    }

    /// Element distance from `origin` to `self`.
    #[track_caller]
    pub fn distance(&self, origin: &Self) -> isize {
        self.inner.distance(&origin.inner)
    }

    /// Copy element `i` out.
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::read`].
    #[track_caller]
    pub unsafe fn read(&self, i: isize) -> T
    where
        T: Copy,
    {
        // SAFETY: forwarded.
        unsafe { self.inner.read(i) }
    }

    /// Shared reference to element `i`.
    ///
    /// # Safety
    ///
    /// As [`ElemPtr::get`].
    #[track_caller]
    pub unsafe fn get<'a>(&self, i: isize) -> &'a T {
        // SAFETY: forwarded.
        unsafe { self.inner.get(i) }
    }

    /// Advance by one element.
    pub fn inc(&mut self) {
        self.inner.inc();
    }

    /// Step back by one element.
    pub fn dec(&mut self) {
        self.inner.dec();
    }
}

impl<T> From<Ptr<T>> for ConstPtr<T> {
    fn from(inner: Ptr<T>) -> Self {
        Self { inner }
    }
}

impl_ptr_arith!(ConstPtr);

impl<T> fmt::Debug for ConstPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConstPtr").field(&self.inner).finish()
    }
}

impl<T> fmt::Display for ConstPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}
