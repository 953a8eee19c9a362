//! Inline fixed-capacity array with a handle view.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use memledger_arena::ptr::{self, ConstPtr, ElemPtr, Ptr};
use memledger_core::AccessError;

/// `N` elements stored inline.
///
/// Cloning clones every element. Indexing is validated through the
/// array's handle view in checked builds and by slice bounds otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StaticArray<T, const N: usize> {
    data: [T; N],
}

impl<T: Default, const N: usize> StaticArray<T, N> {
    /// Array of `N` default values.
    pub fn new() -> Self {
        Self {
            data: std::array::from_fn(|_| T::default()),
        }
    }

    /// Array holding `values` followed by default values.
    ///
    /// # Panics
    ///
    /// Panics if `values` holds more than `N` elements.
    #[track_caller]
    pub fn from_slice(values: &[T]) -> Self
    where
        T: Clone,
    {
        assert!(
            values.len() <= N,
            "[memledger] too many initializer values: {} for capacity {N}",
            values.len()
        );
        Self {
            data: std::array::from_fn(|i| values.get(i).cloned().unwrap_or_default()),
        }
    }
}

impl<T, const N: usize> StaticArray<T, N> {
    /// Capacity, always `N`.
    pub const fn len(&self) -> usize {
        N
    }

    /// Whether `N == 0`.
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Handle view over the `N` elements, borrowing the array.
    pub fn view(&mut self) -> StaticArrayView<'_, T> {
        StaticArrayView {
            // SAFETY: the pointer covers exactly the `N` inline elements,
            // which the view borrows mutably.
            ptr: unsafe { ptr::from_raw_parts(self.data.as_mut_ptr(), N) },
            len: N,
            _borrow: PhantomData,
        }
    }

    /// Elements as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Elements as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// The inline array.
    pub fn into_inner(self) -> [T; N] {
        self.data
    }

    #[track_caller]
    fn validate(&self, i: usize) -> usize {
        // SAFETY: covers exactly the `N` inline elements, borrowed for the
        // duration of the check.
        unsafe {
            let view = ConstPtr::from_raw_parts(self.data.as_ptr(), N);
            view.elem_ptr(isize::try_from(i).unwrap_or(isize::MAX));
        }
        i
    }
}

/// Mutable handle view over a [`StaticArray`], valid while the array is
/// borrowed.
///
/// `read` and `write` are bounds-checked in every build. [`handle`] gives
/// the underlying [`Ptr`] for pointer-style code; dereferencing it is
/// `unsafe` and only sound while the view is alive.
///
/// [`handle`]: StaticArrayView::handle
#[derive(Debug)]
pub struct StaticArrayView<'a, T> {
    ptr: Ptr<T>,
    len: usize,
    _borrow: PhantomData<&'a mut [T]>,
}

impl<T> StaticArrayView<'_, T> {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Handle at element 0.
    pub fn handle(&self) -> Ptr<T> {
        self.ptr
    }

    #[track_caller]
    fn slot(&self, i: usize) -> *mut T {
        if i >= self.len {
            panic!(
                "[memledger] {}",
                AccessError::OutOfBounds {
                    index: isize::try_from(i).unwrap_or(isize::MAX),
                    len: self.len,
                }
            );
        }
        // SAFETY: the view borrows the array, so the storage is live, and
        // `i` is in range.
        unsafe { self.ptr.elem_ptr(i as isize) }
    }

    /// Copy element `i` out.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len`.
    #[track_caller]
    pub fn read(&self, i: usize) -> T
    where
        T: Copy,
    {
        // SAFETY: `slot` checked bounds; elements are always initialised.
        unsafe { self.slot(i).read() }
    }

    /// Overwrite element `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len`.
    #[track_caller]
    pub fn write(&mut self, i: usize, value: T) {
        let slot = self.slot(i);
        // SAFETY: in range and initialised; the old value is dropped once.
        unsafe { *slot = value };
    }
}

impl<T: Default, const N: usize> Default for StaticArray<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> From<[T; N]> for StaticArray<T, N> {
    fn from(data: [T; N]) -> Self {
        Self { data }
    }
}

impl<T, const N: usize> Index<usize> for StaticArray<T, N> {
    type Output = T;

    #[track_caller]
    fn index(&self, i: usize) -> &T {
        &self.data[self.validate(i)]
    }
}

impl<T, const N: usize> IndexMut<usize> for StaticArray<T, N> {
    #[track_caller]
    fn index_mut(&mut self, i: usize) -> &mut T {
        let i = self.validate(i);
        &mut self.data[i]
    }
}
