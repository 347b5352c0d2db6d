use std::alloc::Layout;
use std::any;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::{DefaultAlloc, Error, RawAlloc, Result};

/// Memory requests of at most this many bytes are considered one "page" by
/// [`Allocator::init_page_size()`].
const PAGE_BYTES: usize = 4096;

/// Typed allocation on top of a byte-level [`RawAlloc`].
///
/// Converts element counts to byte sizes, so containers can ask for "`n` values of `T`"
/// instead of computing layouts themselves. Memory is handed out uninitialized; constructing
/// and destroying values is the job of [`construct()`][crate::construct] and
/// [`destroy()`][crate::destroy].
///
/// The allocator is a thin wrapper over its handle and holds no state of its own.
///
/// # Example
///
/// ```rust
/// use tiered_alloc::{Allocator, construct, destroy};
///
/// let alloc = Allocator::<String>::new();
///
/// let slot = alloc.allocate_one();
///
/// // SAFETY: The slot is freshly allocated, so writing to it is valid, and we destroy the
/// // value before releasing the slot.
/// unsafe {
///     construct(slot, String::from("hello"));
///     assert_eq!(slot.as_ref(), "hello");
///     destroy(slot);
///     alloc.deallocate_one(slot);
/// }
/// ```
pub struct Allocator<T, A: RawAlloc = DefaultAlloc> {
    raw: A,

    _element: PhantomData<fn() -> T>,
}

impl<T> Allocator<T, DefaultAlloc> {
    /// Creates a typed allocator over the process-default pool.
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self::with_raw(DefaultAlloc)
    }
}

impl<T, A: RawAlloc> Allocator<T, A> {
    /// Creates a typed allocator over a byte-level allocator handle.
    #[must_use]
    #[inline]
    pub const fn with_raw(raw: A) -> Self {
        Self {
            raw,
            _element: PhantomData,
        }
    }

    /// The byte-level allocator handle.
    #[must_use]
    #[inline]
    pub fn raw(&self) -> &A {
        &self.raw
    }

    /// Consumes the typed allocator and returns its handle.
    #[must_use]
    #[inline]
    pub fn into_raw(self) -> A {
        self.raw
    }

    /// Converts this into an allocator of a different element type that shares the same
    /// handle.
    #[must_use]
    #[inline]
    pub fn rebind<U>(self) -> Allocator<U, A> {
        Allocator::with_raw(self.raw)
    }

    /// Allocates uninitialized storage for one value.
    #[must_use]
    #[inline]
    pub fn allocate_one(&self) -> NonNull<T> {
        self.allocate(1)
    }

    /// Allocates uninitialized storage for `n` values.
    ///
    /// Zero values (or a zero-sized `T`) yield a dangling pointer without touching the
    /// underlying allocator.
    ///
    /// # Panics
    ///
    /// Panics if the total size overflows `isize::MAX` bytes.
    #[must_use]
    pub fn allocate(&self, n: usize) -> NonNull<T> {
        match self.try_allocate(n) {
            Ok(ptr) => ptr,
            Err(e) => panic!("{e}"),
        }
    }

    /// Allocates uninitialized storage for `n` values, reporting a size overflow instead of
    /// panicking.
    ///
    /// Out-of-memory is still fatal, as with every [`RawAlloc`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityOverflow`] if the total size overflows `isize::MAX` bytes.
    pub fn try_allocate(&self, n: usize) -> Result<NonNull<T>> {
        if n == 0 || size_of::<T>() == 0 {
            return Ok(NonNull::dangling());
        }

        let Ok(layout) = Layout::array::<T>(n) else {
            return Err(Error::CapacityOverflow {
                count: n,
                element_size: size_of::<T>(),
            });
        };

        Ok(self.raw.allocate(layout).cast())
    }

    /// Releases storage for one value.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate_one()` (or `allocate(1)`) on an allocator
    /// sharing this handle and not yet released. Any value stored there must already have been
    /// destroyed or moved out.
    #[inline]
    pub unsafe fn deallocate_one(&self, ptr: NonNull<T>) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.deallocate(ptr, 1) }
    }

    /// Releases storage for `n` values.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate(n)` with the same `n` on an allocator sharing
    /// this handle and not yet released. Any values stored there must already have been
    /// destroyed or moved out.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        if n == 0 || size_of::<T>() == 0 {
            return;
        }

        let layout =
            Layout::array::<T>(n).expect("layout was valid when the storage was allocated");

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.raw.deallocate(ptr.cast(), layout) }
    }

    /// The largest number of values a single request could ask for.
    #[must_use]
    #[inline]
    #[allow(clippy::integer_division, reason = "we want whole elements only")]
    pub fn max_size(&self) -> usize {
        // Cannot divide by zero because zero-sized types are handled first.
        match size_of::<T>() {
            0 => usize::MAX,
            size => (isize::MAX.unsigned_abs() / size).max(1),
        }
    }

    /// The number of values that fit in one 4 KiB page, but at least one.
    ///
    /// Containers that grow in blocks use this as a starting block size.
    #[must_use]
    #[inline]
    pub fn init_page_size(&self) -> usize {
        #[allow(clippy::integer_division, reason = "we want whole elements only")]
        let count = PAGE_BYTES / size_of::<T>().max(1);

        count.max(1)
    }
}

impl<T> Default for Allocator<T, DefaultAlloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: RawAlloc + Clone> Clone for Allocator<T, A> {
    #[inline]
    fn clone(&self) -> Self {
        Self::with_raw(self.raw.clone())
    }
}

impl<T, A: RawAlloc + Copy> Copy for Allocator<T, A> {}

impl<T, A: RawAlloc + fmt::Debug> fmt::Debug for Allocator<T, A> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("element", &any::type_name::<T>())
            .field("raw", &self.raw)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::{MallocAlloc, PoolHandle};

    assert_impl_all!(Allocator<Cell<u8>>: Send, Sync, Copy);
    assert_impl_all!(Allocator<String, PoolHandle>: Clone);

    #[test]
    fn allocates_through_handle() {
        let handle = PoolHandle::default();
        let alloc = Allocator::<u64, _>::with_raw(handle.clone());

        let ptr = alloc.allocate(3);
        assert_eq!(ptr.as_ptr().addr() % align_of::<u64>(), 0);
        assert_eq!(handle.with_pool(|pool| pool.free_list_len(24)), 19);

        unsafe {
            for i in 0..3 {
                ptr.add(i).write(i as u64);
            }
            assert_eq!(ptr.add(2).read(), 2);

            alloc.deallocate(ptr, 3);
        }

        assert_eq!(handle.with_pool(|pool| pool.free_list_len(24)), 20);
    }

    #[test]
    fn zero_elements_do_not_touch_allocator() {
        let handle = PoolHandle::default();
        let alloc = Allocator::<u32, _>::with_raw(handle.clone());

        let ptr = alloc.allocate(0);
        assert_eq!(ptr, NonNull::dangling());
        unsafe { alloc.deallocate(ptr, 0) };

        let units = Allocator::<(), _>::with_raw(handle.clone());
        let ptr = units.allocate(1000);
        unsafe { units.deallocate(ptr, 1000) };

        assert_eq!(handle.with_pool(|pool| pool.heap_size()), 0);
    }

    #[test]
    fn overflow_is_reported() {
        let alloc = Allocator::<u64>::new();

        assert!(matches!(
            alloc.try_allocate(usize::MAX / 4),
            Err(Error::CapacityOverflow {
                element_size: 8,
                ..
            })
        ));
    }

    #[test]
    #[should_panic]
    fn overflow_panics_in_infallible_path() {
        let alloc = Allocator::<u64>::new();
        let _ptr = alloc.allocate(usize::MAX / 4);
    }

    #[test]
    fn single_value_round_trip() {
        let alloc = Allocator::<[u8; 100], MallocAlloc>::with_raw(MallocAlloc);

        let ptr = alloc.allocate_one();
        unsafe {
            ptr.write([7; 100]);
            assert_eq!(ptr.as_ref()[99], 7);
            alloc.deallocate_one(ptr);
        }
    }

    #[test]
    fn sizes() {
        assert_eq!(Allocator::<u8>::new().init_page_size(), 4096);
        assert_eq!(Allocator::<u64>::new().init_page_size(), 512);
        assert_eq!(Allocator::<[u8; 5000]>::new().init_page_size(), 1);
        assert_eq!(Allocator::<()>::new().init_page_size(), 4096);

        assert_eq!(
            Allocator::<u64>::new().max_size(),
            isize::MAX.unsigned_abs() / 8
        );
        assert_eq!(Allocator::<()>::new().max_size(), usize::MAX);
    }

    #[test]
    fn rebind_shares_handle() {
        let handle = PoolHandle::default();
        let bytes = Allocator::<u8, _>::with_raw(handle.clone());
        let words = bytes.rebind::<u64>();

        assert!(words.raw().same_pool(&handle));
    }
}
