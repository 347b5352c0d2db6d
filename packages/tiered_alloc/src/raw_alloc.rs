use std::alloc::Layout;
use std::cell::RefCell;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::{PoolAllocator, RawHeap, SystemHeap};

/// The byte-level allocator interface that containers are generic over.
///
/// Implementations hand out uninitialized memory and take it back; they never construct or
/// destroy values. Out-of-memory is fatal at this level: `allocate()` either succeeds or does
/// not return.
///
/// Handles are cheap to clone or copy and share the allocator they point to.
///
/// # Safety
///
/// `allocate()` must return memory valid for reads and writes of `layout.size()` bytes,
/// aligned to `layout.align()`, that is not handed out again until it is passed to
/// `deallocate()`. Zero-sized requests must return a non-null pointer aligned to
/// `layout.align()`.
pub unsafe trait RawAlloc {
    /// Allocates an uninitialized block.
    fn allocate(&self, layout: Layout) -> NonNull<u8>;

    /// Releases a block.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate()` on this handle (or a handle sharing the
    /// same allocator) for the same `layout` and not yet released.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

// SAFETY: Forwards to the referenced allocator, which upholds the contract.
unsafe impl<A: RawAlloc + ?Sized> RawAlloc for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

/// A shared handle to an explicitly created [`PoolAllocator`].
///
/// Use this instead of [`DefaultAlloc`][crate::DefaultAlloc] when a container needs a pool with
/// its own configuration or heap, or when tests need to observe the pool's state. All clones
/// of a handle share one pool, which lives until the last clone is dropped.
///
/// # Example
///
/// ```rust
/// use std::alloc::Layout;
///
/// use tiered_alloc::{PoolAllocator, PoolHandle, RawAlloc};
///
/// let handle = PoolHandle::new(PoolAllocator::new());
/// let layout = Layout::new::<[u32; 4]>();
///
/// let block = handle.allocate(layout);
/// assert_eq!(handle.with_pool(|pool| pool.free_list_len(16)), 19);
///
/// // SAFETY: The block came from this pool with this layout.
/// unsafe { handle.deallocate(block, layout) };
/// ```
///
/// # Reentrancy
///
/// The pool is borrowed for the duration of every operation. An out-of-memory handler that
/// allocates through a handle to the same pool panics.
///
/// # Thread safety
///
/// The handle is single-threaded: neither [`Send`] nor [`Sync`].
pub struct PoolHandle<H: RawHeap = SystemHeap> {
    pool: Rc<RefCell<PoolAllocator<H>>>,
}

impl<H: RawHeap> PoolHandle<H> {
    /// Wraps a pool in a shareable handle.
    #[must_use]
    #[inline]
    pub fn new(pool: PoolAllocator<H>) -> Self {
        Self {
            pool: Rc::new(RefCell::new(pool)),
        }
    }

    /// Calls `f` with exclusive access to the shared pool.
    ///
    /// # Panics
    ///
    /// Panics if called from within an operation on the same pool, such as from its
    /// out-of-memory handler.
    #[inline]
    pub fn with_pool<R>(&self, f: impl FnOnce(&mut PoolAllocator<H>) -> R) -> R {
        f(&mut self.pool.borrow_mut())
    }

    /// Whether two handles share the same pool.
    #[must_use]
    #[inline]
    pub fn same_pool(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.pool, &other.pool)
    }
}

impl Default for PoolHandle<SystemHeap> {
    fn default() -> Self {
        Self::new(PoolAllocator::new())
    }
}

impl<H: RawHeap> Clone for PoolHandle<H> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            pool: Rc::clone(&self.pool),
        }
    }
}

impl<H: RawHeap> From<PoolAllocator<H>> for PoolHandle<H> {
    #[inline]
    fn from(pool: PoolAllocator<H>) -> Self {
        Self::new(pool)
    }
}

impl<H: RawHeap + fmt::Debug> fmt::Debug for PoolHandle<H> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("pool", &self.pool)
            .finish()
    }
}

// SAFETY: Forwards to the pool, which upholds the contract. Blocks stay valid while any clone
// of the handle keeps the pool alive.
unsafe impl<H: RawHeap> RawAlloc for PoolHandle<H> {
    #[inline]
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        self.pool.borrow_mut().allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.pool.borrow_mut().deallocate(ptr, layout) }
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(PoolHandle: Clone, fmt::Debug);
    assert_not_impl_any!(PoolHandle: Send, Sync);
    assert_impl_all!(&'static PoolHandle: RawAlloc);

    #[test]
    fn clones_share_pool() {
        let first = PoolHandle::default();
        let second = first.clone();
        let other = PoolHandle::default();

        assert!(first.same_pool(&second));
        assert!(!first.same_pool(&other));

        let layout = Layout::new::<u64>();
        let block = first.allocate(layout);
        assert_eq!(second.with_pool(|pool| pool.free_list_len(8)), 19);
        assert_eq!(other.with_pool(|pool| pool.free_list_len(8)), 0);

        unsafe { second.deallocate(block, layout) };
        assert_eq!(first.with_pool(|pool| pool.free_list_len(8)), 20);
    }

    #[test]
    fn reference_forwards() {
        fn via_trait(alloc: impl RawAlloc, layout: Layout) -> NonNull<u8> {
            alloc.allocate(layout)
        }

        let handle = PoolHandle::default();
        let layout = Layout::new::<u32>();

        let block = via_trait(&handle, layout);
        unsafe { (&handle).deallocate(block, layout) };

        assert_eq!(handle.with_pool(|pool| pool.free_list_len(4)), 20);
    }

    #[test]
    #[should_panic]
    fn allocating_while_pool_is_borrowed_panics() {
        let handle = PoolHandle::default();

        handle.with_pool(|_pool| {
            let _block = handle.allocate(Layout::new::<u8>());
        });
    }
}
