use std::alloc::Layout;
use std::cell::RefCell;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use crate::{OomHandler, PoolAllocator, RawAlloc};

thread_local! {
    // Never dropped: blocks handed out on this thread may outlive the thread (a container
    // moved elsewhere still holds them) and must stay valid for as long as the process runs.
    static DEFAULT_POOL: RefCell<ManuallyDrop<PoolAllocator>> =
        const { RefCell::new(ManuallyDrop::new(PoolAllocator::new())) };
}

/// A handle to the process-default pool.
///
/// Each thread has its own default pool, created on first use and never torn down. A block may
/// be released on a different thread than the one that allocated it; it then joins the
/// releasing thread's free lists. Memory obtained by the default pools is retained until the
/// process exits.
///
/// This is the allocator containers use unless told otherwise.
///
/// # Example
///
/// ```rust
/// use tiered_alloc::{Allocator, DefaultAlloc};
///
/// let alloc = Allocator::<u64, DefaultAlloc>::new();
///
/// let ptr = alloc.allocate(4);
///
/// // SAFETY: The block came from this allocator for four elements.
/// unsafe { alloc.deallocate(ptr, 4) };
/// ```
///
/// # Reentrancy
///
/// The thread's pool is borrowed for the duration of every operation. An out-of-memory
/// handler that allocates through [`DefaultAlloc`] or [`MallocAlloc`] on the same thread
/// panics.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "stateless handle")]
pub struct DefaultAlloc;

// SAFETY: Forwards to the thread's pool, which upholds the contract. Pools are never dropped,
// so blocks stay valid on every thread.
unsafe impl RawAlloc for DefaultAlloc {
    #[inline]
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        DEFAULT_POOL.with_borrow_mut(|pool| pool.allocate(layout))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        DEFAULT_POOL.with_borrow_mut(|pool| {
            // SAFETY: Forwarding safety requirements to the caller. The block may come from
            // another thread's pool; all default pools live forever and pooled blocks of one
            // size class are interchangeable.
            unsafe { pool.deallocate(ptr, layout) }
        });
    }
}

/// A handle to the primitive tier of the process-default pool.
///
/// Every request goes straight to the heap, with the thread's out-of-memory handler applied.
/// Use this for containers whose blocks are too large to benefit from pooling.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "stateless handle")]
pub struct MallocAlloc;

// SAFETY: Forwards to the primitive tier, which upholds the contract.
unsafe impl RawAlloc for MallocAlloc {
    #[inline]
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        DEFAULT_POOL.with_borrow_mut(|pool| pool.primitive_mut().allocate(layout))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        DEFAULT_POOL.with_borrow_mut(|pool| {
            // SAFETY: Forwarding safety requirements to the caller.
            unsafe { pool.primitive_mut().deallocate(ptr, layout) }
        });
    }
}

/// Installs an out-of-memory handler for the current thread's default pool (or removes it,
/// given `None`) and returns the handler that was installed before.
///
/// The handler applies to both [`DefaultAlloc`] and [`MallocAlloc`] on this thread. It runs
/// before every retry of a failed heap request and must not allocate through either of them.
///
/// # Example
///
/// ```rust
/// use tiered_alloc::set_oom_handler;
///
/// let previous = set_oom_handler(Some(Box::new(|| {
///     // Release caches here.
/// })));
/// assert!(previous.is_none());
///
/// // Restore whatever was there before.
/// let ours = set_oom_handler(previous);
/// assert!(ours.is_some());
/// ```
pub fn set_oom_handler(handler: Option<OomHandler>) -> Option<OomHandler> {
    DEFAULT_POOL.with_borrow_mut(|pool| pool.set_oom_handler(handler))
}

/// Calls `f` with read access to the current thread's default pool, for diagnostics.
///
/// # Panics
///
/// Panics if called from within an operation on the default pool, such as from its
/// out-of-memory handler.
pub fn with_default_pool<R>(f: impl FnOnce(&PoolAllocator) -> R) -> R {
    DEFAULT_POOL.with_borrow(|pool| f(pool))
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(DefaultAlloc: Send, Sync, Copy, Default);
    assert_impl_all!(MallocAlloc: Send, Sync, Copy, Default);

    // Every check runs on a thread of its own so that it sees an untouched default pool.
    fn on_fresh_thread(f: impl FnOnce() + Send + 'static) {
        thread::spawn(f).join().unwrap();
    }

    struct SendPtr(NonNull<u8>);

    // SAFETY: Only used to hand a block to another thread in tests.
    unsafe impl Send for SendPtr {}

    #[test]
    fn default_pool_serves_small_blocks() {
        on_fresh_thread(|| {
            let layout = Layout::from_size_align(40, 8).unwrap();

            let block = DefaultAlloc.allocate(layout);
            assert_eq!(with_default_pool(|pool| pool.free_list_len(40)), 19);

            unsafe { DefaultAlloc.deallocate(block, layout) };
            assert_eq!(with_default_pool(|pool| pool.free_list_len(40)), 20);
        });
    }

    #[test]
    fn malloc_alloc_bypasses_free_lists() {
        on_fresh_thread(|| {
            let layout = Layout::from_size_align(40, 8).unwrap();

            let block = MallocAlloc.allocate(layout);
            assert_eq!(with_default_pool(|pool| pool.free_list_len(40)), 0);
            assert_eq!(with_default_pool(PoolAllocator::heap_size), 0);

            unsafe { MallocAlloc.deallocate(block, layout) };
        });
    }

    #[test]
    fn set_oom_handler_swaps_thread_handler() {
        on_fresh_thread(|| {
            assert!(set_oom_handler(Some(Box::new(|| {}))).is_none());
            assert!(with_default_pool(|pool| pool.primitive().has_oom_handler()));

            let previous = set_oom_handler(None);
            assert!(previous.is_some());
            assert!(!with_default_pool(|pool| pool.primitive().has_oom_handler()));
        });
    }

    #[test]
    fn handler_is_per_thread() {
        on_fresh_thread(|| {
            set_oom_handler(Some(Box::new(|| {})));

            let other_has_handler =
                thread::spawn(|| with_default_pool(|pool| pool.primitive().has_oom_handler()))
                    .join()
                    .unwrap();

            assert!(!other_has_handler);
            assert!(with_default_pool(|pool| pool.primitive().has_oom_handler()));
        });
    }

    #[test]
    fn block_may_be_released_on_another_thread() {
        let layout = Layout::from_size_align(56, 8).unwrap();

        let block = SendPtr(DefaultAlloc.allocate(layout));

        on_fresh_thread(move || {
            let block = block;
            unsafe { DefaultAlloc.deallocate(block.0, layout) };

            assert_eq!(with_default_pool(|pool| pool.free_list_len(56)), 1);
        });
    }
}
