use std::fmt;
use std::num::NonZero;

use crate::pool::DEFAULT_REFILL_OBJECTS;
use crate::{MallocAllocator, OomHandler, PoolAllocator, RawHeap, SystemHeap};

/// Builder for creating an instance of [`PoolAllocator`].
///
/// Every setting is optional. A pool built without calling any setter is identical to
/// [`PoolAllocator::new()`].
///
/// # Examples
///
/// Smaller refill batches:
///
/// ```
/// use new_zealand::nz;
/// use tiered_alloc::PoolAllocator;
///
/// let pool = PoolAllocator::builder().refill_objects(nz!(4)).build();
/// ```
///
/// An out-of-memory handler that gives up a memory reserve before the allocator retries, and
/// stops the retry loop by panicking once there is nothing left to give up:
///
/// ```
/// use std::alloc::Layout;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use tiered_alloc::PoolAllocator;
///
/// let reserve = Rc::new(RefCell::new(Some(vec![0_u8; 1 << 20])));
///
/// let mut pool = PoolAllocator::builder()
///     .oom_handler({
///         let reserve = Rc::clone(&reserve);
///         move || {
///             let released = reserve.borrow_mut().take();
///             assert!(released.is_some(), "no memory reserve left to release");
///         }
///     })
///     .build();
///
/// let layout = Layout::new::<u64>();
/// let block = pool.allocate(layout);
///
/// // SAFETY: The block came from this pool with this layout.
/// unsafe { pool.deallocate(block, layout) };
/// ```
///
/// # Thread safety
///
/// The out-of-memory handler is not required to be thread-safe, so neither is the builder:
/// it is neither [`Send`] nor [`Sync`].
#[must_use]
pub struct PoolAllocatorBuilder<H: RawHeap = SystemHeap> {
    heap: H,
    oom_handler: Option<OomHandler>,
    refill_objects: NonZero<usize>,
}

impl PoolAllocatorBuilder<SystemHeap> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            heap: SystemHeap,
            oom_handler: None,
            refill_objects: DEFAULT_REFILL_OBJECTS,
        }
    }
}

impl<H: RawHeap> PoolAllocatorBuilder<H> {
    /// Sets how many blocks a refill tries to carve at once when a free list runs dry.
    ///
    /// Defaults to 20. The slab obtained when the arena is empty is twice the batch size plus
    /// a sixteenth of all memory obtained so far, so larger batches also mean larger slabs.
    #[inline]
    pub fn refill_objects(mut self, count: NonZero<usize>) -> Self {
        self.refill_objects = count;
        self
    }

    /// Sets the out-of-memory handler that runs before every retry of a failed heap request.
    ///
    /// By default there is none and exhaustion is reported immediately.
    #[inline]
    pub fn oom_handler(mut self, handler: impl FnMut() + 'static) -> Self {
        self.oom_handler = Some(Box::new(handler));
        self
    }

    /// Sets the heap that the pool obtains its slabs and large blocks from.
    ///
    /// Defaults to [`SystemHeap`].
    #[inline]
    pub fn heap<H2: RawHeap>(self, heap: H2) -> PoolAllocatorBuilder<H2> {
        PoolAllocatorBuilder {
            heap,
            oom_handler: self.oom_handler,
            refill_objects: self.refill_objects,
        }
    }

    /// Builds the pool with the specified configuration.
    ///
    /// No memory is obtained until the first allocation.
    #[must_use]
    #[inline]
    pub fn build(self) -> PoolAllocator<H> {
        let mut primitive = MallocAllocator::with_heap(self.heap);
        primitive.set_oom_handler(self.oom_handler);

        PoolAllocator::from_parts(primitive, self.refill_objects)
    }
}

impl<H: RawHeap + fmt::Debug> fmt::Debug for PoolAllocatorBuilder<H> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocatorBuilder")
            .field("heap", &self.heap)
            .field("oom_handler", &self.oom_handler.is_some())
            .field("refill_objects", &self.refill_objects)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::alloc::Layout;

    use new_zealand::nz;
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::BudgetHeap;

    assert_not_impl_any!(PoolAllocatorBuilder: Send, Sync);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = PoolAllocatorBuilder::new();
        assert!(builder.oom_handler.is_none());
        assert_eq!(builder.refill_objects, DEFAULT_REFILL_OBJECTS);
    }

    #[test]
    fn refill_objects_sets_count() {
        let builder = PoolAllocatorBuilder::new().refill_objects(nz!(3));
        assert_eq!(builder.refill_objects, nz!(3));
    }

    #[test]
    fn heap_keeps_other_settings() {
        let builder = PoolAllocatorBuilder::new()
            .refill_objects(nz!(7))
            .oom_handler(|| {})
            .heap(BudgetHeap::new(100));

        assert_eq!(builder.refill_objects, nz!(7));
        assert!(builder.oom_handler.is_some());
        assert_eq!(builder.heap.remaining(), 100);
    }

    #[test]
    fn build_installs_handler() {
        let pool = PoolAllocatorBuilder::new().oom_handler(|| {}).build();
        assert!(pool.primitive().has_oom_handler());

        let pool = PoolAllocatorBuilder::new().build();
        assert!(!pool.primitive().has_oom_handler());
    }

    #[test]
    fn build_uses_configured_heap() {
        let heap = BudgetHeap::new(1000);
        let mut pool = PoolAllocatorBuilder::new().heap(heap.clone()).build();

        let layout = Layout::new::<u64>();
        let block = pool.allocate(layout);
        assert_eq!(heap.remaining(), 1000 - 320);

        // SAFETY: The block came from this pool with this layout.
        unsafe { pool.deallocate(block, layout) };
    }
}
