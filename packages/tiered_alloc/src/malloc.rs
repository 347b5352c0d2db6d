use std::alloc::{Layout, handle_alloc_error};
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};

use tracing::{error, warn};

use crate::{Error, RawHeap, Result, SystemHeap};

/// A callback invoked when the heap cannot satisfy a request.
///
/// The handler is expected to release memory (drop caches, shrink buffers) so that the retry
/// that follows can succeed. It is called repeatedly until the request succeeds, so a handler
/// that can never free anything should terminate the process itself instead of returning.
pub type OomHandler = Box<dyn FnMut()>;

/// The primitive allocation tier: a pass-through to the underlying heap with an
/// out-of-memory retry loop.
///
/// Every request goes straight to the heap with no bookkeeping. When the heap fails, the
/// installed [`OomHandler`] is called and the request retried, over and over until it
/// succeeds. With no handler installed, the fallible entry points return
/// [`Error::OutOfMemory`] and the infallible ones log the failure and terminate the process
/// through [`handle_alloc_error`].
///
/// Zero-sized requests never reach the heap; they are answered with a dangling pointer that
/// is aligned to the requested alignment.
///
/// # Example
///
/// ```rust
/// use std::alloc::Layout;
///
/// use tiered_alloc::MallocAllocator;
///
/// let mut primitive = MallocAllocator::new();
/// let layout = Layout::from_size_align(1024, 16).unwrap();
///
/// let block = primitive.allocate(layout);
///
/// // SAFETY: The block came from this allocator with this layout.
/// unsafe { primitive.deallocate(block, layout) };
/// ```
///
/// # Thread safety
///
/// The allocator holds its handler by value and performs no locking. It is single-threaded:
/// neither [`Send`] nor [`Sync`].
pub struct MallocAllocator<H = SystemHeap> {
    heap: H,
    oom_handler: Option<OomHandler>,
}

impl MallocAllocator<SystemHeap> {
    /// Creates a primitive allocator over the process heap with no out-of-memory handler.
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            heap: SystemHeap,
            oom_handler: None,
        }
    }
}

impl Default for MallocAllocator<SystemHeap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: RawHeap> MallocAllocator<H> {
    /// Creates a primitive allocator over a custom heap with no out-of-memory handler.
    #[must_use]
    #[inline]
    pub const fn with_heap(heap: H) -> Self {
        Self {
            heap,
            oom_handler: None,
        }
    }

    /// Installs a new out-of-memory handler (or removes it, given `None`) and returns the
    /// handler that was installed before.
    ///
    /// The handler runs while the allocator is busy serving the failed request, so it must not
    /// allocate from this same allocator.
    #[inline]
    pub fn set_oom_handler(&mut self, handler: Option<OomHandler>) -> Option<OomHandler> {
        mem::replace(&mut self.oom_handler, handler)
    }

    /// Whether an out-of-memory handler is currently installed.
    #[must_use]
    #[inline]
    pub fn has_oom_handler(&self) -> bool {
        self.oom_handler.is_some()
    }

    /// The heap this allocator draws from.
    #[must_use]
    #[inline]
    pub fn heap(&self) -> &H {
        &self.heap
    }

    /// Allocates a block, terminating the process if memory cannot be obtained.
    ///
    /// The returned block is uninitialized.
    #[must_use]
    pub fn allocate(&mut self, layout: Layout) -> NonNull<u8> {
        match self.try_allocate(layout) {
            Ok(ptr) => ptr,
            Err(e) => {
                error!(size = layout.size(), align = layout.align(), %e, "fatal allocation failure");
                handle_alloc_error(layout)
            }
        }
    }

    /// Allocates a block, returning an error if the heap fails and no out-of-memory handler is
    /// installed.
    ///
    /// With a handler installed this only returns once the allocation succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the heap cannot satisfy the request and there is no
    /// handler to free memory.
    #[cfg_attr(test, mutants::skip)] // Mutating the retry loop can make it spin forever.
    pub fn try_allocate(&mut self, layout: Layout) -> Result<NonNull<u8>> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        loop {
            if let Some(ptr) = self.heap.allocate(layout) {
                return Ok(ptr);
            }

            self.run_oom_handler(layout)?;
        }
    }

    /// Releases a block. This is a direct pass-through to the heap.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for the same `layout` and not yet
    /// released.
    #[inline]
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.heap.deallocate(ptr, layout) }
    }

    /// Resizes a block, terminating the process if memory cannot be obtained.
    ///
    /// The contents are preserved up to the smaller of the two sizes. The alignment stays that
    /// of `old_layout`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for `old_layout` and not yet released.
    /// On return, `ptr` is no longer valid and only the returned pointer may be used.
    #[must_use]
    pub unsafe fn reallocate(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> NonNull<u8> {
        // SAFETY: Forwarding safety requirements to the caller.
        match unsafe { self.try_reallocate(ptr, old_layout, new_size) } {
            Ok(new_ptr) => new_ptr,
            Err(e) => {
                error!(size = new_size, align = old_layout.align(), %e, "fatal reallocation failure");

                let Ok(new_layout) = resized(old_layout, new_size) else {
                    panic!("{e}");
                };

                handle_alloc_error(new_layout)
            }
        }
    }

    /// Resizes a block, returning an error if the heap fails and no out-of-memory handler is
    /// installed. On error the original block is still valid and unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the heap cannot satisfy the request and there is no
    /// handler to free memory, or [`Error::CapacityOverflow`] if `new_size` rounded up to the
    /// alignment exceeds `isize::MAX`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for `old_layout` and not yet released.
    /// On success, `ptr` is no longer valid and only the returned pointer may be used.
    #[cfg_attr(test, mutants::skip)] // Mutating the retry loop can make it spin forever.
    pub unsafe fn try_reallocate(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Result<NonNull<u8>> {
        let new_layout = resized(old_layout, new_size)?;

        if old_layout.size() == 0 {
            return self.try_allocate(new_layout);
        }

        if new_size == 0 {
            // SAFETY: Forwarding safety requirements to the caller.
            unsafe { self.deallocate(ptr, old_layout) };
            return Ok(dangling(new_layout));
        }

        loop {
            // SAFETY: Forwarding safety requirements to the caller. A failed attempt leaves the
            // block untouched, so retrying with the same pointer is valid.
            if let Some(new_ptr) = unsafe { self.heap.reallocate(ptr, old_layout, new_size) } {
                return Ok(new_ptr);
            }

            self.run_oom_handler(new_layout)?;
        }
    }

    /// Allocates from the heap exactly once, without consulting the out-of-memory handler.
    ///
    /// The pool uses this to try a cheap request before it starts salvaging its own free lists.
    pub(crate) fn allocate_without_retry(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0);

        self.heap.allocate(layout)
    }

    fn run_oom_handler(&mut self, layout: Layout) -> Result<()> {
        let Some(handler) = self.oom_handler.as_mut() else {
            return Err(Error::OutOfMemory {
                size: layout.size(),
                align: layout.align(),
            });
        };

        warn!(
            size = layout.size(),
            align = layout.align(),
            "heap exhausted, running out-of-memory handler before retrying"
        );

        handler();

        Ok(())
    }
}

impl<H: fmt::Debug> fmt::Debug for MallocAllocator<H> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MallocAllocator")
            .field("heap", &self.heap)
            .field("oom_handler", &self.oom_handler.is_some())
            .finish()
    }
}

/// A non-null pointer aligned to `layout.align()`, for zero-sized requests.
#[must_use]
#[inline]
pub(crate) fn dangling(layout: Layout) -> NonNull<u8> {
    // SAFETY: Alignment is never zero, so the address is never null.
    unsafe { NonNull::new_unchecked(ptr::without_provenance_mut(layout.align())) }
}

/// The layout of a block resized to `new_size`, keeping the alignment of `old_layout`.
pub(crate) fn resized(old_layout: Layout, new_size: usize) -> Result<Layout> {
    Layout::from_size_align(new_size, old_layout.align())
        .ok()
        .ok_or(Error::CapacityOverflow {
            count: new_size,
            element_size: 1,
        })
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::BudgetHeap;

    assert_not_impl_any!(MallocAllocator: Send, Sync);

    #[test]
    fn allocate_and_deallocate() {
        let mut primitive = MallocAllocator::new();
        let layout = Layout::from_size_align(300, 32).unwrap();

        let ptr = primitive.allocate(layout);
        assert_eq!(ptr.as_ptr().addr() % 32, 0);

        unsafe {
            ptr.as_ptr().write_bytes(7, 300);
            primitive.deallocate(ptr, layout);
        }
    }

    #[test]
    fn zero_size_is_dangling_and_aligned() {
        let heap = BudgetHeap::new(0);
        let mut primitive = MallocAllocator::with_heap(heap.clone());
        let layout = Layout::from_size_align(0, 64).unwrap();

        let ptr = primitive.try_allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr().addr(), 64);

        unsafe { primitive.deallocate(ptr, layout) };
        assert_eq!(heap.remaining(), 0);
    }

    #[test]
    fn failure_without_handler_is_reported() {
        let mut primitive = MallocAllocator::with_heap(BudgetHeap::new(10));
        let layout = Layout::from_size_align(11, 1).unwrap();

        let result = primitive.try_allocate(layout);
        assert!(matches!(
            result,
            Err(Error::OutOfMemory { size: 11, align: 1 })
        ));
    }

    #[test]
    fn handler_runs_until_request_succeeds() {
        let heap = BudgetHeap::new(0);
        let calls = Rc::new(Cell::new(0_usize));

        let mut primitive = MallocAllocator::with_heap(heap.clone());

        primitive.set_oom_handler(Some(Box::new({
            let heap = heap.clone();
            let calls = Rc::clone(&calls);
            move || {
                calls.set(calls.get() + 1);
                heap.grant(16);
            }
        })));

        let layout = Layout::from_size_align(64, 8).unwrap();
        let ptr = primitive.try_allocate(layout).unwrap();

        // 16 bytes per handler call, 64 bytes needed.
        assert_eq!(calls.get(), 4);

        unsafe { primitive.deallocate(ptr, layout) };
        assert_eq!(heap.remaining(), 64);
    }

    #[test]
    fn set_oom_handler_returns_previous() {
        let marker = Rc::new(Cell::new(0));
        let mut primitive = MallocAllocator::new();

        assert!(!primitive.has_oom_handler());
        assert!(primitive.set_oom_handler(None).is_none());

        let first = Rc::clone(&marker);
        let previous = primitive.set_oom_handler(Some(Box::new(move || first.set(1))));
        assert!(previous.is_none());
        assert!(primitive.has_oom_handler());

        let second = Rc::clone(&marker);
        let mut previous = primitive
            .set_oom_handler(Some(Box::new(move || second.set(2))))
            .unwrap();

        previous();
        assert_eq!(marker.get(), 1);

        let mut current = primitive.set_oom_handler(None).unwrap();
        current();
        assert_eq!(marker.get(), 2);
        assert!(!primitive.has_oom_handler());
    }

    #[test]
    fn reallocate_preserves_contents() {
        let mut primitive = MallocAllocator::new();
        let layout = Layout::from_size_align(16, 8).unwrap();

        let ptr = primitive.allocate(layout);

        unsafe {
            for i in 0..16_u8 {
                ptr.as_ptr().add(usize::from(i)).write(i);
            }

            let grown = primitive.reallocate(ptr, layout, 4096);

            for i in 0..16_u8 {
                assert_eq!(grown.as_ptr().add(usize::from(i)).read(), i);
            }

            primitive.deallocate(grown, Layout::from_size_align(4096, 8).unwrap());
        }
    }

    #[test]
    fn failed_reallocate_leaves_block_intact() {
        let heap = BudgetHeap::new(32);
        let mut primitive = MallocAllocator::with_heap(heap.clone());
        let layout = Layout::from_size_align(32, 8).unwrap();

        let ptr = primitive.try_allocate(layout).unwrap();

        unsafe {
            ptr.as_ptr().write_bytes(0x5A, 32);

            assert!(primitive.try_reallocate(ptr, layout, 64).is_err());
            assert_eq!(ptr.as_ptr().add(31).read(), 0x5A);

            primitive.deallocate(ptr, layout);
        }

        assert_eq!(heap.remaining(), 32);
    }

    #[test]
    fn oversized_reallocate_reports_capacity_overflow() {
        let mut primitive = MallocAllocator::new();
        let layout = Layout::from_size_align(16, 8).unwrap();

        let ptr = primitive.allocate(layout);

        unsafe {
            ptr.as_ptr().write_bytes(0x3C, 16);

            let result = primitive.try_reallocate(ptr, layout, usize::MAX);
            assert!(matches!(
                result,
                Err(Error::CapacityOverflow {
                    count: usize::MAX,
                    element_size: 1
                })
            ));
            assert_eq!(ptr.as_ptr().add(15).read(), 0x3C);

            primitive.deallocate(ptr, layout);
        }
    }

    #[test]
    fn reallocate_to_and_from_zero() {
        let heap = BudgetHeap::new(64);
        let mut primitive = MallocAllocator::with_heap(heap.clone());
        let empty = Layout::from_size_align(0, 8).unwrap();

        let ptr = primitive.try_allocate(empty).unwrap();

        unsafe {
            let ptr = primitive.try_reallocate(ptr, empty, 48).unwrap();
            assert_eq!(heap.remaining(), 16);

            let layout = Layout::from_size_align(48, 8).unwrap();
            let ptr = primitive.try_reallocate(ptr, layout, 0).unwrap();
            assert_eq!(heap.remaining(), 64);
            assert_eq!(ptr.as_ptr().addr(), 8);
        }
    }
}
