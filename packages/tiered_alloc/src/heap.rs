use std::alloc::{Layout, alloc, dealloc, realloc};
use std::ptr::NonNull;

/// The underlying heap that the primitive allocator draws memory from.
///
/// A heap only reports failure; it never retries. Retrying through the out-of-memory handler
/// is the job of [`MallocAllocator`][crate::MallocAllocator].
///
/// # Safety
///
/// Implementations must return memory that is valid for reads and writes of `layout.size()`
/// bytes, aligned to `layout.align()`, and not handed out again until it is deallocated.
pub unsafe trait RawHeap {
    /// Attempts to allocate a block of memory. `layout.size()` is never zero.
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>>;

    /// Releases a block previously returned by this heap.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this heap for the same `layout` and not yet released.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout);

    /// Resizes a block, preserving its contents up to the smaller of the two sizes.
    ///
    /// On failure the original block is left untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this heap for `old_layout` and not yet released.
    /// `new_size` must be non-zero and must not overflow `isize` when rounded to the alignment.
    unsafe fn reallocate(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>>;
}

/// The process heap, reached through the global allocator.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "stateless handle")]
pub struct SystemHeap;

// SAFETY: Forwards to the global allocator, which upholds the same guarantees.
unsafe impl RawHeap for SystemHeap {
    #[inline]
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0, "heap requests must not be zero-sized");

        // SAFETY: The layout is non-zero-sized, as required by the trait contract.
        NonNull::new(unsafe { alloc(layout) })
    }

    #[inline]
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { dealloc(ptr.as_ptr(), layout) }
    }

    #[inline]
    unsafe fn reallocate(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        // SAFETY: Forwarding safety requirements to the caller.
        NonNull::new(unsafe { realloc(ptr.as_ptr(), old_layout, new_size) })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn system_heap_round_trip() {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let mut heap = SystemHeap;

        let ptr = heap.allocate(layout).unwrap();

        // SAFETY: The block is 64 bytes and exclusively ours.
        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 64);
            assert_eq!(*ptr.as_ptr().add(63), 0xAB);
        }

        // SAFETY: Allocated above with the same layout.
        let ptr = unsafe { heap.reallocate(ptr, layout, 128) }.unwrap();

        // SAFETY: Reallocation preserves the first 64 bytes.
        unsafe {
            assert_eq!(*ptr.as_ptr().add(10), 0xAB);
        }

        let layout = Layout::from_size_align(128, 8).unwrap();

        // SAFETY: Reallocated above to this layout.
        unsafe { heap.deallocate(ptr, layout) };
    }
}
