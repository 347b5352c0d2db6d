use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::{RawHeap, SystemHeap};

/// A heap with a byte budget, backed by [`SystemHeap`].
///
/// Requests that would exceed the remaining budget fail, which makes memory exhaustion
/// reproducible. Clones share the same budget, so an out-of-memory handler can hold a clone and
/// [`grant()`][Self::grant] more bytes before the allocator retries.
#[derive(Clone, Debug, Default)]
pub(crate) struct BudgetHeap {
    remaining: Rc<Cell<usize>>,
}

impl BudgetHeap {
    /// Creates a heap that can hand out at most `bytes` bytes at a time.
    #[must_use]
    pub(crate) fn new(bytes: usize) -> Self {
        Self {
            remaining: Rc::new(Cell::new(bytes)),
        }
    }

    /// The number of bytes that can still be allocated.
    #[must_use]
    pub(crate) fn remaining(&self) -> usize {
        self.remaining.get()
    }

    /// Adds `bytes` to the budget shared by all clones of this heap.
    pub(crate) fn grant(&self, bytes: usize) {
        self.remaining
            .set(self.remaining.get().saturating_add(bytes));
    }

    fn try_take(&self, bytes: usize) -> bool {
        match self.remaining.get().checked_sub(bytes) {
            Some(left) => {
                self.remaining.set(left);
                true
            }
            None => false,
        }
    }
}

// SAFETY: Memory comes from SystemHeap; the budget only decides whether to ask for it.
unsafe impl RawHeap for BudgetHeap {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if !self.try_take(layout.size()) {
            return None;
        }

        let ptr = SystemHeap.allocate(layout);

        if ptr.is_none() {
            self.grant(layout.size());
        }

        ptr
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { SystemHeap.deallocate(ptr, layout) };
        self.grant(layout.size());
    }

    unsafe fn reallocate(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let growth = new_size.saturating_sub(old_layout.size());

        if !self.try_take(growth) {
            return None;
        }

        // SAFETY: Forwarding safety requirements to the caller.
        let new_ptr = unsafe { SystemHeap.reallocate(ptr, old_layout, new_size) };

        match new_ptr {
            Some(_) => self.grant(old_layout.size().saturating_sub(new_size)),
            None => self.grant(growth),
        }

        new_ptr
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(BudgetHeap: Send, Sync);

    #[test]
    fn budget_heap_refuses_over_budget() {
        let mut heap = BudgetHeap::new(100);
        let big = Layout::from_size_align(101, 1).unwrap();
        let small = Layout::from_size_align(60, 1).unwrap();

        assert!(heap.allocate(big).is_none());
        assert_eq!(heap.remaining(), 100);

        let first = heap.allocate(small).unwrap();
        assert_eq!(heap.remaining(), 40);
        assert!(heap.allocate(small).is_none());

        // SAFETY: Allocated above with the same layout.
        unsafe { heap.deallocate(first, small) };
        assert_eq!(heap.remaining(), 100);
    }

    #[test]
    fn budget_heap_clones_share_budget() {
        let heap = BudgetHeap::new(0);
        let mut other = heap.clone();
        let layout = Layout::from_size_align(16, 8).unwrap();

        assert!(other.allocate(layout).is_none());

        heap.grant(16);
        let ptr = other.allocate(layout).unwrap();
        assert_eq!(heap.remaining(), 0);

        // SAFETY: Allocated above with the same layout.
        unsafe { other.deallocate(ptr, layout) };
        assert_eq!(heap.remaining(), 16);
    }

    #[test]
    fn budget_heap_reallocate_accounts_for_growth_and_shrink() {
        let mut heap = BudgetHeap::new(64);
        let layout = Layout::from_size_align(16, 8).unwrap();

        let ptr = heap.allocate(layout).unwrap();
        assert_eq!(heap.remaining(), 48);

        // SAFETY: Allocated above with the same layout.
        assert!(unsafe { heap.reallocate(ptr, layout, 80) }.is_none());
        assert_eq!(heap.remaining(), 48);

        // SAFETY: The failed reallocation left the block untouched.
        let ptr = unsafe { heap.reallocate(ptr, layout, 32) }.unwrap();
        assert_eq!(heap.remaining(), 32);

        let layout32 = Layout::from_size_align(32, 8).unwrap();

        // SAFETY: Reallocated above to this layout.
        let ptr = unsafe { heap.reallocate(ptr, layout32, 8) }.unwrap();
        assert_eq!(heap.remaining(), 56);

        let layout8 = Layout::from_size_align(8, 8).unwrap();

        // SAFETY: Reallocated above to this layout.
        unsafe { heap.deallocate(ptr, layout8) };
        assert_eq!(heap.remaining(), 64);
    }
}
