use std::alloc::{Layout, handle_alloc_error};
use std::fmt;
use std::num::NonZero;
use std::ptr::{self, NonNull};

use new_zealand::nz;
use static_assertions::const_assert;
use tracing::{debug, error, trace, warn};

use crate::malloc::{dangling, resized};
use crate::{Error, MallocAllocator, OomHandler, PoolAllocatorBuilder, RawHeap, Result, SystemHeap};

/// Granularity of the pool's size classes. Every pooled block is a multiple of this size and
/// aligned to it.
pub const ALIGN: usize = 8;

/// The largest request served from the pool. Larger requests go to the primitive tier.
pub const MAX_BYTES: usize = 128;

/// Number of size classes, one free list each.
pub const FREE_LIST_COUNT: usize = 16;

/// How many blocks a refill tries to carve at once when a free list runs dry.
pub(crate) const DEFAULT_REFILL_OBJECTS: NonZero<usize> = nz!(20);

const_assert!(FREE_LIST_COUNT * ALIGN == MAX_BYTES);
const_assert!(ALIGN.is_power_of_two());

/// The link written into the first bytes of a block while it sits on a free list.
#[repr(C)]
struct FreeBlock {
    next: Option<NonNull<FreeBlock>>,
}

const_assert!(size_of::<FreeBlock>() <= ALIGN);
const_assert!(align_of::<FreeBlock>() <= ALIGN);

/// Rounds a pooled request up to its size class, or returns `None` if the request is not
/// served from the pool (zero bytes or more than [`MAX_BYTES`]).
///
/// # Example
///
/// ```rust
/// use tiered_alloc::size_class;
///
/// assert_eq!(size_class(1), Some(8));
/// assert_eq!(size_class(13), Some(16));
/// assert_eq!(size_class(128), Some(128));
/// assert_eq!(size_class(129), None);
/// ```
#[must_use]
#[inline]
pub const fn size_class(bytes: usize) -> Option<usize> {
    if bytes == 0 || bytes > MAX_BYTES {
        None
    } else {
        Some(round_up(bytes))
    }
}

#[inline]
const fn round_up(bytes: usize) -> usize {
    // Cannot overflow for any size the pool deals with, which are all far below usize::MAX.
    bytes.wrapping_add(ALIGN - 1) & !(ALIGN - 1)
}

#[inline]
const fn free_list_index(bytes: usize) -> usize {
    debug_assert!(bytes > 0 && bytes <= MAX_BYTES);

    // Cannot underflow because bytes is at least 1.
    bytes.div_ceil(ALIGN).wrapping_sub(1)
}

#[inline]
const fn routes_to_primitive(layout: Layout) -> bool {
    layout.size() > MAX_BYTES || layout.align() > ALIGN
}

/// The pooled allocation tier: segregated free lists for small requests, carved out of large
/// slabs obtained from the primitive tier.
///
/// Requests of up to [`MAX_BYTES`] bytes (with alignment of at most [`ALIGN`]) are rounded up
/// to a multiple of [`ALIGN`] and served from the free list of that size class. When a list is
/// empty, it is refilled with a batch of blocks carved from the current slab; when the slab
/// runs out, a new one is requested, sized at twice the batch plus a sixteenth of everything
/// obtained so far. Any tail too small for the current request is donated to the free list of
/// its own size class first, so no slab memory is stranded.
///
/// If the heap refuses a new slab, the pool salvages an unused block from the free list of a
/// larger size class before falling back to the primitive tier's out-of-memory handler.
///
/// Larger or over-aligned requests pass straight through to the primitive tier.
///
/// Blocks are never returned to the heap while the pool is alive. Dropping the pool releases
/// every slab, so all blocks obtained from it must be deallocated (or abandoned) by then.
///
/// # Example
///
/// ```rust
/// use std::alloc::Layout;
///
/// use tiered_alloc::PoolAllocator;
///
/// let mut pool = PoolAllocator::new();
/// let layout = Layout::from_size_align(24, 8).unwrap();
///
/// let block = pool.allocate(layout);
///
/// // The rest of the batch waits on the 24-byte free list.
/// assert_eq!(pool.free_list_len(24), 19);
///
/// // SAFETY: The block came from this pool with this layout.
/// unsafe { pool.deallocate(block, layout) };
/// assert_eq!(pool.free_list_len(24), 20);
/// ```
///
/// # Thread safety
///
/// The pool performs no locking and is single-threaded: neither [`Send`] nor [`Sync`].
pub struct PoolAllocator<H: RawHeap = SystemHeap> {
    primitive: MallocAllocator<H>,

    free_lists: [Option<NonNull<FreeBlock>>; FREE_LIST_COUNT],

    // The unused tail of the most recent slab. Both are null before the first slab.
    start_free: *mut u8,
    end_free: *mut u8,

    // Total bytes ever obtained for slabs. Only grows.
    heap_size: usize,

    // Every slab we own, so dropping the pool can release them.
    slabs: Vec<(NonNull<u8>, Layout)>,

    refill_objects: NonZero<usize>,
}

impl PoolAllocator<SystemHeap> {
    /// Creates an empty pool over the process heap, with default settings.
    ///
    /// No memory is obtained until the first allocation.
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self::from_parts(MallocAllocator::new(), DEFAULT_REFILL_OBJECTS)
    }

    /// Creates a builder for configuring a pool.
    ///
    /// # Example
    ///
    /// ```rust
    /// use new_zealand::nz;
    /// use tiered_alloc::PoolAllocator;
    ///
    /// let pool = PoolAllocator::builder().refill_objects(nz!(8)).build();
    /// ```
    #[inline]
    pub fn builder() -> PoolAllocatorBuilder {
        PoolAllocatorBuilder::new()
    }
}

impl Default for PoolAllocator<SystemHeap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: RawHeap> PoolAllocator<H> {
    pub(crate) const fn from_parts(
        primitive: MallocAllocator<H>,
        refill_objects: NonZero<usize>,
    ) -> Self {
        Self {
            primitive,
            free_lists: [None; FREE_LIST_COUNT],
            start_free: ptr::null_mut(),
            end_free: ptr::null_mut(),
            heap_size: 0,
            slabs: Vec::new(),
            refill_objects,
        }
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

    /// Allocates a block, returning an error if neither the heap, the free lists of larger
    /// size classes nor the out-of-memory handler can produce the memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if memory is exhausted and no
    /// out-of-memory handler is installed.
    pub fn try_allocate(&mut self, layout: Layout) -> Result<NonNull<u8>> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        if routes_to_primitive(layout) {
            return self.primitive.try_allocate(layout);
        }

        let class = round_up(layout.size());

        if let Some(block) = self.pop_free(class) {
            return Ok(block);
        }

        self.refill(class)
    }

    /// Returns a block to the pool.
    ///
    /// Pooled blocks go back on the free list of their size class; others are released to the
    /// primitive tier.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this pool for the same `layout` and not yet released.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        if routes_to_primitive(layout) {
            // SAFETY: Forwarding safety requirements to the caller. Blocks with this layout
            // were obtained from the primitive tier.
            unsafe { self.primitive.deallocate(ptr, layout) };
            return;
        }

        // SAFETY: The caller guarantees the block is ours, unused and of this size class.
        unsafe { self.push_free(ptr, round_up(layout.size())) };
    }

    /// Resizes a block, terminating the process if memory cannot be obtained.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this pool for `old_layout` and not yet released.
    /// On return, only the returned pointer may be used.
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

                if matches!(e, Error::CapacityOverflow { .. }) {
                    panic!("{e}");
                }

                handle_alloc_error(old_layout)
            }
        }
    }

    /// Resizes a block.
    ///
    /// * If both sizes are served by the primitive tier, the primitive tier resizes the block.
    /// * If both sizes fall in the same size class, the block is returned unchanged.
    /// * Otherwise a new block is allocated, the contents copied and the old block released.
    ///
    /// On error the original block is still valid and unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if memory is exhausted and no out-of-memory handler is
    /// installed, or [`Error::CapacityOverflow`] if `new_size` rounded up to the alignment
    /// exceeds `isize::MAX`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this pool for `old_layout` and not yet released.
    /// On success, only the returned pointer may be used.
    pub unsafe fn try_reallocate(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Result<NonNull<u8>> {
        let new_layout = resized(old_layout, new_size)?;

        if routes_to_primitive(old_layout) && routes_to_primitive(new_layout) {
            // SAFETY: Forwarding safety requirements to the caller.
            return unsafe { self.primitive.try_reallocate(ptr, old_layout, new_size) };
        }

        if old_layout.size() != 0
            && new_size != 0
            && !routes_to_primitive(old_layout)
            && !routes_to_primitive(new_layout)
            && round_up(old_layout.size()) == round_up(new_size)
        {
            return Ok(ptr);
        }

        let new_ptr = self.try_allocate(new_layout)?;

        // SAFETY: Both blocks are valid for the smaller of the two sizes and are distinct,
        // because the old block has not been released yet.
        unsafe {
            ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.as_ptr(),
                old_layout.size().min(new_size),
            );
        }

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.deallocate(ptr, old_layout) };

        Ok(new_ptr)
    }

    /// Installs a new out-of-memory handler on the primitive tier (or removes it, given
    /// `None`) and returns the handler that was installed before.
    #[inline]
    pub fn set_oom_handler(&mut self, handler: Option<OomHandler>) -> Option<OomHandler> {
        self.primitive.set_oom_handler(handler)
    }

    /// The primitive tier that serves large requests and supplies slabs.
    #[must_use]
    #[inline]
    pub fn primitive(&self) -> &MallocAllocator<H> {
        &self.primitive
    }

    /// Allocates through the primitive tier, bypassing the free lists.
    pub(crate) fn primitive_mut(&mut self) -> &mut MallocAllocator<H> {
        &mut self.primitive
    }

    /// The number of blocks currently waiting on the free list that serves `bytes`-sized
    /// requests. Zero for sizes not served from the pool.
    ///
    /// This walks the list and is meant for tests and diagnostics.
    #[must_use]
    pub fn free_list_len(&self, bytes: usize) -> usize {
        let Some(class) = size_class(bytes) else {
            return 0;
        };

        let mut len = 0_usize;
        let mut cursor = self.free_list_head(class);

        while let Some(node) = cursor {
            // Cannot overflow because every counted block occupies at least ALIGN bytes.
            len = len.wrapping_add(1);

            // SAFETY: Blocks on a free list hold an initialized FreeBlock.
            cursor = unsafe { node.as_ref().next };
        }

        len
    }

    /// Total bytes obtained for slabs over the lifetime of the pool.
    #[must_use]
    #[inline]
    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    /// Bytes left in the current slab that have not yet been carved into blocks.
    #[must_use]
    #[inline]
    pub fn arena_remaining(&self) -> usize {
        // Cannot underflow because start_free never passes end_free.
        self.end_free.addr().wrapping_sub(self.start_free.addr())
    }

    /// Obtains a batch of blocks of `class` bytes, returns the first and threads the rest onto
    /// the class's free list.
    fn refill(&mut self, class: usize) -> Result<NonNull<u8>> {
        let (chunk, count) = self.chunk_alloc(class, self.refill_objects.get())?;

        // Thread in reverse so that the list hands out blocks in address order.
        for index in (1..count).rev() {
            // Cannot overflow because the chunk holds `count` blocks of `class` bytes.
            let offset = index.wrapping_mul(class);

            // SAFETY: The offset is within the chunk we just carved.
            let block = unsafe { chunk.add(offset) };

            // SAFETY: The block is unused pool memory of this size class.
            unsafe { self.push_free(block, class) };
        }

        trace!(size = class, count, "refilled free list");

        Ok(chunk)
    }

    /// Carves up to `count` blocks of `class` bytes from the arena, obtaining a new slab when
    /// the arena cannot supply even one. Returns the start of the run and how many blocks it
    /// holds.
    #[allow(clippy::integer_division, reason = "we want whole blocks only")]
    fn chunk_alloc(&mut self, class: usize, count: usize) -> Result<(NonNull<u8>, usize)> {
        loop {
            let wanted = class
                .checked_mul(count)
                .expect("refill batch size cannot overflow for configured batch counts");
            let remaining = self.arena_remaining();

            if remaining >= class {
                let count = if remaining >= wanted {
                    count
                } else {
                    // Cannot divide by zero because size classes are at least ALIGN bytes.
                    remaining / class
                };

                // SAFETY: The arena is non-empty, so start_free points into a slab.
                let chunk = unsafe { NonNull::new_unchecked(self.start_free) };

                // SAFETY: We checked that the arena holds at least `count * class` bytes.
                self.start_free = unsafe { self.start_free.add(count.wrapping_mul(class)) };

                return Ok((chunk, count));
            }

            self.donate_leftover();

            // Cannot overflow because the batch is small and heap_size is bounded by memory.
            let slab_size = wanted
                .wrapping_mul(2)
                .wrapping_add(round_up(self.heap_size >> 4));
            let slab_layout = Layout::from_size_align(slab_size, ALIGN)
                .expect("slab size cannot exceed isize::MAX before memory is exhausted");

            if let Some(slab) = self.primitive.allocate_without_retry(slab_layout) {
                self.adopt_slab(slab, slab_layout);
                continue;
            }

            if self.salvage_donor(class) {
                continue;
            }

            // Last resort: the primitive tier's out-of-memory handler either frees something
            // or we give up.
            let slab = self.primitive.try_allocate(slab_layout)?;
            self.adopt_slab(slab, slab_layout);
        }
    }

    /// Moves the arena's tail, which is too small for the current request, onto the free list
    /// of its own size class.
    fn donate_leftover(&mut self) {
        let remaining = self.arena_remaining();

        if remaining > 0 {
            debug_assert!(remaining % ALIGN == 0 && remaining <= MAX_BYTES);

            // SAFETY: A non-empty arena means start_free points into a slab.
            let block = unsafe { NonNull::new_unchecked(self.start_free) };

            // SAFETY: The tail is unused slab memory and its size is a multiple of ALIGN,
            // smaller than the request that did not fit.
            unsafe { self.push_free(block, remaining) };
        }

        self.start_free = ptr::null_mut();
        self.end_free = ptr::null_mut();
    }

    fn adopt_slab(&mut self, slab: NonNull<u8>, layout: Layout) {
        self.slabs.push((slab, layout));

        // Cannot overflow because that would imply more memory than the address space holds.
        self.heap_size = self.heap_size.wrapping_add(layout.size());

        self.start_free = slab.as_ptr();

        // SAFETY: The slab is exactly layout.size() bytes long.
        self.end_free = unsafe { slab.as_ptr().add(layout.size()) };

        debug!(
            slab_size = layout.size(),
            heap_size = self.heap_size,
            "obtained new pool slab"
        );
    }

    /// Takes one unused block from the free list of `class` or a larger size class and turns
    /// it into the arena. Returns whether a block was found.
    fn salvage_donor(&mut self, class: usize) -> bool {
        let mut donor_class = class;

        while donor_class <= MAX_BYTES {
            if let Some(block) = self.pop_free(donor_class) {
                self.start_free = block.as_ptr();

                // SAFETY: The block is donor_class bytes long.
                self.end_free = unsafe { block.as_ptr().add(donor_class) };

                warn!(
                    size = class,
                    donor_size = donor_class,
                    "heap refused a new slab, salvaged a free block of a larger size class"
                );

                return true;
            }

            // Cannot overflow because the loop stops at MAX_BYTES.
            donor_class = donor_class.wrapping_add(ALIGN);
        }

        false
    }

    fn free_list_head(&self, class: usize) -> Option<NonNull<FreeBlock>> {
        *self
            .free_lists
            .get(free_list_index(class))
            .expect("size classes are checked against MAX_BYTES before lookup")
    }

    fn free_list_mut(&mut self, class: usize) -> &mut Option<NonNull<FreeBlock>> {
        self.free_lists
            .get_mut(free_list_index(class))
            .expect("size classes are checked against MAX_BYTES before lookup")
    }

    fn pop_free(&mut self, class: usize) -> Option<NonNull<u8>> {
        let slot = self.free_list_mut(class);
        let head = (*slot)?;

        // SAFETY: Blocks on a free list hold an initialized FreeBlock.
        *slot = unsafe { head.as_ref().next };

        Some(head.cast())
    }

    /// # Safety
    ///
    /// `block` must be unused pool memory of at least `class` bytes, aligned to `ALIGN`, and
    /// not already on a free list.
    unsafe fn push_free(&mut self, block: NonNull<u8>, class: usize) {
        let slot = self.free_list_mut(class);

        #[allow(
            clippy::cast_ptr_alignment,
            reason = "pool blocks are ALIGN-aligned, which satisfies FreeBlock"
        )]
        let node = block.cast::<FreeBlock>();

        // SAFETY: The caller guarantees the block is writable, aligned and unused.
        unsafe { node.write(FreeBlock { next: *slot }) };

        *slot = Some(node);
    }
}

impl<H: RawHeap> Drop for PoolAllocator<H> {
    fn drop(&mut self) {
        for (slab, layout) in self.slabs.drain(..) {
            // SAFETY: Every recorded slab was allocated from this heap with this layout and
            // is released exactly once, here.
            unsafe { self.primitive.deallocate(slab, layout) };
        }
    }
}

impl<H: RawHeap + fmt::Debug> fmt::Debug for PoolAllocator<H> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("primitive", &self.primitive)
            .field("heap_size", &self.heap_size)
            .field(
                "arena_remaining",
                &self.end_free.addr().wrapping_sub(self.start_free.addr()),
            )
            .field("slabs", &self.slabs.len())
            .field("refill_objects", &self.refill_objects)
            .finish_non_exhaustive()
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
    use std::collections::HashSet;
    use std::rc::Rc;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::BudgetHeap;

    assert_not_impl_any!(PoolAllocator: Send, Sync);

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn size_classes() {
        assert_eq!(size_class(0), None);
        assert_eq!(size_class(1), Some(8));
        assert_eq!(size_class(8), Some(8));
        assert_eq!(size_class(9), Some(16));
        assert_eq!(size_class(127), Some(128));
        assert_eq!(size_class(MAX_BYTES + 1), None);

        assert_eq!(free_list_index(1), 0);
        assert_eq!(free_list_index(8), 0);
        assert_eq!(free_list_index(9), 1);
        assert_eq!(free_list_index(128), FREE_LIST_COUNT - 1);
    }

    #[test]
    fn blocks_are_distinct_and_reused() {
        let mut pool = PoolAllocator::new();
        let mut seen = HashSet::new();
        let mut blocks = Vec::new();

        for _ in 0..50 {
            let block = pool.allocate(layout(24));
            assert_eq!(block.as_ptr().addr() % ALIGN, 0);
            assert!(seen.insert(block.as_ptr().addr()));

            unsafe { block.as_ptr().write_bytes(0xCD, 24) };
            blocks.push(block);
        }

        let released = blocks.pop().unwrap();
        unsafe { pool.deallocate(released, layout(24)) };

        // The most recently released block is handed out first.
        let reused = pool.allocate(layout(24));
        assert_eq!(reused, released);

        blocks.push(reused);

        for block in blocks {
            unsafe { pool.deallocate(block, layout(24)) };
        }
    }

    #[test]
    fn first_refill_carves_batch_and_keeps_tail() {
        let mut pool = PoolAllocator::new();

        let block = pool.allocate(layout(8));

        // 20 blocks of 8 wanted, slab is twice that.
        assert_eq!(pool.heap_size(), 320);
        assert_eq!(pool.free_list_len(8), 19);
        assert_eq!(pool.arena_remaining(), 160);

        unsafe { pool.deallocate(block, layout(8)) };
        assert_eq!(pool.free_list_len(8), 20);
    }

    #[test]
    fn requests_share_size_class_list() {
        let mut pool = PoolAllocator::new();

        let a = pool.allocate(layout(13));
        assert_eq!(pool.free_list_len(16), 19);
        assert_eq!(pool.free_list_len(13), 19);

        let b = pool.allocate(layout(16));
        assert_eq!(pool.free_list_len(16), 18);

        unsafe {
            pool.deallocate(a, layout(13));
            pool.deallocate(b, layout(16));
        }

        assert_eq!(pool.free_list_len(9), 20);
        assert_eq!(pool.free_list_len(8), 0);
    }

    #[test]
    fn partial_batch_then_leftover_donation() {
        let mut pool = PoolAllocator::new();

        let small = pool.allocate(layout(8));
        assert_eq!(pool.arena_remaining(), 160);

        // Only one 128-byte block fits in the 160 remaining bytes.
        let large = pool.allocate(layout(128));
        assert_eq!(pool.free_list_len(128), 0);
        assert_eq!(pool.arena_remaining(), 32);

        // 32 bytes cannot serve a 64-byte block, so they go to the 32-byte list before a new
        // slab of 2 * 20 * 64 + round_up(320 / 16) bytes is obtained.
        let medium = pool.allocate(layout(64));
        assert_eq!(pool.free_list_len(32), 1);
        assert_eq!(pool.heap_size(), 320 + 2560 + 24);
        assert_eq!(pool.free_list_len(64), 19);

        unsafe {
            pool.deallocate(small, layout(8));
            pool.deallocate(large, layout(128));
            pool.deallocate(medium, layout(64));
        }
    }

    #[test]
    fn salvages_larger_free_block_when_heap_refuses() {
        let heap = BudgetHeap::new(320);
        let mut pool = PoolAllocator::builder().heap(heap.clone()).build();

        let small = pool.try_allocate(layout(8)).unwrap();
        assert_eq!(heap.remaining(), 0);

        let large = pool.try_allocate(layout(128)).unwrap();
        unsafe { pool.deallocate(large, layout(128)) };
        assert_eq!(pool.free_list_len(128), 1);

        // The heap has nothing left, so the free 128-byte block becomes the arena and yields
        // two 64-byte blocks.
        let medium = pool.try_allocate(layout(64)).unwrap();
        assert_eq!(pool.free_list_len(128), 0);
        assert_eq!(pool.free_list_len(64), 1);
        assert_eq!(pool.free_list_len(32), 1);
        assert_eq!(pool.heap_size(), 320);
        assert_eq!(pool.arena_remaining(), 0);

        unsafe {
            pool.deallocate(small, layout(8));
            pool.deallocate(medium, layout(64));
        }
    }

    #[test]
    fn exhaustion_without_handler_is_reported() {
        let mut pool = PoolAllocator::builder().heap(BudgetHeap::new(0)).build();

        let result = pool.try_allocate(layout(8));
        assert!(matches!(
            result,
            Err(Error::OutOfMemory { size: 320, align: ALIGN })
        ));
        assert_eq!(pool.heap_size(), 0);
    }

    #[test]
    fn exhaustion_runs_handler_then_succeeds() {
        let heap = BudgetHeap::new(0);
        let calls = Rc::new(Cell::new(0_usize));

        let mut pool = PoolAllocator::builder()
            .heap(heap.clone())
            .oom_handler({
                let heap = heap.clone();
                let calls = Rc::clone(&calls);
                move || {
                    calls.set(calls.get() + 1);
                    heap.grant(1024);
                }
            })
            .build();

        let block = pool.try_allocate(layout(8)).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(pool.heap_size(), 320);
        assert_eq!(heap.remaining(), 1024 - 320);

        unsafe { pool.deallocate(block, layout(8)) };
    }

    #[test]
    fn handler_retries_until_enough_is_granted() {
        let heap = BudgetHeap::new(0);
        let calls = Rc::new(Cell::new(0_usize));

        let mut pool = PoolAllocator::builder()
            .heap(heap.clone())
            .oom_handler({
                let heap = heap.clone();
                let calls = Rc::clone(&calls);
                move || {
                    calls.set(calls.get() + 1);
                    heap.grant(100);
                }
            })
            .build();

        // A 320-byte slab needs four grants of 100 bytes.
        let block = pool.try_allocate(layout(8)).unwrap();
        assert_eq!(calls.get(), 4);

        unsafe { pool.deallocate(block, layout(8)) };

        let previous = pool.set_oom_handler(None);
        assert!(previous.is_some());

        // Without the handler, a large request the heap cannot serve is an error.
        assert!(matches!(
            pool.try_allocate(layout(4096)),
            Err(Error::OutOfMemory { size: 4096, .. })
        ));
    }

    #[test]
    fn large_and_over_aligned_requests_bypass_pool() {
        let heap = BudgetHeap::new(4096);
        let mut pool = PoolAllocator::builder().heap(heap.clone()).build();

        let large = pool.try_allocate(layout(MAX_BYTES + 1)).unwrap();
        assert_eq!(heap.remaining(), 4096 - 129);

        let aligned_layout = Layout::from_size_align(16, 64).unwrap();
        let aligned = pool.try_allocate(aligned_layout).unwrap();
        assert_eq!(aligned.as_ptr().addr() % 64, 0);
        assert_eq!(heap.remaining(), 4096 - 129 - 16);

        assert_eq!(pool.heap_size(), 0);

        unsafe {
            pool.deallocate(large, layout(MAX_BYTES + 1));
            pool.deallocate(aligned, aligned_layout);
        }

        assert_eq!(heap.remaining(), 4096);
        assert_eq!(pool.free_list_len(16), 0);
    }

    #[test]
    fn reallocate_within_size_class_keeps_block() {
        let mut pool = PoolAllocator::new();

        let block = pool.allocate(layout(17));
        let same = unsafe { pool.reallocate(block, layout(17), 24) };
        assert_eq!(block, same);

        unsafe { pool.deallocate(same, layout(24)) };
    }

    #[test]
    fn oversized_reallocate_reports_capacity_overflow() {
        let mut pool = PoolAllocator::new();

        let block = pool.allocate(layout(24));
        unsafe { block.as_ptr().write(9) };

        let result = unsafe { pool.try_reallocate(block, layout(24), usize::MAX) };
        assert!(matches!(result, Err(Error::CapacityOverflow { .. })));

        unsafe {
            assert_eq!(block.as_ptr().read(), 9);
            pool.deallocate(block, layout(24));
        }
    }

    #[test]
    fn reallocate_across_classes_copies() {
        let mut pool = PoolAllocator::new();

        let block = pool.allocate(layout(16));
        unsafe {
            for i in 0..16_u8 {
                block.as_ptr().add(usize::from(i)).write(i);
            }
        }

        let grown = unsafe { pool.reallocate(block, layout(16), 100) };
        assert_ne!(block, grown);
        assert_eq!(pool.free_list_len(16), 20);

        let huge = unsafe { pool.reallocate(grown, layout(100), 1000) };

        unsafe {
            for i in 0..16_u8 {
                assert_eq!(huge.as_ptr().add(usize::from(i)).read(), i);
            }
        }

        // The first 16-byte refill left 320 bytes in the arena, enough for only three 104-byte
        // blocks. One served the grow and came back when the block moved to the primitive tier.
        assert_eq!(pool.free_list_len(100), 3);
        assert_eq!(pool.arena_remaining(), 8);

        let shrunk = unsafe { pool.reallocate(huge, layout(1000), 4) };
        unsafe {
            assert_eq!(shrunk.as_ptr().add(3).read(), 3);
            pool.deallocate(shrunk, layout(4));
        }
    }

    #[test]
    fn refill_batch_is_configurable() {
        let mut pool = PoolAllocator::builder().refill_objects(nz!(4)).build();

        let block = pool.allocate(layout(32));
        assert_eq!(pool.free_list_len(32), 3);
        assert_eq!(pool.heap_size(), 2 * 4 * 32);

        unsafe { pool.deallocate(block, layout(32)) };
    }

    #[test]
    fn drop_releases_slabs() {
        let heap = BudgetHeap::new(1 << 20);

        {
            let mut pool = PoolAllocator::builder().heap(heap.clone()).build();

            for size in [8, 24, 64, 128] {
                let _leaked_into_pool = pool.allocate(layout(size));
            }

            assert!(heap.remaining() < 1 << 20);
        }

        assert_eq!(heap.remaining(), 1 << 20);
    }
}
