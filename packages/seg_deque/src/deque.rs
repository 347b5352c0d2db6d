mod erase;
mod insert;
mod map;
mod traits;

use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::{fmt, mem};

use scopeguard::ScopeGuard;
use tiered_alloc::{DefaultAlloc, RawAlloc, TypeTraits, construct_with, destroy_n};

use crate::{DequeCursor, Iter, IterMut, RawIter, Segments};

use insert::{CloneFrom, FillFrom, TakeFrom};

/// A double-ended queue stored as a map of fixed-size buffers.
///
/// Elements live in equally sized buffers whose addresses are kept, in order, in a central
/// array called the map. Pushing at either end fills the buffer at that end and adds a new
/// buffer when it runs out, so existing elements never move when the deque grows at its ends.
/// Indexing is constant time: a position splits into a map slot and an offset inside its
/// buffer.
///
/// Buffers hold `BUF` elements, or as many as fit in
/// [`DEFAULT_BUFFER_BYTES`][crate::DEFAULT_BUFFER_BYTES] when `BUF` is zero. Buffers and the
/// map come from the allocator `A`; by default the calling thread's pool.
///
/// Zero-sized element types are rejected at compile time.
///
/// # Example
///
/// ```rust
/// use seg_deque::Deque;
///
/// let mut deque = Deque::new();
/// deque.push_back(2);
/// deque.push_back(3);
/// deque.push_front(1);
///
/// assert_eq!(deque, [1, 2, 3]);
/// assert_eq!(deque[1], 2);
///
/// deque.insert(1, 10);
/// assert_eq!(deque.pop_front(), Some(1));
/// assert_eq!(deque, [10, 2, 3]);
/// ```
///
/// # Panics during construction
///
/// Inserting several elements first makes room for all of them and then constructs them in
/// place. If cloning an element, the element-producing closure or the source iterator panics,
/// the elements constructed so far are dropped, the shifted elements are moved back and the
/// buffers acquired for the insertion are released before the panic propagates. The deque is
/// left exactly as it was.
pub struct Deque<T: TypeTraits, A: RawAlloc = DefaultAlloc, const BUF: usize = 0> {
    // The first element. Always in an allocated buffer.
    start: RawIter<T, BUF>,

    // One past the last element. Always in an allocated buffer and never at its end, so there
    // is at least one vacant slot after the last element.
    finish: RawIter<T, BUF>,

    // Slots in [start.node, finish.node] own one buffer each; all other slots are null.
    map: NonNull<*mut T>,
    map_size: usize,

    alloc: A,

    _owns: PhantomData<T>,
}

// SAFETY: The deque owns its elements and its storage; moving it to another thread moves
// them along, which is fine when both the elements and the allocator handle can be sent.
unsafe impl<T: TypeTraits + Send, A: RawAlloc + Send, const BUF: usize> Send
    for Deque<T, A, BUF>
{
}

// SAFETY: Shared access only hands out shared references to elements and to the allocator.
unsafe impl<T: TypeTraits + Sync, A: RawAlloc + Sync, const BUF: usize> Sync
    for Deque<T, A, BUF>
{
}

impl<T: TypeTraits> Deque<T> {
    /// Creates an empty deque using the calling thread's pool.
    ///
    /// The map and the first buffer are allocated right away.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(DefaultAlloc)
    }

    /// Creates a deque holding `n` clones of `value`.
    #[must_use]
    pub fn from_elem(n: usize, value: &T) -> Self
    where
        T: Clone,
    {
        Self::from_elem_in(n, value, DefaultAlloc)
    }

    /// Creates a deque holding clones of the values in `values`.
    #[must_use]
    pub fn from_slice(values: &[T]) -> Self
    where
        T: Clone,
    {
        Self::from_slice_in(values, DefaultAlloc)
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Deque<T, A, BUF> {
    const BUFFER_SIZE: usize = {
        assert!(
            size_of::<T>() != 0,
            "zero-sized element types cannot be stored in a deque"
        );

        RawIter::<T, BUF>::BUFFER_SIZE
    };

    /// Creates an empty deque that allocates from `alloc`.
    #[must_use]
    pub fn new_in(alloc: A) -> Self {
        Self::with_map_for(0, alloc)
    }

    /// Creates a deque holding `n` clones of `value`, allocating from `alloc`.
    #[must_use]
    pub fn from_elem_in(n: usize, value: &T, alloc: A) -> Self
    where
        T: Clone,
    {
        let mut deque = Self::with_map_for(n, alloc);
        deque.insert_from(0, n, FillFrom(value));
        deque
    }

    /// Creates a deque holding clones of the values in `values`, allocating from `alloc`.
    #[must_use]
    pub fn from_slice_in(values: &[T], alloc: A) -> Self
    where
        T: Clone,
    {
        let mut deque = Self::with_map_for(values.len(), alloc);
        deque.insert_from(0, values.len(), CloneFrom(values));
        deque
    }

    /// Creates a deque holding the values of an iterator that knows its exact length.
    pub(crate) fn from_exact_iter_in<I>(iter: I, alloc: A) -> Self
    where
        I: ExactSizeIterator<Item = T>,
    {
        let len = iter.len();
        let mut deque = Self::with_map_for(len, alloc);
        deque.insert_from(0, len, TakeFrom(iter));
        deque
    }

    /// The number of elements per buffer.
    #[must_use]
    #[inline]
    pub const fn buffer_size() -> usize {
        Self::BUFFER_SIZE
    }

    /// The number of slots in the map, used or not.
    #[must_use]
    #[inline]
    pub fn map_capacity(&self) -> usize {
        self.map_size
    }

    /// The allocator handle the deque allocates from.
    #[must_use]
    #[inline]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// The number of elements.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        usize::try_from(self.finish.distance_from(&self.start))
            .expect("finish never precedes start")
    }

    /// Whether the deque holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.finish
    }

    /// The element at `index`, or `None` if `index` is out of bounds.
    #[must_use]
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.len() {
            // SAFETY: We just checked the bounds.
            Some(unsafe { self.get_unchecked(index) })
        } else {
            None
        }
    }

    /// The element at `index` for modification, or `None` if `index` is out of bounds.
    #[must_use]
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.len() {
            // SAFETY: We just checked the bounds.
            Some(unsafe { self.get_unchecked_mut(index) })
        } else {
            None
        }
    }

    /// The element at `index`, without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be less than [`len()`][Self::len].
    #[must_use]
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        // SAFETY: The caller guarantees the position is within [start, finish), so every map
        // slot on the way owns a buffer and the target holds an initialized element.
        unsafe { &*self.start.forward(index).curr }
    }

    /// The element at `index` for modification, without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be less than [`len()`][Self::len].
    #[must_use]
    #[inline]
    pub unsafe fn get_unchecked_mut(&mut self, index: usize) -> &mut T {
        // SAFETY: See `get_unchecked()`; `&mut self` makes the reference exclusive.
        unsafe { &mut *self.start.forward(index).curr }
    }

    /// The first element, or `None` if the deque is empty.
    #[must_use]
    #[inline]
    pub fn front(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }

        // SAFETY: A non-empty deque has an initialized element at start.
        Some(unsafe { &*self.start.curr })
    }

    /// The first element for modification, or `None` if the deque is empty.
    #[must_use]
    #[inline]
    pub fn front_mut(&mut self) -> Option<&mut T> {
        if self.is_empty() {
            return None;
        }

        // SAFETY: A non-empty deque has an initialized element at start.
        Some(unsafe { &mut *self.start.curr })
    }

    /// The last element, or `None` if the deque is empty.
    #[must_use]
    #[inline]
    pub fn back(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }

        // SAFETY: A non-empty deque has an initialized element just before finish.
        Some(unsafe { &*self.last_position().curr })
    }

    /// The last element for modification, or `None` if the deque is empty.
    #[must_use]
    #[inline]
    pub fn back_mut(&mut self) -> Option<&mut T> {
        if self.is_empty() {
            return None;
        }

        // SAFETY: A non-empty deque has an initialized element just before finish.
        Some(unsafe { &mut *self.last_position().curr })
    }

    // The position of the last element. Only meaningful for a non-empty deque.
    fn last_position(&self) -> RawIter<T, BUF> {
        let mut last = self.finish;

        // SAFETY: If finish is at the start of its buffer, the previous map slot holds the
        // buffer with the last element.
        unsafe { last.decrement() };

        last
    }

    /// Appends an element.
    #[inline]
    pub fn push_back(&mut self, value: T) {
        self.push_back_with(|| value);
    }

    /// Appends the element returned by `f`, constructing it in place.
    ///
    /// If `f` panics, the deque is unchanged.
    pub fn push_back_with(&mut self, f: impl FnOnce() -> T) {
        if self.finish.curr != self.finish.last.wrapping_sub(1) {
            // SAFETY: finish is a vacant slot inside an allocated buffer.
            unsafe { construct_with(slot(self.finish.curr), f) };

            // Cannot leave the buffer because this was not its last slot.
            self.finish.curr = self.finish.curr.wrapping_add(1);
        } else {
            self.push_back_aux(f);
        }
    }

    // Construction into the last slot of the last buffer. The deque first makes sure a buffer
    // follows, because finish may never rest at the end of its buffer.
    fn push_back_aux(&mut self, f: impl FnOnce() -> T) {
        self.reserve_map_at_back(1);

        let next_node = self.finish.node.wrapping_add(1);
        let target = self.finish.curr;

        // SAFETY: The map has room after finish.node, as reserved above.
        unsafe { next_node.write(self.allocate_node()) };

        let guard = scopeguard::guard(&mut *self, |deque| {
            deque.release_nodes(next_node, next_node.wrapping_add(1));
        });

        // SAFETY: The target is the vacant last slot of the last buffer.
        unsafe { construct_with(slot(target), f) };

        let deque = ScopeGuard::into_inner(guard);

        // SAFETY: The slot now owns a buffer.
        unsafe { deque.finish.set_node(next_node) };
        deque.finish.curr = deque.finish.first;
    }

    /// Prepends an element.
    #[inline]
    pub fn push_front(&mut self, value: T) {
        self.push_front_with(|| value);
    }

    /// Prepends the element returned by `f`, constructing it in place.
    ///
    /// If `f` panics, the deque is unchanged.
    pub fn push_front_with(&mut self, f: impl FnOnce() -> T) {
        if self.start.curr != self.start.first {
            let target = self.start.curr.wrapping_sub(1);

            // SAFETY: start is not at the beginning of its buffer, so the slot before it is
            // vacant and inside the same buffer.
            unsafe { construct_with(slot(target), f) };

            self.start.curr = target;
        } else {
            self.push_front_aux(f);
        }
    }

    // Construction into a new buffer before the first one.
    fn push_front_aux(&mut self, f: impl FnOnce() -> T) {
        self.reserve_map_at_front(1);

        let prev_node = self.start.node.wrapping_sub(1);
        let buffer = self.allocate_node();

        // SAFETY: The map has room before start.node, as reserved above.
        unsafe { prev_node.write(buffer) };

        let guard = scopeguard::guard(&mut *self, |deque| {
            deque.release_nodes(prev_node, prev_node.wrapping_add(1));
        });

        let target = buffer.wrapping_add(Self::BUFFER_SIZE).wrapping_sub(1);

        // SAFETY: The last slot of the new buffer is vacant.
        unsafe { construct_with(slot(target), f) };

        let deque = ScopeGuard::into_inner(guard);

        // SAFETY: The slot now owns a buffer.
        unsafe { deque.start.set_node(prev_node) };
        deque.start.curr = deque.start.last.wrapping_sub(1);
    }

    /// Removes the last element and returns it, or `None` if the deque is empty.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        if self.finish.curr == self.finish.first {
            let drained = self.finish.node;

            // SAFETY: The deque is not empty, so the previous slot owns the buffer holding the
            // last element.
            unsafe { self.finish.set_node(drained.wrapping_sub(1)) };
            self.finish.curr = self.finish.last;

            self.release_nodes(drained, drained.wrapping_add(1));
        }

        self.finish.curr = self.finish.curr.wrapping_sub(1);

        // SAFETY: This is the last element, which now lies outside [start, finish) and is
        // never read again.
        Some(unsafe { self.finish.curr.read() })
    }

    /// Removes the first element and returns it, or `None` if the deque is empty.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        // SAFETY: The first element is initialized. Moving start past it below means it is
        // never read again.
        let value = unsafe { self.start.curr.read() };

        if self.start.curr == self.start.last.wrapping_sub(1) {
            let drained = self.start.node;

            // SAFETY: The first buffer is exhausted, so finish lies in a later buffer and the
            // next slot owns one.
            unsafe { self.start.set_node(drained.wrapping_add(1)) };
            self.start.curr = self.start.first;

            self.release_nodes(drained, drained.wrapping_add(1));
        } else {
            self.start.curr = self.start.curr.wrapping_add(1);
        }

        Some(value)
    }

    /// Swaps the contents of two deques, including their storage and allocators.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// An iterator over the elements, front to back.
    #[must_use]
    #[inline]
    pub fn iter(&self) -> Iter<'_, T, BUF> {
        // SAFETY: [start, finish) holds the elements, borrowed along with the deque.
        unsafe { Iter::new(self.start, self.finish, self.len()) }
    }

    /// An iterator over the elements for modification, front to back.
    #[must_use]
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, T, BUF> {
        // SAFETY: [start, finish) holds the elements, exclusively borrowed along with the deque.
        unsafe { IterMut::new(self.start, self.finish, self.len()) }
    }

    /// An iterator over the contiguous runs of elements, one per buffer in use.
    ///
    /// # Example
    ///
    /// ```rust
    /// use seg_deque::Deque;
    /// use tiered_alloc::DefaultAlloc;
    ///
    /// let deque = Deque::<u8, DefaultAlloc, 4>::from_slice_in(&[1, 2, 3, 4, 5, 6], DefaultAlloc);
    ///
    /// let runs: Vec<&[u8]> = deque.segments().collect();
    /// assert_eq!(runs, [&[1, 2, 3, 4][..], &[5, 6][..]]);
    /// ```
    #[must_use]
    #[inline]
    pub fn segments(&self) -> Segments<'_, T, BUF> {
        // SAFETY: [start, finish) holds the elements, borrowed along with the deque.
        unsafe { Segments::new(self.start, self.len()) }
    }

    /// A cursor at the first element.
    #[must_use]
    #[inline]
    pub fn begin(&self) -> DequeCursor<'_, T, A, BUF> {
        DequeCursor::new(self, self.start, 0)
    }

    /// A cursor one past the last element.
    #[must_use]
    #[inline]
    pub fn end(&self) -> DequeCursor<'_, T, A, BUF> {
        DequeCursor::new(self, self.finish, self.len())
    }

    /// A cursor at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than the length.
    #[must_use]
    pub fn cursor_at(&self, index: usize) -> DequeCursor<'_, T, A, BUF> {
        let len = self.len();
        assert!(
            index <= len,
            "cursor index {index} is out of bounds for a deque of length {len}"
        );

        // SAFETY: The position is within [start, finish].
        let raw = unsafe { self.start.forward(index) };
        DequeCursor::new(self, raw, index)
    }

    // Frees the buffers and the map. Elements must already be gone.
    fn release_storage(&mut self) {
        self.release_nodes(self.start.node, self.finish.node.wrapping_add(1));

        // SAFETY: The map came from this allocator with this size.
        unsafe { self.map_allocator().deallocate(self.map, self.map_size) };
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Drop for Deque<T, A, BUF> {
    fn drop(&mut self) {
        let len = self.len();
        let start = self.start;

        // If a destructor panics, the remaining elements leak but the storage is still freed.
        let _storage = scopeguard::guard(&mut *self, |deque| deque.release_storage());

        // SAFETY: [start, start + len) holds the initialized elements, dropped exactly once.
        unsafe { destroy_span(start, len) };
    }
}

impl<T: TypeTraits + fmt::Debug, A: RawAlloc, const BUF: usize> fmt::Debug for Deque<T, A, BUF> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[inline]
fn slot<T>(ptr: *mut T) -> NonNull<T> {
    NonNull::new(ptr).expect("deque positions always point into an allocated buffer")
}

/// Drops `count` elements starting at `first`, one buffer at a time.
///
/// # Safety
///
/// The `count` positions from `first` must hold initialized elements of one deque. They must
/// not be used again.
unsafe fn destroy_span<T: TypeTraits, const BUF: usize>(first: RawIter<T, BUF>, count: usize) {
    if T::HAS_TRIVIAL_DESTRUCTOR {
        return;
    }

    let mut position = first;
    let mut remaining = count;

    while remaining > 0 {
        // SAFETY: Elements remain, so the next slot owns a buffer.
        unsafe { position.skip_exhausted_buffer() };

        let run = remaining.min(position.remaining_in_buffer());

        // SAFETY: The run lies within one buffer and holds initialized elements.
        unsafe { destroy_n(slot(position.curr), run) };

        position.curr = position.curr.wrapping_add(run);
        remaining = remaining.wrapping_sub(run);
    }
}

/// Moves `count` elements from `src` to `dst` bitwise, front to back.
///
/// # Safety
///
/// Both ranges must lie within the buffers of one deque and `dst` must not come after `src`.
/// The source positions that are not also destination positions are logically uninitialized
/// afterwards.
unsafe fn move_toward_front<T, const BUF: usize>(
    src: RawIter<T, BUF>,
    count: usize,
    dst: RawIter<T, BUF>,
) {
    let (mut src, mut dst) = (src, dst);
    let mut remaining = count;

    while remaining > 0 {
        // SAFETY: Elements remain, so the next slots own buffers.
        unsafe { src.skip_exhausted_buffer() };
        // SAFETY: As above.
        unsafe { dst.skip_exhausted_buffer() };

        let run = remaining
            .min(src.remaining_in_buffer())
            .min(dst.remaining_in_buffer());

        // SAFETY: Both runs lie within one buffer each. Within one buffer the ranges may
        // overlap, which `copy` allows; across buffers the destination never overtakes the
        // source because it moves toward the front.
        unsafe { ptr::copy(src.curr, dst.curr, run) };

        src.curr = src.curr.wrapping_add(run);
        dst.curr = dst.curr.wrapping_add(run);
        remaining = remaining.wrapping_sub(run);
    }
}

/// Moves the `count` elements that end at `src_end` to the range that ends at `dst_end`
/// bitwise, back to front.
///
/// # Safety
///
/// Both ranges must lie within the buffers of one deque and `dst_end` must not come before
/// `src_end`. The source positions that are not also destination positions are logically
/// uninitialized afterwards.
unsafe fn move_toward_back<T, const BUF: usize>(
    src_end: RawIter<T, BUF>,
    count: usize,
    dst_end: RawIter<T, BUF>,
) {
    let (mut src, mut dst) = (src_end, dst_end);
    let mut remaining = count;

    while remaining > 0 {
        // SAFETY: Elements remain before both ends, so the previous slots own buffers.
        unsafe { src.enter_previous_buffer_at_start() };
        // SAFETY: As above.
        unsafe { dst.enter_previous_buffer_at_start() };

        let run = remaining
            .min(src.offset_in_buffer())
            .min(dst.offset_in_buffer());

        src.curr = src.curr.wrapping_sub(run);
        dst.curr = dst.curr.wrapping_sub(run);

        // SAFETY: Both runs lie within one buffer each; see `move_toward_front()`, mirrored.
        unsafe { ptr::copy(src.curr, dst.curr, run) };

        remaining = remaining.wrapping_sub(run);
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use tiered_alloc::{PoolAllocator, PoolHandle};

    use super::*;

    type Small = Deque<u32, DefaultAlloc, 4>;

    fn small() -> Small {
        Deque::new_in(DefaultAlloc)
    }

    assert_impl_all!(Deque<u32>: Send, Sync);
    assert_impl_all!(Deque<Cell<u32>>: Send);
    assert_not_impl_any!(Deque<Cell<u32>>: Sync);
    assert_not_impl_any!(Deque<Rc<u32>>: Send, Sync);
    assert_not_impl_any!(Deque<u32, PoolHandle>: Send, Sync);

    #[test]
    fn buffer_sizes() {
        assert_eq!(Deque::<u32>::buffer_size(), 128);
        assert_eq!(Deque::<[u8; 1000]>::buffer_size(), 1);
        assert_eq!(Small::buffer_size(), 4);
    }

    #[test]
    fn new_deque_is_empty() {
        let deque = Deque::<u32>::new();

        assert!(deque.is_empty());
        assert_eq!(deque.len(), 0);
        assert_eq!(deque.front(), None);
        assert_eq!(deque.back(), None);
        assert_eq!(deque.get(0), None);
        assert_eq!(deque.map_capacity(), 8);
    }

    #[test]
    fn push_back_then_index() {
        let mut deque = small();

        for i in 0..10 {
            deque.push_back(i);
        }

        assert_eq!(deque.len(), 10);
        for i in 0..10 {
            assert_eq!(deque[i as usize], i);
        }

        assert_eq!(deque.front(), Some(&0));
        assert_eq!(deque.back(), Some(&9));
    }

    #[test]
    fn growth_order_with_mixed_ends() {
        let mut deque = small();

        deque.push_back(1);
        deque.push_back(2);
        deque.push_front(0);
        deque.push_front(100);

        assert_eq!(deque.len(), 4);
        assert_eq!(deque.pop_front(), Some(100));
        assert_eq!(deque, [0, 1, 2]);
    }

    #[test]
    fn random_access_across_buffers() {
        let deque = Small::from_slice_in(&(0..11).collect::<Vec<_>>(), DefaultAlloc);

        // Three buffers of four slots: [0..4), [4..8), [8..11).
        assert_eq!(deque.segments().count(), 3);

        for i in 0..11 {
            assert_eq!(deque.get(i), Some(&(i as u32)));
        }

        assert_eq!(deque.get(11), None);
    }

    #[test]
    fn thousand_push_fronts_keep_order() {
        let mut deque = small();

        for i in 0..1000 {
            deque.push_front(i);
        }

        assert_eq!(deque.len(), 1000);
        assert_eq!(deque.front(), Some(&999));
        assert_eq!(deque.back(), Some(&0));

        for (index, value) in deque.iter().enumerate() {
            assert_eq!(*value as usize, 999 - index);
        }
    }

    #[test]
    fn pops_release_buffers() {
        let pool = PoolHandle::new(PoolAllocator::new());
        let mut deque = Deque::<u64, _, 4>::new_in(pool.clone());

        for i in 0..64 {
            deque.push_back(i);
        }

        // Buffers of four u64 are 32 bytes.
        let class = 4 * size_of::<u64>();
        let free_when_full = pool.with_pool(|pool| pool.free_list_len(class));

        while deque.len() > 1 {
            deque.pop_front();
        }

        assert_eq!(deque.front(), Some(&63));

        // The first 15 buffers drained completely, the 16th still holds the last element.
        let free_after_pops = pool.with_pool(|pool| pool.free_list_len(class));
        assert_eq!(free_after_pops, free_when_full + 15);
    }

    #[test]
    fn pop_both_ends_to_empty() {
        let mut deque = Small::from_slice_in(&[1, 2, 3, 4, 5, 6, 7, 8, 9], DefaultAlloc);

        let mut front = Vec::new();
        let mut back = Vec::new();

        while !deque.is_empty() {
            front.extend(deque.pop_front());
            back.extend(deque.pop_back());
        }

        assert_eq!(front, [1, 2, 3, 4, 5]);
        assert_eq!(back, [9, 8, 7, 6]);
        assert_eq!(deque.pop_front(), None);
        assert_eq!(deque.pop_back(), None);

        deque.push_back(10);
        assert_eq!(deque, [10]);
    }

    #[test]
    fn map_recenters_when_mostly_empty() {
        let mut deque = small();

        // Pushing at the back walks the used slots toward the end of the 8-slot map while
        // popping at the front frees slots behind them. At most three slots are ever in use,
        // so the map is always more than twice as large as needed.
        for i in 0..200 {
            deque.push_back(i);
            if deque.len() > 4 {
                deque.pop_front();
            }
        }

        assert_eq!(deque.map_capacity(), 8);
        assert_eq!(deque, [196, 197, 198, 199]);
    }

    #[test]
    fn map_grows_when_full() {
        let mut deque = small();

        // 8 slots hold at most 6 buffers before a reallocation is needed; 8 + 8 + 2 = 18.
        for i in 0..40 {
            deque.push_back(i);
        }

        assert_eq!(deque.map_capacity(), 18);
        assert!(deque.iter().copied().eq(0..40));
    }

    #[test]
    fn push_with_panic_leaves_deque_unchanged() {
        let mut deque = small();
        deque.extend([1, 2, 3]);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            deque.push_back_with(|| panic!("no value"));
        }));
        assert!(result.is_err());

        // The fourth slot is the last of the buffer, which takes the path that adds a buffer.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            deque.push_front_with(|| panic!("no value"));
        }));
        assert!(result.is_err());

        assert_eq!(deque, [1, 2, 3]);
        deque.push_back(4);
        deque.push_front(0);
        assert_eq!(deque, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn front_and_back_mut() {
        let mut deque = Deque::from_slice(&[1, 2, 3]);

        *deque.front_mut().unwrap() = 10;
        *deque.back_mut().unwrap() = 30;
        *deque.get_mut(1).unwrap() = 20;

        assert_eq!(deque, [10, 20, 30]);
        assert!(deque.get_mut(3).is_none());
    }

    #[test]
    fn swap_exchanges_contents() {
        let mut a = Deque::from_slice(&[1, 2]);
        let mut b = Deque::from_elem(3, &7);

        a.swap(&mut b);

        assert_eq!(a, [7, 7, 7]);
        assert_eq!(b, [1, 2]);
    }

    #[test]
    fn drop_releases_everything_to_the_pool() {
        let pool = PoolHandle::new(PoolAllocator::new());

        {
            let mut deque = Deque::<String, _, 2>::new_in(pool.clone());
            for i in 0..50 {
                deque.push_back(i.to_string());
                deque.push_front(i.to_string());
            }
        }

        // Buffers of two Strings are 48 bytes. 100 elements needed at least 50 of them and
        // every one is back on its free list.
        let class = 2 * size_of::<String>();
        let free = pool.with_pool(|pool| pool.free_list_len(class));
        assert!(free >= 50);
    }
}
