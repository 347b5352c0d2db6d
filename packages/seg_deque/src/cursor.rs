use std::{fmt, ptr};

use iter_category::{BidirectionalCursor, Cursor, RandomAccessCursor, RandomAccessIteratorTag};
use tiered_alloc::{RawAlloc, TypeTraits};

use crate::{Deque, RawIter};

/// A random access cursor over a [`Deque`].
///
/// The cursor may rest anywhere in `0..=len`. Reading at `len` or moving outside that span
/// panics. Moving by any offset takes constant time, so the category-dispatched algorithms of
/// [`iter_category`] pick their jumping implementations for it.
///
/// # Example
///
/// ```rust
/// use iter_category::{Cursor, RandomAccessIteratorTag, advance, distance, iterator_category};
/// use seg_deque::Deque;
///
/// let deque: Deque<u32> = (0..1000).collect();
///
/// let mut cursor = deque.begin();
/// advance(&mut cursor, 700);
///
/// assert_eq!(*cursor.get(), 700);
/// assert_eq!(distance(&cursor, &deque.end()), 300);
/// assert_eq!(iterator_category(&cursor), RandomAccessIteratorTag);
/// ```
pub struct DequeCursor<'a, T: TypeTraits, A: RawAlloc, const BUF: usize> {
    deque: &'a Deque<T, A, BUF>,
    raw: RawIter<T, BUF>,
    index: usize,
}

impl<'a, T: TypeTraits, A: RawAlloc, const BUF: usize> DequeCursor<'a, T, A, BUF> {
    // `raw` must be the position of `index` in `deque`.
    pub(crate) fn new(deque: &'a Deque<T, A, BUF>, raw: RawIter<T, BUF>, index: usize) -> Self {
        Self { deque, raw, index }
    }

    /// The index of the current position.
    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The deque this cursor moves over.
    #[must_use]
    #[inline]
    pub fn deque(&self) -> &'a Deque<T, A, BUF> {
        self.deque
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Clone for DequeCursor<'_, T, A, BUF> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Copy for DequeCursor<'_, T, A, BUF> {}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> PartialEq for DequeCursor<'_, T, A, BUF> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.deque, other.deque) && self.index == other.index
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Eq for DequeCursor<'_, T, A, BUF> {}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> fmt::Debug for DequeCursor<'_, T, A, BUF> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DequeCursor")
            .field("len", &self.deque.len())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<'a, T: TypeTraits, A: RawAlloc, const BUF: usize> Cursor for DequeCursor<'a, T, A, BUF> {
    type Category = RandomAccessIteratorTag;
    type Value = T;
    type Difference = isize;
    type Pointer = *const T;
    type Reference = &'a T;

    #[inline]
    fn get(&self) -> &'a T {
        assert!(
            self.index < self.deque.len(),
            "cursor dereferenced at the end of its deque"
        );

        // SAFETY: The position is one of the deque's elements, which the borrow keeps alive.
        unsafe { &*self.raw.curr }
    }

    #[inline]
    fn pointer(&self) -> *const T {
        self.raw.curr.cast_const()
    }

    #[inline]
    fn increment(&mut self) {
        assert!(
            self.index < self.deque.len(),
            "cursor moved outside its deque"
        );

        // SAFETY: The cursor is at an element, so the next position is within [start, finish].
        unsafe { self.raw.increment() };

        // Cannot overflow because the index stays within the length.
        self.index = self.index.wrapping_add(1);
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> BidirectionalCursor
    for DequeCursor<'_, T, A, BUF>
{
    #[inline]
    fn decrement(&mut self) {
        assert!(self.index > 0, "cursor moved outside its deque");

        // SAFETY: The cursor is after the first element, so the previous position is one.
        unsafe { self.raw.decrement() };

        // Cannot underflow because the index is positive.
        self.index = self.index.wrapping_sub(1);
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> RandomAccessCursor
    for DequeCursor<'_, T, A, BUF>
{
    #[inline]
    fn offset(&mut self, n: isize) {
        let target = self
            .index
            .checked_add_signed(n)
            .filter(|target| *target <= self.deque.len())
            .expect("cursor moved outside its deque");

        // SAFETY: The target is within [start, finish].
        unsafe { self.raw.offset(n) };

        self.index = target;
    }

    #[inline]
    fn difference(&self, origin: &Self) -> isize {
        let to_index = |index: usize| {
            isize::try_from(index).expect("deque lengths never exceed isize::MAX")
        };

        // Cannot overflow because both indexes are in 0..=isize::MAX.
        to_index(self.index).wrapping_sub(to_index(origin.index))
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use iter_category::{CursorRange, ForwardOnly, advance, distance, next, prev};
    use static_assertions::assert_impl_all;
    use tiered_alloc::DefaultAlloc;

    use super::*;

    type Small = Deque<u32, DefaultAlloc, 4>;

    assert_impl_all!(DequeCursor<'static, u32, DefaultAlloc, 0>: Copy, RandomAccessCursor);

    #[test]
    fn random_access_across_buffers() {
        let deque: Small = (0..30).collect();
        let begin = deque.begin();

        for target in 0..30 {
            let mut cursor = begin;
            advance(&mut cursor, target);
            assert_eq!(*cursor.get(), u32::try_from(target).unwrap());
            assert_eq!(cursor, deque.cursor_at(target.unsigned_abs()));

            for back in 0..=target {
                let earlier = prev(&cursor, back);
                assert_eq!(earlier.index(), (target - back).unsigned_abs());
                assert_eq!(*earlier.get(), u32::try_from(target - back).unwrap());
            }
        }
    }

    #[test]
    fn distance_agrees_with_forward_walk() {
        let deque: Small = (0..23).collect();

        assert_eq!(distance(&deque.begin(), &deque.end()), 23);

        let first = ForwardOnly::new(deque.cursor_at(3));
        let last = ForwardOnly::new(deque.cursor_at(17));
        assert_eq!(distance(&first, &last), 14);
    }

    #[test]
    fn range_iterates_both_ways() {
        let deque: Small = (0..9).collect();

        let forward: Vec<u32> = CursorRange::new(deque.begin(), deque.end())
            .copied()
            .collect();
        assert_eq!(forward, (0..9).collect::<Vec<_>>());

        let backward: Vec<u32> = CursorRange::new(deque.cursor_at(2), deque.cursor_at(7))
            .rev()
            .copied()
            .collect();
        assert_eq!(backward, [6, 5, 4, 3, 2]);
    }

    #[test]
    fn end_cursor_matches_walked_cursor() {
        let deque: Small = (0..8).collect();

        let walked = next(&deque.begin(), 8);

        assert_eq!(walked, deque.end());
        assert_eq!(walked.pointer(), deque.end().pointer());
    }

    #[test]
    fn cursors_of_different_deques_differ() {
        let a: Small = (0..3).collect();
        let b: Small = (0..3).collect();

        assert_ne!(a.begin(), b.begin());
        assert!(ptr::eq(a.begin().deque(), &a));
    }

    #[test]
    #[should_panic]
    fn get_at_end_panics() {
        let deque: Small = (0..3).collect();
        _ = deque.end().get();
    }

    #[test]
    #[should_panic]
    fn offset_past_end_panics() {
        let deque: Small = (0..3).collect();
        let mut cursor = deque.begin();
        cursor.offset(4);
    }

    #[test]
    #[should_panic]
    fn decrement_before_begin_panics() {
        let deque: Small = (0..3).collect();
        let mut cursor = deque.begin();
        cursor.decrement();
    }
}
