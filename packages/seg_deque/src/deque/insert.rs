//! Insertion of one or more elements at an arbitrary position.

use std::ptr::NonNull;

use scopeguard::ScopeGuard;
use tiered_alloc::{
    RawAlloc, TypeTraits, uninitialized_copy, uninitialized_fill, uninitialized_fill_with,
};

use super::{destroy_span, move_toward_back, move_toward_front, slot};
use crate::{Deque, RawIter};

/// Produces the values of a batch insertion, a contiguous run at a time.
pub(crate) trait Source<T> {
    /// Constructs the next `n` values into `n` consecutive slots starting at `dst`.
    ///
    /// If producing a value panics, the values constructed by this call are dropped before
    /// the panic propagates.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of `n` values.
    unsafe fn construct_into(&mut self, dst: NonNull<T>, n: usize);
}

/// Clones one value into every slot.
pub(crate) struct FillFrom<'a, T>(pub(crate) &'a T);

impl<T: Clone + TypeTraits> Source<T> for FillFrom<'_, T> {
    unsafe fn construct_into(&mut self, dst: NonNull<T>, n: usize) {
        // SAFETY: Forwarding safety requirements to the caller. The value lives outside the
        // deque's vacant slots.
        unsafe { uninitialized_fill(dst, n, self.0) };
    }
}

/// Clones the values of a slice, in order.
pub(crate) struct CloneFrom<'a, T>(pub(crate) &'a [T]);

impl<T: Clone + TypeTraits> Source<T> for CloneFrom<'_, T> {
    unsafe fn construct_into(&mut self, dst: NonNull<T>, n: usize) {
        let (head, tail) = self.0.split_at(n);

        // SAFETY: Forwarding safety requirements to the caller. The slice lives outside the
        // deque's vacant slots.
        unsafe { uninitialized_copy(head, dst) };

        self.0 = tail;
    }
}

/// Moves the values out of an iterator, in order.
pub(crate) struct TakeFrom<I>(pub(crate) I);

impl<T: TypeTraits, I: Iterator<Item = T>> Source<T> for TakeFrom<I> {
    unsafe fn construct_into(&mut self, dst: NonNull<T>, n: usize) {
        let iter = &mut self.0;

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            uninitialized_fill_with(dst, n, || {
                iter.next()
                    .expect("iterator yielded fewer items than it reported")
            });
        }
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Deque<T, A, BUF> {
    /// Inserts `value` at `index`, shifting the elements on the shorter side by one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than the length.
    pub fn insert(&mut self, index: usize, value: T) {
        if index == 0 {
            self.push_front(value);
        } else if index == self.len() {
            self.push_back(value);
        } else {
            self.insert_from(index, 1, TakeFrom(Some(value).into_iter()));
        }
    }

    /// Inserts `n` clones of `value` at `index`.
    ///
    /// If a clone panics, the deque is left as it was.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than the length.
    pub fn insert_n(&mut self, index: usize, n: usize, value: &T)
    where
        T: Clone,
    {
        self.insert_from(index, n, FillFrom(value));
    }

    /// Inserts clones of the values in `values` at `index`, keeping their order.
    ///
    /// If a clone panics, the deque is left as it was.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than the length.
    pub fn insert_slice(&mut self, index: usize, values: &[T])
    where
        T: Clone,
    {
        self.insert_from(index, values.len(), CloneFrom(values));
    }

    /// Inserts the values of an iterator at `index`, keeping their order.
    ///
    /// Iterators that report an exact length are consumed while inserting. Others are
    /// collected first, so that the deque makes room only once.
    ///
    /// If the iterator panics, the deque is left as it was.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than the length, or if an iterator that reported an exact
    /// length yields fewer items than reported. In debug builds, also panics if it yields more.
    pub fn insert_iter<I: IntoIterator<Item = T>>(&mut self, index: usize, values: I) {
        let mut values = values.into_iter();

        match values.size_hint() {
            (lower, Some(upper)) if lower == upper => {
                self.insert_from(index, lower, TakeFrom(values.by_ref()));

                debug_assert!(
                    values.next().is_none(),
                    "iterator yielded more items than it reported"
                );
            }
            _ => {
                let values: Vec<T> = values.collect();
                self.insert_from(index, values.len(), TakeFrom(values.into_iter()));
            }
        }
    }

    /// Inserts `n` values produced by `source` at `index`.
    ///
    /// Room is made on the side with fewer elements to shift. `start` or `finish` only moves
    /// once every new value is constructed.
    pub(crate) fn insert_from(&mut self, index: usize, n: usize, source: impl Source<T>) {
        let len = self.len();
        assert!(
            index <= len,
            "insertion index {index} is out of bounds for a deque of length {len}"
        );

        if n == 0 {
            return;
        }

        #[allow(clippy::integer_division, reason = "any rounding picks a valid side")]
        let front_is_shorter = index < len / 2;

        if front_is_shorter {
            self.insert_at_front_side(index, n, source);
        } else {
            self.insert_at_back_side(index, n, source);
        }
    }

    // Moves the `index` elements before the insertion point `n` slots toward the front and
    // constructs the new values in the gap.
    fn insert_at_front_side(&mut self, index: usize, n: usize, mut source: impl Source<T>) {
        let new_start = self.reserve_elements_at_front(n);
        let old_start = self.start;

        // SAFETY: Both positions are within [new_start, finish], which is backed by buffers.
        let gap = unsafe { new_start.forward(index) };
        // SAFETY: As above.
        let old_gap = unsafe { old_start.forward(index) };

        // SAFETY: The prefix moves toward the front into reserved slots.
        unsafe { move_toward_front(old_start, index, new_start) };

        let mut progress = scopeguard::guard((&mut *self, 0_usize), |(deque, built)| {
            // SAFETY: Exactly `built` values were constructed from gap on; the moved prefix
            // goes back where it was and the reserved buffers hold no values any more.
            unsafe { destroy_span(gap, built) };

            // SAFETY: See above.
            unsafe { move_toward_back(gap, index, old_gap) };

            deque.release_nodes(new_start.node, old_start.node);
        });

        // SAFETY: The n slots from gap on are reserved and vacant.
        unsafe { construct_span(gap, n, &mut source, &mut progress.1) };

        let (deque, _) = ScopeGuard::into_inner(progress);
        deque.start = new_start;
    }

    // Moves the elements after the insertion point `n` slots toward the back and constructs
    // the new values in the gap.
    fn insert_at_back_side(&mut self, index: usize, n: usize, mut source: impl Source<T>) {
        let new_finish = self.reserve_elements_at_back(n);
        let old_finish = self.finish;

        // Cannot underflow because index is at most the length.
        let after = self.len().wrapping_sub(index);

        // SAFETY: Both positions are within [start, new_finish], which is backed by buffers.
        let gap = unsafe { self.start.forward(index) };
        // SAFETY: As above.
        let gap_end = unsafe { gap.forward(n) };

        // SAFETY: The suffix moves toward the back into reserved slots.
        unsafe { move_toward_back(old_finish, after, new_finish) };

        let mut progress = scopeguard::guard((&mut *self, 0_usize), |(deque, built)| {
            // SAFETY: Exactly `built` values were constructed from gap on; the moved suffix
            // goes back where it was and the reserved buffers hold no values any more.
            unsafe { destroy_span(gap, built) };

            // SAFETY: See above.
            unsafe { move_toward_front(gap_end, after, gap) };

            deque.release_nodes(
                old_finish.node.wrapping_add(1),
                new_finish.node.wrapping_add(1),
            );
        });

        // SAFETY: The n slots from gap on are reserved and vacant.
        unsafe { construct_span(gap, n, &mut source, &mut progress.1) };

        let (deque, _) = ScopeGuard::into_inner(progress);
        deque.finish = new_finish;
    }
}

/// Constructs `n` values from `source` at `gap`, a buffer at a time.
///
/// `built` counts the values constructed so far, so that a panic can be rolled back by
/// dropping exactly those.
///
/// # Safety
///
/// The `n` slots from `gap` on must be vacant slots backed by buffers of one deque.
unsafe fn construct_span<T, S: Source<T>, const BUF: usize>(
    gap: RawIter<T, BUF>,
    n: usize,
    source: &mut S,
    built: &mut usize,
) {
    let mut position = gap;

    while *built < n {
        // SAFETY: Values remain to be constructed, so the next slot owns a reserved buffer.
        unsafe { position.skip_exhausted_buffer() };

        // Cannot underflow because the loop stops at n.
        let run = n.wrapping_sub(*built).min(position.remaining_in_buffer());

        // SAFETY: The run lies within one reserved buffer and its slots are vacant.
        unsafe { source.construct_into(slot(position.curr), run) };

        position.curr = position.curr.wrapping_add(run);

        // Cannot overflow because the loop stops at n.
        *built = built.wrapping_add(run);
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::modulo_arithmetic,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use tiered_alloc::DefaultAlloc;

    use super::*;

    type Small = Deque<u32, DefaultAlloc, 4>;

    fn numbered(len: u32) -> Small {
        Small::from_exact_iter_in(0..len, DefaultAlloc)
    }

    #[test]
    fn insert_matches_vec_at_every_index() {
        for index in 0..=11 {
            let mut deque = numbered(11);
            let mut expected: Vec<u32> = (0..11).collect();

            deque.insert(index, 100);
            expected.insert(index, 100);

            assert_eq!(deque, expected, "inserting at {index}");
        }
    }

    #[test]
    fn insert_n_on_both_sides() {
        for index in [0, 2, 5, 9, 13] {
            let mut deque = numbered(13);
            let mut expected: Vec<u32> = (0..13).collect();

            deque.insert_n(index, 6, &77);
            expected.splice(index..index, [77; 6]);

            assert_eq!(deque, expected, "inserting at {index}");
        }
    }

    #[test]
    fn insert_slice_spanning_many_buffers() {
        let mut deque = numbered(6);
        let values: Vec<u32> = (100..117).collect();

        deque.insert_slice(2, &values);
        deque.insert_slice(21, &values[..3]);

        let expected: Vec<u32> = [0, 1]
            .into_iter()
            .chain(100..117)
            .chain([2, 3, 100, 101, 102, 4, 5])
            .collect();
        assert_eq!(deque, expected);
    }

    #[test]
    fn insert_iter_without_exact_length() {
        let mut deque = numbered(5);

        deque.insert_iter(1, (10..20).filter(|v| v % 3 == 0));

        assert_eq!(deque, [0, 12, 15, 18, 1, 2, 3, 4]);
    }

    #[test]
    fn insert_nothing_is_a_no_op() {
        let mut deque = numbered(5);
        let capacity = deque.map_capacity();

        deque.insert_slice(3, &[]);
        deque.insert_n(0, 0, &1);
        deque.insert_iter(5, []);

        assert_eq!(deque, [0, 1, 2, 3, 4]);
        assert_eq!(deque.map_capacity(), capacity);
    }

    #[test]
    #[should_panic]
    fn insert_past_end_panics() {
        let mut deque = numbered(3);
        deque.insert_n(4, 1, &0);
    }

    #[test]
    fn panicking_iterator_leaves_deque_unchanged() {
        for index in [1, 9] {
            let mut deque = numbered(10);

            let values = (0..9_u32).map(|v| {
                assert!(v != 6, "no seventh value");
                v + 50
            });

            let result = catch_unwind(AssertUnwindSafe(|| deque.insert_iter(index, values)));
            assert!(result.is_err());

            let expected: Vec<u32> = (0..10).collect();
            assert_eq!(deque, expected);

            // The deque is fully usable afterwards.
            deque.insert(index, 99);
            assert_eq!(deque[index], 99);
            assert_eq!(deque.len(), 11);
        }
    }

    /// Yields `left` items while claiming to hold exactly `reported`.
    struct Liar {
        left: u32,
        reported: usize,
    }

    impl Iterator for Liar {
        type Item = u32;

        fn next(&mut self) -> Option<u32> {
            self.left = self.left.checked_sub(1)?;
            Some(self.left)
        }

        fn size_hint(&self) -> (usize, Option<usize>) {
            (self.reported, Some(self.reported))
        }
    }

    #[test]
    #[should_panic(expected = "iterator yielded fewer items than it reported")]
    fn iterator_shorter_than_reported_panics() {
        let mut deque = numbered(3);
        deque.insert_iter(1, Liar { left: 2, reported: 10 });
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "iterator yielded more items than it reported")]
    fn iterator_longer_than_reported_panics_in_debug_builds() {
        let mut deque = numbered(3);
        deque.insert_iter(1, Liar { left: 5, reported: 2 });
    }
}
