//! Removal of elements and changes of length.

use std::iter;
use std::ops::{Bound, RangeBounds};

use tiered_alloc::{RawAlloc, TypeTraits};

use super::{FillFrom, TakeFrom, destroy_span, move_toward_back, move_toward_front};
use crate::Deque;

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Deque<T, A, BUF> {
    /// Removes the element at `index` and returns it, or returns `None` if `index` is out of
    /// bounds.
    ///
    /// The elements on the shorter side of `index` shift by one to close the gap.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let len = self.len();

        if index >= len {
            return None;
        }

        if index == 0 {
            return self.pop_front();
        }

        // Cannot underflow because the deque is not empty.
        if index == len.wrapping_sub(1) {
            return self.pop_back();
        }

        // SAFETY: index is in bounds.
        let position = unsafe { self.start.forward(index) };

        // SAFETY: The position holds an initialized element. The gap is closed right away, so
        // the moved-out value is never read again.
        let value = unsafe { position.curr.read() };

        self.close_gap(index, 1);

        Some(value)
    }

    /// Removes the elements in `range`, shifting the elements on the shorter side to close the
    /// gap.
    ///
    /// If an element's destructor panics, the rest of the range is leaked and the deque still
    /// holds exactly the elements outside the range.
    ///
    /// # Panics
    ///
    /// Panics if the range starts after it ends or ends after the length.
    ///
    /// # Example
    ///
    /// ```rust
    /// use seg_deque::Deque;
    ///
    /// let mut deque: Deque<u32> = (0..10).collect();
    /// deque.remove_range(2..8);
    ///
    /// assert_eq!(deque, [0, 1, 8, 9]);
    /// ```
    pub fn remove_range(&mut self, range: impl RangeBounds<usize>) {
        let len = self.len();

        let first = match range.start_bound() {
            Bound::Included(&first) => first,
            Bound::Excluded(&first) => first
                .checked_add(1)
                .expect("range start overflows usize"),
            Bound::Unbounded => 0,
        };

        let last = match range.end_bound() {
            Bound::Included(&last) => last.checked_add(1).expect("range end overflows usize"),
            Bound::Excluded(&last) => last,
            Bound::Unbounded => len,
        };

        assert!(
            first <= last,
            "range starts at {first} but ends at {last}"
        );
        assert!(
            last <= len,
            "range end {last} is out of bounds for a deque of length {len}"
        );

        if first == last {
            return;
        }

        if first == 0 && last == len {
            self.clear();
            return;
        }

        // Cannot underflow because first <= last.
        let count = last.wrapping_sub(first);

        // SAFETY: first is in bounds.
        let gap = unsafe { self.start.forward(first) };

        let _close = scopeguard::guard(&mut *self, |deque| deque.close_gap(first, count));

        // SAFETY: The range holds initialized elements. The guard closes the gap even if a
        // destructor panics, so they are never touched again.
        unsafe { destroy_span(gap, count) };
    }

    /// Shortens the deque to `len` elements, dropping the rest. Does nothing if the deque is
    /// not longer than `len`.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.remove_range(len..);
        }
    }

    /// Removes every element.
    ///
    /// The buffer under the start position is kept; all others are released.
    pub fn clear(&mut self) {
        let start = self.start;
        let len = self.len();

        let _reset = scopeguard::guard(&mut *self, |deque| {
            deque.release_nodes(
                deque.start.node.wrapping_add(1),
                deque.finish.node.wrapping_add(1),
            );
            deque.finish = deque.start;
        });

        // SAFETY: [start, start + len) holds the initialized elements. The guard empties the
        // deque even if a destructor panics, so they are never touched again.
        unsafe { destroy_span(start, len) };
    }

    /// Changes the length to `new_len`, dropping elements at the back or appending clones of
    /// `value`.
    #[allow(
        clippy::needless_pass_by_value,
        reason = "takes ownership like the std collections do"
    )]
    pub fn resize(&mut self, new_len: usize, value: T)
    where
        T: Clone,
    {
        let len = self.len();

        if new_len <= len {
            self.truncate(new_len);
        } else {
            // Cannot underflow because new_len > len.
            self.insert_from(len, new_len.wrapping_sub(len), FillFrom(&value));
        }
    }

    /// Changes the length to `new_len`, dropping elements at the back or appending values
    /// returned by `f`.
    pub fn resize_with(&mut self, new_len: usize, f: impl FnMut() -> T) {
        let len = self.len();

        if new_len <= len {
            self.truncate(new_len);
        } else {
            // Cannot underflow because new_len > len.
            self.insert_from(
                len,
                new_len.wrapping_sub(len),
                TakeFrom(iter::repeat_with(f)),
            );
        }
    }

    /// Closes the gap of `count` vacant slots at `index` by shifting the shorter side, then
    /// releases the buffers that no longer hold elements.
    fn close_gap(&mut self, index: usize, count: usize) {
        // Cannot underflow because the gap lies within the deque.
        let survivors = self.len().wrapping_sub(count);
        let after = survivors.wrapping_sub(index);

        // SAFETY: The gap lies within [start, finish].
        let gap = unsafe { self.start.forward(index) };
        // SAFETY: As above.
        let gap_end = unsafe { gap.forward(count) };

        #[allow(clippy::integer_division, reason = "any rounding picks a valid side")]
        let front_is_shorter = index < survivors / 2;

        if front_is_shorter {
            // SAFETY: The new start is within the deque.
            let new_start = unsafe { self.start.forward(count) };

            // SAFETY: The prefix moves toward the back over the vacant gap.
            unsafe { move_toward_back(gap, index, gap_end) };

            self.release_nodes(self.start.node, new_start.node);
            self.start = new_start;
        } else {
            // SAFETY: The new finish is within the deque.
            let new_finish = unsafe { self.finish.backward(count) };

            // SAFETY: The suffix moves toward the front over the vacant gap.
            unsafe { move_toward_front(gap_end, after, gap) };

            self.release_nodes(
                new_finish.node.wrapping_add(1),
                self.finish.node.wrapping_add(1),
            );
            self.finish = new_finish;
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use tiered_alloc::DefaultAlloc;

    use super::*;

    type Small = Deque<u32, DefaultAlloc, 4>;

    fn numbered(len: u32) -> Small {
        Small::from_exact_iter_in(0..len, DefaultAlloc)
    }

    #[test]
    fn remove_near_front_and_back() {
        let mut deque = numbered(20);

        assert_eq!(deque.remove(3), Some(3));
        assert_eq!(deque.remove(15), Some(16));
        assert_eq!(deque.remove(0), Some(0));
        assert_eq!(deque.remove(16), Some(19));
        assert_eq!(deque.remove(16), None);

        let expected: Vec<u32> = [1, 2]
            .into_iter()
            .chain(4..16)
            .chain([17, 18])
            .collect();
        assert_eq!(deque, expected);
    }

    #[test]
    fn remove_range_from_every_position() {
        for first in 0..=13 {
            for last in first..=13 {
                let mut deque = numbered(13);
                deque.remove_range(first..last);

                let expected: Vec<u32> = (0..13)
                    .filter(|v| !(first..last).contains(&usize::try_from(*v).unwrap()))
                    .collect();
                assert_eq!(deque, expected, "removing {first}..{last}");
            }
        }
    }

    #[test]
    fn remove_range_bounds() {
        let mut deque = numbered(10);
        deque.remove_range(..=1);
        assert_eq!(deque, [2, 3, 4, 5, 6, 7, 8, 9]);

        deque.remove_range((Bound::Excluded(5), Bound::Unbounded));
        assert_eq!(deque, [2, 3, 4, 5, 6, 7]);

        deque.remove_range(..);
        assert!(deque.is_empty());
    }

    #[test]
    #[should_panic]
    fn remove_range_past_end_panics() {
        let mut deque = numbered(3);
        deque.remove_range(1..4);
    }

    #[test]
    #[should_panic]
    #[expect(clippy::reversed_empty_ranges, reason = "that is the point of the test")]
    fn remove_range_reversed_panics() {
        let mut deque = numbered(3);
        deque.remove_range(2..1);
    }

    #[test]
    fn remove_front_side_releases_buffers() {
        let mut deque = numbered(16);
        let capacity = deque.map_capacity();

        deque.remove_range(1..9);

        assert_eq!(deque, [0, 9, 10, 11, 12, 13, 14, 15]);
        assert_eq!(deque.segments().map(<[u32]>::len).sum::<usize>(), 8);
        assert_eq!(deque.segments().count(), 2);
        assert_eq!(deque.map_capacity(), capacity);
    }

    #[test]
    fn truncate_and_clear() {
        let mut deque = numbered(9);

        deque.truncate(20);
        assert_eq!(deque.len(), 9);

        deque.truncate(5);
        assert_eq!(deque, [0, 1, 2, 3, 4]);

        deque.clear();
        assert!(deque.is_empty());
        assert_eq!(deque.segments().count(), 0);

        deque.push_front(1);
        deque.push_back(2);
        assert_eq!(deque, [1, 2]);
    }

    #[test]
    fn resize_grows_and_shrinks() {
        let mut deque = numbered(3);

        deque.resize(6, 7);
        assert_eq!(deque, [0, 1, 2, 7, 7, 7]);

        deque.resize(2, 9);
        assert_eq!(deque, [0, 1]);

        let mut next = 10;
        deque.resize_with(5, || {
            next += 1;
            next
        });
        assert_eq!(deque, [0, 1, 11, 12, 13]);
    }

    #[test]
    fn clear_drops_every_element() {
        let mut deque = Deque::<String, DefaultAlloc, 2>::new_in(DefaultAlloc);
        for i in 0..9 {
            deque.push_back(i.to_string());
        }

        deque.clear();
        assert!(deque.is_empty());

        deque.push_back("again".to_owned());
        assert_eq!(deque.front().map(String::as_str), Some("again"));
    }
}
