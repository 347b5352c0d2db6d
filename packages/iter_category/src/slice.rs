use std::fmt;
use std::ptr;

use crate::{BidirectionalCursor, Cursor, RandomAccessCursor, RandomAccessIteratorTag};

/// A random access cursor over a slice.
///
/// The cursor may rest anywhere in `0..=len`. Reading at `len` or moving outside that span
/// panics.
///
/// # Example
///
/// ```rust
/// use iter_category::{Cursor, RandomAccessCursor, SliceCursor};
///
/// let data = ['a', 'b', 'c'];
/// let mut cursor = SliceCursor::begin(&data);
///
/// cursor.offset(2);
/// assert_eq!(*cursor.get(), 'c');
/// ```
pub struct SliceCursor<'a, T> {
    slice: &'a [T],

    // Always within 0..=slice.len(), which fits in isize because slices never exceed
    // isize::MAX bytes.
    position: isize,
}

impl<'a, T> SliceCursor<'a, T> {
    /// A cursor at the first element of `slice`.
    #[must_use]
    #[inline]
    pub fn begin(slice: &'a [T]) -> Self {
        Self { slice, position: 0 }
    }

    /// A cursor one past the last element of `slice`.
    #[must_use]
    #[inline]
    pub fn end(slice: &'a [T]) -> Self {
        Self::at(slice, slice.len())
    }

    /// A cursor at `index` in `slice`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than the length of the slice.
    #[must_use]
    pub fn at(slice: &'a [T], index: usize) -> Self {
        assert!(
            index <= slice.len(),
            "cursor index {index} is out of bounds for a slice of length {}",
            slice.len()
        );

        Self {
            slice,
            position: isize::try_from(index)
                .expect("slice lengths never exceed isize::MAX"),
        }
    }

    /// The index of the current position.
    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        self.position.unsigned_abs()
    }

    /// The slice this cursor moves over.
    #[must_use]
    #[inline]
    pub fn slice(&self) -> &'a [T] {
        self.slice
    }

    fn move_to(&mut self, position: Option<isize>) {
        let position = position
            .filter(|p| p.unsigned_abs() <= self.slice.len() && *p >= 0)
            .expect("cursor moved outside its slice");

        self.position = position;
    }
}

impl<T> Clone for SliceCursor<'_, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SliceCursor<'_, T> {}

impl<T> PartialEq for SliceCursor<'_, T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.slice.as_ptr(), other.slice.as_ptr()) && self.position == other.position
    }
}

impl<T> Eq for SliceCursor<'_, T> {}

impl<T> fmt::Debug for SliceCursor<'_, T> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceCursor")
            .field("len", &self.slice.len())
            .field("position", &self.position)
            .finish()
    }
}

impl<'a, T> Cursor for SliceCursor<'a, T> {
    type Category = RandomAccessIteratorTag;
    type Value = T;
    type Difference = isize;
    type Pointer = *const T;
    type Reference = &'a T;

    #[inline]
    fn get(&self) -> &'a T {
        self.slice
            .get(self.index())
            .expect("cursor dereferenced at the end of its slice")
    }

    #[inline]
    fn pointer(&self) -> *const T {
        self.slice.as_ptr().wrapping_offset(self.position)
    }

    #[inline]
    fn increment(&mut self) {
        self.move_to(self.position.checked_add(1));
    }
}

impl<T> BidirectionalCursor for SliceCursor<'_, T> {
    #[inline]
    fn decrement(&mut self) {
        self.move_to(self.position.checked_sub(1));
    }
}

impl<T> RandomAccessCursor for SliceCursor<'_, T> {
    #[inline]
    fn offset(&mut self, n: isize) {
        self.move_to(self.position.checked_add(n));
    }

    #[inline]
    fn difference(&self, origin: &Self) -> isize {
        // Cannot overflow because both positions are in 0..=isize::MAX.
        self.position.wrapping_sub(origin.position)
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SliceCursor<'static, String>: Copy, RandomAccessCursor);

    #[test]
    fn walks_the_slice() {
        let data = [10, 20, 30];
        let mut cursor = SliceCursor::begin(&data);
        let end = SliceCursor::end(&data);

        let mut seen = Vec::new();
        while cursor != end {
            seen.push(*cursor.get());
            cursor.increment();
        }

        assert_eq!(seen, [10, 20, 30]);
        assert_eq!(cursor.index(), 3);
    }

    #[test]
    fn offset_and_difference() {
        let data = [1, 2, 3, 4, 5];
        let first = SliceCursor::begin(&data);
        let mut cursor = first;

        cursor.offset(4);
        assert_eq!(*cursor.get(), 5);
        assert_eq!(cursor.difference(&first), 4);
        assert_eq!(first.difference(&cursor), -4);

        cursor.decrement();
        assert_eq!(*cursor.get(), 4);
        assert_eq!(cursor.pointer(), data.as_ptr().wrapping_add(3));
    }

    #[test]
    fn cursors_over_different_slices_differ() {
        let a = [1, 2];
        let b = [1, 2];

        assert!(SliceCursor::begin(&a) != SliceCursor::begin(&b));
        assert!(SliceCursor::begin(&a) == SliceCursor::at(&a, 0));
    }

    #[test]
    #[should_panic]
    fn reading_the_end_panics() {
        let data = [1];
        _ = SliceCursor::end(&data).get();
    }

    #[test]
    #[should_panic]
    fn moving_before_the_start_panics() {
        let data = [1];
        SliceCursor::begin(&data).decrement();
    }

    #[test]
    #[should_panic]
    fn moving_past_the_end_panics() {
        let data = [1, 2];
        SliceCursor::begin(&data).offset(3);
    }
}
