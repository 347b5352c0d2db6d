use std::iter::FusedIterator;

use crate::{BidirectionalCursor, Cursor};

/// Adapts a pair of cursors `[first, last)` into an [`Iterator`] over their references.
///
/// # Example
///
/// ```rust
/// use iter_category::{CursorRange, SliceCursor};
///
/// let data = [1, 2, 3];
/// let range = CursorRange::new(SliceCursor::begin(&data), SliceCursor::end(&data));
///
/// assert_eq!(range.rev().copied().collect::<Vec<_>>(), [3, 2, 1]);
/// ```
#[derive(Clone, Debug)]
pub struct CursorRange<C> {
    first: C,
    last: C,
}

impl<C: Cursor> CursorRange<C> {
    /// The range from `first` up to but not including `last`.
    ///
    /// `last` must be reachable from `first` by incrementing.
    #[must_use]
    #[inline]
    pub fn new(first: C, last: C) -> Self {
        Self { first, last }
    }

    /// The remaining range as its pair of cursors.
    #[must_use]
    #[inline]
    pub fn into_cursors(self) -> (C, C) {
        (self.first, self.last)
    }
}

impl<C: Cursor> Iterator for CursorRange<C> {
    type Item = C::Reference;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.first == self.last {
            return None;
        }

        let item = self.first.get();
        self.first.increment();
        Some(item)
    }
}

impl<C: BidirectionalCursor> DoubleEndedIterator for CursorRange<C> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.first == self.last {
            return None;
        }

        self.last.decrement();
        Some(self.last.get())
    }
}

impl<C: Cursor> FusedIterator for CursorRange<C> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ForwardOnly, SliceCursor};

    #[test]
    fn yields_every_element() {
        let data = ["a", "b", "c"];
        let range = CursorRange::new(
            ForwardOnly::new(SliceCursor::begin(&data)),
            ForwardOnly::new(SliceCursor::end(&data)),
        );

        assert_eq!(range.copied().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn meets_in_the_middle() {
        let data = [1, 2, 3, 4];
        let mut range = CursorRange::new(SliceCursor::begin(&data), SliceCursor::end(&data));

        assert_eq!(range.next(), Some(&1));
        assert_eq!(range.next_back(), Some(&4));
        assert_eq!(range.next_back(), Some(&3));
        assert_eq!(range.next(), Some(&2));
        assert_eq!(range.next(), None);
        assert_eq!(range.next_back(), None);

        let (first, last) = range.into_cursors();
        assert_eq!(first, last);
    }

    #[test]
    fn empty_range() {
        let data: [u8; 0] = [];
        let mut range = CursorRange::new(SliceCursor::begin(&data), SliceCursor::end(&data));

        assert_eq!(range.next(), None);
    }
}
