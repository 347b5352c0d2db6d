use crate::{
    BidirectionalCursor, BidirectionalIteratorTag, Cursor, ForwardCategory, ForwardIteratorTag,
};

/// Presents a cursor as a forward cursor, hiding any stronger movement it supports.
///
/// Algorithms given a `ForwardOnly` cursor take their step-by-step paths, which makes this
/// useful for comparing strategies over the same sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardOnly<C>(C);

impl<C: Cursor<Category: ForwardCategory>> ForwardOnly<C> {
    /// Wraps `cursor`.
    #[must_use]
    #[inline]
    pub fn new(cursor: C) -> Self {
        Self(cursor)
    }

    /// The wrapped cursor.
    #[must_use]
    #[inline]
    pub fn into_inner(self) -> C {
        self.0
    }
}

impl<C: Cursor<Category: ForwardCategory>> Cursor for ForwardOnly<C> {
    type Category = ForwardIteratorTag;
    type Value = C::Value;
    type Difference = C::Difference;
    type Pointer = C::Pointer;
    type Reference = C::Reference;

    #[inline]
    fn get(&self) -> Self::Reference {
        self.0.get()
    }

    #[inline]
    fn pointer(&self) -> Self::Pointer {
        self.0.pointer()
    }

    #[inline]
    fn increment(&mut self) {
        self.0.increment();
    }
}

/// Presents a cursor as a bidirectional cursor, hiding random access.
#[derive(Clone, Debug, PartialEq)]
pub struct BidirectionalOnly<C>(C);

impl<C: BidirectionalCursor> BidirectionalOnly<C> {
    /// Wraps `cursor`.
    #[must_use]
    #[inline]
    pub fn new(cursor: C) -> Self {
        Self(cursor)
    }

    /// The wrapped cursor.
    #[must_use]
    #[inline]
    pub fn into_inner(self) -> C {
        self.0
    }
}

impl<C: BidirectionalCursor> Cursor for BidirectionalOnly<C> {
    type Category = BidirectionalIteratorTag;
    type Value = C::Value;
    type Difference = C::Difference;
    type Pointer = C::Pointer;
    type Reference = C::Reference;

    #[inline]
    fn get(&self) -> Self::Reference {
        self.0.get()
    }

    #[inline]
    fn pointer(&self) -> Self::Pointer {
        self.0.pointer()
    }

    #[inline]
    fn increment(&mut self) {
        self.0.increment();
    }
}

impl<C: BidirectionalCursor> BidirectionalCursor for BidirectionalOnly<C> {
    #[inline]
    fn decrement(&mut self) {
        self.0.decrement();
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{RandomAccessCursor, SliceCursor, advance, distance, iterator_category, prev};

    assert_impl_all!(BidirectionalOnly<SliceCursor<'static, u8>>: BidirectionalCursor);
    assert_not_impl_any!(BidirectionalOnly<SliceCursor<'static, u8>>: RandomAccessCursor);
    assert_not_impl_any!(ForwardOnly<SliceCursor<'static, u8>>: BidirectionalCursor);

    #[test]
    fn forward_only_walks_to_the_same_answer() {
        let data = [1, 2, 3, 4, 5, 6];
        let first = ForwardOnly::new(SliceCursor::begin(&data));
        let last = ForwardOnly::new(SliceCursor::end(&data));

        assert_eq!(iterator_category(&first), ForwardIteratorTag);
        assert_eq!(distance(&first, &last), 6);

        let mut cursor = first;
        advance(&mut cursor, 2);
        assert_eq!(*cursor.get(), 3);
        assert_eq!(cursor.into_inner().index(), 2);
    }

    #[test]
    fn bidirectional_only_moves_both_ways() {
        let data = [1, 2, 3, 4];
        let last = BidirectionalOnly::new(SliceCursor::end(&data));

        let cursor = prev(&last, 3);
        assert_eq!(*cursor.get(), 2);

        let first = BidirectionalOnly::new(SliceCursor::begin(&data));
        assert_eq!(distance(&first, &last), 4);
    }
}
