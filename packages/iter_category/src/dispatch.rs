use num_traits::{CheckedAdd, One, Zero};

use crate::{
    BidirectionalCursor, BidirectionalIteratorTag, Cursor, ForwardIteratorTag, InputIteratorTag,
    RandomAccessCursor, RandomAccessIteratorTag,
};

/// The distance and advance strategies a category provides for cursor type `C`.
///
/// Input and forward cursors walk step by step and only move forward. Bidirectional cursors
/// walk in either direction. Random access cursors jump in one step. The output category has
/// no strategy because an output cursor cannot be compared or read.
///
/// Call these through [`distance()`] and [`advance()`], which pick the implementation from
/// the cursor's [`Category`][Cursor::Category].
pub trait CategoryDispatch<C: Cursor> {
    /// Number of increments needed to move from `first` to `last`.
    fn distance(first: &C, last: &C) -> C::Difference;

    /// Moves `cursor` by `n` positions.
    fn advance(cursor: &mut C, n: C::Difference);
}

impl<C: Cursor> CategoryDispatch<C> for InputIteratorTag {
    #[inline]
    fn distance(first: &C, last: &C) -> C::Difference {
        walk_distance(first, last)
    }

    #[inline]
    fn advance(cursor: &mut C, n: C::Difference) {
        walk_forward(cursor, n);
    }
}

impl<C: Cursor> CategoryDispatch<C> for ForwardIteratorTag {
    #[inline]
    fn distance(first: &C, last: &C) -> C::Difference {
        walk_distance(first, last)
    }

    #[inline]
    fn advance(cursor: &mut C, n: C::Difference) {
        walk_forward(cursor, n);
    }
}

impl<C: BidirectionalCursor> CategoryDispatch<C> for BidirectionalIteratorTag {
    #[inline]
    fn distance(first: &C, last: &C) -> C::Difference {
        walk_distance(first, last)
    }

    fn advance(cursor: &mut C, n: C::Difference) {
        if n >= C::Difference::zero() {
            walk_forward(cursor, n);
        } else {
            let mut remaining = n;

            while remaining < C::Difference::zero() {
                cursor.decrement();
                // Cannot overflow because remaining is negative.
                remaining = remaining + C::Difference::one();
            }
        }
    }
}

impl<C: RandomAccessCursor> CategoryDispatch<C> for RandomAccessIteratorTag {
    #[inline]
    fn distance(first: &C, last: &C) -> C::Difference {
        last.difference(first)
    }

    #[inline]
    fn advance(cursor: &mut C, n: C::Difference) {
        cursor.offset(n);
    }
}

fn walk_distance<C: Cursor>(first: &C, last: &C) -> C::Difference {
    let mut cursor = first.clone();
    let mut n = C::Difference::zero();

    while cursor != *last {
        cursor.increment();
        n = n
            .checked_add(&C::Difference::one())
            .expect("distance exceeds the range of the cursor's difference type");
    }

    n
}

fn walk_forward<C: Cursor>(cursor: &mut C, n: C::Difference) {
    debug_assert!(
        n >= C::Difference::zero(),
        "input and forward cursors cannot move backward"
    );

    let mut remaining = n;

    while remaining > C::Difference::zero() {
        cursor.increment();
        // Cannot overflow because remaining is positive.
        remaining = remaining - C::Difference::one();
    }
}

/// The number of increments needed to move from `first` to `last`.
///
/// Random access cursors answer in constant time; all others walk from `first` until they
/// reach `last`, which must be reachable.
///
/// # Example
///
/// ```rust
/// use iter_category::{SliceCursor, distance};
///
/// let data = [1, 2, 3, 4];
/// let first = SliceCursor::begin(&data);
/// let last = SliceCursor::end(&data);
///
/// assert_eq!(distance(&first, &last), 4);
/// ```
#[inline]
pub fn distance<C>(first: &C, last: &C) -> C::Difference
where
    C: Cursor,
    C::Category: CategoryDispatch<C>,
{
    <C::Category as CategoryDispatch<C>>::distance(first, last)
}

/// Moves `cursor` by `n` positions.
///
/// Negative `n` is only meaningful for bidirectional and random access cursors; passing one
/// for a weaker cursor is a contract violation caught by a debug assertion.
#[inline]
pub fn advance<C>(cursor: &mut C, n: C::Difference)
where
    C: Cursor,
    C::Category: CategoryDispatch<C>,
{
    <C::Category as CategoryDispatch<C>>::advance(cursor, n);
}

/// A copy of `cursor` moved forward by `n` positions.
#[must_use]
#[inline]
pub fn next<C>(cursor: &C, n: C::Difference) -> C
where
    C: Cursor,
    C::Category: CategoryDispatch<C>,
{
    let mut moved = cursor.clone();
    advance(&mut moved, n);
    moved
}

/// A copy of `cursor` moved backward by `n` positions.
#[must_use]
#[inline]
pub fn prev<C>(cursor: &C, n: C::Difference) -> C
where
    C: BidirectionalCursor,
    C::Category: CategoryDispatch<C>,
{
    let mut moved = cursor.clone();
    advance(&mut moved, -n);
    moved
}

/// The category tag of `cursor`, for selecting an algorithm variant by overload.
#[must_use]
#[inline]
pub fn iterator_category<C: Cursor>(_cursor: &C) -> C::Category {
    C::Category::default()
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::marker::PhantomData;
    use std::rc::Rc;

    use super::*;
    use crate::{
        BidirectionalCategory, ForwardCategory, IteratorCategory, RandomAccessCategory,
        SliceCursor,
    };

    #[derive(Debug, Default)]
    struct Steps {
        increments: Cell<usize>,
        decrements: Cell<usize>,
    }

    // Wraps a slice cursor, counts single steps and claims the category `Tag`.
    #[derive(Debug)]
    struct Counting<'a, Tag> {
        inner: SliceCursor<'a, u32>,
        steps: Rc<Steps>,
        _tag: PhantomData<Tag>,
    }

    impl<'a, Tag> Counting<'a, Tag> {
        fn new(inner: SliceCursor<'a, u32>, steps: &Rc<Steps>) -> Self {
            Self {
                inner,
                steps: Rc::clone(steps),
                _tag: PhantomData,
            }
        }
    }

    impl<Tag> Clone for Counting<'_, Tag> {
        fn clone(&self) -> Self {
            Self::new(self.inner, &self.steps)
        }
    }

    impl<Tag> PartialEq for Counting<'_, Tag> {
        fn eq(&self, other: &Self) -> bool {
            self.inner == other.inner
        }
    }

    impl<'a, Tag: IteratorCategory> Cursor for Counting<'a, Tag> {
        type Category = Tag;
        type Value = u32;
        type Difference = isize;
        type Pointer = *const u32;
        type Reference = &'a u32;

        fn get(&self) -> &'a u32 {
            self.inner.get()
        }

        fn pointer(&self) -> *const u32 {
            self.inner.pointer()
        }

        fn increment(&mut self) {
            self.steps.increments.set(self.steps.increments.get() + 1);
            self.inner.increment();
        }
    }

    impl<Tag: BidirectionalCategory> BidirectionalCursor for Counting<'_, Tag> {
        fn decrement(&mut self) {
            self.steps.decrements.set(self.steps.decrements.get() + 1);
            self.inner.decrement();
        }
    }

    impl<Tag: RandomAccessCategory> RandomAccessCursor for Counting<'_, Tag> {
        fn offset(&mut self, n: isize) {
            self.inner.offset(n);
        }

        fn difference(&self, origin: &Self) -> isize {
            self.inner.difference(&origin.inner)
        }
    }

    static DATA: [u32; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];

    fn cursors<Tag>(steps: &Rc<Steps>) -> (Counting<'static, Tag>, Counting<'static, Tag>) {
        (
            Counting::new(SliceCursor::begin(&DATA), steps),
            Counting::new(SliceCursor::end(&DATA), steps),
        )
    }

    #[test]
    fn forward_distance_walks() {
        let steps = Rc::new(Steps::default());
        let (first, last) = cursors::<ForwardIteratorTag>(&steps);

        assert_eq!(distance(&first, &last), 10);
        assert_eq!(steps.increments.get(), 10);
    }

    #[test]
    fn input_advance_walks() {
        let steps = Rc::new(Steps::default());
        let (mut first, _) = cursors::<InputIteratorTag>(&steps);

        advance(&mut first, 7);

        assert_eq!(*first.get(), 7);
        assert_eq!(steps.increments.get(), 7);
    }

    #[test]
    fn bidirectional_advance_walks_backward() {
        let steps = Rc::new(Steps::default());
        let (_, mut last) = cursors::<BidirectionalIteratorTag>(&steps);

        advance(&mut last, -3);

        assert_eq!(*last.get(), 7);
        assert_eq!(steps.decrements.get(), 3);
        assert_eq!(steps.increments.get(), 0);
    }

    #[test]
    fn random_access_jumps() {
        let steps = Rc::new(Steps::default());
        let (mut first, last) = cursors::<RandomAccessIteratorTag>(&steps);

        assert_eq!(distance(&first, &last), 10);
        assert_eq!(distance(&last, &first), -10);

        advance(&mut first, 6);
        assert_eq!(*first.get(), 6);

        advance(&mut first, -4);
        assert_eq!(*first.get(), 2);

        assert_eq!(steps.increments.get(), 0);
        assert_eq!(steps.decrements.get(), 0);
    }

    fn advance_matches_distance<Tag>()
    where
        Tag: ForwardCategory,
        Tag: CategoryDispatch<Counting<'static, Tag>>,
    {
        let steps = Rc::new(Steps::default());
        let (first, _) = cursors::<Tag>(&steps);

        for target in 0..=DATA.len() {
            let to = Counting::new(SliceCursor::at(&DATA, target), &steps);
            let n = distance(&first, &to);

            assert_eq!(n, isize::try_from(target).unwrap());
            assert!(next(&first, n) == to);
        }
    }

    #[test]
    fn advance_and_distance_agree_in_every_category() {
        advance_matches_distance::<ForwardIteratorTag>();
        advance_matches_distance::<BidirectionalIteratorTag>();
        advance_matches_distance::<RandomAccessIteratorTag>();
    }

    #[test]
    fn prev_moves_backward() {
        let steps = Rc::new(Steps::default());
        let (_, last) = cursors::<BidirectionalIteratorTag>(&steps);

        let moved = prev(&last, 4);

        assert_eq!(*moved.get(), 6);
        assert!(last == Counting::new(SliceCursor::end(&DATA), &steps));
    }

    #[test]
    fn category_of_cursor() {
        let steps = Rc::new(Steps::default());
        let (first, _) = cursors::<ForwardIteratorTag>(&steps);

        assert_eq!(iterator_category(&first), ForwardIteratorTag);
        assert_eq!(
            iterator_category(&SliceCursor::begin(&DATA)),
            RandomAccessIteratorTag
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn forward_cursor_cannot_move_backward() {
        let steps = Rc::new(Steps::default());
        let (_, mut last) = cursors::<ForwardIteratorTag>(&steps);

        advance(&mut last, -1);
    }
}
