use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::slice;

use tiered_alloc::{RawAlloc, TypeTraits};

use crate::{Deque, RawIter};

/// An iterator over shared references to the elements of a [`Deque`], front to back.
///
/// Jumping ahead with [`nth()`][Iterator::nth] takes constant time.
pub struct Iter<'a, T, const BUF: usize> {
    front: RawIter<T, BUF>,

    // One past the last element not yet yielded.
    back: RawIter<T, BUF>,

    remaining: usize,

    _deque: PhantomData<&'a T>,
}

impl<T, const BUF: usize> Iter<'_, T, BUF> {
    /// # Safety
    ///
    /// `[front, back)` must be the `remaining` elements of a deque that stays borrowed for the
    /// lifetime of the iterator.
    pub(crate) unsafe fn new(
        front: RawIter<T, BUF>,
        back: RawIter<T, BUF>,
        remaining: usize,
    ) -> Self {
        Self {
            front,
            back,
            remaining,
            _deque: PhantomData,
        }
    }
}

impl<'a, T, const BUF: usize> Iterator for Iter<'a, T, BUF> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let current = self.front.curr;

        // SAFETY: An element remains, so the deque's finish position (or an element) follows
        // it within allocated buffers.
        unsafe { self.front.increment() };

        // Cannot underflow because an element remained.
        self.remaining = self.remaining.wrapping_sub(1);

        // SAFETY: The position held an initialized element that the borrow keeps alive.
        Some(unsafe { &*current })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.remaining {
            self.front = self.back;
            self.remaining = 0;
            return None;
        }

        // SAFETY: The target is one of the remaining elements.
        self.front = unsafe { self.front.forward(n) };

        // Cannot underflow because n < remaining.
        self.remaining = self.remaining.wrapping_sub(n);

        self.next()
    }
}

impl<T, const BUF: usize> DoubleEndedIterator for Iter<'_, T, BUF> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        // SAFETY: An element remains before back.
        unsafe { self.back.decrement() };

        // Cannot underflow because an element remained.
        self.remaining = self.remaining.wrapping_sub(1);

        // SAFETY: The position holds an initialized element that the borrow keeps alive.
        Some(unsafe { &*self.back.curr })
    }
}

impl<T, const BUF: usize> ExactSizeIterator for Iter<'_, T, BUF> {}

impl<T, const BUF: usize> FusedIterator for Iter<'_, T, BUF> {}

impl<T, const BUF: usize> Clone for Iter<'_, T, BUF> {
    fn clone(&self) -> Self {
        Self {
            front: self.front,
            back: self.back,
            remaining: self.remaining,
            _deque: PhantomData,
        }
    }
}

impl<T, const BUF: usize> fmt::Debug for Iter<'_, T, BUF> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

// SAFETY: The iterator only hands out shared references, like `&T` would.
unsafe impl<T: Sync, const BUF: usize> Send for Iter<'_, T, BUF> {}

// SAFETY: The iterator only hands out shared references, like `&T` would.
unsafe impl<T: Sync, const BUF: usize> Sync for Iter<'_, T, BUF> {}

/// An iterator over exclusive references to the elements of a [`Deque`], front to back.
pub struct IterMut<'a, T, const BUF: usize> {
    front: RawIter<T, BUF>,
    back: RawIter<T, BUF>,
    remaining: usize,
    _deque: PhantomData<&'a mut T>,
}

impl<T, const BUF: usize> IterMut<'_, T, BUF> {
    /// # Safety
    ///
    /// `[front, back)` must be the `remaining` elements of a deque that stays exclusively
    /// borrowed for the lifetime of the iterator.
    pub(crate) unsafe fn new(
        front: RawIter<T, BUF>,
        back: RawIter<T, BUF>,
        remaining: usize,
    ) -> Self {
        Self {
            front,
            back,
            remaining,
            _deque: PhantomData,
        }
    }
}

impl<'a, T, const BUF: usize> Iterator for IterMut<'a, T, BUF> {
    type Item = &'a mut T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let current = self.front.curr;

        // SAFETY: See `Iter::next()`.
        unsafe { self.front.increment() };

        // Cannot underflow because an element remained.
        self.remaining = self.remaining.wrapping_sub(1);

        // SAFETY: The position held an initialized element. Each element is yielded once, so
        // the exclusive references never alias.
        Some(unsafe { &mut *current })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T, const BUF: usize> DoubleEndedIterator for IterMut<'_, T, BUF> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        // SAFETY: An element remains before back.
        unsafe { self.back.decrement() };

        // Cannot underflow because an element remained.
        self.remaining = self.remaining.wrapping_sub(1);

        // SAFETY: See `next()`.
        Some(unsafe { &mut *self.back.curr })
    }
}

impl<T, const BUF: usize> ExactSizeIterator for IterMut<'_, T, BUF> {}

impl<T, const BUF: usize> FusedIterator for IterMut<'_, T, BUF> {}

impl<T, const BUF: usize> fmt::Debug for IterMut<'_, T, BUF> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterMut")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

// SAFETY: The iterator hands out exclusive references, like `&mut T` would.
unsafe impl<T: Send, const BUF: usize> Send for IterMut<'_, T, BUF> {}

// SAFETY: The iterator hands out exclusive references, like `&mut T` would.
unsafe impl<T: Sync, const BUF: usize> Sync for IterMut<'_, T, BUF> {}

/// An iterator that moves the elements out of a [`Deque`], front to back.
///
/// Each element taken releases its buffer as soon as the buffer is empty.
pub struct IntoIter<T: TypeTraits, A: RawAlloc, const BUF: usize> {
    deque: Deque<T, A, BUF>,
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Iterator for IntoIter<T, A, BUF> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        self.deque.pop_front()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.deque.len();
        (len, Some(len))
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> DoubleEndedIterator for IntoIter<T, A, BUF> {
    #[inline]
    fn next_back(&mut self) -> Option<T> {
        self.deque.pop_back()
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> ExactSizeIterator for IntoIter<T, A, BUF> {}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> FusedIterator for IntoIter<T, A, BUF> {}

impl<T, A, const BUF: usize> fmt::Debug for IntoIter<T, A, BUF>
where
    T: TypeTraits + fmt::Debug,
    A: RawAlloc,
{
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntoIter").field(&self.deque).finish()
    }
}

/// An iterator over the contiguous runs of elements of a [`Deque`], one slice per buffer in
/// use.
///
/// Created by [`Deque::segments()`].
pub struct Segments<'a, T, const BUF: usize> {
    front: RawIter<T, BUF>,
    remaining: usize,
    _deque: PhantomData<&'a T>,
}

impl<T, const BUF: usize> Segments<'_, T, BUF> {
    /// # Safety
    ///
    /// The `remaining` positions from `front` on must be elements of a deque that stays
    /// borrowed for the lifetime of the iterator.
    pub(crate) unsafe fn new(front: RawIter<T, BUF>, remaining: usize) -> Self {
        Self {
            front,
            remaining,
            _deque: PhantomData,
        }
    }
}

impl<'a, T, const BUF: usize> Iterator for Segments<'a, T, BUF> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        // SAFETY: Elements remain, so the next slot owns a buffer holding them.
        unsafe { self.front.skip_exhausted_buffer() };

        let run = self.remaining.min(self.front.remaining_in_buffer());

        // SAFETY: The run lies within one buffer and holds initialized elements that the
        // borrow keeps alive.
        let segment = unsafe { slice::from_raw_parts(self.front.curr, run) };

        self.front.curr = self.front.curr.wrapping_add(run);

        // Cannot underflow because run <= remaining.
        self.remaining = self.remaining.wrapping_sub(run);

        Some(segment)
    }
}

impl<T, const BUF: usize> FusedIterator for Segments<'_, T, BUF> {}

impl<T, const BUF: usize> Clone for Segments<'_, T, BUF> {
    fn clone(&self) -> Self {
        Self {
            front: self.front,
            remaining: self.remaining,
            _deque: PhantomData,
        }
    }
}

impl<T, const BUF: usize> fmt::Debug for Segments<'_, T, BUF> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segments")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

// SAFETY: The iterator only hands out shared slices, like `&[T]` would.
unsafe impl<T: Sync, const BUF: usize> Send for Segments<'_, T, BUF> {}

// SAFETY: The iterator only hands out shared slices, like `&[T]` would.
unsafe impl<T: Sync, const BUF: usize> Sync for Segments<'_, T, BUF> {}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> IntoIterator for Deque<T, A, BUF> {
    type Item = T;
    type IntoIter = IntoIter<T, A, BUF>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { deque: self }
    }
}

impl<'a, T: TypeTraits, A: RawAlloc, const BUF: usize> IntoIterator for &'a Deque<T, A, BUF> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, BUF>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T: TypeTraits, A: RawAlloc, const BUF: usize> IntoIterator
    for &'a mut Deque<T, A, BUF>
{
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T, BUF>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use tiered_alloc::DefaultAlloc;

    use super::*;

    type Small = Deque<u32, DefaultAlloc, 4>;

    assert_impl_all!(Iter<'static, u32, 0>: Send, Sync, Clone, ExactSizeIterator);
    assert_impl_all!(IterMut<'static, u32, 0>: Send, Sync, ExactSizeIterator);
    assert_impl_all!(IterMut<'static, Cell<u32>, 0>: Send);
    assert_not_impl_any!(Iter<'static, Cell<u32>, 0>: Send, Sync);
    assert_not_impl_any!(Segments<'static, Rc<u32>, 0>: Send, Sync);
    assert_impl_all!(IntoIter<u32, DefaultAlloc, 0>: Send, Sync, DoubleEndedIterator);

    #[test]
    fn iter_both_ends() {
        let deque: Small = (0..10).collect();
        let mut iter = deque.iter();

        assert_eq!(iter.len(), 10);
        assert_eq!(iter.next(), Some(&0));
        assert_eq!(iter.next_back(), Some(&9));
        assert_eq!(iter.next_back(), Some(&8));
        assert_eq!(iter.len(), 7);

        let middle: Vec<u32> = iter.copied().collect();
        assert_eq!(middle, [1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn iter_nth_jumps() {
        let deque: Small = (0..20).collect();
        let mut iter = deque.iter();

        assert_eq!(iter.nth(5), Some(&5));
        assert_eq!(iter.nth(7), Some(&13));
        assert_eq!(iter.len(), 6);
        assert_eq!(iter.nth(6), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn iter_mut_modifies_every_element() {
        let mut deque: Small = (0..9).collect();

        for value in &mut deque {
            *value *= 10;
        }

        deque.iter_mut().rev().take(2).for_each(|value| *value += 1);

        assert_eq!(deque, [0, 10, 20, 30, 40, 50, 60, 71, 81]);
    }

    #[test]
    fn into_iter_moves_out() {
        let deque: Deque<String, DefaultAlloc, 2> =
            ["a", "b", "c", "d", "e"].map(str::to_owned).into();
        let mut iter = deque.into_iter();

        assert_eq!(iter.next().as_deref(), Some("a"));
        assert_eq!(iter.next_back().as_deref(), Some("e"));
        assert_eq!(iter.len(), 3);

        // The rest are dropped with the iterator.
        drop(iter);
    }

    #[test]
    fn segments_follow_buffers() {
        let mut deque: Small = (0..6).collect();
        deque.push_front(100);

        // The front buffer holds only its last slot; 0..6 start at a fresh buffer.
        let segments: Vec<&[u32]> = deque.segments().collect();
        assert_eq!(segments, [&[100][..], &[0, 1, 2, 3][..], &[4, 5][..]]);

        let empty = Small::new_in(DefaultAlloc);
        assert_eq!(empty.segments().next(), None);
    }
}
