//! Standard trait implementations.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::ops::{Index, IndexMut};

use tiered_alloc::{DefaultAlloc, RawAlloc, TypeTraits};

use super::TakeFrom;
use crate::Deque;

impl<T, A, const BUF: usize> Clone for Deque<T, A, BUF>
where
    T: Clone + TypeTraits,
    A: RawAlloc + Clone,
{
    fn clone(&self) -> Self {
        Self::from_exact_iter_in(self.iter().cloned(), self.alloc.clone())
    }

    /// Makes `self` equal to `source` while keeping the allocator of `self`.
    ///
    /// Existing elements are overwritten with `clone_from()`; surplus elements are dropped
    /// from the back and missing ones are cloned onto the back.
    fn clone_from(&mut self, source: &Self) {
        let len = self.len();

        for (target, value) in self.iter_mut().zip(source.iter()) {
            target.clone_from(value);
        }

        let source_len = source.len();

        if len >= source_len {
            self.truncate(source_len);
        } else {
            // Cannot underflow because source_len > len.
            self.insert_from(
                len,
                source_len.wrapping_sub(len),
                TakeFrom(source.iter().skip(len).cloned()),
            );
        }
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Index<usize> for Deque<T, A, BUF> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        let len = self.len();

        let Some(value) = self.get(index) else {
            panic!("index {index} is out of bounds for a deque of length {len}");
        };

        value
    }
}

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> IndexMut<usize> for Deque<T, A, BUF> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        let len = self.len();

        let Some(value) = self.get_mut(index) else {
            panic!("index {index} is out of bounds for a deque of length {len}");
        };

        value
    }
}

impl<T, U, A, A2, const BUF: usize, const BUF2: usize> PartialEq<Deque<U, A2, BUF2>>
    for Deque<T, A, BUF>
where
    T: PartialEq<U> + TypeTraits,
    U: TypeTraits,
    A: RawAlloc,
    A2: RawAlloc,
{
    fn eq(&self, other: &Deque<U, A2, BUF2>) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<T: Eq + TypeTraits, A: RawAlloc, const BUF: usize> Eq for Deque<T, A, BUF> {}

impl<T, U, A, const BUF: usize> PartialEq<[U]> for Deque<T, A, BUF>
where
    T: PartialEq<U> + TypeTraits,
    A: RawAlloc,
{
    fn eq(&self, other: &[U]) -> bool {
        self.len() == other.len() && self.iter().eq(other)
    }
}

impl<T, U, A, const BUF: usize> PartialEq<&[U]> for Deque<T, A, BUF>
where
    T: PartialEq<U> + TypeTraits,
    A: RawAlloc,
{
    fn eq(&self, other: &&[U]) -> bool {
        *self == **other
    }
}

impl<T, U, A, const BUF: usize, const N: usize> PartialEq<[U; N]> for Deque<T, A, BUF>
where
    T: PartialEq<U> + TypeTraits,
    A: RawAlloc,
{
    fn eq(&self, other: &[U; N]) -> bool {
        *self == *other.as_slice()
    }
}

impl<T, U, A, const BUF: usize> PartialEq<Vec<U>> for Deque<T, A, BUF>
where
    T: PartialEq<U> + TypeTraits,
    A: RawAlloc,
{
    fn eq(&self, other: &Vec<U>) -> bool {
        *self == *other.as_slice()
    }
}

impl<T: PartialOrd + TypeTraits, A: RawAlloc, const BUF: usize> PartialOrd for Deque<T, A, BUF> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}

impl<T: Ord + TypeTraits, A: RawAlloc, const BUF: usize> Ord for Deque<T, A, BUF> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<T: Hash + TypeTraits, A: RawAlloc, const BUF: usize> Hash for Deque<T, A, BUF> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());

        for value in self {
            value.hash(state);
        }
    }
}

/// Appends the values of the iterator.
///
/// The values are inserted as one batch: if the iterator panics, the deque keeps its previous
/// contents.
impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Extend<T> for Deque<T, A, BUF> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let len = self.len();
        self.insert_iter(len, iter);
    }
}

impl<'a, T, A, const BUF: usize> Extend<&'a T> for Deque<T, A, BUF>
where
    T: Copy + TypeTraits + 'a,
    A: RawAlloc,
{
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

impl<T: TypeTraits, const BUF: usize> FromIterator<T> for Deque<T, DefaultAlloc, BUF> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut deque = Self::new_in(DefaultAlloc);
        deque.extend(iter);
        deque
    }
}

impl<T: TypeTraits, const BUF: usize, const N: usize> From<[T; N]> for Deque<T, DefaultAlloc, BUF> {
    fn from(values: [T; N]) -> Self {
        Self::from_exact_iter_in(values.into_iter(), DefaultAlloc)
    }
}

impl<T: TypeTraits, const BUF: usize> From<Vec<T>> for Deque<T, DefaultAlloc, BUF> {
    fn from(values: Vec<T>) -> Self {
        Self::from_exact_iter_in(values.into_iter(), DefaultAlloc)
    }
}

impl<T: TypeTraits, A: RawAlloc + Default, const BUF: usize> Default for Deque<T, A, BUF> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::hash::DefaultHasher;

    use tiered_alloc::{PoolAllocator, PoolHandle};

    use super::*;

    type Small<T> = Deque<T, DefaultAlloc, 4>;

    fn hash_of(value: &impl Hash) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn clone_is_deep_and_independent() {
        let original: Small<String> = (0..9).map(|i| i.to_string()).collect();
        let mut copy = original.clone();

        copy[0].push('!');
        copy.push_back("extra".to_owned());

        assert_eq!(original.len(), 9);
        assert_eq!(original[0], "0");
        assert_eq!(copy[0], "0!");
        assert_eq!(copy.len(), 10);
    }

    #[test]
    fn clone_keeps_the_allocator() {
        let pool = PoolHandle::new(PoolAllocator::new());
        let original = Deque::<u32, _>::from_slice_in(&[1, 2, 3], pool.clone());

        let copy = original.clone();

        assert!(copy.allocator().same_pool(&pool));
        assert_eq!(copy, original);
    }

    #[test]
    fn clone_from_shrinks_and_grows() {
        let long: Small<u32> = (0..13).collect();
        let short: Small<u32> = (100..103).collect();

        let mut target = long.clone();
        target.clone_from(&short);
        assert_eq!(target, short);

        target.clone_from(&long);
        assert_eq!(target, long);
    }

    #[test]
    fn equality_ignores_buffer_size() {
        let small: Small<u32> = (0..10).collect();
        let large: Deque<u32> = (0..10).collect();

        assert_eq!(small, large);
        assert_eq!(hash_of(&small), hash_of(&large));

        let shorter: Deque<u32> = (0..9).collect();
        assert_ne!(small, shorter);
    }

    #[test]
    fn comparisons_with_std_sequences() {
        let deque: Deque<u32> = Deque::from([1, 2, 3]);

        assert_eq!(deque, [1, 2, 3]);
        assert_eq!(deque, vec![1, 2, 3]);
        assert_eq!(deque, &[1, 2, 3][..]);
        assert_ne!(deque, [1, 2]);
        assert_ne!(deque, [1, 2, 4]);
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a: Deque<u32> = Deque::from([1, 2, 3]);
        let b: Deque<u32> = Deque::from([1, 3]);
        let c: Deque<u32> = Deque::from([1, 2]);

        assert!(a < b);
        assert!(c < a);
        assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Less));
    }

    #[test]
    fn hash_includes_the_length() {
        let empty_inner: Deque<Vec<u8>> = Deque::from([Vec::new()]);
        let empty: Deque<Vec<u8>> = Deque::new();

        assert_ne!(hash_of(&empty_inner), hash_of(&empty));
    }

    #[test]
    fn extend_appends_in_order() {
        let mut deque: Small<u32> = Deque::from(vec![1, 2]);

        deque.extend([3, 4, 5]);
        deque.extend(&[6, 7]);
        deque.extend((8..20).filter(|v| *v < 10));

        assert_eq!(deque, [1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    #[should_panic]
    fn index_out_of_bounds_panics() {
        let deque: Deque<u32> = Deque::from([1, 2, 3]);
        assert_eq!(deque[3], 0);
    }

    #[test]
    fn index_mut_writes_through() {
        let mut deque: Small<u32> = (0..8).collect();
        deque[6] = 60;

        assert_eq!(deque.get(6), Some(&60));
    }

    #[test]
    fn default_is_empty() {
        let deque = Deque::<u32, PoolHandle>::default();

        assert!(deque.is_empty());
        assert_eq!(format!("{deque:?}"), "[]");
    }
}
