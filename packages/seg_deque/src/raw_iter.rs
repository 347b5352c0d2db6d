use std::cmp::Ordering;
use std::fmt;
use std::ptr;

use num_integer::Integer;

use crate::buffer_size;

/// A position in a deque: the current slot plus the bounds of its buffer and the map slot that
/// owns the buffer.
///
/// `first` and `last` are always derived from `node` by [`set_node()`][Self::set_node], so
/// moving to another buffer is one step. Pointer arithmetic wraps; a position is only ever
/// dereferenced by the deque while it lies within `[start, finish)`.
pub(crate) struct RawIter<T, const BUF: usize> {
    pub(crate) curr: *mut T,
    pub(crate) first: *mut T,
    pub(crate) last: *mut T,
    pub(crate) node: *mut *mut T,
}

impl<T, const BUF: usize> RawIter<T, BUF> {
    /// Elements per buffer.
    pub(crate) const BUFFER_SIZE: usize = buffer_size(BUF, size_of::<T>());

    #[allow(
        clippy::cast_possible_wrap,
        reason = "a buffer is one allocation, which never exceeds isize::MAX elements"
    )]
    const BUFFER_SPAN: isize = Self::BUFFER_SIZE as isize;

    /// A position at the first slot of the buffer owned by `node`.
    ///
    /// # Safety
    ///
    /// `node` must point to a slot of a live map.
    #[must_use]
    pub(crate) unsafe fn at_node_start(node: *mut *mut T) -> Self {
        let mut iter = Self {
            curr: ptr::null_mut(),
            first: ptr::null_mut(),
            last: ptr::null_mut(),
            node,
        };

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { iter.set_node(node) };
        iter.curr = iter.first;
        iter
    }

    /// Moves to the buffer owned by `node`, leaving `curr` untouched.
    ///
    /// # Safety
    ///
    /// `node` must point to a slot of a live map.
    #[inline]
    pub(crate) unsafe fn set_node(&mut self, node: *mut *mut T) {
        self.node = node;
        // SAFETY: Forwarding safety requirements to the caller.
        self.first = unsafe { node.read() };
        self.last = self.first.wrapping_add(Self::BUFFER_SIZE);
    }

    /// The number of slots between the start of the buffer and `curr`.
    #[inline]
    #[allow(clippy::integer_division, reason = "exact, addresses are whole slots apart")]
    pub(crate) fn offset_in_buffer(&self) -> usize {
        // Cannot underflow because curr never precedes first.
        (self.curr.addr().wrapping_sub(self.first.addr())) / size_of::<T>()
    }

    /// The number of slots from `curr` to the end of the buffer.
    #[inline]
    pub(crate) fn remaining_in_buffer(&self) -> usize {
        Self::BUFFER_SIZE.wrapping_sub(self.offset_in_buffer())
    }

    /// If `curr` sits at the end of its buffer, moves to the first slot of the next buffer.
    ///
    /// # Safety
    ///
    /// If `curr` is at the end of its buffer, the next map slot must own a buffer.
    #[inline]
    pub(crate) unsafe fn skip_exhausted_buffer(&mut self) {
        if self.curr == self.last {
            // SAFETY: Forwarding safety requirements to the caller.
            unsafe { self.set_node(self.node.wrapping_add(1)) };
            self.curr = self.first;
        }
    }

    /// If `curr` sits at the start of its buffer, moves to the end of the previous buffer, so
    /// that the slots just before `curr` are in the same buffer.
    ///
    /// # Safety
    ///
    /// If `curr` is at the start of its buffer, the previous map slot must own a buffer.
    #[inline]
    pub(crate) unsafe fn enter_previous_buffer_at_start(&mut self) {
        if self.curr == self.first {
            // SAFETY: Forwarding safety requirements to the caller.
            unsafe { self.set_node(self.node.wrapping_sub(1)) };
            self.curr = self.last;
        }
    }

    /// Moves one position forward.
    ///
    /// # Safety
    ///
    /// If `curr` is the last slot of its buffer, the next map slot must be part of the map.
    #[inline]
    pub(crate) unsafe fn increment(&mut self) {
        self.curr = self.curr.wrapping_add(1);

        if self.curr == self.last {
            // SAFETY: Forwarding safety requirements to the caller.
            unsafe { self.set_node(self.node.wrapping_add(1)) };
            self.curr = self.first;
        }
    }

    /// Moves one position backward.
    ///
    /// # Safety
    ///
    /// If `curr` is the first slot of its buffer, the previous map slot must be part of the
    /// map.
    #[inline]
    pub(crate) unsafe fn decrement(&mut self) {
        if self.curr == self.first {
            // SAFETY: Forwarding safety requirements to the caller.
            unsafe { self.set_node(self.node.wrapping_sub(1)) };
            self.curr = self.last;
        }

        self.curr = self.curr.wrapping_sub(1);
    }

    /// Moves by `n` positions in constant time, backward if `n` is negative.
    ///
    /// # Safety
    ///
    /// Every map slot between the current one and the target one must be part of the map.
    pub(crate) unsafe fn offset(&mut self, n: isize) {
        // Cannot overflow because offsets are bounded by the element count of the deque.
        let position = n.wrapping_add(signed(self.offset_in_buffer()));

        if (0..Self::BUFFER_SPAN).contains(&position) {
            self.curr = self.curr.wrapping_offset(n);
            return;
        }

        let node_offset = Integer::div_floor(&position, &Self::BUFFER_SPAN);

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.set_node(self.node.wrapping_offset(node_offset)) };

        // Cannot overflow because the result is in 0..BUFFER_SPAN.
        let within = position.wrapping_sub(node_offset.wrapping_mul(Self::BUFFER_SPAN));
        self.curr = self.first.wrapping_offset(within);
    }

    /// A copy moved by `n` positions.
    ///
    /// # Safety
    ///
    /// See [`offset()`][Self::offset].
    #[must_use]
    #[inline]
    pub(crate) unsafe fn plus(mut self, n: isize) -> Self {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.offset(n) };
        self
    }

    /// A copy moved forward by `n` positions.
    ///
    /// # Safety
    ///
    /// See [`offset()`][Self::offset].
    #[must_use]
    #[inline]
    pub(crate) unsafe fn forward(self, n: usize) -> Self {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.plus(signed(n)) }
    }

    /// A copy moved backward by `n` positions.
    ///
    /// # Safety
    ///
    /// See [`offset()`][Self::offset].
    #[must_use]
    #[inline]
    pub(crate) unsafe fn backward(self, n: usize) -> Self {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.plus(signed(n).wrapping_neg()) }
    }

    /// The number of positions from `origin` to `self`, negative if `self` comes first.
    ///
    /// Both positions must belong to the same map.
    #[allow(clippy::integer_division, reason = "exact, map slots are whole pointers apart")]
    pub(crate) fn distance_from(&self, origin: &Self) -> isize {
        #[allow(
            clippy::cast_possible_wrap,
            reason = "the wrapped address difference is reinterpreted as signed on purpose"
        )]
        let bytes_between = self.node.addr().wrapping_sub(origin.node.addr()) as isize;
        let nodes_between = bytes_between / signed(size_of::<*mut T>());

        // Cannot overflow because the result is bounded by the element count of the deque.
        Self::BUFFER_SPAN
            .wrapping_mul(nodes_between.wrapping_sub(1))
            .wrapping_add(signed(self.offset_in_buffer()))
            .wrapping_add(signed(origin.remaining_in_buffer()))
    }
}

#[inline]
fn signed(count: usize) -> isize {
    isize::try_from(count).expect("in-memory counts never exceed isize::MAX")
}

impl<T, const BUF: usize> Clone for RawIter<T, BUF> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, const BUF: usize> Copy for RawIter<T, BUF> {}

impl<T, const BUF: usize> PartialEq for RawIter<T, BUF> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.curr == other.curr
    }
}

impl<T, const BUF: usize> Eq for RawIter<T, BUF> {}

impl<T, const BUF: usize> PartialOrd for RawIter<T, BUF> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, const BUF: usize> Ord for RawIter<T, BUF> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        if self.node == other.node {
            self.curr.cmp(&other.curr)
        } else {
            self.node.cmp(&other.node)
        }
    }
}

impl<T, const BUF: usize> fmt::Debug for RawIter<T, BUF> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawIter")
            .field("node", &self.node)
            .field("offset_in_buffer", &self.offset_in_buffer())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use super::*;

    // Four buffers of four slots each, behind a map with a spare slot on both sides.
    struct Fixture {
        buffers: Vec<[u32; 4]>,
        map: Vec<*mut u32>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut buffers: Vec<[u32; 4]> = (0..4_u32)
                .map(|b| [b * 4, b * 4 + 1, b * 4 + 2, b * 4 + 3])
                .collect();

            let mut map = vec![ptr::null_mut(); 6];
            for (slot, buffer) in map[1..5].iter_mut().zip(buffers.iter_mut()) {
                *slot = buffer.as_mut_ptr();
            }

            Self { buffers, map }
        }

        fn begin(&mut self) -> RawIter<u32, 4> {
            // SAFETY: Slot 1 is part of the map.
            unsafe { RawIter::at_node_start(self.map.as_mut_ptr().add(1)) }
        }
    }

    fn read(iter: &RawIter<u32, 4>) -> u32 {
        // SAFETY: Tests only read positions inside the fixture buffers.
        unsafe { *iter.curr }
    }

    #[test]
    fn increment_crosses_buffers() {
        let mut fixture = Fixture::new();
        let mut iter = fixture.begin();

        for expected in 0..16 {
            assert_eq!(read(&iter), expected);
            // SAFETY: The walk stays within slots 1..=5 of the map.
            unsafe { iter.increment() };
        }

        assert_eq!(fixture.buffers.len(), 4);
    }

    #[test]
    fn decrement_crosses_buffers() {
        let mut fixture = Fixture::new();

        // SAFETY: Position 15 is the last slot of the last buffer.
        let mut iter = unsafe { fixture.begin().forward(15) };

        for expected in (0..16).rev() {
            assert_eq!(read(&iter), expected);

            if expected > 0 {
                // SAFETY: The walk stays within the buffers.
                unsafe { iter.decrement() };
            }
        }
    }

    #[test]
    fn offset_jumps_in_both_directions() {
        let mut fixture = Fixture::new();
        let begin = fixture.begin();

        for target in 0..16 {
            // SAFETY: Every target is inside the buffers.
            let iter = unsafe { begin.forward(target) };
            assert_eq!(read(&iter), u32::try_from(target).unwrap());

            for back in 0..=target {
                // SAFETY: Moving back at most to position 0.
                let earlier = unsafe { iter.backward(back) };
                assert_eq!(read(&earlier), u32::try_from(target - back).unwrap());
            }
        }
    }

    #[test]
    fn distance_matches_offset() {
        let mut fixture = Fixture::new();
        let begin = fixture.begin();

        for a in 0..16 {
            for b in 0..16 {
                // SAFETY: Both positions are inside the buffers.
                let (x, y) = unsafe { (begin.forward(a), begin.forward(b)) };
                let expected = isize::try_from(b).unwrap() - isize::try_from(a).unwrap();
                assert_eq!(y.distance_from(&x), expected);
            }
        }
    }

    #[test]
    fn ordering_follows_position() {
        let mut fixture = Fixture::new();
        let begin = fixture.begin();

        // SAFETY: Both positions are inside the buffers.
        let (three, nine) = unsafe { (begin.forward(3), begin.forward(9)) };

        assert!(three < nine);
        assert!(nine > begin);

        // SAFETY: Position 3 is inside the first buffer.
        assert_eq!(three, unsafe { begin.plus(3) });
    }
}
