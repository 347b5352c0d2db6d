//! Management of the map: the central array of buffer pointers.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use num_integer::Integer;
use tiered_alloc::{Allocator, RawAlloc, TypeTraits};
use tracing::{debug, trace};

use crate::buffer::INITIAL_MAP_SIZE;
use crate::{Deque, RawIter};

impl<T: TypeTraits, A: RawAlloc, const BUF: usize> Deque<T, A, BUF> {
    /// An empty deque whose map has room for `element_count` elements without reallocating.
    ///
    /// Only the buffer under the start position is allocated. The used part of the map sits in
    /// the middle so that the deque can grow at both ends.
    #[allow(clippy::integer_division, reason = "we want whole buffers and a rounded-down middle")]
    pub(super) fn with_map_for(element_count: usize, alloc: A) -> Self {
        // Cannot overflow because element_count is bounded by what fits in memory.
        let node_count = (element_count / Self::BUFFER_SIZE).wrapping_add(1);
        let map_size = INITIAL_MAP_SIZE.max(node_count.wrapping_add(2));

        let map = Allocator::<*mut T, &A>::with_raw(&alloc).allocate(map_size);

        for index in 0..map_size {
            // SAFETY: The map was just allocated with map_size slots.
            unsafe { map.add(index).write(ptr::null_mut()) };
        }

        // Cannot underflow because map_size exceeds node_count by at least two.
        let start_index = map_size.wrapping_sub(node_count) / 2;

        // SAFETY: start_index is within the map.
        let start_node = unsafe { map.add(start_index) }.as_ptr();

        let buffer = Allocator::<T, &A>::with_raw(&alloc)
            .allocate(Self::BUFFER_SIZE)
            .as_ptr();

        // SAFETY: start_node is a slot of the map.
        unsafe { start_node.write(buffer) };

        // SAFETY: The slot now owns a buffer.
        let start = unsafe { RawIter::at_node_start(start_node) };

        Self {
            start,
            finish: start,
            map,
            map_size,
            alloc,
            _owns: PhantomData,
        }
    }

    #[inline]
    pub(super) fn node_allocator(&self) -> Allocator<T, &A> {
        Allocator::with_raw(&self.alloc)
    }

    #[inline]
    pub(super) fn map_allocator(&self) -> Allocator<*mut T, &A> {
        Allocator::with_raw(&self.alloc)
    }

    /// Allocates one uninitialized buffer.
    #[inline]
    pub(super) fn allocate_node(&self) -> *mut T {
        self.node_allocator().allocate(Self::BUFFER_SIZE).as_ptr()
    }

    /// Releases the buffers owned by the map slots in `[from, to)` and clears the slots.
    ///
    /// The buffers must hold no live elements.
    pub(super) fn release_nodes(&self, from: *mut *mut T, to: *mut *mut T) {
        let allocator = self.node_allocator();
        let mut node = from;

        while node < to {
            // SAFETY: The caller passes slots of our map that own buffers.
            let buffer = unsafe { node.replace(ptr::null_mut()) };

            let buffer = NonNull::new(buffer).expect("released map slots always own a buffer");

            // SAFETY: The buffer came from this allocator with this size and holds no values.
            unsafe { allocator.deallocate(buffer, Self::BUFFER_SIZE) };

            node = node.wrapping_add(1);
        }
    }

    /// The index of `node` within the map.
    #[allow(clippy::integer_division, reason = "exact, map slots are whole pointers apart")]
    fn slot_index(&self, node: *mut *mut T) -> usize {
        // Cannot underflow because every node we track is within the map.
        node.addr().wrapping_sub(self.map.as_ptr().addr()) / size_of::<*mut T>()
    }

    /// The number of map slots from `start.node` to `finish.node`, both included.
    fn used_nodes(&self) -> usize {
        // Cannot overflow because both nodes are within the map and finish never precedes start.
        self.slot_index(self.finish.node)
            .wrapping_sub(self.slot_index(self.start.node))
            .wrapping_add(1)
    }

    /// Makes sure the map has `nodes_to_add` free slots after `finish.node`.
    pub(super) fn reserve_map_at_back(&mut self, nodes_to_add: usize) {
        // Cannot overflow because finish.node is a slot of the map.
        let free_after = self
            .map_size
            .wrapping_sub(self.slot_index(self.finish.node))
            .wrapping_sub(1);

        if nodes_to_add > free_after {
            self.reallocate_map(nodes_to_add, false);
        }
    }

    /// Makes sure the map has `nodes_to_add` free slots before `start.node`.
    pub(super) fn reserve_map_at_front(&mut self, nodes_to_add: usize) {
        if nodes_to_add > self.slot_index(self.start.node) {
            self.reallocate_map(nodes_to_add, true);
        }
    }

    /// Makes room for `nodes_to_add` more slots at one end of the used part of the map.
    ///
    /// If the map is more than twice as large as what is needed, the used slots are moved to
    /// the middle of the existing map. Otherwise a larger map is allocated. The positions of
    /// the elements in their buffers do not change either way.
    #[allow(clippy::integer_division, reason = "we want a rounded-down middle")]
    fn reallocate_map(&mut self, nodes_to_add: usize, add_at_front: bool) {
        let old_nodes = self.used_nodes();

        let new_nodes = old_nodes
            .checked_add(nodes_to_add)
            .expect("deque map size overflows usize");

        let front_gap = if add_at_front { nodes_to_add } else { 0 };

        let needed_twice = new_nodes.checked_mul(2).unwrap_or(usize::MAX);

        let new_start = if self.map_size > needed_twice {
            // Cannot overflow because the map holds more than twice new_nodes slots.
            let start_index = (self.map_size.wrapping_sub(new_nodes) / 2).wrapping_add(front_gap);

            // SAFETY: start_index plus old_nodes stays within the map.
            let new_start = unsafe { self.map.add(start_index) }.as_ptr();

            // SAFETY: Both ranges lie within the map; `copy` allows them to overlap.
            unsafe { ptr::copy(self.start.node, new_start, old_nodes) };

            self.clear_vacated_slots(new_start, old_nodes);

            trace!(
                map_size = self.map_size,
                used = old_nodes,
                nodes_to_add,
                "recentered deque map"
            );

            new_start
        } else {
            let new_map_size = self
                .map_size
                .checked_add(self.map_size.max(nodes_to_add))
                .and_then(|size| size.checked_add(2))
                .expect("deque map size overflows usize");

            let new_map = self.map_allocator().allocate(new_map_size);

            for index in 0..new_map_size {
                // SAFETY: The map was just allocated with new_map_size slots.
                unsafe { new_map.add(index).write(ptr::null_mut()) };
            }

            // Cannot overflow because the new map holds more than new_nodes slots.
            let start_index = (new_map_size.wrapping_sub(new_nodes) / 2).wrapping_add(front_gap);

            // SAFETY: start_index plus old_nodes stays within the new map.
            let new_start = unsafe { new_map.add(start_index) }.as_ptr();

            // SAFETY: The old slots are valid and the new map is a separate allocation.
            unsafe { ptr::copy_nonoverlapping(self.start.node, new_start, old_nodes) };

            // SAFETY: The old map came from this allocator with this size.
            unsafe { self.map_allocator().deallocate(self.map, self.map_size) };

            debug!(
                old_map_size = self.map_size,
                new_map_size, "grew deque map"
            );

            self.map = new_map;
            self.map_size = new_map_size;

            new_start
        };

        // Cannot overflow because old_nodes is at least one.
        let new_finish = new_start.wrapping_add(old_nodes.wrapping_sub(1));

        // SAFETY: Both slots own the buffers that start and finish were in.
        unsafe {
            self.start.set_node(new_start);
            self.finish.set_node(new_finish);
        }
    }

    // After moving the used slots to `new_start` within the same map, nulls the slots that
    // were used before and are not any longer.
    fn clear_vacated_slots(&self, new_start: *mut *mut T, used: usize) {
        let old_first = self.slot_index(self.start.node);
        let new_first = self.slot_index(new_start);

        for index in old_first..old_first.wrapping_add(used) {
            let still_used = (new_first..new_first.wrapping_add(used)).contains(&index);

            if !still_used {
                // SAFETY: The index is within the map.
                unsafe { self.map.add(index).write(ptr::null_mut()) };
            }
        }
    }

    /// Makes sure `n` slots before the first element are backed by buffers and returns the
    /// position `n` slots before the first element.
    ///
    /// `start` is not moved; the new buffers are owned by map slots before `start.node`.
    pub(super) fn reserve_elements_at_front(&mut self, n: usize) -> RawIter<T, BUF> {
        let vacancies = self.start.offset_in_buffer();

        if n > vacancies {
            // Cannot underflow because n exceeds vacancies.
            let new_nodes = Integer::div_ceil(&n.wrapping_sub(vacancies), &Self::BUFFER_SIZE);
            self.reserve_map_at_front(new_nodes);

            for i in 1..=new_nodes {
                let node = self.start.node.wrapping_sub(i);

                // SAFETY: The map has new_nodes free slots before start.node.
                unsafe { node.write(self.allocate_node()) };
            }
        }

        // SAFETY: The n slots before start are backed by buffers.
        unsafe { self.start.backward(n) }
    }

    /// Makes sure `n` slots after the last element are backed by buffers and returns the
    /// position `n` slots after the last element.
    ///
    /// `finish` is not moved; the new buffers are owned by map slots after `finish.node`. The
    /// returned position is never at the end of its buffer.
    pub(super) fn reserve_elements_at_back(&mut self, n: usize) -> RawIter<T, BUF> {
        // Cannot underflow because finish is never at the end of its buffer.
        let vacancies = self.finish.remaining_in_buffer().wrapping_sub(1);

        if n > vacancies {
            // Cannot underflow because n exceeds vacancies.
            let new_nodes = Integer::div_ceil(&n.wrapping_sub(vacancies), &Self::BUFFER_SIZE);
            self.reserve_map_at_back(new_nodes);

            for i in 1..=new_nodes {
                let node = self.finish.node.wrapping_add(i);

                // SAFETY: The map has new_nodes free slots after finish.node.
                unsafe { node.write(self.allocate_node()) };
            }
        }

        // SAFETY: The n slots after finish are backed by buffers.
        unsafe { self.finish.forward(n) }
    }
}
