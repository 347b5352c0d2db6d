//! Integration tests for the `seg_deque` package.
//!
//! These check the deque against elements that count their clones and drops, including
//! clones that fail halfway through a batch, and against `VecDeque` under long random
//! operation sequences.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use seg_deque::Deque;
use testing::{Counters, Tracked, with_watchdog};
use tiered_alloc::{DefaultAlloc, PoolAllocator, PoolHandle};

type TrackedDeque = Deque<Tracked, PoolHandle, 4>;

// Tracked values are 16 bytes, so four of them make a 64-byte buffer.
const BUFFER_BYTES: usize = 4 * size_of::<Tracked>();

/// A pool with plenty of free buffers, so that reserving a few of them never refills the free
/// list and releasing them restores the free list length exactly.
fn warm_pool() -> PoolHandle {
    let pool = PoolHandle::new(PoolAllocator::new());
    let counters = Counters::new();

    let mut warmup = TrackedDeque::new_in(pool.clone());
    for i in 0..100 {
        warmup.push_back(Tracked::new(i, &counters));
    }
    drop(warmup);

    pool
}

fn tracked_deque(len: i32, counters: &Counters, pool: &PoolHandle) -> TrackedDeque {
    let values: Vec<Tracked> = (0..len).map(|i| Tracked::new(i, counters)).collect();
    let deque = TrackedDeque::from_slice_in(&values, pool.clone());
    drop(values);
    deque
}

fn values_of(deque: &TrackedDeque) -> Vec<i32> {
    deque.iter().map(Tracked::value).collect()
}

fn free_buffers(pool: &PoolHandle) -> usize {
    pool.with_pool(|pool| pool.free_list_len(BUFFER_BYTES))
}

#[test]
fn drop_releases_every_element() {
    let counters = Counters::new();
    let pool = warm_pool();

    let deque = tracked_deque(37, &counters, &pool);
    assert_eq!(counters.live(), 37);

    drop(deque);
    assert_eq!(counters.live(), 0);
}

#[test]
fn insert_at_front_side_rolls_back() {
    let counters = Counters::new();
    let pool = warm_pool();
    let mut deque = tracked_deque(10, &counters, &pool);

    let source: Vec<Tracked> = (100..105).map(|i| Tracked::new(i, &counters)).collect();
    let free_before = free_buffers(&pool);
    let clones_before = counters.clones();

    counters.panic_on_clone(4);

    let result = catch_unwind(AssertUnwindSafe(|| deque.insert_slice(2, &source)));
    assert!(result.is_err());

    // Three clones succeeded and were dropped again; the prefix moved back.
    assert_eq!(counters.clones() - clones_before, 3);
    assert_eq!(counters.live(), 15);
    assert_eq!(values_of(&deque), (0..10).collect::<Vec<_>>());
    assert_eq!(free_buffers(&pool), free_before);

    deque.insert_slice(2, &source);
    assert_eq!(
        values_of(&deque),
        [0, 1, 100, 101, 102, 103, 104, 2, 3, 4, 5, 6, 7, 8, 9]
    );
}

#[test]
fn insert_at_back_side_rolls_back() {
    let counters = Counters::new();
    let pool = warm_pool();
    let mut deque = tracked_deque(10, &counters, &pool);

    let source: Vec<Tracked> = (100..105).map(|i| Tracked::new(i, &counters)).collect();
    let free_before = free_buffers(&pool);

    counters.panic_on_clone(5);

    let result = catch_unwind(AssertUnwindSafe(|| deque.insert_slice(8, &source)));
    assert!(result.is_err());

    assert_eq!(counters.live(), 15);
    assert_eq!(values_of(&deque), (0..10).collect::<Vec<_>>());
    assert_eq!(free_buffers(&pool), free_before);
    assert_eq!(deque.back().map(Tracked::value), Some(9));
}

#[test]
fn fill_at_end_rolls_back() {
    let counters = Counters::new();
    let pool = warm_pool();
    let mut deque = tracked_deque(10, &counters, &pool);

    let value = Tracked::new(7, &counters);
    let free_before = free_buffers(&pool);

    counters.panic_on_clone(3);

    let result = catch_unwind(AssertUnwindSafe(|| deque.insert_n(10, 6, &value)));
    assert!(result.is_err());

    assert_eq!(counters.live(), 11);
    assert_eq!(deque.len(), 10);
    assert_eq!(free_buffers(&pool), free_before);

    // The vacant slots after the last element are usable again.
    deque.push_back(value);
    assert_eq!(deque.len(), 11);
}

#[test]
fn push_with_failed_clone_leaves_deque_unchanged() {
    let counters = Counters::new();
    let pool = warm_pool();
    let mut deque = tracked_deque(4, &counters, &pool);
    let value = Tracked::new(50, &counters);

    counters.panic_on_clone(1);
    let result = catch_unwind(AssertUnwindSafe(|| deque.push_back_with(|| value.clone())));
    assert!(result.is_err());

    counters.panic_on_clone(1);
    let result = catch_unwind(AssertUnwindSafe(|| deque.push_front_with(|| value.clone())));
    assert!(result.is_err());

    assert_eq!(values_of(&deque), [0, 1, 2, 3]);
    assert_eq!(counters.live(), 5);
}

#[test]
fn clone_rolls_back() {
    let counters = Counters::new();
    let pool = warm_pool();
    let deque = tracked_deque(20, &counters, &pool);

    counters.panic_on_clone(11);

    let result = catch_unwind(AssertUnwindSafe(|| deque.clone()));
    assert!(result.is_err());

    assert_eq!(counters.live(), 20);

    let copy = deque.clone();
    assert_eq!(copy, deque);
    assert_eq!(counters.live(), 40);
}

#[test]
fn clone_from_reuses_existing_elements() {
    let counters = Counters::new();
    let pool = warm_pool();
    let source = tracked_deque(12, &counters, &pool);

    let mut target = tracked_deque(5, &counters, &pool);
    let clones_before = counters.clones();

    target.clone_from(&source);

    assert_eq!(target, source);
    assert_eq!(counters.clones() - clones_before, 12);
    assert_eq!(counters.live(), 24);

    let short = tracked_deque(3, &counters, &pool);
    target.clone_from(&short);

    assert_eq!(target, short);
    assert_eq!(counters.live(), 12 + 3 + 3);
}

#[test]
fn remove_range_drops_exactly_the_range() {
    let counters = Counters::new();
    let pool = warm_pool();
    let mut deque = tracked_deque(30, &counters, &pool);
    let drops_before = counters.drops();

    deque.remove_range(4..13);
    assert_eq!(counters.drops() - drops_before, 9);

    deque.remove_range(15..);
    assert_eq!(counters.drops() - drops_before, 9 + 6);

    let removed = deque.remove(2).unwrap();
    assert_eq!(removed.value(), 2);
    assert_eq!(counters.live(), 15);

    let expected: Vec<i32> = [0, 1, 3].into_iter().chain(13..24).collect();
    assert_eq!(values_of(&deque), expected);
}

#[test]
fn into_iter_drops_the_rest() {
    let counters = Counters::new();
    let pool = warm_pool();
    let deque = tracked_deque(10, &counters, &pool);

    let taken: Vec<i32> = deque.into_iter().take(3).map(|t| t.value()).collect();

    assert_eq!(taken, [0, 1, 2]);
    assert_eq!(counters.live(), 0);
}

// Ten values with four per buffer fill map slots 2..=4 of an 8-slot map. Inserting 40 more needs
// ten new buffers, more than either end of that map has room for, so the insert replaces the
// map with one of 8 + 10 + 2 slots before it starts cloning.
const GROWN_MAP_SLOTS: usize = 20;

// The replaced 8-slot map is 64 bytes, the same size class as a buffer, so releasing it adds one
// block to the buffer free list. The 20-slot map is served outside the pool.
const RELEASED_MAP_BLOCKS: usize = 1;

#[test]
fn front_side_rollback_after_map_growth() {
    let counters = Counters::new();
    let pool = warm_pool();
    let mut deque = tracked_deque(10, &counters, &pool);
    assert_eq!(deque.map_capacity(), 8);

    let value = Tracked::new(77, &counters);
    let free_before = free_buffers(&pool);

    // Fails in the middle of the sixth new buffer.
    counters.panic_on_clone(22);

    let result = catch_unwind(AssertUnwindSafe(|| deque.insert_n(2, 40, &value)));
    assert!(result.is_err());

    assert_eq!(deque.map_capacity(), GROWN_MAP_SLOTS);
    assert_eq!(values_of(&deque), (0..10).collect::<Vec<_>>());
    assert_eq!(counters.live(), 11);
    assert_eq!(free_buffers(&pool), free_before + RELEASED_MAP_BLOCKS);

    // The grown map has room for the same insert without growing again.
    deque.insert_n(2, 40, &value);
    assert_eq!(deque.map_capacity(), GROWN_MAP_SLOTS);

    let expected: Vec<i32> = [0, 1]
        .into_iter()
        .chain(std::iter::repeat_n(77, 40))
        .chain(2..10)
        .collect();
    assert_eq!(values_of(&deque), expected);
    assert_eq!(counters.live(), 51);
}

#[test]
fn back_side_rollback_after_map_growth() {
    let counters = Counters::new();
    let pool = warm_pool();
    let mut deque = tracked_deque(10, &counters, &pool);
    assert_eq!(deque.map_capacity(), 8);

    let source: Vec<Tracked> = (100..140).map(|i| Tracked::new(i, &counters)).collect();
    let free_before = free_buffers(&pool);

    counters.panic_on_clone(31);

    let result = catch_unwind(AssertUnwindSafe(|| deque.insert_slice(8, &source)));
    assert!(result.is_err());

    assert_eq!(deque.map_capacity(), GROWN_MAP_SLOTS);
    assert_eq!(values_of(&deque), (0..10).collect::<Vec<_>>());
    assert_eq!(deque.front().map(Tracked::value), Some(0));
    assert_eq!(deque.back().map(Tracked::value), Some(9));
    assert_eq!(counters.live(), 50);
    assert_eq!(free_buffers(&pool), free_before + RELEASED_MAP_BLOCKS);

    deque.insert_slice(8, &source);
    assert_eq!(deque.map_capacity(), GROWN_MAP_SLOTS);

    let expected: Vec<i32> = (0..8).chain(100..140).chain(8..10).collect();
    assert_eq!(values_of(&deque), expected);
    assert_eq!(counters.live(), 90);
}

#[derive(Clone, Copy, Debug)]
enum Operation {
    PushBack,
    PushFront,
    PopBack,
    PopFront,
    Insert,
    Remove,
    InsertSlice,
    RemoveRange,
    Truncate,
    Resize,
}

const OPERATIONS: [Operation; 10] = [
    Operation::PushBack,
    Operation::PushFront,
    Operation::PopBack,
    Operation::PopFront,
    Operation::Insert,
    Operation::Remove,
    Operation::InsertSlice,
    Operation::RemoveRange,
    Operation::Truncate,
    Operation::Resize,
];

fn run_against_vec_deque<const BUF: usize>(seed: u64, steps: usize) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut deque = Deque::<u32, DefaultAlloc, BUF>::new_in(DefaultAlloc);
    let mut model = VecDeque::new();

    for step in 0..steps {
        let operation = OPERATIONS[rng.random_range(0..OPERATIONS.len())];
        let len = model.len();
        let value: u32 = rng.random();

        match operation {
            Operation::PushBack => {
                deque.push_back(value);
                model.push_back(value);
            }
            Operation::PushFront => {
                deque.push_front(value);
                model.push_front(value);
            }
            Operation::PopBack => assert_eq!(deque.pop_back(), model.pop_back()),
            Operation::PopFront => assert_eq!(deque.pop_front(), model.pop_front()),
            Operation::Insert => {
                let index = rng.random_range(0..=len);
                deque.insert(index, value);
                model.insert(index, value);
            }
            Operation::Remove => {
                let index = rng.random_range(0..=len);
                assert_eq!(deque.remove(index), model.remove(index));
            }
            Operation::InsertSlice => {
                let index = rng.random_range(0..=len);
                let count = rng.random_range(0..3 * BUF.max(4));
                let values: Vec<u32> = (0..count).map(|_| rng.random()).collect();

                deque.insert_slice(index, &values);
                for (offset, value) in values.into_iter().enumerate() {
                    model.insert(index + offset, value);
                }
            }
            Operation::RemoveRange => {
                let first = rng.random_range(0..=len);
                let last = rng.random_range(first..=len);

                deque.remove_range(first..last);
                model.drain(first..last);
            }
            Operation::Truncate => {
                // Rare, so that the deque gets long enough to span many buffers.
                if rng.random_bool(0.1) {
                    let new_len = rng.random_range(0..=len);
                    deque.truncate(new_len);
                    model.truncate(new_len);
                }
            }
            Operation::Resize => {
                let new_len = rng.random_range(0..=len + 2 * BUF.max(4));
                deque.resize(new_len, value);
                model.resize(new_len, value);
            }
        }

        assert_eq!(deque.len(), model.len(), "step {step}: {operation:?}");
        assert!(deque.iter().eq(model.iter()), "step {step}: {operation:?}");
        assert_eq!(deque.front(), model.front());
        assert_eq!(deque.back(), model.back());

        if !model.is_empty() {
            let index = rng.random_range(0..model.len());
            assert_eq!(deque.get(index), model.get(index));
        }
    }

    assert!(deque.iter().rev().eq(model.iter().rev()));
    assert!(deque.into_iter().eq(model));
}

#[test]
fn random_operations_match_vec_deque_small_buffers() {
    with_watchdog(|| run_against_vec_deque::<4>(42, 5_000));
}

#[test]
fn random_operations_match_vec_deque_single_slot_buffers() {
    with_watchdog(|| run_against_vec_deque::<1>(7, 3_000));
}

#[test]
fn random_operations_match_vec_deque_default_buffers() {
    with_watchdog(|| run_against_vec_deque::<0>(1234, 5_000));
}
