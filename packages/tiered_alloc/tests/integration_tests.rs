//! Integration tests for the `tiered_alloc` package.
//!
//! These exercise the tiers together: typed allocation through the pool and rollback of the
//! uninitialized-memory algorithms with elements that fail to clone.

use std::alloc::Layout;
use std::collections::HashMap;
use std::mem::MaybeUninit;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;
use std::slice;

use new_zealand::nz;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use testing::{Counters, Tracked};
use tiered_alloc::{
    Allocator, MAX_BYTES, PoolAllocator, PoolHandle, RawAlloc, construct, destroy_range,
    size_class, uninitialized_copy, uninitialized_fill,
};

fn slots<const N: usize>() -> [MaybeUninit<Tracked>; N] {
    [const { MaybeUninit::uninit() }; N]
}

fn start(slots: &mut [MaybeUninit<Tracked>]) -> NonNull<Tracked> {
    NonNull::new(slots.as_mut_ptr().cast::<Tracked>()).unwrap()
}

#[test]
fn copy_clones_every_value() {
    let counters = Counters::new();
    let src: Vec<Tracked> = (0..3).map(|i| Tracked::new(i, &counters)).collect();
    let mut storage = slots::<3>();
    let dst = start(&mut storage);

    // SAFETY: The storage holds three uninitialized slots, all destroyed below.
    unsafe {
        uninitialized_copy(&src, dst);

        assert_eq!(counters.clones(), 3);
        assert_eq!(dst.add(2).as_ref().value(), 2);

        destroy_range(dst, dst.add(3));
    }

    assert_eq!(counters.live(), 3);
    assert_eq!(counters.drops(), 3);
}

#[test]
fn copy_rolls_back_when_a_clone_panics() {
    let counters = Counters::new();
    let src: Vec<Tracked> = (0..5).map(|i| Tracked::new(i, &counters)).collect();
    let mut storage = slots::<5>();
    let dst = start(&mut storage);

    counters.panic_on_clone(3);

    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: The storage holds five uninitialized slots.
        unsafe { uninitialized_copy(&src, dst) };
    }));

    assert!(result.is_err());

    // The two clones that succeeded were destroyed again; only the originals remain.
    assert_eq!(counters.clones(), 2);
    assert_eq!(counters.drops(), 2);
    assert_eq!(counters.live(), 5);
}

#[test]
fn fill_rolls_back_when_a_clone_panics() {
    let counters = Counters::new();
    let value = Tracked::new(42, &counters);
    let mut storage = slots::<4>();
    let dst = start(&mut storage);

    counters.panic_on_clone(4);

    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: The storage holds four uninitialized slots.
        unsafe { uninitialized_fill(dst, 4, &value) };
    }));

    assert!(result.is_err());
    assert_eq!(counters.live(), 1);
}

#[test]
fn typed_allocation_through_pool() {
    let pool = PoolHandle::new(PoolAllocator::new());
    let counters = Counters::new();
    let alloc = Allocator::<Tracked, _>::with_raw(pool.clone());

    let values = alloc.allocate(2);

    // SAFETY: Both slots are constructed before use, destroyed before release and released
    // with the same count.
    unsafe {
        construct(values, Tracked::new(1, &counters));
        construct(values.add(1), Tracked::new(2, &counters));
        assert_eq!(counters.live(), 2);

        destroy_range(values, values.add(2));
        alloc.deallocate(values, 2);
    }

    assert_eq!(counters.live(), 0);

    let class = size_class(2 * size_of::<Tracked>()).unwrap();
    assert_eq!(pool.with_pool(|pool| pool.free_list_len(class)), 20);
}

#[test]
fn random_blocks_never_overlap() {
    let pool = PoolHandle::new(PoolAllocator::builder().refill_objects(nz!(7)).build());
    let mut rng = SmallRng::seed_from_u64(42);

    // Address -> (layout, fill byte).
    let mut live: HashMap<usize, (NonNull<u8>, Layout, u8)> = HashMap::new();

    for round in 0..5_000_u32 {
        if live.is_empty() || rng.random_bool(0.6) {
            let size = rng.random_range(1..=MAX_BYTES + 64);
            let layout = Layout::from_size_align(size, 8).unwrap();
            let block = pool.allocate(layout);
            let fill = u8::try_from(round % 251).unwrap();

            // SAFETY: The block is fresh and `size` bytes long.
            unsafe { block.as_ptr().write_bytes(fill, size) };

            assert!(
                live.insert(block.as_ptr().addr(), (block, layout, fill))
                    .is_none(),
                "block handed out twice"
            );
        } else {
            let key = *live.keys().next().unwrap();
            let (block, layout, fill) = live.remove(&key).unwrap();

            // SAFETY: The block is live and `layout.size()` bytes long.
            let bytes = unsafe { slice::from_raw_parts(block.as_ptr(), layout.size()) };
            assert!(bytes.iter().all(|&b| b == fill), "block was overwritten");

            // SAFETY: The block came from this pool with this layout.
            unsafe { pool.deallocate(block, layout) };
        }
    }

    for (_, (block, layout, fill)) in live {
        // SAFETY: The block is live and `layout.size()` bytes long.
        let bytes = unsafe { slice::from_raw_parts(block.as_ptr(), layout.size()) };
        assert!(bytes.iter().all(|&b| b == fill), "block was overwritten");

        // SAFETY: The block came from this pool with this layout.
        unsafe { pool.deallocate(block, layout) };
    }
}
