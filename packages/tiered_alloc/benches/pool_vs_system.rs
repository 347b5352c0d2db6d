//! Compares small-block allocation through the pool with the global allocator.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::alloc::{self, Layout, System};
use std::hint::black_box;
use std::ptr::NonNull;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use tiered_alloc::{DefaultAlloc, PoolAllocator, RawAlloc};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<System> = Allocator::system();

const BATCH: usize = 1000;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("pool_vs_system");

    for size in [8, 32, 128] {
        let layout = Layout::from_size_align(size, 8).unwrap();
        let mut blocks = Vec::with_capacity(BATCH);

        let name = format!("pool_{size}_x{BATCH}");
        let mut allocs_op = allocs.operation(&name);
        group.bench_function(&name, |b| {
            b.iter_custom(|iters| {
                let mut pool = PoolAllocator::new();

                let _span = allocs_op.measure_thread().iterations(iters);

                let start = Instant::now();

                for _ in 0..iters {
                    for _ in 0..BATCH {
                        blocks.push(black_box(pool.allocate(layout)));
                    }

                    for block in blocks.drain(..) {
                        // SAFETY: The block came from this pool with this layout.
                        unsafe { pool.deallocate(block, layout) };
                    }
                }

                start.elapsed()
            });
        });

        let name = format!("default_{size}_x{BATCH}");
        let mut allocs_op = allocs.operation(&name);
        group.bench_function(&name, |b| {
            b.iter_custom(|iters| {
                let _span = allocs_op.measure_thread().iterations(iters);

                let start = Instant::now();

                for _ in 0..iters {
                    for _ in 0..BATCH {
                        blocks.push(black_box(DefaultAlloc.allocate(layout)));
                    }

                    for block in blocks.drain(..) {
                        // SAFETY: The block came from the default pool with this layout.
                        unsafe { DefaultAlloc.deallocate(block, layout) };
                    }
                }

                start.elapsed()
            });
        });

        let name = format!("system_{size}_x{BATCH}");
        let mut allocs_op = allocs.operation(&name);
        group.bench_function(&name, |b| {
            b.iter_custom(|iters| {
                let _span = allocs_op.measure_thread().iterations(iters);

                let start = Instant::now();

                for _ in 0..iters {
                    for _ in 0..BATCH {
                        // SAFETY: The layout is non-zero-sized.
                        let block = NonNull::new(unsafe { alloc::alloc(layout) }).unwrap();
                        blocks.push(black_box(block));
                    }

                    for block in blocks.drain(..) {
                        // SAFETY: The block came from the global allocator with this layout.
                        unsafe { alloc::dealloc(block.as_ptr(), layout) };
                    }
                }

                start.elapsed()
            });
        });
    }

    group.finish();

    allocs.print_to_stdout();
}
