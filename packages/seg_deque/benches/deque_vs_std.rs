//! Compares the segmented deque with `VecDeque` on queue traffic and random access.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]
#![allow(
    clippy::indexing_slicing,
    reason = "indexing is what the benchmark measures"
)]

use std::alloc::System;
use std::collections::VecDeque;
use std::hint::black_box;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use seg_deque::Deque;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<System> = Allocator::system();

const ITEMS: usize = 10_000;
const MIDDLE: usize = 3_333;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("deque_vs_std");

    let name = format!("seg_push_pop_x{ITEMS}");
    let mut allocs_op = allocs.operation(&name);
    group.bench_function(&name, |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut deque = Deque::new();

                for i in 0..ITEMS {
                    deque.push_back(black_box(i));
                }

                while let Some(value) = deque.pop_front() {
                    black_box(value);
                }
            }

            start.elapsed()
        });
    });

    let name = format!("std_push_pop_x{ITEMS}");
    let mut allocs_op = allocs.operation(&name);
    group.bench_function(&name, |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut deque = VecDeque::new();

                for i in 0..ITEMS {
                    deque.push_back(black_box(i));
                }

                while let Some(value) = deque.pop_front() {
                    black_box(value);
                }
            }

            start.elapsed()
        });
    });

    let seg: Deque<usize> = (0..ITEMS).collect();
    let reference: VecDeque<usize> = (0..ITEMS).collect();

    group.bench_function("seg_index_strided", |b| {
        b.iter(|| {
            let mut sum = 0_usize;
            for i in (0..ITEMS).step_by(7) {
                sum = sum.wrapping_add(seg[black_box(i)]);
            }
            sum
        });
    });

    group.bench_function("std_index_strided", |b| {
        b.iter(|| {
            let mut sum = 0_usize;
            for i in (0..ITEMS).step_by(7) {
                sum = sum.wrapping_add(reference[black_box(i)]);
            }
            sum
        });
    });

    group.bench_function("seg_insert_middle", |b| {
        b.iter(|| {
            let mut deque = seg.clone();
            deque.insert(MIDDLE, black_box(0));
            deque
        });
    });

    group.bench_function("std_insert_middle", |b| {
        b.iter(|| {
            let mut deque = reference.clone();
            deque.insert(MIDDLE, black_box(0));
            deque
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
