//! # Allocator Strategy Benchmark
//!
//! Per-call cost of each strategy against the platform heap:
//! 1. Bump allocation (linear, ring) with the bulk reset that follows
//! 2. Fixed pool allocate/release churn
//! 3. Aligned heap allocation for comparison

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::{
    Allocator, FixedPoolAllocator, HeapAllocator, LifecycleEvent, LifecycleHandler,
    LinearAllocator, MappingType, RingFrameAllocator, SystemBlockRegistry,
};

const ALLOCATIONS_PER_ITER: usize = 1024;
const SMALL_SIZES: [usize; 6] = [4, 8, 12, 16, 32, 64];

// =============================================================================
// BUMP STRATEGIES
// =============================================================================

fn bench_linear_bump(c: &mut Criterion) {
    let registry = SystemBlockRegistry::new();
    let mut scratch = LinearAllocator::new(&registry, 4 * 1024 * 1024, MappingType::Unclassified);

    let mut group = c.benchmark_group("linear_bump");
    for alignment in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(alignment), &alignment, |b, &alignment| {
            b.iter(|| {
                for i in 0..ALLOCATIONS_PER_ITER {
                    let size = SMALL_SIZES[i % SMALL_SIZES.len()];
                    black_box(scratch.allocate(size, alignment).ok());
                }
                scratch.reset();
            });
        });
    }
    group.finish();
}

fn bench_ring_frames(c: &mut Criterion) {
    let registry = SystemBlockRegistry::new();
    let mut frame = RingFrameAllocator::new(&registry, 159 * 1024, MappingType::Cpu);

    c.bench_function("ring_frame_1024_allocs", |b| {
        b.iter(|| {
            for i in 0..ALLOCATIONS_PER_ITER {
                let size = SMALL_SIZES[i % SMALL_SIZES.len()];
                black_box(frame.allocate(size, 16).ok());
            }
            black_box(frame.on_event(LifecycleEvent::NextFrame).ok());
        });
    });
}

// =============================================================================
// POOL VS HEAP
// =============================================================================

fn bench_pool_churn(c: &mut Criterion) {
    let registry = SystemBlockRegistry::new();
    let mut pool = FixedPoolAllocator::new(&registry, 8192, MappingType::Unclassified);
    let mut live = Vec::with_capacity(ALLOCATIONS_PER_ITER);

    c.bench_function("pool_alloc_release_1024", |b| {
        b.iter(|| {
            for i in 0..ALLOCATIONS_PER_ITER {
                if let Ok(ptr) = pool.allocate(SMALL_SIZES[i % SMALL_SIZES.len()], 16) {
                    live.push(ptr);
                }
            }
            for ptr in live.drain(..).rev() {
                black_box(pool.release(ptr).ok());
            }
        });
    });
}

fn bench_heap_churn(c: &mut Criterion) {
    let mut heap = HeapAllocator::new();
    let mut live = Vec::with_capacity(ALLOCATIONS_PER_ITER);

    c.bench_function("heap_alloc_release_1024", |b| {
        b.iter(|| {
            for i in 0..ALLOCATIONS_PER_ITER {
                if let Ok(ptr) = heap.allocate(SMALL_SIZES[i % SMALL_SIZES.len()], 16) {
                    live.push(ptr);
                }
            }
            for ptr in live.drain(..).rev() {
                black_box(heap.release(ptr).ok());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_linear_bump,
    bench_ring_frames,
    bench_pool_churn,
    bench_heap_churn,
);
criterion_main!(benches);
