//! Criterion micro-benchmarks for tracked allocation, region access and
//! unchecked allocation.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use lode_arena::Validation;
use lode_bench::{chunk_arena, fragmented_arena, BENCH_CAPACITY};
use lode_test_utils::{Voxel, CHUNK_VOLUME};

/// Benchmark: allocate and free one 4KB region in an empty arena.
fn bench_allocate_free(c: &mut Criterion) {
    let arena = chunk_arena(BENCH_CAPACITY, Validation::Lenient);
    c.bench_function("allocate_free_4k", |b| {
        b.iter(|| {
            let addr = arena.allocate(black_box(4096)).unwrap();
            arena.free(addr).unwrap();
        });
    });
}

/// Benchmark: first-fit search across ~1000 live regions with holes.
fn bench_allocate_fragmented(c: &mut Criterion) {
    let (arena, _live) = fragmented_arena(42, 2000);
    c.bench_function("allocate_fragmented_1k", |b| {
        b.iter(|| {
            let addr = arena.allocate(black_box(200)).unwrap();
            arena.free(addr).unwrap();
        });
    });
}

/// Benchmark: uncontended lock + exclusive view + unlock on a chunk.
fn bench_lock_chunk(c: &mut Criterion) {
    let arena = chunk_arena(BENCH_CAPACITY, Validation::Lenient);
    let chunk = arena.new_array::<Voxel>(CHUNK_VOLUME).unwrap();
    let mut block = 0u16;
    c.bench_function("lock_write_chunk", |b| {
        b.iter(|| {
            let mut lock = arena.lock_typed(chunk).unwrap().unwrap();
            let mut voxels = lock.get_mut().unwrap();
            voxels[0] = Voxel::solid(block);
            block = block.wrapping_add(1);
            black_box(voxels[0]);
        });
    });
}

/// Benchmark: strict vs lenient `get` on a raw region.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_1k");
    for validation in [Validation::Strict, Validation::Lenient] {
        let arena = chunk_arena(BENCH_CAPACITY, validation);
        let addr = arena.allocate(1024).unwrap();
        group.bench_function(format!("{validation:?}"), |b| {
            b.iter(|| {
                let bytes = arena.get(addr).unwrap().unwrap();
                black_box(bytes[0]);
            });
        });
    }
    group.finish();
}

/// Benchmark: unchecked mesh-buffer allocation round trip.
fn bench_unchecked(c: &mut Criterion) {
    let arena = chunk_arena(BENCH_CAPACITY, Validation::Lenient);
    c.bench_function("unchecked_mesh_64k", |b| {
        b.iter(|| {
            let mesh = arena.new_array_unchecked::<f32>(black_box(16 * 1024)).unwrap();
            black_box(mesh.len());
        });
    });
}

criterion_group!(
    benches,
    bench_allocate_free,
    bench_allocate_fragmented,
    bench_lock_chunk,
    bench_get,
    bench_unchecked
);
criterion_main!(benches);
