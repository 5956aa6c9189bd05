//! Benchmarks for distance computations.
//!
//! These kernels dominate k-means assignment, flat search and ADC table
//! construction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use vecquant::ann::Index;
use vecquant::simd::{dot, l2_distance_squared};
use vecquant::FlatIndex;

fn random_vectors(n: usize, dim: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n * dim).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect()
}

fn bench_l2_dimensions(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_squared");

    for dim in [64, 128, 256, 384, 768, 1536].iter() {
        group.throughput(Throughput::Elements(*dim as u64));

        let vectors = random_vectors(2, *dim);
        let (a, b) = vectors.split_at(*dim);

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| l2_distance_squared(black_box(a), black_box(b)));
        });
    }

    group.finish();
}

fn bench_dot_dimensions(c: &mut Criterion) {
    let mut group = c.benchmark_group("dot_product");

    for dim in [64, 128, 256, 384, 768, 1536].iter() {
        group.throughput(Throughput::Elements(*dim as u64));

        let vectors = random_vectors(2, *dim);
        let (a, b) = vectors.split_at(*dim);

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| dot(black_box(a), black_box(b)));
        });
    }

    group.finish();
}

fn bench_flat_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_search");

    let dim = 128;
    let queries = random_vectors(16, dim);

    for n in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements((*n * 16) as u64));

        let mut index = FlatIndex::new_l2(dim).expect("Failed to create");
        index.add(&random_vectors(*n, dim)).expect("Failed to add");

        group.bench_with_input(BenchmarkId::from_parameter(n), n, |bench, _| {
            bench.iter(|| index.search(black_box(&queries), 10).expect("Search failed"));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_l2_dimensions,
    bench_dot_dimensions,
    bench_flat_search,
);
criterion_main!(benches);
