use std::mem::size_of;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use parallel_bucket_sort::util::generate_shard;
use parallel_bucket_sort::{local_bucket_sort, Key};

const WORKERS: usize = 4;

fn setup(size: usize) -> Vec<Vec<Key>> {
    (0..WORKERS)
        .map(|rank| generate_shard(42, rank, size / WORKERS, 0..Key::MAX))
        .collect()
}

fn sample_sort_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_sort");
    group.sample_size(10);

    static K: usize = 1 << 10;

    for size in [16 * K, 64 * K, 256 * K, 1024 * K] {
        group.throughput(Throughput::Bytes((size * size_of::<Key>()) as u64));
        group.bench_with_input(
            BenchmarkId::new("throughput", format!("{}K", size / K)),
            &size,
            |b, &size| {
                b.iter_batched(
                    || setup(size),
                    |shards| local_bucket_sort(shards).unwrap(),
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

fn duplicate_heavy_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_sort_duplicates");
    group.sample_size(10);

    let size = 256 * 1024;
    group.bench_function("equal_count_fallback", |b| {
        b.iter_batched(
            || {
                (0..WORKERS)
                    .map(|rank| generate_shard(7, rank, size / WORKERS, 0..2))
                    .collect::<Vec<_>>()
            },
            |shards| local_bucket_sort(shards).unwrap(),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, sample_sort_bench, duplicate_heavy_bench);
criterion_main!(benches);
