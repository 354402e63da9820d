//! Benchmarks for a full fan-out query over HNSW shards.
//!
//! Run with: cargo bench --bench coordinator_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shard_knn::{
    CoordinatorOptions, HnswIndex, HnswParams, SearchMode, ShardHandle, ShardQueryCoordinator,
    ShardSet, VectorSet,
};

const NUM_DOCS: usize = 20_000;
const DIM: usize = 64;
const NUM_SHARDS: usize = 4;

fn shard_set(docs: &VectorSet) -> ShardSet {
    let per_shard = docs.len() / NUM_SHARDS;
    let handles = (0..NUM_SHARDS)
        .map(|i| {
            let start = i * per_shard;
            let index = HnswIndex::build(
                &docs.slice(start, start + per_shard),
                start as u64,
                HnswParams::default(),
            )
            .expect("build shard");
            ShardHandle::new(i, format!("shard-{i}"), Box::new(index))
        })
        .collect();
    ShardSet::from_handles(handles).expect("shard set")
}

/// Compare sequential, parallel and collaborative fan-out at a few K.
fn benchmark_search_one(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let docs = VectorSet::random_unit(NUM_DOCS, DIM, &mut rng);
    let queries = VectorSet::random_unit(100, DIM, &mut rng);

    let variants = [
        ("sequential", 1, SearchMode::Standard),
        ("parallel", NUM_SHARDS, SearchMode::Standard),
        ("collaborative", NUM_SHARDS, SearchMode::Collaborative),
    ];

    let mut group = c.benchmark_group("search_one");
    group.sample_size(20);

    for (name, search_threads, mode) in variants {
        let coordinator = ShardQueryCoordinator::new(
            shard_set(&docs),
            CoordinatorOptions {
                search_threads,
                mode,
                record_shard_timings: false,
            },
        )
        .expect("coordinator");

        for k in [10, 100] {
            group.bench_function(BenchmarkId::new(name, k), |b| {
                let mut q = 0;
                b.iter(|| {
                    let query = queries.get(q % queries.len());
                    q += 1;
                    coordinator.search_one(black_box(query), black_box(k))
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, benchmark_search_one);
criterion_main!(benches);
