//! Measure merged recall for an in-memory sharded HNSW index, with and
//! without collaborative pruning.
//!
//! Run with: cargo run --example measure_recall --release

use rand::rngs::StdRng;
use rand::SeedableRng;
use shard_knn::{
    recall_at_k, CoordinatorOptions, ExactNn, HnswIndex, HnswParams, SearchMode, ShardHandle,
    ShardQueryCoordinator, ShardSet, VectorSet,
};
use std::sync::Arc;

const NUM_DOCS: usize = 10_000;
const NUM_QUERIES: usize = 100;
const DIM: usize = 128;
const NUM_SHARDS: usize = 4;

fn main() -> shard_knn::Result<()> {
    println!("Generating dataset...");
    let mut rng = StdRng::seed_from_u64(42);
    let docs = VectorSet::random_unit(NUM_DOCS, DIM, &mut rng);
    let queries = VectorSet::random_unit(NUM_QUERIES, DIM, &mut rng);

    println!("Computing ground truth...");
    let oracle = ExactNn::new(Arc::new(docs.clone()));
    let ground_truth = oracle.batch_exact_top_k(&queries, 100)?;

    let k_values = vec![1, 10, 50, 100];

    for mode in [SearchMode::Standard, SearchMode::Collaborative] {
        println!("\nBuilding {} shards...", NUM_SHARDS);
        let per_shard = NUM_DOCS / NUM_SHARDS;
        let mut handles = Vec::with_capacity(NUM_SHARDS);
        for i in 0..NUM_SHARDS {
            let start = i * per_shard;
            let index = HnswIndex::build(&docs.slice(start, start + per_shard), start as u64, HnswParams::default())?;
            handles.push(ShardHandle::new(i, format!("shard-{i}"), Box::new(index)));
        }
        let coordinator = ShardQueryCoordinator::new(
            ShardSet::from_handles(handles)?,
            CoordinatorOptions {
                search_threads: NUM_SHARDS,
                mode,
                record_shard_timings: false,
            },
        )?;

        println!("Measuring recall ({:?})...", mode);
        for &k in &k_values {
            let mut total_recall = 0.0;
            let mut total_saved = 0u64;

            for (q, query) in queries.iter().enumerate() {
                let result = coordinator.search_one(query, k)?;
                total_recall += recall_at_k(&result.ids(), &ground_truth[q], k);
                total_saved += result.visited_savings.unwrap_or(0);
            }

            let avg_recall = total_recall / NUM_QUERIES as f64;
            println!(
                "Recall@{}: {:.2}%  (avg lookups saved: {})",
                k,
                avg_recall * 100.0,
                total_saved / NUM_QUERIES as u64
            );
        }
        coordinator.close();
    }

    println!("\nRecall differences between modes come from pruning, not from the merge.");
    Ok(())
}
