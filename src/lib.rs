//! shard-knn: sharded approximate nearest-neighbor search, measured.
//!
//! This crate answers K-nearest-neighbor queries over a document collection
//! split into independently indexed shards, and measures how good and how
//! fast those answers are.
//!
//! # Features
//!
//! - **Fan-out and exact merge**: Every shard returns its local top-K; the
//!   coordinator merges them into the global top-K, sequentially or on a
//!   rayon pool sized to the shard count
//! - **Collaborative pruning**: Shards publish their running top-K and read
//!   a shared global K-th best score to stop exploring early
//! - **Exact oracle**: Brute-force top-K for recall@K ground truth
//! - **Benchmark driver**: Per-K latency, recall and visited-node savings,
//!   rendered as a tab-separated report
//! - **Vector file I/O**: Headerless little-endian f32 `.vec` files, single
//!   or pre-sharded
//!
//! # Example
//!
//! ```
//! use shard_knn::{merge_top_k, ScoredHit};
//!
//! let shard_a = vec![ScoredHit::new(3u64, 0.9), ScoredHit::new(1u64, 0.4)];
//! let shard_b = vec![ScoredHit::new(7u64, 0.7)];
//!
//! let top = merge_top_k(vec![shard_a, shard_b], 2);
//! assert_eq!(top[0].id.0, 3);
//! assert_eq!(top[1].id.0, 7);
//! ```

pub mod bench;
pub mod builder;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod exact;
pub mod index;
pub mod metrics;
pub mod persistence;
pub mod pruning;
pub mod searcher;
pub mod shard;
pub mod types;
pub mod vec_file;
pub mod vector;

// Re-export commonly used types at crate root
pub use bench::{run_benchmark, BenchOptions, BenchReport, BenchRunner, KReport, RunOutcome};
pub use builder::{build_shards, BuildSummary};
pub use config::{BuildConfig, GenerateConfig, RunConfig};
pub use coordinator::{merge_top_k, CoordinatorOptions, QueryResult, ShardQueryCoordinator};
pub use dataset::{generate_dataset, recall_at_k, DatasetDir, Manifest};
pub use distance::Similarity;
pub use error::{Result, ShardKnnError};
pub use exact::ExactNn;
pub use index::{HnswIndex, HnswParams, ShardIndex};
pub use persistence::Persistable;
pub use pruning::SharedPruningState;
pub use searcher::SearchMode;
pub use shard::{ShardHandle, ShardSet};
pub use types::{GlobalDocId, ScoredHit};
pub use vec_file::{read_docs_from_path, read_vec_file, write_vec_file};
pub use vector::{Vector, VectorSet};
