//! Per-shard index implementations.

pub mod hnsw;
pub mod traits;

pub use hnsw::{HnswIndex, HnswParams};
pub use traits::{NoBound, ScoreBound, ShardHits, ShardIndex};
