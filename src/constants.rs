//! Named constants for configuration values.
//!
//! This module centralizes magic numbers, default values and file naming
//! conventions used throughout the crate.

/// Constants for the HNSW shard index.
pub mod hnsw {
    /// Default M parameter (max connections per layer).
    pub const DEFAULT_M: usize = 16;

    /// Default ef_construction (beam width during build).
    pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

    /// Default ef_search (beam width during search). Raised to `k` when smaller.
    pub const DEFAULT_EF_SEARCH: usize = 100;

    /// Default RNG seed for level assignment.
    pub const DEFAULT_SEED: u64 = 42;
}

/// Constants for collaborative pruning.
pub mod pruning {
    /// Layer-0 expansions between reads of the shared bound.
    pub const BOUND_REFRESH_INTERVAL: usize = 8;

    /// Layer-0 expansions between pushes of the local top-K into the shard's slot.
    pub const PUBLISH_INTERVAL: usize = 32;
}

/// Constants for cache-friendly scanning.
pub mod cache {
    /// Documents per rayon task in the parallel exact scan.
    /// Sized to fit multiple vectors in L2 cache.
    pub const EXACT_CHUNK_SIZE: usize = 1000;
}

/// Constants for the benchmark driver.
pub mod bench {
    /// K values used when none are configured.
    pub const DEFAULT_K_VALUES: [usize; 4] = [10, 100, 1_000, 10_000];

    /// Completed queries between progress lines.
    pub const PROGRESS_INTERVAL: usize = 1_000;

    /// Placeholder for metrics that were not measured.
    pub const NOT_AVAILABLE: &str = "N/A";

    /// Tag prefixed to machine-greppable summary lines.
    pub const SUMMARY_TAG: &str = "SUMMARY";

    /// Column header of the per-K table.
    pub const REPORT_HEADER: &str =
        "topK\tlatency_ms\tmerged_recall\tlookups_saved\tnDoc\tnumShards\tnum_queries";
}

/// On-disk naming conventions.
pub mod layout {
    /// Prefix of shard subdirectories (`shard-0`, `shard-1`, ...).
    pub const SHARD_DIR_PREFIX: &str = "shard-";

    /// Index file inside each shard directory.
    pub const SHARD_FILE_NAME: &str = "shard.knn";

    /// Unsharded document vectors of a dataset.
    pub const DOCS_FILE_NAME: &str = "docs.vec";

    /// Prefix of pre-sharded document vector files (`docs-shard-0.vec`, ...).
    pub const DOCS_SHARD_PREFIX: &str = "docs-shard-";

    /// Extension of raw vector files.
    pub const VEC_EXTENSION: &str = "vec";

    /// Query vectors of a dataset.
    pub const QUERIES_FILE_NAME: &str = "queries.vec";

    /// Dataset manifest.
    pub const MANIFEST_FILE_NAME: &str = "meta.json";
}

/// Constants for the vector file format.
pub mod format {
    /// Bytes per stored component (little-endian f32).
    pub const BYTES_PER_FLOAT: usize = 4;
}
