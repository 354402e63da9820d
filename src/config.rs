//! Validated configuration for the `run`, `build` and `generate` commands.
//!
//! The CLI parses flags into these structs; `validate()` rejects bad values
//! before any file is read or any shard is opened.

use crate::constants::{bench, hnsw as hnsw_defaults};
use crate::error::{Result, ShardKnnError};
use crate::index::hnsw::HnswParams;
use crate::searcher::SearchMode;
use std::path::{Path, PathBuf};

/// Parse a comma-separated list of K values such as `10,100,1000`.
pub fn parse_k_list(s: &str) -> Result<Vec<usize>> {
    let mut values = Vec::new();
    for part in s.split(',').map(str::trim) {
        if part.is_empty() {
            continue;
        }
        let k: usize = part
            .parse()
            .map_err(|_| ShardKnnError::config(format!("invalid K value '{}'", part)))?;
        if k < 1 {
            return Err(ShardKnnError::config("K values must be >= 1"));
        }
        values.push(k);
    }
    if values.is_empty() {
        return Err(ShardKnnError::config("at least one K value is required"));
    }
    Ok(values)
}

/// Settings for one benchmark run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Directory holding `shard-<n>` subdirectories.
    pub shards_dir: PathBuf,
    pub queries_path: PathBuf,
    pub dim: usize,
    /// Documents for exact ground truth; recall is `N/A` without them.
    pub docs_path: Option<PathBuf>,
    pub k_values: Vec<usize>,
    /// Shard-search threads; `None` derives it from the shard count.
    pub search_threads: Option<usize>,
    pub query_threads: usize,
    pub collaborative: bool,
    pub progress: bool,
    pub shard_timings: bool,
    /// Overrides the beam width saved with each shard.
    pub ef_search: Option<usize>,
}

impl RunConfig {
    /// A config with defaults for everything but the required paths and dimension.
    pub fn new(shards_dir: impl Into<PathBuf>, queries_path: impl Into<PathBuf>, dim: usize) -> Self {
        Self {
            shards_dir: shards_dir.into(),
            queries_path: queries_path.into(),
            dim,
            docs_path: None,
            k_values: bench::DEFAULT_K_VALUES.to_vec(),
            search_threads: None,
            query_threads: 1,
            collaborative: false,
            progress: false,
            shard_timings: false,
            ef_search: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim < 1 {
            return Err(ShardKnnError::config("--dim must be >= 1"));
        }
        if self.k_values.is_empty() {
            return Err(ShardKnnError::config("at least one K value is required"));
        }
        if self.k_values.contains(&0) {
            return Err(ShardKnnError::config("K values must be >= 1"));
        }
        if self.search_threads == Some(0) {
            return Err(ShardKnnError::config("--search-threads must be >= 1"));
        }
        if self.query_threads < 1 {
            return Err(ShardKnnError::config("--query-threads must be >= 1"));
        }
        if self.ef_search == Some(0) {
            return Err(ShardKnnError::config("--ef-search must be >= 1"));
        }
        require_dir(&self.shards_dir, "shards directory")?;
        if !self.queries_path.is_file() {
            return Err(ShardKnnError::config(format!(
                "queries file does not exist: {}",
                self.queries_path.display()
            )));
        }
        if let Some(docs) = &self.docs_path {
            if !docs.exists() {
                return Err(ShardKnnError::config(format!(
                    "docs path does not exist: {}",
                    docs.display()
                )));
            }
        }
        Ok(())
    }

    /// Shard-search pool size: the configured value, else one thread per
    /// shard per concurrent query.
    pub fn effective_search_threads(&self, num_shards: usize) -> usize {
        match self.search_threads {
            Some(n) => n,
            None if self.query_threads > 1 => num_shards * self.query_threads,
            None => num_shards,
        }
    }

    pub fn search_mode(&self) -> SearchMode {
        if self.collaborative {
            SearchMode::Collaborative
        } else {
            SearchMode::Standard
        }
    }

    /// Name used in `SUMMARY` lines: the last component of the shards directory.
    pub fn dataset_name(&self) -> String {
        self.shards_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.shards_dir.display().to_string())
    }
}

/// Settings for building shard indices from a dataset directory.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub dataset_dir: PathBuf,
    pub output_dir: PathBuf,
    pub num_shards: usize,
    /// Shards built concurrently.
    pub threads: usize,
    pub params: HnswParams,
}

impl BuildConfig {
    pub fn new(dataset_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            output_dir: output_dir.into(),
            num_shards: 1,
            threads: 1,
            params: HnswParams::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_shards < 1 {
            return Err(ShardKnnError::config("--num-shards must be >= 1"));
        }
        if self.threads < 1 {
            return Err(ShardKnnError::config("--threads must be >= 1"));
        }
        self.params
            .validate()
            .map_err(|e| ShardKnnError::config(e.to_string()))?;
        require_dir(&self.dataset_dir, "dataset directory")
    }
}

/// Settings for writing a synthetic dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateConfig {
    pub output_dir: PathBuf,
    pub num_docs: usize,
    pub num_queries: usize,
    pub dim: usize,
    /// Split documents over this many `docs-shard-<i>.vec` files; 1 writes `docs.vec`.
    pub num_vec_shards: usize,
    pub seed: u64,
}

impl GenerateConfig {
    pub fn new(output_dir: impl Into<PathBuf>, num_docs: usize, num_queries: usize, dim: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            num_docs,
            num_queries,
            dim,
            num_vec_shards: 1,
            seed: hnsw_defaults::DEFAULT_SEED,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim < 1 {
            return Err(ShardKnnError::config("--dim must be >= 1"));
        }
        if self.num_docs < 1 {
            return Err(ShardKnnError::config("--num-docs must be >= 1"));
        }
        if self.num_vec_shards < 1 || self.num_vec_shards > self.num_docs {
            return Err(ShardKnnError::config(format!(
                "--num-vec-shards must be between 1 and {}",
                self.num_docs
            )));
        }
        Ok(())
    }
}

fn require_dir(path: &Path, what: &str) -> Result<()> {
    if !path.is_dir() {
        return Err(ShardKnnError::config(format!(
            "{} does not exist: {}",
            what,
            path.display()
        )));
    }
    Ok(())
}
