//! Dataset directories, synthetic dataset generation, and recall.
//!
//! A dataset directory looks like:
//!
//! ```text
//! <dataset>/
//!   meta.json            manifest (dim, num_docs, optional pre-shard layout)
//!   docs.vec             all documents, or ...
//!   docs-shard-0.vec     ... pre-sharded documents, one file per vec shard
//!   docs-shard-1.vec
//!   queries.vec          query vectors
//! ```
//!
//! Global document ids are positions in the logical, unsharded document
//! sequence. For pre-sharded datasets, `shard_doc_offsets[i]` is the global id
//! of the first document in `docs-shard-<i>.vec`.

use crate::config::GenerateConfig;
use crate::constants::layout;
use crate::error::{Result, ShardKnnError};
use crate::types::GlobalDocId;
use crate::vec_file::{doc_shard_path, read_vec_file, write_vec_file};
use crate::vector::VectorSet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents of `meta.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub dim: usize,
    pub num_docs: usize,
    #[serde(default)]
    pub num_query_vectors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_docs_vec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_queries_vec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
    /// Number of `docs-shard-<i>.vec` files; 0 or 1 means a single `docs.vec`.
    #[serde(default)]
    pub num_shards: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shard_sizes: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shard_doc_offsets: Vec<u64>,
}

impl Manifest {
    /// Return true if documents are split over `docs-shard-<i>.vec` files.
    pub fn is_sharded(&self) -> bool {
        self.num_shards > 1
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check internal consistency of the manifest.
    pub fn validate(&self) -> Result<()> {
        if self.dim < 1 {
            return Err(ShardKnnError::invalid_format("meta.json: dim must be >= 1"));
        }
        if !self.is_sharded() {
            return Ok(());
        }
        if self.shard_sizes.len() != self.num_shards || self.shard_doc_offsets.len() != self.num_shards {
            return Err(ShardKnnError::invalid_format(format!(
                "meta.json: num_shards={} but {} shard_sizes and {} shard_doc_offsets",
                self.num_shards,
                self.shard_sizes.len(),
                self.shard_doc_offsets.len()
            )));
        }
        let total: usize = self.shard_sizes.iter().sum();
        if total != self.num_docs {
            return Err(ShardKnnError::invalid_format(format!(
                "meta.json: shard_sizes sum to {} but num_docs={}",
                total, self.num_docs
            )));
        }
        Ok(())
    }
}

/// An opened dataset directory with a validated manifest.
#[derive(Debug, Clone)]
pub struct DatasetDir {
    dir: PathBuf,
    manifest: Manifest,
}

impl DatasetDir {
    /// Open `dir`, reading and validating its `meta.json`.
    ///
    /// # Errors
    /// `NotFound` if `meta.json` or the document file(s) it implies are missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let meta = dir.join(layout::MANIFEST_FILE_NAME);
        if !meta.is_file() {
            return Err(ShardKnnError::not_found(format!(
                "missing {} in dataset dir {}",
                layout::MANIFEST_FILE_NAME,
                dir.display()
            )));
        }
        let manifest = Manifest::load(&meta)?;
        manifest.validate()?;

        let dataset = Self { dir, manifest };
        let first_docs = if dataset.manifest.is_sharded() {
            dataset.doc_shard_path(0)
        } else {
            dataset.docs_path()
        };
        if !first_docs.is_file() {
            return Err(ShardKnnError::not_found(format!(
                "missing {}",
                first_docs.display()
            )));
        }
        Ok(dataset)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn dim(&self) -> usize {
        self.manifest.dim
    }

    /// `dataset_name` from the manifest, else the directory name.
    pub fn name(&self) -> String {
        self.manifest.dataset_name.clone().unwrap_or_else(|| {
            self.dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    pub fn docs_path(&self) -> PathBuf {
        self.dir.join(layout::DOCS_FILE_NAME)
    }

    pub fn queries_path(&self) -> PathBuf {
        self.dir.join(layout::QUERIES_FILE_NAME)
    }

    pub fn doc_shard_path(&self, index: usize) -> PathBuf {
        doc_shard_path(&self.dir, index)
    }

    /// Read `docs.vec`, checking its count against `num_docs`.
    pub fn read_docs(&self) -> Result<VectorSet> {
        let path = self.docs_path();
        let docs = read_vec_file(&path, self.dim())?;
        check_count(&path, docs.len(), self.manifest.num_docs, "num_docs")?;
        Ok(docs)
    }

    /// Read `docs-shard-<index>.vec`, checking its count against `shard_sizes[index]`.
    pub fn read_doc_shard(&self, index: usize) -> Result<VectorSet> {
        let expected = *self.manifest.shard_sizes.get(index).ok_or_else(|| {
            ShardKnnError::invalid_parameter(format!(
                "vec shard {} out of range (num_shards={})",
                index, self.manifest.num_shards
            ))
        })?;
        let path = self.doc_shard_path(index);
        let docs = read_vec_file(&path, self.dim())?;
        check_count(&path, docs.len(), expected, &format!("shard_sizes[{}]", index))?;
        Ok(docs)
    }

    pub fn read_queries(&self) -> Result<VectorSet> {
        read_vec_file(self.queries_path(), self.dim())
    }
}

fn check_count(path: &Path, actual: usize, expected: usize, field: &str) -> Result<()> {
    if actual != expected {
        return Err(ShardKnnError::invalid_format(format!(
            "{} has {} vectors but meta.json says {}={}",
            path.display(),
            actual,
            field,
            expected
        )));
    }
    Ok(())
}

/// Split `0..n` into `parts` contiguous ranges; the first `n % parts` ranges
/// get one extra element.
pub fn split_ranges(n: usize, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return Vec::new();
    }
    let per_part = n / parts;
    let remainder = n % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for part in 0..parts {
        let len = per_part + usize::from(part < remainder);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Write a synthetic dataset of random unit vectors.
///
/// Documents and queries are drawn from one RNG seeded with `config.seed`, so
/// the same config always yields the same files.
pub fn generate_dataset(config: &GenerateConfig) -> Result<Manifest> {
    config.validate()?;
    fs::create_dir_all(&config.output_dir)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let docs = VectorSet::random_unit(config.num_docs, config.dim, &mut rng);
    let queries = VectorSet::random_unit(config.num_queries, config.dim, &mut rng);

    let dir = &config.output_dir;
    let mut manifest = Manifest {
        source: Some("synthetic".to_string()),
        dim: config.dim,
        num_docs: config.num_docs,
        num_query_vectors: config.num_queries,
        output_queries_vec: Some(layout::QUERIES_FILE_NAME.to_string()),
        dataset_name: dir.file_name().map(|n| n.to_string_lossy().into_owned()),
        ..Manifest::default()
    };

    if config.num_vec_shards > 1 {
        for (index, range) in split_ranges(docs.len(), config.num_vec_shards).into_iter().enumerate() {
            write_vec_file(doc_shard_path(dir, index), &docs.slice(range.start, range.end))?;
            manifest.shard_sizes.push(range.len());
            manifest.shard_doc_offsets.push(range.start as u64);
        }
        manifest.num_shards = config.num_vec_shards;
    } else {
        write_vec_file(dir.join(layout::DOCS_FILE_NAME), &docs)?;
        manifest.output_docs_vec = Some(layout::DOCS_FILE_NAME.to_string());
        manifest.num_shards = 1;
    }
    write_vec_file(dir.join(layout::QUERIES_FILE_NAME), &queries)?;
    manifest.save(dir.join(layout::MANIFEST_FILE_NAME))?;

    info!(
        dir = %dir.display(),
        docs = config.num_docs,
        queries = config.num_queries,
        dim = config.dim,
        vec_shards = config.num_vec_shards,
        "generated synthetic dataset"
    );
    Ok(manifest)
}

/// Compute recall@k between predicted and ground truth results.
///
/// The fraction of the exact top-k found among the first `k` predictions. The
/// denominator is `min(k, ground_truth.len())`, so a collection smaller than
/// `k` can still reach 1.0. Returns 0.0 when there is nothing to find.
pub fn recall_at_k(predicted: &[GlobalDocId], ground_truth: &[GlobalDocId], k: usize) -> f64 {
    let effective_k = k.min(ground_truth.len());
    if effective_k == 0 {
        return 0.0;
    }

    let pred_set: HashSet<GlobalDocId> = predicted.iter().take(k).copied().collect();
    let truth_set: HashSet<GlobalDocId> = ground_truth.iter().take(effective_k).copied().collect();

    let intersection = pred_set.intersection(&truth_set).count();
    intersection as f64 / effective_k as f64
}
