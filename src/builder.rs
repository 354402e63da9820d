//! Building per-shard HNSW indices from a dataset directory.
//!
//! Two layouts are supported:
//!
//! - **Unsharded** (`docs.vec`): the documents are split into `num_shards`
//!   contiguous ranges; the first `num_docs % num_shards` shards get one extra
//!   document.
//! - **Pre-sharded** (`docs-shard-<i>.vec`): the vec shard files are grouped
//!   into `num_shards` contiguous groups of equal size. The vec shard count
//!   must be a multiple of `num_shards`.
//!
//! Either way a document's global id is its position in the logical
//! unsharded sequence, so the shards can be merged and scored against exact
//! ground truth computed over the whole collection.
//!
//! ```ignore
//! let mut config = BuildConfig::new("data/wiki-1m", "indexes/wiki-1m");
//! config.num_shards = 4;
//! config.threads = 4;
//! let summary = build_shards(&config)?;
//! ```

use crate::config::BuildConfig;
use crate::constants::layout;
use crate::dataset::{split_ranges, DatasetDir};
use crate::error::{Result, ShardKnnError};
use crate::index::hnsw::{HnswIndex, HnswParams};
use crate::persistence::Persistable;
use crate::shard::shard_dir;
use crate::vector::VectorSet;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// What `build_shards` wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub num_shards: usize,
    /// Documents per shard, in shard order.
    pub shard_sizes: Vec<usize>,
    pub total_docs: usize,
}

/// Documents for one shard plus the global id of the first of them.
struct ShardInput {
    index: usize,
    first_id: u64,
    docs: VectorSet,
}

/// Build and save one HNSW index per shard under `config.output_dir`.
///
/// Shards are built concurrently on up to `config.threads` threads. If any
/// shard fails, the error of the lowest-numbered failing shard is returned.
pub fn build_shards(config: &BuildConfig) -> Result<BuildSummary> {
    config.validate()?;
    let dataset = DatasetDir::open(&config.dataset_dir)?;
    let start = Instant::now();

    let inputs = if dataset.manifest().is_sharded() {
        pre_sharded_inputs(&dataset, config.num_shards)?
    } else {
        split_inputs(&dataset, config.num_shards)?
    };

    info!(
        dataset = %dataset.dir().display(),
        output = %config.output_dir.display(),
        shards = config.num_shards,
        docs = dataset.manifest().num_docs,
        dim = dataset.dim(),
        threads = config.threads,
        "building shards"
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.threads.min(config.num_shards))
        .thread_name(|i| format!("shard-build-{i}"))
        .build()
        .map_err(|e| ShardKnnError::config(format!("failed to build shard build pool: {e}")))?;

    let params = config.params;
    let output = config.output_dir.as_path();
    let results: Vec<Result<usize>> = pool.install(|| {
        inputs
            .into_par_iter()
            .map(|input| build_one(output, input, params))
            .collect()
    });
    let shard_sizes = results.into_iter().collect::<Result<Vec<usize>>>()?;

    let summary = BuildSummary {
        num_shards: shard_sizes.len(),
        total_docs: shard_sizes.iter().sum(),
        shard_sizes,
    };
    info!(
        shards = summary.num_shards,
        docs = summary.total_docs,
        elapsed_s = start.elapsed().as_secs_f64(),
        "finished building shards"
    );
    Ok(summary)
}

fn build_one(output: &Path, input: ShardInput, params: HnswParams) -> Result<usize> {
    let start = Instant::now();
    let count = input.docs.len();
    let index = HnswIndex::build(&input.docs, input.first_id, params)?;
    let path = shard_dir(output, input.index).join(layout::SHARD_FILE_NAME);
    index.save(&path)?;
    info!(
        shard = input.index,
        docs = count,
        first_id = input.first_id,
        elapsed_s = start.elapsed().as_secs_f64(),
        path = %path.display(),
        "built shard"
    );
    Ok(count)
}

/// Split `docs.vec` into `num_shards` contiguous ranges.
fn split_inputs(dataset: &DatasetDir, num_shards: usize) -> Result<Vec<ShardInput>> {
    let docs = dataset.read_docs()?;
    if num_shards > docs.len() {
        return Err(ShardKnnError::config(format!(
            "--num-shards {} exceeds document count {}",
            num_shards,
            docs.len()
        )));
    }
    Ok(split_ranges(docs.len(), num_shards)
        .into_iter()
        .enumerate()
        .map(|(index, range)| ShardInput {
            index,
            first_id: range.start as u64,
            docs: docs.slice(range.start, range.end),
        })
        .collect())
}

/// Group pre-sharded vec files into `num_shards` contiguous groups.
fn pre_sharded_inputs(dataset: &DatasetDir, num_shards: usize) -> Result<Vec<ShardInput>> {
    let manifest = dataset.manifest();
    let num_vec_shards = manifest.num_shards;
    if num_vec_shards % num_shards != 0 {
        return Err(ShardKnnError::config(format!(
            "dataset has {} vec shards, which is not a multiple of --num-shards {}",
            num_vec_shards, num_shards
        )));
    }
    let per_index = num_vec_shards / num_shards;

    let mut inputs = Vec::with_capacity(num_shards);
    for index in 0..num_shards {
        let first_vec = index * per_index;
        let mut docs = VectorSet::new(dataset.dim());
        for vec_shard in first_vec..first_vec + per_index {
            docs.extend_from(&dataset.read_doc_shard(vec_shard)?)?;
        }
        let first_id = manifest.shard_doc_offsets[first_vec];
        debug!(
            shard = index,
            vec_shards = ?(first_vec..first_vec + per_index),
            docs = docs.len(),
            first_id,
            "grouped vec shards"
        );
        inputs.push(ShardInput {
            index,
            first_id,
            docs,
        });
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerateConfig;
    use crate::dataset::generate_dataset;
    use crate::shard::ShardSet;
    use crate::types::GlobalDocId;
    use tempfile::tempdir;

    fn small_params() -> HnswParams {
        HnswParams {
            m: 8,
            ef_construction: 32,
            ..HnswParams::default()
        }
    }

    #[test]
    fn test_build_unsharded_dataset() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        generate_dataset(&GenerateConfig::new(&data, 11, 2, 8)).unwrap();

        let out = dir.path().join("index");
        let config = BuildConfig {
            num_shards: 3,
            threads: 2,
            params: small_params(),
            ..BuildConfig::new(&data, &out)
        };
        let summary = build_shards(&config).unwrap();
        assert_eq!(summary.shard_sizes, vec![4, 4, 3]);
        assert_eq!(summary.total_docs, 11);

        let shards = ShardSet::open_dir(&out, None).unwrap();
        assert_eq!(shards.len(), 3);
        assert_eq!(shards.total_docs(), 11);
        assert_eq!(shards.dimension(), Some(8));
    }

    #[test]
    fn test_single_shard_still_uses_shard_dir() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        generate_dataset(&GenerateConfig::new(&data, 5, 1, 4)).unwrap();

        let out = dir.path().join("index");
        build_shards(&BuildConfig::new(&data, &out)).unwrap();
        assert!(out.join("shard-0").join(layout::SHARD_FILE_NAME).is_file());
    }

    #[test]
    fn test_pre_sharded_ids_follow_offsets() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        let generate = GenerateConfig {
            num_vec_shards: 4,
            ..GenerateConfig::new(&data, 10, 1, 4)
        };
        generate_dataset(&generate).unwrap();
        let dataset = DatasetDir::open(&data).unwrap();
        let docs = dataset.read_doc_shard(2).unwrap();

        let out = dir.path().join("index");
        let config = BuildConfig {
            num_shards: 2,
            params: small_params(),
            ..BuildConfig::new(&data, &out)
        };
        // Vec shards hold 3, 3, 2, 2 documents.
        let summary = build_shards(&config).unwrap();
        assert_eq!(summary.shard_sizes, vec![6, 4]);

        // The first document of vec shard 2 is global id 6, stored in shard 1.
        let shards = ShardSet::open_dir(&out, None).unwrap();
        let hits = shards.handles()[1].search(docs.get(0), 1, None).unwrap().hits;
        assert_eq!(hits[0].id, GlobalDocId(6));
    }

    #[test]
    fn test_pre_sharded_requires_divisible_count() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        let generate = GenerateConfig {
            num_vec_shards: 3,
            ..GenerateConfig::new(&data, 9, 1, 4)
        };
        generate_dataset(&generate).unwrap();

        let config = BuildConfig {
            num_shards: 2,
            ..BuildConfig::new(&data, dir.path().join("index"))
        };
        assert!(matches!(build_shards(&config), Err(ShardKnnError::Config(_))));
    }

    #[test]
    fn test_too_many_shards_for_docs() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        generate_dataset(&GenerateConfig::new(&data, 2, 1, 4)).unwrap();
        let config = BuildConfig {
            num_shards: 3,
            ..BuildConfig::new(&data, dir.path().join("index"))
        };
        assert!(matches!(build_shards(&config), Err(ShardKnnError::Config(_))));
    }
}
