//! Opening the shards of a sharded index directory.
//!
//! A shards directory holds one `shard-<n>` subdirectory per shard, each with
//! a `shard.knn` index file. Shards are discovered by name, ordered by their
//! numeric suffix, and opened once per run.

use crate::constants::layout;
use crate::error::{Result, ShardKnnError};
use crate::index::hnsw::HnswIndex;
use crate::index::traits::{ScoreBound, ShardHits, ShardIndex};
use crate::persistence::Persistable;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One opened shard.
pub struct ShardHandle {
    index: usize,
    path: PathBuf,
    inner: Box<dyn ShardIndex>,
}

impl ShardHandle {
    /// Wrap an already-open index as shard number `index`.
    pub fn new(index: usize, path: impl Into<PathBuf>, inner: Box<dyn ShardIndex>) -> Self {
        Self {
            index,
            path: path.into(),
            inner,
        }
    }

    /// Open the HNSW index stored in shard directory `path`.
    ///
    /// `ef_search` overrides the beam width saved with the index.
    pub fn open(index: usize, path: impl Into<PathBuf>, ef_search: Option<usize>) -> Result<Self> {
        let path = path.into();
        let mut hnsw = HnswIndex::load(path.join(layout::SHARD_FILE_NAME))
            .map_err(|e| ShardKnnError::shard_open(index, &path, e))?;
        if let Some(ef) = ef_search {
            hnsw.set_ef_search(ef);
        }
        debug!(shard = index, path = %path.display(), docs = hnsw.len(), "opened shard");
        Ok(Self::new(index, path, Box::new(hnsw)))
    }

    /// Zero-based position of this shard.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_docs(&self) -> usize {
        self.inner.num_docs()
    }

    pub fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    /// Run a top-K query against this shard.
    pub fn search(&self, query: &[f32], k: usize, bound: Option<&dyn ScoreBound>) -> Result<ShardHits> {
        self.inner.search(query, k, bound)
    }
}

impl fmt::Debug for ShardHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardHandle")
            .field("index", &self.index)
            .field("path", &self.path)
            .field("num_docs", &self.num_docs())
            .finish()
    }
}

/// All shards of one index, ordered by shard number.
///
/// Dropping the set releases every shard.
#[derive(Debug)]
pub struct ShardSet {
    shards: Vec<ShardHandle>,
}

impl ShardSet {
    /// Open every `shard-<n>` subdirectory of `dir`.
    ///
    /// # Errors
    /// `Config` if `dir` is missing or contains no shard directories;
    /// `ShardOpen` naming the first shard that fails to open. Shards opened
    /// before the failure are released before returning.
    pub fn open_dir(dir: impl AsRef<Path>, ef_search: Option<usize>) -> Result<Self> {
        let dir = dir.as_ref();
        let paths = discover_shards(dir)?;
        if paths.is_empty() {
            return Err(ShardKnnError::config(format!(
                "no {}<n> directories under {}",
                layout::SHARD_DIR_PREFIX,
                dir.display()
            )));
        }

        let mut shards = Vec::with_capacity(paths.len());
        for (index, path) in paths.into_iter().enumerate() {
            // On error `shards` is dropped here, closing what was opened.
            shards.push(ShardHandle::open(index, path, ef_search)?);
        }

        let set = Self::from_handles(shards)?;
        info!(
            dir = %dir.display(),
            shards = set.len(),
            docs = set.total_docs(),
            "opened shard set"
        );
        Ok(set)
    }

    /// Assemble a set from already-open handles.
    ///
    /// # Errors
    /// `Config` if `shards` is empty or the shards disagree on dimension.
    pub fn from_handles(shards: Vec<ShardHandle>) -> Result<Self> {
        if shards.is_empty() {
            return Err(ShardKnnError::config("shard set is empty"));
        }
        let dims: Vec<usize> = shards
            .iter()
            .filter(|s| s.num_docs() > 0)
            .map(ShardHandle::dimension)
            .collect();
        if let Some(&first) = dims.first() {
            if let Some(&other) = dims.iter().find(|&&d| d != first) {
                return Err(ShardKnnError::config(format!(
                    "shards disagree on dimension: {} vs {}",
                    first, other
                )));
            }
        }
        Ok(Self { shards })
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Sum of every shard's document count.
    pub fn total_docs(&self) -> usize {
        self.shards.iter().map(ShardHandle::num_docs).sum()
    }

    /// Dimension shared by the non-empty shards, if any are non-empty.
    pub fn dimension(&self) -> Option<usize> {
        self.shards
            .iter()
            .find(|s| s.num_docs() > 0)
            .map(ShardHandle::dimension)
    }

    pub fn handles(&self) -> &[ShardHandle] {
        &self.shards
    }

    /// Release every shard.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for ShardSet {
    fn drop(&mut self) {
        debug!(shards = self.shards.len(), "closing shard set");
    }
}

/// Shard directories under `dir`, sorted by numeric suffix.
///
/// Entries that are not directories named `shard-<digits>` are ignored.
pub fn discover_shards(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ShardKnnError::config(format!(
            "shards directory does not exist: {}",
            dir.display()
        )));
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(n) = entry.file_name().to_str().and_then(shard_number) {
            found.push((n, path));
        }
    }
    found.sort_by_key(|(n, _)| *n);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Directory of shard `index` under `dir`.
pub fn shard_dir(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{}{}", layout::SHARD_DIR_PREFIX, index))
}

fn shard_number(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(layout::SHARD_DIR_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
