//! Saving and loading shard indices.
//!
//! Every shard directory holds one index file, written by `shard-knn build`
//! and opened by `shard-knn run`.
//!
//! A file is a 24-byte [`ShardFileHeader`] followed by the bincode-encoded
//! index snapshot. The header's CRC32 is checked before anything is decoded.

mod format;

pub use format::{IndexKind, ShardFileHeader, FORMAT_VERSION, HEADER_LEN, MAGIC};

use crate::error::{Result, ShardKnnError};
use crate::index::hnsw::{HnswIndex, HnswSnapshot};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Trait for types that can be persisted to disk.
pub trait Persistable: Sized {
    /// Save to `path`, creating missing parent directories.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written or serialization fails.
    fn save(&self, path: impl AsRef<Path>) -> Result<()>;

    /// Load from `path`.
    ///
    /// # Errors
    /// `NotFound` if `path` is not a file; `InvalidFormat`,
    /// `ChecksumMismatch` or `IndexCorrupted` if its contents are unusable.
    fn load(path: impl AsRef<Path>) -> Result<Self>;
}

impl Persistable for HnswIndex {
    fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let payload = bincode::serialize(&self.to_snapshot())?;
        write_framed(path, IndexKind::Hnsw, &payload)?;
        debug!(path = %path.display(), bytes = payload.len(), nodes = self.len(), "saved shard index");
        Ok(())
    }

    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ShardKnnError::not_found(format!(
                "shard index file {}",
                path.display()
            )));
        }
        let bytes = fs::read(path)?;
        let payload = ShardFileHeader::open(&bytes, IndexKind::Hnsw)?;
        let snapshot: HnswSnapshot = bincode::deserialize(payload)?;
        HnswIndex::from_snapshot(snapshot)
    }
}

/// Write header and payload, creating parent directories as needed.
fn write_framed(path: &Path, kind: IndexKind, payload: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&ShardFileHeader::seal(kind, payload).encode())?;
    writer.write_all(payload)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}
