//! Reading and writing raw `.vec` files.
//!
//! A `.vec` file is a flat array of little-endian f32 values with no header:
//! `num_vectors * dim * 4` bytes. The dimension is never stored in the file,
//! so every reader takes it from the caller and rejects files whose size is
//! not a whole number of vectors.

use crate::constants::{format::BYTES_PER_FLOAT, layout};
use crate::error::{Result, ShardKnnError};
use crate::vector::VectorSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decode a flat little-endian f32 buffer into `dim`-dimensional vectors.
///
/// # Errors
/// `Config` if `dim` is zero, `VectorSize` if `bytes.len()` is not a multiple
/// of `dim * 4`.
pub fn decode_vectors(bytes: &[u8], dim: usize) -> Result<VectorSet> {
    let vector_bytes = vector_byte_size(dim)?;
    if bytes.len() % vector_bytes != 0 {
        return Err(ShardKnnError::VectorSize {
            size: bytes.len() as u64,
            vector_bytes,
            dim,
        });
    }

    let data: Vec<f32> = bytes
        .chunks_exact(BYTES_PER_FLOAT)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    VectorSet::from_flat(dim, data)
}

/// Encode vectors into the flat little-endian layout.
pub fn encode_vectors(vectors: &VectorSet) -> Vec<u8> {
    let mut out = Vec::with_capacity(vectors.as_flat().len() * BYTES_PER_FLOAT);
    for value in vectors.as_flat() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Read every vector from a `.vec` file.
pub fn read_vec_file(path: impl AsRef<Path>, dim: usize) -> Result<VectorSet> {
    let path = path.as_ref();
    let vector_bytes = vector_byte_size(dim)?;

    // Check the size before reading so a wrong --dim fails fast on large files.
    let size = fs::metadata(path)?.len();
    if size % vector_bytes as u64 != 0 {
        return Err(ShardKnnError::VectorSize {
            size,
            vector_bytes,
            dim,
        });
    }

    let bytes = fs::read(path)?;
    let vectors = decode_vectors(&bytes, dim)?;
    debug!(path = %path.display(), count = vectors.len(), dim, "read vector file");
    Ok(vectors)
}

/// Write vectors to a `.vec` file, creating parent directories as needed.
pub fn write_vec_file(path: impl AsRef<Path>, vectors: &VectorSet) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for value in vectors.as_flat() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Read all document vectors from a file or a dataset directory.
///
/// A regular file is read as-is. A directory yields its `docs.vec` when
/// present, otherwise the concatenation of `docs-shard-0.vec`,
/// `docs-shard-1.vec`, ... in numeric order.
///
/// # Errors
/// `NotFound` if the path does not exist or the directory holds neither form.
pub fn read_docs_from_path(path: impl AsRef<Path>, dim: usize) -> Result<VectorSet> {
    let path = path.as_ref();
    if path.is_file() {
        return read_vec_file(path, dim);
    }
    if !path.is_dir() {
        return Err(ShardKnnError::not_found(format!(
            "not a file or directory: {}",
            path.display()
        )));
    }

    let single = path.join(layout::DOCS_FILE_NAME);
    if single.is_file() {
        return read_vec_file(single, dim);
    }

    let shard_files = list_doc_shard_files(path)?;
    if shard_files.is_empty() {
        return Err(ShardKnnError::not_found(format!(
            "no {} or {}*.{} in {}",
            layout::DOCS_FILE_NAME,
            layout::DOCS_SHARD_PREFIX,
            layout::VEC_EXTENSION,
            path.display()
        )));
    }

    let mut all = VectorSet::new(dim);
    for (_, file) in &shard_files {
        all.extend_from(&read_vec_file(file, dim)?)?;
    }
    debug!(
        dir = %path.display(),
        files = shard_files.len(),
        count = all.len(),
        "concatenated doc shard files"
    );
    Ok(all)
}

/// List `docs-shard-<n>.vec` files in `dir`, sorted by `n`.
pub fn list_doc_shard_files(dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_path = entry.path();
        if !file_path.is_file() {
            continue;
        }
        if let Some(index) = entry.file_name().to_str().and_then(doc_shard_index) {
            files.push((index, file_path));
        }
    }
    files.sort_by_key(|(index, _)| *index);
    Ok(files)
}

/// Path of the `index`-th pre-sharded document file inside `dir`.
pub fn doc_shard_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!(
        "{}{}.{}",
        layout::DOCS_SHARD_PREFIX,
        index,
        layout::VEC_EXTENSION
    ))
}

/// Parse `docs-shard-<n>.vec` into `n`.
fn doc_shard_index(file_name: &str) -> Option<usize> {
    let stem = file_name.strip_suffix(layout::VEC_EXTENSION)?.strip_suffix('.')?;
    let digits = stem.strip_prefix(layout::DOCS_SHARD_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn vector_byte_size(dim: usize) -> Result<usize> {
    if dim == 0 {
        return Err(ShardKnnError::config("vector dimension must be >= 1"));
    }
    Ok(dim * BYTES_PER_FLOAT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_decode_rejects_partial_vector() {
        let bytes = vec![0u8; 4 * 3 + 2];
        let err = decode_vectors(&bytes, 3).unwrap_err();
        match err {
            ShardKnnError::VectorSize {
                size,
                vector_bytes,
                dim,
            } => {
                assert_eq!(size, 14);
                assert_eq!(vector_bytes, 12);
                assert_eq!(dim, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_is_little_endian() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-2.25f32).to_le_bytes());
        let set = decode_vectors(&bytes, 2).unwrap();
        assert_eq!(set.get(0), &[1.5, -2.25]);
    }

    #[test]
    fn test_zero_dim_is_config_error() {
        assert!(matches!(
            decode_vectors(&[], 0),
            Err(ShardKnnError::Config(_))
        ));
    }

    #[test]
    fn test_empty_file_yields_no_vectors() {
        let set = decode_vectors(&[], 8).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_doc_shard_index_parsing() {
        assert_eq!(doc_shard_index("docs-shard-0.vec"), Some(0));
        assert_eq!(doc_shard_index("docs-shard-12.vec"), Some(12));
        assert_eq!(doc_shard_index("docs-shard-.vec"), None);
        assert_eq!(doc_shard_index("docs-shard-1a.vec"), None);
        assert_eq!(doc_shard_index("docs.vec"), None);
        assert_eq!(doc_shard_index("docs-shard-3.bin"), None);
    }

    #[test]
    fn test_directory_prefers_docs_vec() {
        let dir = tempdir().unwrap();
        let whole = VectorSet::from_rows(2, [[1.0f32, 1.0]]).unwrap();
        let shard = VectorSet::from_rows(2, [[9.0f32, 9.0]]).unwrap();
        write_vec_file(dir.path().join("docs.vec"), &whole).unwrap();
        write_vec_file(doc_shard_path(dir.path(), 0), &shard).unwrap();

        let docs = read_docs_from_path(dir.path(), 2).unwrap();
        assert_eq!(docs, whole);
    }

    #[test]
    fn test_directory_concatenates_shards_numerically() {
        let dir = tempdir().unwrap();
        // Written out of order and with a two-digit index to exercise numeric sorting.
        for index in [10usize, 2, 0, 1] {
            let row = [index as f32, -(index as f32) - 0.5];
            let set = VectorSet::from_rows(2, [row]).unwrap();
            write_vec_file(doc_shard_path(dir.path(), index), &set).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let docs = read_docs_from_path(dir.path(), 2).unwrap();
        let firsts: Vec<f32> = docs.iter().map(|row| row[0]).collect();
        assert_eq!(firsts, vec![0.0, 1.0, 2.0, 10.0]);
    }

    #[test]
    fn test_directory_without_docs_is_not_found() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_docs_from_path(dir.path(), 4),
            Err(ShardKnnError::NotFound(_))
        ));
        assert!(matches!(
            read_docs_from_path(dir.path().join("missing"), 4),
            Err(ShardKnnError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_rejects_size_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.vec");
        fs::write(&path, vec![0u8; 20]).unwrap();
        assert!(matches!(
            read_vec_file(&path, 3),
            Err(ShardKnnError::VectorSize { size: 20, vector_bytes: 12, dim: 3 })
        ));
    }
}
