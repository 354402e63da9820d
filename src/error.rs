//! Error types for shard-knn operations.
//!
//! Every failure in the harness is fatal to the run that hit it. The only
//! place that recovers is the binary's `main`, which logs the cause and exits
//! non-zero. Missing ground truth is deliberately *not* an error: recall is
//! reported as `N/A` instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`ShardKnnError`].
pub type Result<T> = std::result::Result<T, ShardKnnError>;

/// Errors that can occur while loading data, opening shards, or running a benchmark.
#[derive(Error, Debug)]
pub enum ShardKnnError {
    /// Missing or invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// A vector file whose length is not a whole number of vectors.
    #[error("vector file size {size} is not a multiple of vector size {vector_bytes} (dim={dim})")]
    VectorSize {
        /// Actual byte length of the input.
        size: u64,
        /// Expected bytes per vector (`dim * 4`).
        vector_bytes: usize,
        /// Declared dimension.
        dim: usize,
    },

    /// Input has an invalid or unrecognized format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// A required file or directory does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A shard could not be opened.
    #[error("failed to open shard {shard} at {}: {source}", path.display())]
    ShardOpen {
        /// Zero-based shard index.
        shard: usize,
        /// Shard directory.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: Box<ShardKnnError>,
    },

    /// A shard failed while executing a query.
    #[error("search failed on shard {shard}: {source}")]
    ShardSearch {
        /// Zero-based shard index.
        shard: usize,
        /// Underlying cause.
        #[source]
        source: Box<ShardKnnError>,
    },

    /// Vector dimensions do not match the expected dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected vector dimension.
        expected: usize,
        /// Actual vector dimension provided.
        actual: usize,
    },

    /// Invalid parameter value provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during serialization or deserialization.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Checksum verification failed while loading a shard file.
    #[error("checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    /// A shard file decoded but describes an inconsistent index.
    #[error("index corrupted: {0}")]
    IndexCorrupted(String),
}

impl ShardKnnError {
    /// Creates a new `Config` error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new `InvalidFormat` error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Creates a new `NotFound` error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Creates a new `IndexCorrupted` error.
    pub fn index_corrupted(msg: impl Into<String>) -> Self {
        Self::IndexCorrupted(msg.into())
    }

    /// Creates a new `DimensionMismatch` error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Wraps `source` as a failure to open shard `shard`.
    pub fn shard_open(shard: usize, path: impl Into<PathBuf>, source: ShardKnnError) -> Self {
        Self::ShardOpen {
            shard,
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Wraps `source` as a search failure on shard `shard`.
    pub fn shard_search(shard: usize, source: ShardKnnError) -> Self {
        Self::ShardSearch {
            shard,
            source: Box::new(source),
        }
    }

    /// Index of the shard this error is attributed to, if any.
    pub fn shard_index(&self) -> Option<usize> {
        match self {
            Self::ShardOpen { shard, .. } | Self::ShardSearch { shard, .. } => Some(*shard),
            _ => None,
        }
    }
}

impl From<bincode::Error> for ShardKnnError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ShardKnnError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShardKnnError::VectorSize {
            size: 10,
            vector_bytes: 16,
            dim: 4,
        };
        assert_eq!(
            err.to_string(),
            "vector file size 10 is not a multiple of vector size 16 (dim=4)"
        );

        let err = ShardKnnError::dimension_mismatch(8, 4);
        assert_eq!(err.to_string(), "dimension mismatch: expected 8, got 4");

        let err = ShardKnnError::config("--k values must be >= 1");
        assert_eq!(err.to_string(), "configuration error: --k values must be >= 1");
    }

    #[test]
    fn test_shard_errors_carry_index() {
        let err = ShardKnnError::shard_search(3, ShardKnnError::invalid_parameter("boom"));
        assert_eq!(err.shard_index(), Some(3));
        assert!(err.to_string().contains("shard 3"));
        assert!(err.to_string().contains("boom"));

        let err = ShardKnnError::shard_open(1, "/tmp/shard-1", ShardKnnError::ChecksumMismatch);
        assert_eq!(err.shard_index(), Some(1));
        assert!(err.to_string().contains("/tmp/shard-1"));

        assert_eq!(ShardKnnError::ChecksumMismatch.shard_index(), None);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: ShardKnnError = io_err.into();
        assert!(matches!(err, ShardKnnError::Io(_)));
    }
}
