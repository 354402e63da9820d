//! The fixed header in front of every shard index file.
//!
//! ```text
//! offset  size  field
//!      0     8  magic "SHARDKNN"
//!      8     4  format version (LE u32)
//!     12     4  index kind (LE u32)
//!     16     4  flags (LE u32, none defined)
//!     20     4  CRC32 of the payload (LE u32)
//!     24     -  payload
//! ```

use crate::error::{Result, ShardKnnError};

pub const MAGIC: [u8; 8] = *b"SHARDKNN";

/// Newest format this build reads and the one it writes.
pub const FORMAT_VERSION: u32 = 1;

/// Bytes before the payload.
pub const HEADER_LEN: usize = 24;

/// What the payload encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IndexKind {
    Hnsw = 1,
}

impl TryFrom<u32> for IndexKind {
    type Error = ShardKnnError;

    fn try_from(raw: u32) -> Result<Self> {
        match raw {
            1 => Ok(Self::Hnsw),
            other => Err(ShardKnnError::invalid_format(format!("unknown index kind {}", other))),
        }
    }
}

/// Decoded header fields. The magic is checked on decode and not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardFileHeader {
    pub version: u32,
    pub kind: IndexKind,
    pub flags: u32,
    pub checksum: u32,
}

impl ShardFileHeader {
    /// Header for `payload` at the current version.
    pub fn seal(kind: IndexKind, payload: &[u8]) -> Self {
        Self {
            version: FORMAT_VERSION,
            kind,
            flags: 0,
            checksum: crc32fast::hash(payload),
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..8].copy_from_slice(&MAGIC);
        for (slot, value) in [self.version, self.kind as u32, self.flags, self.checksum]
            .into_iter()
            .enumerate()
        {
            let at = 8 + slot * 4;
            out[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Parse the first [`HEADER_LEN`] bytes of `bytes`.
    ///
    /// # Errors
    /// `InvalidFormat` on a short input, wrong magic, or unknown kind.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = bytes
            .get(..HEADER_LEN)
            .ok_or_else(|| ShardKnnError::invalid_format(format!("{} bytes is shorter than the header", bytes.len())))?;
        if header[..8] != MAGIC {
            return Err(ShardKnnError::invalid_format("not a shard index file (bad magic)"));
        }
        let word = |slot: usize| {
            let at = 8 + slot * 4;
            u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
        };
        Ok(Self {
            version: word(0),
            kind: IndexKind::try_from(word(1))?,
            flags: word(2),
            checksum: word(3),
        })
    }

    /// Check `bytes` holds a supported `expected` file and return its payload.
    ///
    /// # Errors
    /// `InvalidFormat` for header problems, `ChecksumMismatch` if the payload
    /// does not match the stored CRC32.
    pub fn open(bytes: &[u8], expected: IndexKind) -> Result<&[u8]> {
        let header = Self::decode(bytes)?;
        if header.version == 0 || header.version > FORMAT_VERSION {
            return Err(ShardKnnError::invalid_format(format!(
                "format version {} is not supported (newest is {})",
                header.version, FORMAT_VERSION
            )));
        }
        if header.kind != expected {
            return Err(ShardKnnError::invalid_format(format!(
                "expected a {:?} index, found {:?}",
                expected, header.kind
            )));
        }
        let payload = &bytes[HEADER_LEN..];
        if crc32fast::hash(payload) != header.checksum {
            return Err(ShardKnnError::ChecksumMismatch);
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut bytes = ShardFileHeader::seal(IndexKind::Hnsw, payload).encode().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_open_returns_payload() {
        let bytes = framed(b"graph");
        assert_eq!(&bytes[..8], b"SHARDKNN");
        assert_eq!(bytes.len(), HEADER_LEN + 5);
        assert_eq!(ShardFileHeader::open(&bytes, IndexKind::Hnsw).unwrap(), b"graph");

        let header = ShardFileHeader::decode(&bytes).unwrap();
        assert_eq!(header.version, FORMAT_VERSION);
        assert_eq!(header.flags, 0);
    }

    #[test]
    fn test_bad_magic_and_short_input() {
        let mut bytes = framed(b"x");
        bytes[0] = b'X';
        assert!(matches!(ShardFileHeader::decode(&bytes), Err(ShardKnnError::InvalidFormat(_))));
        assert!(matches!(ShardFileHeader::decode(&bytes[..10]), Err(ShardKnnError::InvalidFormat(_))));
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut bytes = framed(b"x");
        bytes[8..12].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            ShardFileHeader::open(&bytes, IndexKind::Hnsw),
            Err(ShardKnnError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut bytes = framed(b"x");
        bytes[12..16].copy_from_slice(&7u32.to_le_bytes());
        assert!(ShardFileHeader::decode(&bytes).is_err());
    }

    #[test]
    fn test_flipped_payload_bit() {
        let mut bytes = framed(b"payload");
        bytes[HEADER_LEN + 2] ^= 0x01;
        assert!(matches!(
            ShardFileHeader::open(&bytes, IndexKind::Hnsw),
            Err(ShardKnnError::ChecksumMismatch)
        ));
    }
}
