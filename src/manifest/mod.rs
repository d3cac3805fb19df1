//! Manifest Module
//!
//! Persists the engine's bookkeeping metadata — the **clean signal** the
//! startup sequence uses to tell live segments from orphans — in a single
//! snapshot file named `database_metadata` inside the segments directory.
//!
//! ## Contents
//!
//! - `current_segment` — id the next flush will produce.
//! - `segments` — ordered list of segment ids on disk, oldest first.
//! - `filter_active` / `filter_expected_items` / `filter_false_positive_prob`
//!   — membership filter configuration.
//! - `filter_state` — opaque bytes reconstructing the filter's bit array.
//!
//! ## On-disk layout
//!
//! ```text
//! [MAGIC "SDBM"][VERSION u32 LE][PAYLOAD_LEN u32 LE][PAYLOAD][PAYLOAD_CRC32 LE]
//! ```
//!
//! The payload is the [`crate::encoding`] serialisation of [`Metadata`].
//! The CRC32 covers the payload only; magic and version are validated by
//! value.
//!
//! ## Durability
//!
//! The file is always rewritten whole: encode to `database_metadata.tmp`,
//! fsync, atomically rename over the live file, then fsync the directory.
//! A reader therefore sees either the previous snapshot or the new one,
//! never a torn write. A snapshot that fails the checksum or does not
//! parse is a fatal integrity error — the engine refuses to open.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{self, File},
    io::{self, Write},
    path::Path,
};

use crc32fast::Hasher as Crc32;
use thiserror::Error;
use tracing::{debug, info};

use crate::encoding::{self, Decode, Encode, EncodingError};

/// Name of the metadata file within the segments directory.
pub const METADATA_FILENAME: &str = "database_metadata";

/// Temp name used while rewriting the metadata file.
pub const METADATA_TEMP_FILENAME: &str = "database_metadata.tmp";

const MAGIC: [u8; 4] = *b"SDBM";
const VERSION: u32 = 1;
const U32_SIZE: usize = std::mem::size_of::<u32>();
const HEADER_SIZE: usize = MAGIC.len() + 2 * U32_SIZE;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by metadata load and persist operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding / decoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Payload checksum did not match — the snapshot is corrupt.
    #[error("metadata checksum mismatch")]
    ChecksumMismatch,

    /// Magic, version, or framing was invalid.
    #[error("invalid metadata file: {0}")]
    InvalidSnapshot(String),
}

// ------------------------------------------------------------------------------------------------
// Metadata record
// ------------------------------------------------------------------------------------------------

/// The engine's durable bookkeeping record.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Segment id that the next flush will produce.
    pub current_segment: String,

    /// Segment ids currently on disk, oldest first.
    pub segments: Vec<String>,

    /// Whether the membership filter answers negatively.
    pub filter_active: bool,

    /// Expected item count the filter was sized for.
    pub filter_expected_items: u64,

    /// False-positive probability the filter was sized for.
    pub filter_false_positive_prob: f64,

    /// Opaque filter state (bit array and sizing parameters).
    pub filter_state: Vec<u8>,
}

impl Encode for Metadata {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.current_segment.encode_to(buf)?;
        encoding::encode_seq(&self.segments, buf)?;
        self.filter_active.encode_to(buf)?;
        self.filter_expected_items.encode_to(buf)?;
        self.filter_false_positive_prob.encode_to(buf)?;
        self.filter_state.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for Metadata {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (current_segment, n) = String::decode_from(&buf[offset..])?;
        offset += n;
        let (segments, n) = encoding::decode_seq::<String>(&buf[offset..])?;
        offset += n;
        let (filter_active, n) = bool::decode_from(&buf[offset..])?;
        offset += n;
        let (filter_expected_items, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (filter_false_positive_prob, n) = f64::decode_from(&buf[offset..])?;
        offset += n;
        let (filter_state, n) = <Vec<u8>>::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                current_segment,
                segments,
                filter_active,
                filter_expected_items,
                filter_false_positive_prob,
                filter_state,
            },
            offset,
        ))
    }
}

impl Metadata {
    /// Loads the snapshot from `dir`, or `Ok(None)` when no metadata file
    /// exists (fresh database).
    ///
    /// Any structural problem — bad magic, unsupported version, short
    /// file, checksum mismatch — is fatal.
    pub fn load(dir: &Path) -> Result<Option<Self>, ManifestError> {
        let path = dir.join(METADATA_FILENAME);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ManifestError::Io(e)),
        };

        if bytes.len() < HEADER_SIZE + U32_SIZE {
            return Err(ManifestError::InvalidSnapshot("file too short".into()));
        }
        if bytes[..4] != MAGIC {
            return Err(ManifestError::InvalidSnapshot("bad magic".into()));
        }

        let mut raw = [0u8; U32_SIZE];
        raw.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(raw);
        if version != VERSION {
            return Err(ManifestError::InvalidSnapshot(format!(
                "unsupported version {version}"
            )));
        }

        raw.copy_from_slice(&bytes[8..12]);
        let payload_len = u32::from_le_bytes(raw) as usize;
        if bytes.len() != HEADER_SIZE + payload_len + U32_SIZE {
            return Err(ManifestError::InvalidSnapshot("length mismatch".into()));
        }

        let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
        raw.copy_from_slice(&bytes[HEADER_SIZE + payload_len..]);
        let stored_checksum = u32::from_le_bytes(raw);

        let mut hasher = Crc32::new();
        hasher.update(payload);
        if hasher.finalize() != stored_checksum {
            return Err(ManifestError::ChecksumMismatch);
        }

        let (metadata, _) = encoding::decode_from_slice::<Metadata>(payload)?;

        debug!(
            path = %path.display(),
            segments = metadata.segments.len(),
            current_segment = %metadata.current_segment,
            "metadata loaded"
        );

        Ok(Some(metadata))
    }

    /// Atomically rewrites the snapshot in `dir`.
    pub fn persist(&self, dir: &Path) -> Result<(), ManifestError> {
        let payload = encoding::encode_to_vec(self)?;
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| EncodingError::LengthOverflow(payload.len()))?;

        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let checksum = hasher.finalize();

        let temp_path = dir.join(METADATA_TEMP_FILENAME);
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&MAGIC)?;
            file.write_all(&VERSION.to_le_bytes())?;
            file.write_all(&payload_len.to_le_bytes())?;
            file.write_all(&payload)?;
            file.write_all(&checksum.to_le_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, dir.join(METADATA_FILENAME))?;

        // Make the rename itself durable.
        File::open(dir)?.sync_all()?;

        info!(
            dir = %dir.display(),
            segments = self.segments.len(),
            current_segment = %self.current_segment,
            "metadata persisted"
        );
        Ok(())
    }
}
