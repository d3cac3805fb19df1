//! Segment Store Module
//!
//! Manages the sorted, immutable segment files a flush leaves on disk and
//! the filesystem-level operations the engine and the compaction engine
//! perform on them.
//!
//! # On-disk layout
//!
//! A segment file is UTF-8 text, one record per line:
//!
//! ```text
//! key,value\n
//! key,value\n
//! ...
//! ```
//!
//! Lines are ascending by key with each key appearing at most once — the
//! flush and compaction paths establish this; the store itself does not
//! verify it.
//!
//! # Naming
//!
//! A segment id is `<basename>-<n>` with `n ≥ 1`. [`increment`] steps the
//! suffix for the next flush target; [`renormalise`] renumbers a surviving
//! list back to consecutive suffixes `1…m` after compaction.
//!
//! # Mutation discipline
//!
//! Segments are mutated only by compaction, and every rewrite goes
//! through a temp file (`<id>.tmp`) followed by an atomic rename —
//! a crash leaves each segment wholly old or wholly new, and
//! [`SegmentStore::remove_temp_files`] sweeps any orphan temp at startup.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::record::{self, RecordError};

/// Suffix appended to a segment id for its rewrite temp file.
const TEMP_SUFFIX: &str = ".tmp";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by segment store operations.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment line failed to parse — the file is corrupt.
    #[error("corrupt segment record: {0}")]
    Corrupt(#[from] RecordError),

    /// A segment id did not match `<basename>-<n>` with `n ≥ 1`.
    #[error("invalid segment name: {0:?}")]
    InvalidName(String),
}

// ------------------------------------------------------------------------------------------------
// Naming helpers
// ------------------------------------------------------------------------------------------------

/// Splits a segment id into its basename and numeric suffix.
pub fn split_name(id: &str) -> Result<(&str, u64), SegmentError> {
    let (basename, suffix) = id
        .rsplit_once('-')
        .ok_or_else(|| SegmentError::InvalidName(id.to_string()))?;

    let number: u64 = suffix
        .parse()
        .map_err(|_| SegmentError::InvalidName(id.to_string()))?;

    if basename.is_empty() || number == 0 {
        return Err(SegmentError::InvalidName(id.to_string()));
    }

    Ok((basename, number))
}

/// Produces the id that follows `id`: `<basename>-<n>` → `<basename>-<n+1>`.
pub fn increment(id: &str) -> Result<String, SegmentError> {
    let (basename, number) = split_name(id)?;
    Ok(format!("{basename}-{}", number + 1))
}

/// Renumbers a list of segment ids so their suffixes run `1…m` in order.
///
/// Each id keeps its own basename; only the suffix changes.
pub fn renormalise(ids: &[String]) -> Result<Vec<String>, SegmentError> {
    ids.iter()
        .enumerate()
        .map(|(position, id)| {
            let (basename, _) = split_name(id)?;
            Ok(format!("{basename}-{}", position + 1))
        })
        .collect()
}

// ------------------------------------------------------------------------------------------------
// Segment Store
// ------------------------------------------------------------------------------------------------

/// Filesystem-level access to the segment files in one directory.
///
/// The store performs no locking and assumes exclusive ownership of the
/// directory for the engine's lifetime.
#[derive(Debug)]
pub struct SegmentStore {
    dir: PathBuf,
}

impl SegmentStore {
    /// Opens the store rooted at `dir`, creating the directory if absent.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SegmentError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The segments directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the segment file named `id`.
    pub fn path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// Full path of the rewrite temp file for `id`.
    pub fn temp_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{TEMP_SUFFIX}"))
    }

    /// Whether the segment file exists.
    pub fn exists(&self, id: &str) -> bool {
        self.path(id).is_file()
    }

    /// Byte length of the segment file.
    pub fn size(&self, id: &str) -> Result<u64, SegmentError> {
        Ok(fs::metadata(self.path(id))?.len())
    }

    /// Creates (or truncates) the segment file, returning a writer with a
    /// byte cursor starting at 0.
    pub fn create(&self, id: &str) -> Result<SegmentWriter, SegmentError> {
        trace!(segment = id, "creating segment file");
        SegmentWriter::create(self.path(id))
    }

    /// Creates (or truncates) the rewrite temp for `id`.
    ///
    /// Pair with [`promote_temp`](Self::promote_temp) once fully written.
    pub fn create_temp(&self, id: &str) -> Result<SegmentWriter, SegmentError> {
        trace!(segment = id, "creating segment temp file");
        SegmentWriter::create(self.temp_path(id))
    }

    /// Atomically replaces the segment file with its finished temp.
    pub fn promote_temp(&self, id: &str) -> Result<(), SegmentError> {
        fs::rename(self.temp_path(id), self.path(id))?;
        debug!(segment = id, "segment temp promoted");
        Ok(())
    }

    /// Writes `entries`, already in ascending key order, as a new segment.
    pub fn write_sorted<'a, I>(&self, id: &str, entries: I) -> Result<(), SegmentError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut writer = self.create(id)?;
        for (key, value) in entries {
            writer.append(key, value)?;
        }
        writer.finish()
    }

    /// Lazily scans the segment from the beginning.
    pub fn scan(&self, id: &str) -> Result<SegmentScan, SegmentError> {
        self.scan_from(id, 0)
    }

    /// Lazily scans the segment starting at byte `offset`.
    ///
    /// `offset` must be the start of a record line — the sparse index only
    /// ever hands out such offsets.
    pub fn scan_from(&self, id: &str, offset: u64) -> Result<SegmentScan, SegmentError> {
        let mut file = File::open(self.path(id))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        Ok(SegmentScan {
            reader: BufReader::new(file),
            offset,
        })
    }

    /// Reads the single record line starting at `offset`.
    pub fn read_at(&self, id: &str, offset: u64) -> Result<(String, String), SegmentError> {
        let mut file = File::open(self.path(id))?;
        file.seek(SeekFrom::Start(offset))?;

        let mut reader = BufReader::new(file);
        let mut line = String::new();
        reader.read_line(&mut line)?;

        Ok(record::parse_line(&line)?)
    }

    /// Deletes the segment file.
    pub fn delete(&self, id: &str) -> Result<(), SegmentError> {
        fs::remove_file(self.path(id))?;
        debug!(segment = id, "segment deleted");
        Ok(())
    }

    /// Renames a segment file. A no-op when the names are equal.
    pub fn rename(&self, old_id: &str, new_id: &str) -> Result<(), SegmentError> {
        if old_id == new_id {
            return Ok(());
        }
        fs::rename(self.path(old_id), self.path(new_id))?;
        debug!(from = old_id, to = new_id, "segment renamed");
        Ok(())
    }

    /// Names of all regular files currently in the directory.
    pub fn file_names(&self) -> Result<Vec<String>, SegmentError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Deletes every leftover rewrite temp in the directory.
    ///
    /// Run at startup: a temp on disk means a rewrite crashed before its
    /// rename, so the original file is still authoritative.
    pub fn remove_temp_files(&self) -> Result<usize, SegmentError> {
        let mut removed = 0;
        for name in self.file_names()? {
            if name.ends_with(TEMP_SUFFIX) {
                warn!(file = %name, "removing orphan segment temp");
                fs::remove_file(self.dir.join(&name))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ------------------------------------------------------------------------------------------------
// Segment Writer
// ------------------------------------------------------------------------------------------------

/// Sequential segment file writer tracking a byte cursor.
///
/// The cursor before each append is the offset the sparse index records
/// for sampled keys.
#[derive(Debug)]
pub struct SegmentWriter {
    writer: BufWriter<File>,
    offset: u64,
}

impl SegmentWriter {
    fn create(path: PathBuf) -> Result<Self, SegmentError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            offset: 0,
        })
    }

    /// Appends one record line, returning the offset at which it starts.
    pub fn append(&mut self, key: &str, value: &str) -> Result<u64, SegmentError> {
        let line = record::format_entry(key, value);
        let at = self.offset;
        self.writer.write_all(line.as_bytes())?;
        self.offset += line.len() as u64;
        Ok(at)
    }

    /// The byte cursor — offset of the next line to be appended.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Flushes and syncs the file to the operating system.
    pub fn finish(mut self) -> Result<(), SegmentError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Segment Scan
// ------------------------------------------------------------------------------------------------

/// One record yielded by a segment scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentEntry {
    pub key: String,
    pub value: String,

    /// Offset of the line's first byte within the segment file.
    pub offset: u64,

    /// Length of the line in bytes, terminator included.
    pub len: u64,
}

/// Streaming forward scan over a segment's record lines.
#[derive(Debug)]
pub struct SegmentScan {
    reader: BufReader<File>,
    offset: u64,
}

impl Iterator for SegmentScan {
    type Item = Result<SegmentEntry, SegmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        let read = match self.reader.read_line(&mut line) {
            Ok(0) => return None,
            Ok(n) => n as u64,
            Err(e) => return Some(Err(SegmentError::Io(e))),
        };

        let at = self.offset;
        self.offset += read;

        match record::parse_line(&line) {
            Ok((key, value)) => Some(Ok(SegmentEntry {
                key,
                value,
                offset: at,
                len: read,
            })),
            Err(e) => Some(Err(SegmentError::Corrupt(e))),
        }
    }
}
