//! Write-Ahead Logging (WAL) Module
//!
//! A **durable**, **append-only** log of memtable mutations. Every write
//! the engine acknowledges has first been appended here and fsynced, so a
//! process crash between writes loses nothing, and the memtable can be
//! reconstructed on startup by replaying the log front to back.
//!
//! # On-disk layout
//!
//! The WAL shares the record-line format of a segment file:
//!
//! ```text
//! key,value\n
//! key,value\n
//! ...
//! ```
//!
//! Unlike a segment, the WAL carries **no sortedness or uniqueness
//! guarantee** — lines appear in write order, with repeated keys whenever
//! a key was updated. Replay applies lines in order and lets later lines
//! overwrite earlier ones, which makes it idempotent.
//!
//! # Ownership model
//!
//! One WAL exists per engine, owned as a plain field on the engine struct:
//! opened at engine start, appended on every write, cleared at every
//! flush, and closed (synced) at engine shutdown. There is no global
//! state and no sharing.
//!
//! # Guarantees
//!
//! - **Durability:** every `append()` ends in [`File::sync_all`]; the call
//!   does not return success before the line is on stable storage.
//! - **Failure atomicity for the caller:** if an append fails, the engine
//!   surfaces the error without touching the memtable or the filter.
//! - **Integrity:** a line that no longer splits into `key,value` during
//!   replay is a fatal corruption, reported to the caller.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::record::{self, RecordError};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A replayed line failed to parse — the log is corrupt.
    #[error("corrupt WAL record: {0}")]
    Corrupt(#[from] RecordError),
}

// ------------------------------------------------------------------------------------------------
// WAL Core
// ------------------------------------------------------------------------------------------------

/// An append-only, fsync-on-write log of `key,value` record lines.
#[derive(Debug)]
pub struct Wal {
    /// Handle used for appends and truncation.
    file: File,

    /// Path to the WAL file on disk.
    path: PathBuf,
}

impl Wal {
    /// Opens the WAL at `path`, creating it if absent.
    ///
    /// Existing content is preserved — the caller replays it before
    /// issuing new appends.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        info!(path = %path.display(), size = file.metadata()?.len(), "WAL opened");

        Ok(Self { file, path })
    }

    /// Appends one record line and syncs it to stable storage.
    ///
    /// The engine calls this once per write, including in-place updates,
    /// so the log always covers the full memtable state.
    pub fn append(&mut self, key: &str, value: &str) -> Result<(), WalError> {
        let line = record::format_entry(key, value);
        self.file.write_all(line.as_bytes())?;
        self.file.sync_all()?;

        trace!(key, len = line.len(), "WAL record appended");
        Ok(())
    }

    /// Returns an iterator replaying every record line in write order.
    ///
    /// Reads through an independent handle, so replay does not disturb
    /// the append position.
    pub fn replay(&self) -> Result<WalReplay, WalError> {
        debug!(path = %self.path.display(), "WAL replay started");

        let file = File::open(&self.path)?;
        Ok(WalReplay {
            reader: BufReader::new(file),
        })
    }

    /// Truncates the WAL to zero length.
    ///
    /// Called exactly when the memtable has been durably flushed to a new
    /// segment — the log's contents are covered by the segment from then on.
    pub fn clear(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;

        info!(path = %self.path.display(), "WAL cleared");
        Ok(())
    }

    /// Forces any buffered state to stable storage.
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Path of the underlying WAL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current on-disk length in bytes.
    pub fn len(&self) -> Result<u64, WalError> {
        Ok(self.file.metadata()?.len())
    }

    /// Whether the WAL currently holds no records.
    pub fn is_empty(&self) -> Result<bool, WalError> {
        Ok(self.len()? == 0)
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if let Err(e) = self.file.sync_all() {
            error!(path = %self.path.display(), error = %e, "WAL sync failed on drop");
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Replay iterator
// ------------------------------------------------------------------------------------------------

/// Streaming replay of WAL record lines, one `(key, value)` pair at a time.
#[derive(Debug)]
pub struct WalReplay {
    reader: BufReader<File>,
}

impl Iterator for WalReplay {
    type Item = Result<(String, String), WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(record::parse_line(&line).map_err(WalError::from)),
            Err(e) => Some(Err(WalError::Io(e))),
        }
    }
}
