//! LSM Storage Engine
//!
//! The coordinator tying the subsystems together: memtable + WAL on the
//! write path, sparse index + segment files behind an optional membership
//! filter on the read path, and the inline compaction engine.
//!
//! ## Write path
//!
//! [`Engine::put`] appends the record to the WAL (fsync) before touching
//! the memtable, so an acknowledged write survives any crash. An update
//! to a key already buffered is applied in place and does not change the
//! byte tally. When a *new* key would push the tally past the threshold,
//! the engine first cleans superseded keys out of the existing segments,
//! flushes the memtable into a fresh segment (sampling the sparse index
//! as it goes), persists metadata, and only then clears the WAL.
//!
//! ## Read path
//!
//! [`Engine::get`] consults, in order: the membership filter (a negative
//! answer ends the read), the memtable, the sparse index (floor lookup
//! plus a bounded forward scan — sound because segments are sorted), and
//! finally a newest-first linear scan of all segments (sound because a
//! key's latest value lives in the latest segment holding it). The
//! fallback is rarely reached once the index is populated.
//!
//! ## Concurrency model
//!
//! Single-writer, single-reader: all public operations are expected to be
//! called from one thread of control, there are no internal background
//! tasks, and [`Engine::compact`] blocks its caller for the duration.
//! The WAL file and the segments directory are owned exclusively by the
//! engine for its lifetime.
//!
//! ## Crash recovery
//!
//! [`Engine::open`] loads the metadata snapshot (fatal if corrupt, fatal
//! if a listed segment is missing), deletes orphan segment files and
//! leftover rewrite temps, replays the WAL into the memtable, re-adds the
//! replayed keys to the membership filter, and rebuilds the sparse index
//! from the segments on disk.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::compaction::{self, CompactionError};
use crate::filter::{FilterConfig, FilterError, MembershipFilter};
use crate::index::SparseIndex;
use crate::manifest::{ManifestError, Metadata};
use crate::memtable::Memtable;
use crate::record::{self, RecordError};
use crate::segment::{self, SegmentError, SegmentStore};
use crate::wal::{Wal, WalError};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Durability failure in the write-ahead log.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// Error originating from the segment store.
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Error originating from the metadata file.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Error originating from the compaction engine.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// Invalid filter sizing parameters.
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    /// Invalid key or value.
    #[error("invalid record: {0}")]
    Record(#[from] RecordError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A segment listed in the metadata is missing on disk.
    #[error("segment listed in metadata but missing on disk: {0}")]
    MissingSegment(String),

    /// A reconfiguration parameter was out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for an [`Engine`] instance. Passed to [`Engine::open`].
///
/// `threshold` and `sparsity_factor` are runtime settings re-applied on
/// every open; the filter settings only seed a **fresh** database — an
/// existing one restores its filter from the metadata file.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Basename for segment files; the first segment is `<basename>-1`.
    pub segment_basename: String,

    /// Filename of the write-ahead log within the segments directory.
    pub wal_basename: String,

    /// Memtable payload size (bytes) that triggers a flush.
    pub threshold: u64,

    /// Divisor deriving the index sampling stride from the threshold.
    pub sparsity_factor: u64,

    /// Membership filter sizing and activation.
    pub filter: FilterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            segment_basename: "segment".to_string(),
            wal_basename: "wal".to_string(),
            threshold: 1_000_000,
            sparsity_factor: 100,
            filter: FilterConfig::default(),
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.segment_basename.is_empty() {
            return Err(EngineError::Config("segment_basename is empty".into()));
        }
        if self.wal_basename.is_empty() {
            return Err(EngineError::Config("wal_basename is empty".into()));
        }
        if self.threshold == 0 {
            return Err(EngineError::Config("threshold must be positive".into()));
        }
        if self.sparsity_factor == 0 {
            return Err(EngineError::Config(
                "sparsity_factor must be positive".into(),
            ));
        }
        self.filter.validate()?;
        Ok(())
    }
}

/// Snapshot of engine statistics returned by [`Engine::stats`].
#[derive(Debug)]
pub struct EngineStats {
    /// Number of entries buffered in the memtable.
    pub memtable_entries: usize,

    /// Sum of key+value lengths over the memtable entries.
    pub memtable_bytes: u64,

    /// Number of segment files on disk.
    pub segment_count: usize,

    /// Per-segment file sizes in bytes, oldest first.
    pub segment_sizes: Vec<u64>,

    /// Number of keys sampled into the sparse index.
    pub index_entries: usize,
}

// ------------------------------------------------------------------------------------------------
// Engine Core
// ------------------------------------------------------------------------------------------------

/// The main storage engine handle.
///
/// Single-writer, single-reader; see the
/// [module-level documentation](self) for the full model.
#[derive(Debug)]
pub struct Engine {
    /// Directory holding segments, WAL, and metadata.
    dir: PathBuf,

    /// Filesystem access to segment files.
    store: SegmentStore,

    /// Durable log of memtable mutations since the last flush.
    wal: Wal,

    /// In-memory ordered write buffer.
    memtable: Memtable,

    /// Sum of key+value lengths currently buffered. Kept by the engine —
    /// in-place updates must not change it.
    memtable_bytes: u64,

    /// Sparse index from sampled keys to segment offsets.
    index: SparseIndex,

    /// Lifetime-accumulating membership filter.
    filter: MembershipFilter,

    /// Segment ids on disk, oldest first.
    segments: Vec<String>,

    /// Id the next flush will produce.
    current_segment: String,

    /// Flush threshold in bytes.
    threshold: u64,

    /// Divisor deriving the index sampling stride.
    sparsity_factor: u64,

    /// Set once `close` has persisted state.
    closed: bool,
}

impl Engine {
    /// Opens (or creates) an engine rooted at the given directory.
    ///
    /// Fresh directories are initialised with defaults; existing ones go
    /// through the recovery sequence described in the
    /// [module documentation](self).
    pub fn open<P: AsRef<Path>>(dir: P, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let dir = dir.as_ref().to_path_buf();
        let store = SegmentStore::open(&dir)?;

        // 1. Load persisted metadata, or initialise defaults.
        let (current_segment, segments, mut filter) = match Metadata::load(&dir)? {
            Some(metadata) => {
                let filter_config = FilterConfig {
                    expected_items: metadata.filter_expected_items,
                    false_positive_prob: metadata.filter_false_positive_prob,
                    active: metadata.filter_active,
                };
                let filter = if metadata.filter_state.is_empty() {
                    MembershipFilter::new(filter_config)?
                } else {
                    MembershipFilter::from_state(filter_config, &metadata.filter_state)?
                };
                (metadata.current_segment, metadata.segments, filter)
            }
            None => (
                format!("{}-1", config.segment_basename),
                Vec::new(),
                MembershipFilter::new(config.filter.clone())?,
            ),
        };

        // 2. A listed segment missing on disk is unrecoverable.
        for id in &segments {
            if !store.exists(id) {
                return Err(EngineError::MissingSegment(id.clone()));
            }
        }

        // 3. Sweep rewrite temps and segment files nothing refers to.
        store.remove_temp_files()?;
        Self::remove_orphan_segments(&store, &current_segment, &segments, &config.wal_basename)?;

        // 4. Replay the WAL into a fresh memtable, overwriting repeats.
        let wal = Wal::open(dir.join(&config.wal_basename))?;
        let mut memtable = Memtable::new();
        let mut replayed = 0usize;
        for entry in wal.replay()? {
            let (key, value) = entry?;
            memtable.add(key, value);
            replayed += 1;
        }

        let mut memtable_bytes = 0u64;
        for (key, value) in memtable.in_order() {
            memtable_bytes += (key.len() + value.len()) as u64;
            // The persisted filter state may predate these writes.
            filter.add(key);
        }

        let mut engine = Self {
            dir,
            store,
            wal,
            memtable,
            memtable_bytes,
            index: SparseIndex::new(),
            filter,
            segments,
            current_segment,
            threshold: config.threshold,
            sparsity_factor: config.sparsity_factor,
            closed: false,
        };

        // 5. Rebuild the sparse index from the segments on disk.
        engine.rebuild_index()?;

        info!(
            dir = %engine.dir.display(),
            segments = engine.segments.len(),
            current_segment = %engine.current_segment,
            replayed_records = replayed,
            memtable_bytes = engine.memtable_bytes,
            "engine opened"
        );
        Ok(engine)
    }

    /// Durably associates `value` with `key`.
    ///
    /// The record is fsynced to the WAL before any in-memory state
    /// changes; on error nothing has been modified. May trigger a flush
    /// (and the pre-flush segment cleaning) when the memtable is full.
    pub fn put(&mut self, key: &str, value: &str) -> Result<(), EngineError> {
        record::validate(key, value)?;

        // Update in place when the key is already buffered: the tally is
        // unchanged and no flush check is needed.
        if self.memtable.contains(key) {
            self.wal.append(key, value)?;
            self.memtable.add(key.to_string(), value.to_string());
            trace!(key, "memtable entry updated in place");
            return Ok(());
        }

        let additional = (key.len() + value.len()) as u64;
        if self.memtable_bytes + additional > self.threshold {
            self.clean_superseded_keys()?;
            self.flush_memtable()?;
        }

        self.wal.append(key, value)?;
        self.memtable.add(key.to_string(), value.to_string());
        self.memtable_bytes += additional;
        self.filter.add(key);

        trace!(key, bytes = self.memtable_bytes, "memtable entry added");
        Ok(())
    }

    /// Retrieves the value associated with `key`, or `None`.
    pub fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        record::validate_key(key)?;

        // 1. Filter: a negative answer is definitive (no false negatives).
        if !self.filter.check(key) {
            trace!(key, "filter reported key absent");
            return Ok(None);
        }

        // 2. Memtable holds the most recent value if present.
        if let Some(value) = self.memtable.find(key) {
            return Ok(Some(value.to_string()));
        }

        // 3. Sparse index: seek to the floor entry and scan forward.
        //    Segments are sorted, so passing `key` ends the scan.
        if let Some((floor_key, entry)) = self.index.floor(key) {
            trace!(key, floor_key, segment = %entry.segment, "index floor hit");
            for item in self.store.scan_from(&entry.segment, entry.offset)? {
                let record = item?;
                if record.key == key {
                    return Ok(Some(record.value));
                }
                if record.key.as_str() > key {
                    break;
                }
            }
        }

        // 4. Fallback: newest segment first; first match wins.
        self.search_all_segments(key)
    }

    /// Runs full compaction inline, then persists the new segment list
    /// and rebuilds the sparse index.
    pub fn compact(&mut self) -> Result<(), EngineError> {
        let survivors = compaction::compact(&self.store, &self.segments, self.threshold)?;
        self.segments = survivors;
        self.persist_metadata()?;
        self.rebuild_index()?;
        Ok(())
    }

    /// Sets the flush threshold in bytes. No data is migrated.
    pub fn set_threshold(&mut self, threshold: u64) -> Result<(), EngineError> {
        if threshold == 0 {
            return Err(EngineError::Config("threshold must be positive".into()));
        }
        self.threshold = threshold;
        Ok(())
    }

    /// Sets the sparsity factor. No data is migrated; the new stride
    /// applies from the next flush or index rebuild.
    pub fn set_sparsity_factor(&mut self, factor: u64) -> Result<(), EngineError> {
        if factor == 0 {
            return Err(EngineError::Config(
                "sparsity_factor must be positive".into(),
            ));
        }
        self.sparsity_factor = factor;
        Ok(())
    }

    /// Replaces the membership filter.
    ///
    /// Resizing discards the accumulated bit array, so the fresh filter
    /// is rebuilt from every live key — the memtable and a scan of every
    /// segment — keeping "ever written implies positive" true.
    pub fn set_filter(
        &mut self,
        expected_items: u64,
        false_positive_prob: f64,
        active: bool,
    ) -> Result<(), EngineError> {
        let config = FilterConfig {
            expected_items,
            false_positive_prob,
            active,
        };
        let mut filter = MembershipFilter::new(config)?;

        for (key, _) in self.memtable.in_order() {
            filter.add(key);
        }
        for id in &self.segments {
            for item in self.store.scan(id)? {
                filter.add(&item?.key);
            }
        }

        debug!(
            expected_items,
            false_positive_prob, active, "membership filter reconfigured and rebuilt"
        );
        self.filter = filter;
        Ok(())
    }

    /// Persists metadata and syncs the WAL. Idempotent.
    pub fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.persist_metadata()?;
        self.wal.sync()?;
        self.closed = true;

        info!(dir = %self.dir.display(), "engine closed");
        Ok(())
    }

    /// Returns a snapshot of engine statistics.
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let mut segment_sizes = Vec::with_capacity(self.segments.len());
        for id in &self.segments {
            segment_sizes.push(self.store.size(id)?);
        }
        Ok(EngineStats {
            memtable_entries: self.memtable.len(),
            memtable_bytes: self.memtable_bytes,
            segment_count: self.segments.len(),
            segment_sizes,
            index_entries: self.index.len(),
        })
    }

    /// Segment ids on disk, oldest first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Id the next flush will produce.
    pub fn current_segment(&self) -> &str {
        &self.current_segment
    }

    /// Sum of key+value lengths currently buffered in the memtable.
    pub fn memtable_bytes(&self) -> u64 {
        self.memtable_bytes
    }

    /// The directory this engine is rooted at.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // --------------------------------------------------------------------------------------------
    // Flush path
    // --------------------------------------------------------------------------------------------

    /// Index sampling stride: one sampled key per `stride` entries
    /// flushed. A stride of 0 (threshold below the sparsity factor)
    /// samples nothing; reads then rely on the fallback scan.
    fn index_stride(&self) -> u64 {
        self.threshold / self.sparsity_factor
    }

    /// Removes keys about to be re-written on disk from every existing
    /// segment, so the flush leaves each key's bytes in one place.
    ///
    /// Only memtable keys the filter reports as possibly on disk are
    /// considered; a definitive "never written" answer saves the I/O.
    /// Surviving lines are copied verbatim — no re-sort, no dedupe.
    fn clean_superseded_keys(&mut self) -> Result<(), EngineError> {
        let superseded: std::collections::HashSet<&str> = self
            .memtable
            .in_order()
            .map(|(key, _)| key)
            .filter(|key| self.filter.check(key))
            .collect();

        if superseded.is_empty() {
            return Ok(());
        }

        debug!(
            keys = superseded.len(),
            segments = self.segments.len(),
            "cleaning superseded keys from segments"
        );

        for id in &self.segments {
            let mut writer = self.store.create_temp(id)?;
            for item in self.store.scan(id)? {
                let entry = item?;
                if !superseded.contains(entry.key.as_str()) {
                    writer.append(&entry.key, &entry.value)?;
                }
            }
            writer.finish()?;
            self.store.promote_temp(id)?;
        }

        Ok(())
    }

    /// Flushes the memtable into a new segment named `current_segment`,
    /// sampling the sparse index, then resets the write path.
    ///
    /// Metadata is persisted after the segment list is updated and
    /// *before* the WAL is cleared: a crash in between leaves either an
    /// orphan segment plus a full WAL, or a registered segment plus a
    /// cleared WAL — never a data loss.
    fn flush_memtable(&mut self) -> Result<(), EngineError> {
        let stride = self.index_stride();
        let mut writer = self.store.create(&self.current_segment)?;

        let mut sampling_countdown = stride;
        for (key, value) in self.memtable.in_order() {
            if sampling_countdown == 1 {
                self.index.add(
                    key.to_string(),
                    self.current_segment.clone(),
                    writer.offset(),
                );
                sampling_countdown = stride + 1;
            }
            writer.append(key, value)?;
            sampling_countdown = sampling_countdown.saturating_sub(1);
        }
        writer.finish()?;

        info!(
            segment = %self.current_segment,
            entries = self.memtable.len(),
            bytes = self.memtable_bytes,
            "memtable flushed to segment"
        );

        self.segments.push(self.current_segment.clone());
        self.current_segment = segment::increment(&self.current_segment)?;
        self.persist_metadata()?;

        self.memtable = Memtable::new();
        self.memtable_bytes = 0;
        self.wal.clear()?;

        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Read helpers
    // --------------------------------------------------------------------------------------------

    /// Linear scan of all segments, newest first. Within a segment the
    /// first match wins; across segments the newest segment wins.
    fn search_all_segments(&self, key: &str) -> Result<Option<String>, EngineError> {
        for id in self.segments.iter().rev() {
            for item in self.store.scan(id)? {
                let entry = item?;
                if entry.key == key {
                    return Ok(Some(entry.value));
                }
            }
        }
        Ok(None)
    }

    // --------------------------------------------------------------------------------------------
    // Maintenance helpers
    // --------------------------------------------------------------------------------------------

    /// Rebuilds the sparse index by streaming every segment at the
    /// sampling stride. The countdown resets per segment.
    fn rebuild_index(&mut self) -> Result<(), EngineError> {
        self.index.clear();
        let stride = self.index_stride();

        for id in &self.segments {
            let mut sampling_countdown = stride;
            for item in self.store.scan(id)? {
                let entry = item?;
                if sampling_countdown == 1 {
                    self.index.add(entry.key, id.clone(), entry.offset);
                    sampling_countdown = stride + 1;
                }
                sampling_countdown = sampling_countdown.saturating_sub(1);
            }
        }

        debug!(entries = self.index.len(), "sparse index rebuilt");
        Ok(())
    }

    /// Deletes segment files that the persisted list does not mention —
    /// the remains of a flush that crashed before metadata was written.
    fn remove_orphan_segments(
        store: &SegmentStore,
        current_segment: &str,
        segments: &[String],
        wal_basename: &str,
    ) -> Result<(), EngineError> {
        let (basename, _) = segment::split_name(current_segment)?;

        for name in store.file_names()? {
            if name == wal_basename {
                continue;
            }
            let parsed = match segment::split_name(&name) {
                Ok(parsed) => parsed,
                Err(_) => continue,
            };
            if parsed.0 == basename && !segments.iter().any(|id| *id == name) {
                info!(file = %name, "removing orphan segment");
                store.delete(&name)?;
            }
        }
        Ok(())
    }

    fn persist_metadata(&self) -> Result<(), EngineError> {
        let filter_config = self.filter.config();
        Metadata {
            current_segment: self.current_segment.clone(),
            segments: self.segments.clone(),
            filter_active: filter_config.active,
            filter_expected_items: filter_config.expected_items,
            filter_false_positive_prob: filter_config.false_positive_prob,
            filter_state: self.filter.state_bytes(),
        }
        .persist(&self.dir)?;
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                error!(dir = %self.dir.display(), error = %e, "engine close failed on drop");
            }
        }
    }
}
