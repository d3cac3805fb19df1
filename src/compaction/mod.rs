//! Compaction Module
//!
//! Shrinks the segment set and restores its invariants in three phases,
//! all inline on the caller's thread:
//!
//! ## Phase 1 — per-segment dedupe
//!
//! Each segment is read sequentially keeping only the **last-seen** value
//! per key, then rewritten in ascending key order. Input segments may or
//! may not already be sorted and duplicate-free; this phase establishes
//! both properties unconditionally.
//!
//! ## Phase 2 — adjacent merge under a size budget
//!
//! The segment list is processed left-to-right pairwise. When the two
//! leftmost working segments together exceed the threshold, the left one
//! is frozen as fully compacted; otherwise they are stream-merged into a
//! file keeping the left segment's name, with the **right (newer) value
//! winning ties**, and the merged result re-enters the working list.
//!
//! ## Phase 3 — renumbering
//!
//! Survivors are renamed so their suffixes run `1…m` in list order.
//!
//! Every rewrite goes through a temp file and an atomic rename, so a
//! crash leaves each segment either wholly pre- or wholly post-compaction.
//! During a merge the temp is promoted over the left segment *before* the
//! right segment is deleted — the intermediate state merely duplicates
//! data whose values already agree.
//!
//! The caller (the engine) owns what happens afterwards: persisting the
//! new segment list and rebuilding the sparse index. The membership
//! filter is untouched — compaction never removes a key from the store.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::segment::{self, SegmentEntry, SegmentError, SegmentStore};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised while compacting.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Underlying segment store failure.
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),
}

// ------------------------------------------------------------------------------------------------
// Driver
// ------------------------------------------------------------------------------------------------

/// Runs full compaction over `segments`, returning the surviving,
/// renumbered segment list (oldest first).
pub fn compact(
    store: &SegmentStore,
    segments: &[String],
    threshold: u64,
) -> Result<Vec<String>, CompactionError> {
    // Phase 1: make every segment individually sorted and duplicate-free.
    for id in segments {
        dedupe_segment(store, id)?;
    }

    // Phase 2: merge adjacent segments while the pair fits the budget.
    let survivors = merge_adjacent(store, segments.to_vec(), threshold)?;

    // Phase 3: renumber the survivors to consecutive suffixes.
    let renamed = rename_segment_files(store, &survivors)?;

    info!(
        before = segments.len(),
        after = renamed.len(),
        threshold,
        "compaction finished"
    );
    Ok(renamed)
}

// ------------------------------------------------------------------------------------------------
// Phase 1 — per-segment dedupe
// ------------------------------------------------------------------------------------------------

/// Rewrites one segment keeping only the last-seen value per key, sorted.
pub fn dedupe_segment(store: &SegmentStore, id: &str) -> Result<(), CompactionError> {
    let mut latest: BTreeMap<String, String> = BTreeMap::new();
    for entry in store.scan(id)? {
        let entry = entry?;
        latest.insert(entry.key, entry.value);
    }

    let mut writer = store.create_temp(id)?;
    for (key, value) in &latest {
        writer.append(key, value)?;
    }
    writer.finish()?;
    store.promote_temp(id)?;

    debug!(segment = id, records = latest.len(), "segment deduplicated");
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// Phase 2 — adjacent merge
// ------------------------------------------------------------------------------------------------

/// Merges adjacent segments left-to-right while each pair fits within
/// `threshold` bytes. Returns the surviving ids in order, oldest first.
fn merge_adjacent(
    store: &SegmentStore,
    segments: Vec<String>,
    threshold: u64,
) -> Result<Vec<String>, CompactionError> {
    let mut fully_compacted: Vec<String> = Vec::new();
    let mut working = segments;

    while working.len() > 1 {
        let first = working.remove(0);
        let second = working.remove(0);

        let combined = store.size(&first)? + store.size(&second)?;
        if combined > threshold {
            // The left segment cannot grow further; the right one may
            // still merge with the remaining tail.
            debug!(
                frozen = %first,
                combined,
                threshold,
                "segment frozen as fully compacted"
            );
            fully_compacted.push(first);
            working.insert(0, second);
        } else {
            merge_into_first(store, &first, &second)?;
            working.insert(0, first);
        }
    }

    fully_compacted.extend(working);
    Ok(fully_compacted)
}

/// Stream-merges two sorted segments into a file keeping `first`'s name.
///
/// On equal keys the value from `second` wins — `second` sits later in
/// the segment list and is therefore newer. `second` is deleted.
pub fn merge_into_first(
    store: &SegmentStore,
    first: &str,
    second: &str,
) -> Result<(), CompactionError> {
    let mut left = store.scan(first)?;
    let mut right = store.scan(second)?;
    let mut writer = store.create_temp(first)?;

    let mut left_entry = next_entry(&mut left)?;
    let mut right_entry = next_entry(&mut right)?;

    loop {
        match (&left_entry, &right_entry) {
            (None, None) => break,

            (Some(l), None) => {
                writer.append(&l.key, &l.value)?;
                left_entry = next_entry(&mut left)?;
            }

            (None, Some(r)) => {
                writer.append(&r.key, &r.value)?;
                right_entry = next_entry(&mut right)?;
            }

            (Some(l), Some(r)) => {
                if l.key == r.key {
                    // Newer segment wins the tie; both sides advance.
                    writer.append(&r.key, &r.value)?;
                    left_entry = next_entry(&mut left)?;
                    right_entry = next_entry(&mut right)?;
                } else if l.key < r.key {
                    writer.append(&l.key, &l.value)?;
                    left_entry = next_entry(&mut left)?;
                } else {
                    writer.append(&r.key, &r.value)?;
                    right_entry = next_entry(&mut right)?;
                }
            }
        }
    }

    writer.finish()?;

    // Promote before deleting the second input: the in-between state
    // holds the same values twice, never fewer.
    store.promote_temp(first)?;
    store.delete(second)?;

    debug!(kept = %first, merged_away = %second, "adjacent segments merged");
    Ok(())
}

fn next_entry(
    scan: &mut crate::segment::SegmentScan,
) -> Result<Option<SegmentEntry>, CompactionError> {
    match scan.next() {
        Some(Ok(entry)) => Ok(Some(entry)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

// ------------------------------------------------------------------------------------------------
// Phase 3 — renumbering
// ------------------------------------------------------------------------------------------------

/// Renames the surviving segment files so suffixes run `1…m` in order.
fn rename_segment_files(
    store: &SegmentStore,
    survivors: &[String],
) -> Result<Vec<String>, CompactionError> {
    let corrected = segment::renormalise(survivors)?;

    // Suffixes only ever shrink toward their list position, so renaming
    // left-to-right never collides with a not-yet-renamed survivor.
    for (old_id, new_id) in survivors.iter().zip(&corrected) {
        store.rename(old_id, new_id)?;
    }

    Ok(corrected)
}
