//! # StrataDB
//!
//! An embeddable, persistent **ordered key-value store** built on a
//! **Log-Structured Merge Tree (LSM-tree)** architecture. Designed for
//! durable writes, cheap point reads, and crash-safe operation.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         Engine                            │
//! │  ┌────────────┐   ┌─────────────┐   ┌──────────────┐      │
//! │  │  Memtable  │   │   Sparse    │   │   Segments   │      │
//! │  │  + WAL     │   │   index     │   │  (on disk)   │      │
//! │  └─────┬──────┘   └──────┬──────┘   └──────┬───────┘      │
//! │        │  flush          │  floor          │              │
//! │        └────────►        └────────►        │              │
//! │                                            │              │
//! │  ┌─────────────────────────────────────────┘              │
//! │  │  Compaction (dedupe / adjacent merge / renumber)       │
//! │  └────────────────────────────────────────────────────────┤
//! │                                                           │
//! │  ┌───────────────────┐  ┌─────────────────────────────┐   │
//! │  │ Membership filter │  │ Metadata (database_metadata)│   │
//! │  └───────────────────┘  └─────────────────────────────┘   │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Core storage engine — open, put, get, flush, compact, reconfigure |
//! | [`memtable`] | In-memory ordered write buffer |
//! | [`wal`] | Durable append-only write-ahead log for crash recovery |
//! | [`segment`] | Sorted, immutable, line-oriented segment files on disk |
//! | [`index`] | Sparse in-memory index from sampled keys to segment offsets |
//! | [`filter`] | Probabilistic "key may be on disk" membership filter |
//! | [`compaction`] | Per-segment dedupe and threshold-bounded adjacent merging |
//! | [`manifest`] | Persistent engine metadata (segment list, filter state) |
//! | [`record`] | The `key,value` record-line codec and input validation |
//! | [`encoding`] | Binary serialisation used by the metadata file |
//!
//! ## Key Features
//!
//! - **Write-ahead logging** — every write is fsynced to the WAL before it
//!   is acknowledged, so acknowledged data survives a process crash.
//! - **Threshold-triggered flushes** — the memtable spills to a new sorted
//!   segment once its payload exceeds the configured byte threshold.
//! - **Sparse indexing** — point reads seek directly into a segment via the
//!   greatest sampled key at or below the target.
//! - **Membership filtering** — an optional seeded-hash filter short-circuits
//!   reads for keys that were never written.
//! - **Inline compaction** — deduplicates each segment, merges adjacent
//!   segments under a size budget, and renumbers the survivors.
//! - **Atomic metadata** — the segment list and filter state are persisted
//!   with a checksum via write-temp-then-rename.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stratadb::{Engine, EngineConfig};
//!
//! let mut engine = Engine::open("/tmp/my_db", EngineConfig::default()).unwrap();
//!
//! // Write
//! engine.put("hello", "world").unwrap();
//!
//! // Read
//! assert_eq!(engine.get("hello").unwrap(), Some("world".to_string()));
//!
//! // Reclaim space and read amplification
//! engine.compact().unwrap();
//!
//! // Graceful shutdown
//! engine.close().unwrap();
//! ```

pub mod compaction;
pub mod encoding;
pub mod engine;
pub mod filter;
pub mod index;
pub mod manifest;
pub mod memtable;
pub mod record;
pub mod segment;
pub mod wal;

pub use engine::{Engine, EngineConfig, EngineError, EngineStats};
pub use filter::FilterConfig;
