//! YCSB-style macro-benchmarks for StrataDB.
//!
//! Measures sustained throughput under realistic mixed workloads inspired
//! by the Yahoo Cloud Serving Benchmark (YCSB).
//!
//! # Workloads
//!
//! | Name | Mix | Description |
//! |------|-----|-------------|
//! | **A** | 50% read, 50% update | Session store — heavy read/write |
//! | **B** | 95% read, 5% update | Photo tagging — read-mostly |
//! | **C** | 100% read | User profile cache — read-only |
//! | **D** | 95% read, 5% insert | Read-latest — status updates |
//! | **F** | 50% read, 50% read-modify-write | User database — RMW |
//!
//! The classic Workload E (range scans) has no counterpart here — the
//! engine exposes point reads only.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench ycsb               # all workloads
//! cargo bench --bench ycsb -- "load"      # load phase only
//! cargo bench --bench ycsb -- "A"         # workload A only
//! ```

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};

use rand::Rng;
use std::hint::black_box;
use stratadb::{Engine, EngineConfig};
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Number of records loaded into the store before running workloads.
const RECORD_COUNT: u64 = 2_000;

/// Number of operations per workload run.
const OPS_PER_RUN: u64 = 1_000;

/// Value size in characters.
const VALUE_SIZE: usize = 128;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

fn make_key(i: u64) -> String {
    format!("user{i:012}")
}

/// Random lowercase payload. Stays inside the record alphabet — no
/// delimiter bytes, never empty.
fn make_value(rng: &mut impl Rng) -> String {
    (0..VALUE_SIZE)
        .map(|_| char::from(b'a' + rng.random_range(0..26u8)))
        .collect()
}

/// Open a store with settings tuned for benchmarking.
fn open_bench_engine(dir: &std::path::Path) -> Engine {
    Engine::open(
        dir,
        EngineConfig {
            threshold: 64 * 1024, // 64 KiB — moderate buffer.
            ..EngineConfig::default()
        },
    )
    .expect("open")
}

/// Load phase: insert [`RECORD_COUNT`] sequential records.
///
/// **Scenario:** Writes 2,000 key-value pairs (128 B values) sequentially,
/// simulating the initial bulk-load of a dataset.
///
/// **What it measures:** Sustained sequential write throughput through the
/// entire engine pipeline — WAL append, memtable insertion, and the
/// flushes triggered as the write buffer fills up.
fn load_engine(engine: &mut Engine) {
    let mut rng = rand::rng();
    for i in 0..RECORD_COUNT {
        let key = make_key(i);
        let value = make_value(&mut rng);
        engine.put(&key, &value).unwrap();
    }
}

// ------------------------------------------------------------------------------------------------
// Workloads
// ------------------------------------------------------------------------------------------------

/// Workload A — 50% read, 50% update.
///
/// **Real-world analogy:** Session store. A web server reads and updates
/// session data equally — checking login state and refreshing tokens.
///
/// **What it measures:** Performance under a balanced read/write mix with
/// uniform random key access. Updates overwrite existing keys, exercising
/// the WAL, the in-place memtable update path, and any flushes triggered
/// by accumulated writes.
fn run_workload_a(engine: &mut Engine) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        let key = make_key(rng.random_range(0..RECORD_COUNT));

        if rng.random_bool(0.5) {
            // Read.
            let _ = black_box(engine.get(&key).unwrap());
        } else {
            // Update.
            let value = make_value(&mut rng);
            engine.put(&key, &value).unwrap();
        }
    }
}

/// Workload B — 95% read, 5% update.
///
/// **Real-world analogy:** Photo tagging or social-media metadata. The
/// vast majority of accesses are reads, with occasional writes.
///
/// **What it measures:** Read-dominated throughput with light write
/// pressure. Verifies that infrequent writes do not disproportionately
/// affect read latency.
fn run_workload_b(engine: &mut Engine) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        let key = make_key(rng.random_range(0..RECORD_COUNT));

        if rng.random_bool(0.95) {
            let _ = black_box(engine.get(&key).unwrap());
        } else {
            let value = make_value(&mut rng);
            engine.put(&key, &value).unwrap();
        }
    }
}

/// Workload C — 100% read.
///
/// **Real-world analogy:** User profile cache. Profiles are read with no
/// modifications during the measured window.
///
/// **What it measures:** Peak point-read throughput with zero write
/// contention — the ceiling for the memtable → index → segment path.
fn run_workload_c(engine: &Engine) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        let key = make_key(rng.random_range(0..RECORD_COUNT));
        let _ = black_box(engine.get(&key).unwrap());
    }
}

/// Workload D — 95% read, 5% insert (append-only new keys).
///
/// **Real-world analogy:** Status/timeline feed. Most operations read
/// recent posts; a small fraction inserts new ones beyond the initial
/// key range.
///
/// **What it measures:** Behaviour under a growing keyspace. Unlike
/// Workload B the writes create new keys, stretching the segment key
/// range and the membership filter rather than overwriting.
fn run_workload_d(engine: &mut Engine, insert_base: &mut u64) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        if rng.random_bool(0.95) {
            let key = make_key(rng.random_range(0..RECORD_COUNT + *insert_base));
            let _ = black_box(engine.get(&key).unwrap());
        } else {
            let key = make_key(RECORD_COUNT + *insert_base);
            let value = make_value(&mut rng);
            engine.put(&key, &value).unwrap();
            *insert_base += 1;
        }
    }
}

/// Workload F — 50% read, 50% read-modify-write (RMW).
///
/// **Real-world analogy:** User database with counters. Half the
/// operations read a record; the other half read it, modify it, and
/// write it back.
///
/// **What it measures:** RMW pattern cost — each RMW performs a `get`
/// followed by a `put`, two engine calls per logical unit.
fn run_workload_f(engine: &mut Engine) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        let key = make_key(rng.random_range(0..RECORD_COUNT));

        if rng.random_bool(0.5) {
            // Pure read.
            let _ = black_box(engine.get(&key).unwrap());
        } else {
            // Read-modify-write: read existing, then overwrite.
            let _ = engine.get(&key).unwrap();
            let value = make_value(&mut rng);
            engine.put(&key, &value).unwrap();
        }
    }
}

// ================================================================================================
// Criterion benchmark functions
// ================================================================================================

/// Criterion registration for the load phase.
///
/// Measures the time to insert [`RECORD_COUNT`] records into a fresh
/// store. Sample size is reduced to 10 because each iteration creates and
/// fills an entire database from scratch.
fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/load");
    group.sample_size(10);
    group.bench_function(BenchmarkId::new("sequential", RECORD_COUNT), |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let engine = open_bench_engine(dir.path());
                (dir, engine)
            },
            |(_dir, mut engine)| {
                load_engine(&mut engine);
                engine.close().unwrap();
            },
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

/// Criterion registration for Workload A (50% read / 50% update).
fn bench_workload_a(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("A_50read_50update", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let mut engine = open_bench_engine(dir.path());
                load_engine(&mut engine);
                (dir, engine)
            },
            |(_dir, mut engine)| run_workload_a(&mut engine),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

/// Criterion registration for Workload B (95% read / 5% update).
fn bench_workload_b(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("B_95read_5update", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let mut engine = open_bench_engine(dir.path());
                load_engine(&mut engine);
                (dir, engine)
            },
            |(_dir, mut engine)| run_workload_b(&mut engine),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

/// Criterion registration for Workload C (100% read).
fn bench_workload_c(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("C_100read", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let mut engine = open_bench_engine(dir.path());
                load_engine(&mut engine);
                (dir, engine)
            },
            |(_dir, engine)| run_workload_c(&engine),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

/// Criterion registration for Workload D (95% read / 5% insert).
fn bench_workload_d(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("D_95read_5insert", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let mut engine = open_bench_engine(dir.path());
                load_engine(&mut engine);
                let insert_base = 0u64;
                (dir, engine, insert_base)
            },
            |(_dir, mut engine, mut insert_base)| run_workload_d(&mut engine, &mut insert_base),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

/// Criterion registration for Workload F (50% read / 50% RMW).
fn bench_workload_f(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("F_50read_50rmw", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let mut engine = open_bench_engine(dir.path());
                load_engine(&mut engine);
                (dir, engine)
            },
            |(_dir, mut engine)| run_workload_f(&mut engine),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

// ================================================================================================
// Group registration
// ================================================================================================

criterion_group!(
    benches,
    bench_load,
    bench_workload_a,
    bench_workload_b,
    bench_workload_c,
    bench_workload_d,
    bench_workload_f,
);

criterion_main!(benches);
