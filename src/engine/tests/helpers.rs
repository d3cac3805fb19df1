use crate::engine::{Engine, EngineConfig};
use crate::filter::FilterConfig;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with a tiny threshold so flushes happen after a few writes.
pub fn small_threshold_config(threshold: u64) -> EngineConfig {
    EngineConfig {
        threshold,
        ..EngineConfig::default()
    }
}

/// Config with an active filter sized for test workloads.
pub fn active_filter_config() -> EngineConfig {
    EngineConfig {
        filter: FilterConfig {
            expected_items: 10_000,
            false_positive_prob: 0.01,
            active: true,
        },
        ..EngineConfig::default()
    }
}

/// Open an engine with default config.
pub fn open_default(dir: &Path) -> Engine {
    init_tracing();
    Engine::open(dir, EngineConfig::default()).expect("engine open")
}
