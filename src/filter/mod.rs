//! Membership Filter Module
//!
//! A probabilistic "key *may* be on disk" predicate with **no false
//! negatives** and a configurable false-positive rate. Point reads probe
//! the filter first; a negative answer skips every segment scan.
//!
//! ## Sizing
//!
//! Given the expected item count `n` and the desired false-positive
//! probability `p`, the bit-array size and seed count follow the standard
//! bloom-filter formulas:
//!
//! ```text
//! m = ⌈−n·ln(p) / (ln 2)²⌉        (bits)
//! k = max(1, ⌊(m/n)·ln 2⌋)        (hash seeds)
//! ```
//!
//! All `k` "hash functions" are one keyed non-cryptographic algorithm —
//! `xxh3_64_with_seed` — evaluated under seeds `0..k`; each probe sets or
//! tests bit `hash(key, seed) mod m`.
//!
//! ## Lifecycle
//!
//! The filter accumulates over the **entire engine lifetime**: flushes and
//! compactions never clear it, so any key ever written keeps reporting
//! positive. Its bit array travels through the metadata file
//! ([`state_bytes`](MembershipFilter::state_bytes) /
//! [`from_state`](MembershipFilter::from_state)) so restarts keep the
//! accumulated state. Changing `expected_items` or `false_positive_prob`
//! discards the array — the engine then rebuilds it from live data.
//!
//! When `active` is false the filter is bypassed: [`check`]
//! unconditionally answers `true` while [`add`] keeps populating bits, so
//! activating the filter later costs nothing.
//!
//! [`check`]: MembershipFilter::check
//! [`add`]: MembershipFilter::add

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::f64::consts::LN_2;

use thiserror::Error;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64_with_seed;

const STATE_HEADER_SIZE: usize = 8 + 4 + 4;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised by filter construction and restoration.
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    /// `expected_items` must be at least 1.
    #[error("expected_items must be positive")]
    InvalidExpectedItems,

    /// `false_positive_prob` must lie strictly between 0 and 1.
    #[error("false_positive_prob {0} must lie in (0, 1)")]
    InvalidProbability(f64),

    /// Persisted filter state did not match its sizing parameters.
    #[error("filter state is malformed")]
    MalformedState,
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Sizing and activation parameters for a [`MembershipFilter`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    /// Number of distinct keys the filter is sized for.
    pub expected_items: u64,

    /// Desired false-positive probability, in `(0, 1)`.
    pub false_positive_prob: f64,

    /// When false, `check` always answers `true` (filter bypassed).
    pub active: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            expected_items: 100_000,
            false_positive_prob: 0.01,
            active: false,
        }
    }
}

impl FilterConfig {
    /// Validates the sizing parameters.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.expected_items == 0 {
            return Err(FilterError::InvalidExpectedItems);
        }
        if !(self.false_positive_prob > 0.0 && self.false_positive_prob < 1.0) {
            return Err(FilterError::InvalidProbability(self.false_positive_prob));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Filter Core
// ------------------------------------------------------------------------------------------------

/// Seeded-hash membership filter over a byte-backed bit array.
#[derive(Debug, Clone)]
pub struct MembershipFilter {
    config: FilterConfig,

    /// Bit-array size in bits.
    m: u64,

    /// Number of hash seeds per key.
    k: u32,

    /// The bit array, packed 8 bits per byte.
    bits: Vec<u8>,
}

impl MembershipFilter {
    /// Creates an empty filter sized for `config`.
    pub fn new(config: FilterConfig) -> Result<Self, FilterError> {
        config.validate()?;

        let (m, k) = Self::size_for(config.expected_items, config.false_positive_prob);
        let bytes = m.div_ceil(8) as usize;

        debug!(
            expected_items = config.expected_items,
            false_positive_prob = config.false_positive_prob,
            bits = m,
            seeds = k,
            "membership filter sized"
        );

        Ok(Self {
            config,
            m,
            k,
            bits: vec![0u8; bytes],
        })
    }

    /// Restores a filter from persisted state bytes.
    ///
    /// The state must have been produced by [`state_bytes`] with the same
    /// sizing parameters; any inconsistency is rejected.
    ///
    /// [`state_bytes`]: MembershipFilter::state_bytes
    pub fn from_state(config: FilterConfig, state: &[u8]) -> Result<Self, FilterError> {
        config.validate()?;

        if state.len() < STATE_HEADER_SIZE {
            return Err(FilterError::MalformedState);
        }

        let mut raw_m = [0u8; 8];
        raw_m.copy_from_slice(&state[0..8]);
        let m = u64::from_le_bytes(raw_m);

        let mut raw_k = [0u8; 4];
        raw_k.copy_from_slice(&state[8..12]);
        let k = u32::from_le_bytes(raw_k);

        let mut raw_len = [0u8; 4];
        raw_len.copy_from_slice(&state[12..16]);
        let len = u32::from_le_bytes(raw_len) as usize;

        let bits = &state[STATE_HEADER_SIZE..];
        if m == 0 || k == 0 || bits.len() != len || len as u64 != m.div_ceil(8) {
            return Err(FilterError::MalformedState);
        }

        Ok(Self {
            config,
            m,
            k,
            bits: bits.to_vec(),
        })
    }

    /// Serialises the bit array and sizing parameters for the metadata file.
    pub fn state_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(STATE_HEADER_SIZE + self.bits.len());
        buf.extend_from_slice(&self.m.to_le_bytes());
        buf.extend_from_slice(&self.k.to_le_bytes());
        buf.extend_from_slice(&(self.bits.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.bits);
        buf
    }

    /// Records `key` in the filter.
    pub fn add(&mut self, key: &str) {
        for seed in 0..self.k {
            let bit = self.probe(key, seed);
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// Answers whether `key` may have been written.
    ///
    /// Returns `true` unconditionally when the filter is inactive.
    /// Otherwise returns `false` only if some probed bit is unset — a
    /// definitive "never written".
    pub fn check(&self, key: &str) -> bool {
        if !self.config.active {
            return true;
        }
        (0..self.k).all(|seed| {
            let bit = self.probe(key, seed);
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    /// The filter's configuration.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Whether negative answers from `check` are meaningful.
    pub fn is_active(&self) -> bool {
        self.config.active
    }

    /// Bit-array size in bits.
    pub fn bit_count(&self) -> u64 {
        self.m
    }

    /// Number of hash seeds probed per key.
    pub fn seed_count(&self) -> u32 {
        self.k
    }

    /// Bit index probed for `key` under `seed`.
    fn probe(&self, key: &str, seed: u32) -> u64 {
        xxh3_64_with_seed(key.as_bytes(), u64::from(seed)) % self.m
    }

    /// Standard bloom sizing: bit count and seed count for `n` items at
    /// false-positive probability `p`.
    fn size_for(n: u64, p: f64) -> (u64, u32) {
        let items = n as f64;
        let m = (-(items * p.ln()) / (LN_2 * LN_2)).ceil().max(1.0) as u64;
        let k = (((m as f64 / items) * LN_2).floor() as u32).max(1);
        (m, k)
    }
}
