// src/utils/constants.rs

/// Hop limit for bulk resolution inside the pipeline.
pub const CONSERVATIVE_MAX_HOPS: usize = 10;

/// Hop limit for manual/diagnostic resolution (`resolve_urls`).
pub const DIAGNOSTIC_MAX_HOPS: usize = 20;

/// Pause between consecutive hops of one chain, bounds the outbound request rate.
pub const DEFAULT_HOP_DELAY_MS: u64 = 50;

/// Per-hop connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_MIN_MENTIONS: usize = 1;
pub const DEFAULT_MIN_RETWEET_AUDIENCE: usize = 10;
pub const DEFAULT_MIN_JACCARD: f64 = 0.0;

/// Canonicalization LRU capacity per worker.
pub const DEFAULT_CACHE_SIZE: usize = 20_000;

/// Grouping key every record shares on its way into the all-pairs join.
pub const SYNTHETIC_JOIN_KEY: u32 = 1;

/// Error messages kept per ledger; counts are always exact.
pub const MAX_ERROR_SAMPLES: usize = 20;

/// Above this many materialized join records a warning is logged.
pub const JOIN_SOFT_WARN_RECORDS: usize = 5_000;
