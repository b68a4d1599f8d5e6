// src/similarity/mod.rs
pub mod all_pairs;
pub mod jaccard;

// Re-export main similarity API
pub use all_pairs::{all_pairs, expected_pair_count, AllPairsJoiner, PairIter};
pub use jaccard::{coefficient, JaccardScorer, KeyDecoding, ScoreOutcome, ScoreStats};
