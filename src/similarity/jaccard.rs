// src/similarity/jaccard.rs
use base64::{engine::general_purpose, Engine as _};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::errors::PipelineError;
use crate::models::{parse_joined_record, MemberList, SimilarityEdge};
use crate::utils::constants::DEFAULT_MIN_JACCARD;

/// How entity keys are turned into edge endpoints once a pair is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyDecoding {
    #[default]
    Plain,
    /// Keys are base64 tokens (retweet audiences); decoded after scoring.
    Base64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Edge {
        edge: SimilarityEdge,
        /// Keys that failed to decode and were kept raw.
        undecoded_keys: usize,
    },
    BelowThreshold(f64),
    EmptyUnion,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreStats {
    pub pairs_scored: usize,
    pub edges_emitted: usize,
    pub below_threshold: usize,
    pub empty_unions: usize,
    pub undecoded_keys: usize,
}

/// |A ∩ B| / |A ∪ B|, or `None` when both sets are empty.
pub fn coefficient(a: &BTreeSet<u64>, b: &BTreeSet<u64>) -> Option<f64> {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return None;
    }
    Some(intersection as f64 / union as f64)
}

#[derive(Debug, Clone)]
pub struct JaccardScorer {
    threshold: f64,
    key_decoding: KeyDecoding,
}

impl Default for JaccardScorer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_JACCARD)
    }
}

impl JaccardScorer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            key_decoding: KeyDecoding::Plain,
        }
    }

    /// Scorer for opaque base64 keys.
    pub fn decoding(threshold: f64) -> Self {
        Self {
            threshold,
            key_decoding: KeyDecoding::Base64,
        }
    }

    pub fn with_key_decoding(mut self, key_decoding: KeyDecoding) -> Self {
        self.key_decoding = key_decoding;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn score(&self, left: &MemberList, right: &MemberList) -> ScoreOutcome {
        let Some(value) = coefficient(&left.members, &right.members) else {
            debug!(
                "{}",
                PipelineError::EmptyUnion {
                    left: left.key.clone(),
                    right: right.key.clone(),
                }
            );
            return ScoreOutcome::EmptyUnion;
        };
        if value < self.threshold {
            return ScoreOutcome::BelowThreshold(value);
        }

        let mut undecoded_keys = 0;
        let mut endpoint = |key: &str| match self.key_decoding {
            KeyDecoding::Plain => key.to_string(),
            KeyDecoding::Base64 => decode_key(key).unwrap_or_else(|| {
                undecoded_keys += 1;
                key.to_string()
            }),
        };
        let edge = SimilarityEdge {
            left: endpoint(&left.key),
            right: endpoint(&right.key),
            coefficient: value,
        };
        ScoreOutcome::Edge {
            edge,
            undecoded_keys,
        }
    }

    /// Scores one joined-pair text record.
    pub fn score_record(&self, line: &str) -> Result<ScoreOutcome, PipelineError> {
        let (left, right) = parse_joined_record(line)?;
        Ok(self.score(&left, &right))
    }

    pub fn score_pairs<'a>(
        &self,
        pairs: impl IntoIterator<Item = (&'a MemberList, &'a MemberList)>,
    ) -> (Vec<SimilarityEdge>, ScoreStats) {
        let mut stats = ScoreStats::default();
        let mut edges = Vec::new();
        for (left, right) in pairs {
            stats.pairs_scored += 1;
            match self.score(left, right) {
                ScoreOutcome::Edge {
                    edge,
                    undecoded_keys,
                } => {
                    stats.edges_emitted += 1;
                    stats.undecoded_keys += undecoded_keys;
                    edges.push(edge);
                }
                ScoreOutcome::BelowThreshold(_) => stats.below_threshold += 1,
                ScoreOutcome::EmptyUnion => stats.empty_unions += 1,
            }
        }
        (edges, stats)
    }
}

fn decode_key(key: &str) -> Option<String> {
    let bytes = match general_purpose::STANDARD.decode(key) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Keeping undecodable key '{}': {}", key, e);
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(text) => Some(flatten_decoded(&text)),
        Err(e) => {
            warn!("Keeping key '{}', decoded bytes are not UTF-8: {}", key, e);
            None
        }
    }
}

/// Keeps a decoded key on one edge line: each whitespace run becomes a single
/// space and ASCII commas become `，` so the key cannot split the pair field.
pub(crate) fn flatten_decoded(text: &str) -> String {
    let mut flat = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                flat.push(' ');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        flat.push(if c == ',' { '，' } else { c });
    }
    flat
}
