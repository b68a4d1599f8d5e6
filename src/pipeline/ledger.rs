// src/pipeline/ledger.rs
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::errors::{ErrorKind, PipelineError};
use crate::utils::constants::MAX_ERROR_SAMPLES;

/// Side channel for per-record failures: counts by kind plus a bounded
/// sample of messages for later inspection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorLedger {
    counts: BTreeMap<ErrorKind, usize>,
    samples: Vec<String>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: &str, err: &PipelineError) {
        *self.counts.entry(err.kind()).or_insert(0) += 1;
        if self.samples.len() < MAX_ERROR_SAMPLES {
            warn!("[{}] Skipping record: {}", stage, err);
            self.samples.push(err.to_string());
        }
    }

    pub fn merge(&mut self, other: ErrorLedger) {
        for (kind, count) in other.counts {
            *self.counts.entry(kind).or_insert(0) += count;
        }
        let room = MAX_ERROR_SAMPLES.saturating_sub(self.samples.len());
        self.samples.extend(other.samples.into_iter().take(room));
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_kind_and_caps_samples() {
        let mut ledger = ErrorLedger::new();
        for i in 0..(MAX_ERROR_SAMPLES + 5) {
            ledger.record("test", &PipelineError::parse("bad", i.to_string()));
        }
        ledger.record("test", &PipelineError::malformed("x", "nope"));
        assert_eq!(ledger.count(ErrorKind::ParseFailure), MAX_ERROR_SAMPLES + 5);
        assert_eq!(ledger.count(ErrorKind::MalformedUrl), 1);
        assert_eq!(ledger.total(), MAX_ERROR_SAMPLES + 6);
        assert_eq!(ledger.samples().len(), MAX_ERROR_SAMPLES);
    }

    #[test]
    fn test_merge() {
        let mut a = ErrorLedger::new();
        a.record("a", &PipelineError::parse("bad", "1"));
        let mut b = ErrorLedger::new();
        b.record("b", &PipelineError::parse("bad", "2"));
        b.record("b", &PipelineError::malformed("u", "r"));
        a.merge(b);
        assert_eq!(a.count(ErrorKind::ParseFailure), 2);
        assert_eq!(a.total(), 3);
        assert_eq!(a.samples().len(), 3);
    }
}
