// src/similarity/all_pairs.rs
use log::{debug, warn};

use crate::errors::PipelineError;
use crate::utils::constants::JOIN_SOFT_WARN_RECORDS;

/// Number of unordered pairs of distinct records among `n`.
pub fn expected_pair_count(n: usize) -> usize {
    if n < 2 {
        0
    } else {
        n * (n - 1) / 2
    }
}

/// Single-partition all-pairs join. Records are materialized into an
/// order-preserving arena, then pairs are enumerated by index with `j` only
/// ever scanning beyond `i`.
///
/// Time is quadratic and memory linear in the number of records, so callers
/// must keep the input bounded (see [`AllPairsJoiner::with_capacity_limit`]).
#[derive(Debug, Clone)]
pub struct AllPairsJoiner<T> {
    records: Vec<T>,
    max_records: Option<usize>,
}

impl<T> Default for AllPairsJoiner<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AllPairsJoiner<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            max_records: None,
        }
    }

    /// Refuse to materialize more than `max_records` records.
    pub fn with_capacity_limit(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Collects every record routed to the join partition. On
    /// `JoinCapacityExceeded` the joiner is left empty and no pair is produced.
    pub fn materialize(&mut self, records: impl IntoIterator<Item = T>) -> Result<(), PipelineError> {
        for record in records {
            if let Some(limit) = self.max_records {
                if self.records.len() >= limit {
                    let seen = self.records.len() + 1;
                    self.records.clear();
                    return Err(PipelineError::JoinCapacityExceeded {
                        records: seen,
                        limit,
                    });
                }
            }
            self.records.push(record);
        }

        if self.records.len() > JOIN_SOFT_WARN_RECORDS {
            warn!(
                "All-pairs join materialized {} records ({} pairs); this stage is quadratic",
                self.records.len(),
                self.pair_count()
            );
        } else {
            debug!(
                "All-pairs join materialized {} records ({} pairs)",
                self.records.len(),
                self.pair_count()
            );
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn pair_count(&self) -> usize {
        expected_pair_count(self.records.len())
    }

    pub fn pairs(&self) -> PairIter<'_, T> {
        all_pairs(&self.records)
    }
}

/// Every unordered pair of distinct elements of `records`, in index order.
pub fn all_pairs<T>(records: &[T]) -> PairIter<'_, T> {
    PairIter {
        records,
        i: 0,
        j: 1,
        remaining: expected_pair_count(records.len()),
    }
}

pub struct PairIter<'a, T> {
    records: &'a [T],
    i: usize,
    j: usize,
    remaining: usize,
}

impl<'a, T> Iterator for PairIter<'a, T> {
    type Item = (&'a T, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.records.len();
        if self.j >= n {
            self.i += 1;
            self.j = self.i + 1;
        }
        if self.i >= n || self.j >= n {
            return None;
        }
        let pair = (&self.records[self.i], &self.records[self.j]);
        self.j += 1;
        self.remaining = self.remaining.saturating_sub(1);
        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for PairIter<'_, T> {}
