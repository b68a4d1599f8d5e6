// src/pipeline/stage.rs
//
// In-process stand-ins for the dataflow engine's stage model: a bounded
// parallel map, a key-partitioned shuffle, and the single-partition funnel
// the all-pairs join needs.

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;

use crate::errors::PipelineError;
use crate::pipeline::ledger::ErrorLedger;
use crate::utils::constants::SYNTHETIC_JOIN_KEY;

/// Runs `f` over every input with at most `concurrency` in flight. Failed
/// records go to the ledger; output order is unspecified.
pub async fn run_map_stage<I, O, F, Fut>(
    stage: &str,
    inputs: Vec<I>,
    concurrency: usize,
    f: F,
) -> (Vec<O>, ErrorLedger)
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<O, PipelineError>>,
{
    let results: Vec<Result<O, PipelineError>> = stream::iter(inputs)
        .map(f)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut ledger = ErrorLedger::new();
    let mut outputs = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(output) => outputs.push(output),
            Err(e) => ledger.record(stage, &e),
        }
    }
    (outputs, ledger)
}

/// Groups values by key. Partitions come back ordered by key.
pub fn shuffle<K: Ord, V>(pairs: impl IntoIterator<Item = (K, V)>) -> BTreeMap<K, Vec<V>> {
    let mut partitions: BTreeMap<K, Vec<V>> = BTreeMap::new();
    for (key, value) in pairs {
        partitions.entry(key).or_default().push(value);
    }
    partitions
}

/// Routes every record to one synthetic key so a single reducer sees the
/// complete collection, in arrival order.
pub fn funnel_to_single_partition<V>(records: impl IntoIterator<Item = V>) -> Vec<V> {
    shuffle(records.into_iter().map(|record| (SYNTHETIC_JOIN_KEY, record)))
        .remove(&SYNTHETIC_JOIN_KEY)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[tokio::test]
    async fn test_map_stage_isolates_failures() {
        let (mut outputs, ledger) = run_map_stage("test", vec![1u64, 2, 3, 4], 2, |n| async move {
            if n % 2 == 0 {
                Err(PipelineError::parse("even", n.to_string()))
            } else {
                Ok(n * 10)
            }
        })
        .await;
        outputs.sort();
        assert_eq!(outputs, vec![10, 30]);
        assert_eq!(ledger.count(ErrorKind::ParseFailure), 2);
    }

    #[tokio::test]
    async fn test_map_stage_zero_concurrency_still_runs() {
        let (outputs, ledger) =
            run_map_stage("test", vec![1u8], 0, |n| async move { Ok::<_, PipelineError>(n) }).await;
        assert_eq!(outputs, vec![1]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_shuffle_groups_by_key() {
        let partitions = shuffle(vec![("b", 1), ("a", 2), ("b", 3)]);
        assert_eq!(partitions.keys().copied().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(partitions["b"], vec![1, 3]);
    }

    #[test]
    fn test_funnel_preserves_order() {
        assert_eq!(funnel_to_single_partition(vec!["x", "y", "z"]), vec!["x", "y", "z"]);
        assert!(funnel_to_single_partition(Vec::<u8>::new()).is_empty());
    }
}
