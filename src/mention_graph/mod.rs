// src/mention_graph/mod.rs
pub mod builder;
pub mod retweet;

use log::debug;
use serde::Serialize;

use crate::models::{MemberList, MentionSet};
use crate::pipeline::ledger::ErrorLedger;

pub use builder::{Mention, MentionGraphBuilder};
pub use retweet::RetweetAudienceBuilder;

/// Map-side counters, merged across tasks once the stage finishes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MapStats {
    pub records_seen: usize,
    pub records_failed: usize,
    pub posts_without_keys: usize,
    pub authors_filtered: usize,
    pub pairs_emitted: usize,
    pub urls_resolved: usize,
    pub urls_trimmed_only: usize,
    pub redirect_loops: usize,
    pub urls_unreachable: usize,
    pub urls_malformed: usize,
}

impl MapStats {
    pub fn absorb(&mut self, other: &MapStats) {
        self.records_seen += other.records_seen;
        self.records_failed += other.records_failed;
        self.posts_without_keys += other.posts_without_keys;
        self.authors_filtered += other.authors_filtered;
        self.pairs_emitted += other.pairs_emitted;
        self.urls_resolved += other.urls_resolved;
        self.urls_trimmed_only += other.urls_trimmed_only;
        self.redirect_loops += other.redirect_loops;
        self.urls_unreachable += other.urls_unreachable;
        self.urls_malformed += other.urls_malformed;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReduceStats {
    pub keys_in: usize,
    pub keys_kept: usize,
    pub dropped_quoted: usize,
    pub dropped_below_threshold: usize,
}

/// Output of a builder run over one batch partition.
#[derive(Debug, Default)]
pub struct AudienceBatch {
    pub lists: Vec<MemberList>,
    pub errors: ErrorLedger,
    pub map_stats: MapStats,
    pub reduce_stats: ReduceStats,
}

/// Reduce step shared by the builders: drops quoted garbage keys and keys
/// with fewer distinct members than `min_members`.
pub fn finalize_member_lists(
    set: MentionSet,
    min_members: usize,
    stats: &mut ReduceStats,
) -> Vec<MemberList> {
    let mut kept = Vec::with_capacity(set.len());
    for list in set.into_member_lists() {
        stats.keys_in += 1;
        if list.key.starts_with('"') {
            debug!("Dropping quoted key {:?}", list.key);
            stats.dropped_quoted += 1;
            continue;
        }
        if list.len() < min_members {
            stats.dropped_below_threshold += 1;
            continue;
        }
        stats.keys_kept += 1;
        kept.push(list);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_applies_threshold_and_quote_guard() {
        let mut set = MentionSet::new();
        set.extend("http://a.example/", vec![1, 2, 3]);
        set.extend("http://b.example/", vec![4]);
        set.extend("\"http://c.example/", vec![5, 6, 7]);

        let mut stats = ReduceStats::default();
        let lists = finalize_member_lists(set, 2, &mut stats);
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].key, "http://a.example/");
        assert_eq!(stats.keys_in, 3);
        assert_eq!(stats.dropped_quoted, 1);
        assert_eq!(stats.dropped_below_threshold, 1);
    }

    #[test]
    fn test_threshold_of_one_keeps_singletons() {
        let mut set = MentionSet::new();
        set.insert("k", 9);
        let lists = finalize_member_lists(set, 1, &mut ReduceStats::default());
        assert_eq!(lists.len(), 1);
    }
}
