// src/mention_graph/retweet.rs
use base64::{engine::general_purpose, Engine as _};
use log::info;
use std::sync::Arc;

use crate::broadcast::BroadcastTable;
use crate::mention_graph::{finalize_member_lists, AudienceBatch, MapStats, ReduceStats};
use crate::models::{MentionSet, Post};
use crate::pipeline::ledger::ErrorLedger;
use crate::utils::constants::DEFAULT_MIN_RETWEET_AUDIENCE;

const STAGE: &str = "RETWEETS";

/// Groups users by the text they retweeted. Keys are base64 encoded so that
/// arbitrary post text survives the tab/comma delimited record formats.
pub struct RetweetAudienceBuilder {
    min_audience: usize,
    audience_filter: Option<Arc<BroadcastTable>>,
}

impl Default for RetweetAudienceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetweetAudienceBuilder {
    pub fn new() -> Self {
        Self {
            min_audience: DEFAULT_MIN_RETWEET_AUDIENCE,
            audience_filter: None,
        }
    }

    pub fn with_min_audience(mut self, min_audience: usize) -> Self {
        self.min_audience = min_audience;
        self
    }

    pub fn with_audience_filter(mut self, table: Arc<BroadcastTable>) -> Self {
        self.audience_filter = Some(table);
        self
    }

    /// Encoded key for a post: the retweeted text for a retweet, the post's
    /// own text when it was retweeted by others, otherwise nothing.
    pub fn map_post(&self, post: &Post) -> Option<(String, u64)> {
        let text = match &post.retweeted {
            Some(original) => original.text.as_str(),
            None if post.retweet_count > 0 => post.text.as_str(),
            None => return None,
        };
        Some((general_purpose::STANDARD.encode(text), post.author_id))
    }

    /// Synchronous map and reduce over raw input lines. No I/O is involved,
    /// so the lines are processed in order on the calling task.
    pub fn build(&self, lines: &[String]) -> AudienceBatch {
        let mut errors = ErrorLedger::new();
        let mut map_stats = MapStats::default();
        let mut set = MentionSet::new();

        for line in lines {
            map_stats.records_seen += 1;
            let post = match Post::from_line(line) {
                Ok(post) => post,
                Err(e) => {
                    map_stats.records_failed += 1;
                    errors.record(STAGE, &e);
                    continue;
                }
            };
            if let Some(table) = &self.audience_filter {
                if !table.contains(post.author_id) {
                    map_stats.authors_filtered += 1;
                    continue;
                }
            }
            match self.map_post(&post) {
                Some((key, user_id)) => {
                    map_stats.pairs_emitted += 1;
                    set.insert(key, user_id);
                }
                None => map_stats.posts_without_keys += 1,
            }
        }

        let mut reduce_stats = ReduceStats::default();
        let lists = finalize_member_lists(set, self.min_audience, &mut reduce_stats);
        info!(
            "[{}] {} retweeted texts kept of {} (min audience {})",
            STAGE, reduce_stats.keys_kept, reduce_stats.keys_in, self.min_audience
        );

        AudienceBatch {
            lists,
            errors,
            map_stats,
            reduce_stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retweet_line(author: u64, text: &str) -> String {
        format!(
            "{}\t{{\"text\":\"RT {}\",\"retweeted_status\":{{\"id\":1,\"text\":\"{}\",\"user\":{{\"id\":77}}}}}}",
            author, text, text
        )
    }

    fn original_line(author: u64, text: &str, retweet_count: u64) -> String {
        format!(
            "{}\t{{\"text\":\"{}\",\"retweet_count\":{}}}",
            author, text, retweet_count
        )
    }

    #[test]
    fn test_map_post_prefers_retweeted_text() {
        let builder = RetweetAudienceBuilder::new();
        let post = Post::from_line(&retweet_line(5, "vote today")).unwrap();
        let (key, user) = builder.map_post(&post).unwrap();
        assert_eq!(key, general_purpose::STANDARD.encode("vote today"));
        assert_eq!(user, 5);
    }

    #[test]
    fn test_map_post_uses_own_text_only_when_retweeted() {
        let builder = RetweetAudienceBuilder::new();
        let popular = Post::from_line(&original_line(3, "hello", 4)).unwrap();
        let quiet = Post::from_line(&original_line(3, "hello", 0)).unwrap();
        assert!(builder.map_post(&popular).is_some());
        assert!(builder.map_post(&quiet).is_none());
    }

    #[test]
    fn test_build_applies_min_audience() {
        let mut lines: Vec<String> = (1..=10).map(|u| retweet_line(u, "big")).collect();
        lines.extend((1..=3).map(|u| retweet_line(u, "small")));
        lines.push("broken line".to_string());

        let batch = RetweetAudienceBuilder::new().build(&lines);
        assert_eq!(batch.lists.len(), 1);
        assert_eq!(batch.lists[0].key, general_purpose::STANDARD.encode("big"));
        assert_eq!(batch.lists[0].len(), 10);
        assert_eq!(batch.reduce_stats.dropped_below_threshold, 1);
        assert_eq!(batch.map_stats.records_failed, 1);
        assert_eq!(batch.errors.total(), 1);
    }

    #[test]
    fn test_duplicate_retweets_count_once() {
        let lines = vec![retweet_line(1, "x"), retweet_line(1, "x"), retweet_line(2, "x")];
        let batch = RetweetAudienceBuilder::new().with_min_audience(2).build(&lines);
        assert_eq!(batch.lists[0].members_csv(), "1,2");
    }

    #[test]
    fn test_audience_filter() {
        let table = Arc::new(BroadcastTable::from_entries(vec![(2, -1)]));
        let lines = vec![retweet_line(1, "x"), retweet_line(2, "x")];
        let batch = RetweetAudienceBuilder::new()
            .with_min_audience(1)
            .with_audience_filter(table)
            .build(&lines);
        assert_eq!(batch.lists[0].members_csv(), "2");
        assert_eq!(batch.map_stats.authors_filtered, 1);
    }
}
