// src/mention_graph/builder.rs
use log::{debug, info};
use std::sync::Arc;

use crate::broadcast::BroadcastTable;
use crate::canonical::{CanonicalState, HttpProbe, RedirectProbe, UrlCanonicalizer};
use crate::errors::PipelineError;
use crate::mention_graph::{finalize_member_lists, AudienceBatch, MapStats, ReduceStats};
use crate::models::{MentionSet, Post};
use crate::pipeline::stage::run_map_stage;
use crate::utils::constants::DEFAULT_MIN_MENTIONS;

const STAGE: &str = "MENTIONS";

/// One (canonical URL, author) pair emitted by the map step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub canonical: String,
    pub user_id: u64,
}

/// Associates canonical URLs with the users who referenced them.
pub struct MentionGraphBuilder<P: RedirectProbe = HttpProbe> {
    canonicalizer: Arc<UrlCanonicalizer<P>>,
    audience_filter: Option<Arc<BroadcastTable>>,
    min_mentions: usize,
}

impl<P: RedirectProbe> MentionGraphBuilder<P> {
    pub fn new(canonicalizer: Arc<UrlCanonicalizer<P>>) -> Self {
        Self {
            canonicalizer,
            audience_filter: None,
            min_mentions: DEFAULT_MIN_MENTIONS,
        }
    }

    pub fn with_min_mentions(mut self, min_mentions: usize) -> Self {
        self.min_mentions = min_mentions;
        self
    }

    /// Only authors present in `table` contribute mentions.
    pub fn with_audience_filter(mut self, table: Arc<BroadcastTable>) -> Self {
        self.audience_filter = Some(table);
        self
    }

    /// Map step for an already parsed post.
    pub async fn map_post(&self, post: &Post) -> (Vec<Mention>, MapStats) {
        let mut stats = MapStats {
            records_seen: 1,
            ..Default::default()
        };

        if let Some(table) = &self.audience_filter {
            if !table.contains(post.author_id) {
                stats.authors_filtered += 1;
                return (Vec::new(), stats);
            }
        }
        if post.urls.is_empty() {
            stats.posts_without_keys += 1;
            return (Vec::new(), stats);
        }

        let mut mentions = Vec::with_capacity(post.urls.len());
        for url_ref in &post.urls {
            let outcome = self.canonicalizer.canonicalize(url_ref.preferred()).await;
            match outcome.state {
                CanonicalState::Resolved => stats.urls_resolved += 1,
                CanonicalState::Trimmed => stats.urls_trimmed_only += 1,
                CanonicalState::LoopDetected => stats.redirect_loops += 1,
                CanonicalState::Unreachable => stats.urls_unreachable += 1,
                CanonicalState::Malformed => stats.urls_malformed += 1,
            }
            mentions.push(Mention {
                canonical: outcome.canonical,
                user_id: post.author_id,
            });
        }
        stats.pairs_emitted = mentions.len();
        (mentions, stats)
    }

    /// Map step for one raw `<author-id><TAB><json>` input line.
    pub async fn map_line(&self, line: &str) -> Result<(Vec<Mention>, MapStats), PipelineError> {
        let post = Post::from_line(line)?;
        Ok(self.map_post(&post).await)
    }

    /// Reduce/combine step over the mentions of one partition.
    pub fn reduce(
        &self,
        mentions: impl IntoIterator<Item = Mention>,
        stats: &mut ReduceStats,
    ) -> Vec<crate::models::MemberList> {
        let mut set = MentionSet::new();
        for mention in mentions {
            set.insert(mention.canonical, mention.user_id);
        }
        finalize_member_lists(set, self.min_mentions, stats)
    }

    /// Runs map and reduce over a batch of raw lines. Failed lines are
    /// counted in the ledger and skipped.
    pub async fn build(&self, lines: Vec<String>, concurrency: usize) -> AudienceBatch {
        let total = lines.len();
        let (outputs, errors) = run_map_stage(STAGE, lines, concurrency, |line| async move {
            self.map_line(&line).await
        })
        .await;

        let mut map_stats = MapStats {
            records_failed: errors.total(),
            records_seen: errors.total(),
            ..Default::default()
        };
        let mut mentions = Vec::new();
        for (task_mentions, task_stats) in outputs {
            map_stats.absorb(&task_stats);
            mentions.extend(task_mentions);
        }
        debug!(
            "[{}] {} lines mapped into {} mention pairs",
            STAGE,
            total,
            mentions.len()
        );

        let mut reduce_stats = ReduceStats::default();
        let lists = self.reduce(mentions, &mut reduce_stats);
        info!(
            "[{}] {} canonical URLs kept of {} (min mentions {})",
            STAGE, reduce_stats.keys_kept, reduce_stats.keys_in, self.min_mentions
        );

        AudienceBatch {
            lists,
            errors,
            map_stats,
            reduce_stats,
        }
    }
}
