// src/utils/progress_bars/logging.rs - Logging helpers for pipeline stages
use log::{debug, info, warn};
use std::time::Instant;

use crate::mention_graph::{MapStats, ReduceStats};
use crate::pipeline::ledger::ErrorLedger;
use crate::similarity::ScoreStats;

/// Pipeline stage a logger reports for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Mentions,
    Retweets,
    Join,
    Score,
    Annotate,
}

impl Stage {
    fn label(self) -> (&'static str, &'static str) {
        match self {
            Stage::Mentions => ("MENTIONS", "🌐"),
            Stage::Retweets => ("RETWEETS", "🔁"),
            Stage::Join => ("JOIN", "🔗"),
            Stage::Score => ("JACCARD", "📐"),
            Stage::Annotate => ("ANNOTATE", "🏷️"),
        }
    }
}

#[derive(Clone)]
pub struct StageLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

impl StageLogger {
    pub fn new(stage: Stage) -> Self {
        let (stage_name, stage_emoji) = stage.label();
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, run_id: &str, input_records: usize) {
        info!(
            "[{}] {} 🚀 Starting stage (run ID: {}) over {} records",
            self.stage_name, self.stage_emoji, run_id, input_records
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        let msg = if let Some(details) = details {
            format!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, details, elapsed.as_secs_f32()
            )
        } else {
            format!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, elapsed.as_secs_f32()
            )
        };
        info!("{}", msg);
    }

    pub fn log_map_stats(&self, stats: &MapStats) {
        info!(
            "[{}] {} 📊 Map: {} records seen, {} failed, {} pairs emitted",
            self.stage_name, self.stage_emoji, stats.records_seen, stats.records_failed, stats.pairs_emitted
        );
        let url_total = stats.urls_resolved
            + stats.urls_trimmed_only
            + stats.redirect_loops
            + stats.urls_unreachable
            + stats.urls_malformed;
        if url_total > 0 {
            info!(
                "[{}] {} 🔍 URLs: {} resolved, {} trimmed only, {} loops, {} unreachable, {} malformed",
                self.stage_name,
                self.stage_emoji,
                stats.urls_resolved,
                stats.urls_trimmed_only,
                stats.redirect_loops,
                stats.urls_unreachable,
                stats.urls_malformed
            );
        }
        if stats.authors_filtered > 0 {
            info!(
                "[{}] {} 🚫 {} posts from authors outside the broadcast table",
                self.stage_name, self.stage_emoji, stats.authors_filtered
            );
        }
    }

    pub fn log_reduce_stats(&self, stats: &ReduceStats) {
        info!(
            "[{}] {} ✅ Reduce: {} keys → {} kept ({} below threshold, {} quoted)",
            self.stage_name,
            self.stage_emoji,
            stats.keys_in,
            stats.keys_kept,
            stats.dropped_below_threshold,
            stats.dropped_quoted
        );
    }

    pub fn log_pair_generation(&self, records: usize, total_pairs: usize) {
        info!(
            "[{}] {} 📈 {} records materialized on one partition → {} candidate pairs",
            self.stage_name, self.stage_emoji, records, total_pairs
        );
    }

    pub fn log_score_stats(&self, stats: &ScoreStats, threshold: f64) {
        info!(
            "[{}] {} 🎯 {} pairs scored → {} edges (threshold {:?}), {} below threshold, {} empty unions",
            self.stage_name,
            self.stage_emoji,
            stats.pairs_scored,
            stats.edges_emitted,
            threshold,
            stats.below_threshold,
            stats.empty_unions
        );
        if stats.undecoded_keys > 0 {
            warn!(
                "[{}] {} ⚠️  {} keys kept undecoded",
                self.stage_name, self.stage_emoji, stats.undecoded_keys
            );
        }
    }

    pub fn log_cache_results(&self, cache_hits: usize, cache_misses: usize) {
        let total = cache_hits + cache_misses;
        if total > 0 {
            let hit_rate = (cache_hits as f64 / total as f64) * 100.0;
            info!(
                "[{}] {} 💾 Cache results: {} hits, {} misses ({:.1}% hit rate)",
                self.stage_name, self.stage_emoji, cache_hits, cache_misses, hit_rate
            );
        }
    }

    pub fn log_errors(&self, ledger: &ErrorLedger) {
        if ledger.is_empty() {
            return;
        }
        warn!(
            "[{}] {} ⚠️  {} records skipped",
            self.stage_name,
            self.stage_emoji,
            ledger.total()
        );
        for sample in ledger.samples().iter().take(3) {
            debug!("[{}] {} sample: {}", self.stage_name, self.stage_emoji, sample);
        }
    }

    pub fn log_completion(&self, outputs: usize) {
        info!(
            "[{}] {} 🎉 COMPLETED: {} output records in {:.2?}",
            self.stage_name,
            self.stage_emoji,
            outputs,
            self.start_time.elapsed()
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.stage_name, self.stage_emoji, message);
    }
}

pub fn log_pipeline_start(run_id: &str, mode: &str, concurrency: usize) {
    info!("🚀 ===== MENTION GRAPH PIPELINE STARTING =====");
    info!("📅 Pipeline Run ID: {}", run_id);
    info!("   • Mode: {}", mode);
    info!("   • Map concurrency: {} in-flight records", concurrency);
    info!("==============================================");
}

pub fn log_pipeline_completion(run_id: &str, duration: std::time::Duration, lists: usize, edges: usize) {
    info!("🎉 ===== MENTION GRAPH PIPELINE COMPLETED =====");
    info!("📅 Pipeline Run ID: {}", run_id);
    info!("⏱️  Total Duration: {:.2?}", duration);
    info!("📋 Member lists: {}", lists);
    info!("🔗 Similarity edges: {}", edges);
    info!("===============================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_prefixes_are_distinct() {
        let stages = [
            Stage::Mentions,
            Stage::Retweets,
            Stage::Join,
            Stage::Score,
            Stage::Annotate,
        ];
        let mut names: Vec<&str> = stages.iter().map(|s| s.label().0).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), stages.len());
    }

    #[test]
    fn test_phase_logging_with_and_without_details() {
        let logger = StageLogger::new(Stage::Join);
        logger.log_phase("Materializing", Some("3 member lists on one partition"));
        logger.log_phase("Materializing", None);
        assert_eq!(logger.stage_name, "JOIN");
    }
}
