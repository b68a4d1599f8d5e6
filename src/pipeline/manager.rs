// src/pipeline/manager.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::broadcast::{
    BroadcastAnnotator, BroadcastTable, MemberAnnotation, NeighborhoodOpinion, TextOpinionTable,
};
use crate::canonical::{create_shared_cache, RedirectProbe, UrlCanonicalizer};
use crate::errors::PipelineError;
use crate::mention_graph::{
    AudienceBatch, MapStats, MentionGraphBuilder, ReduceStats, RetweetAudienceBuilder,
};
use crate::models::{MemberList, SimilarityEdge};
use crate::pipeline::io::{ensure_dir, read_records, write_json, write_records};
use crate::pipeline::ledger::ErrorLedger;
use crate::pipeline::stage::funnel_to_single_partition;
use crate::similarity::{AllPairsJoiner, ScoreStats};
use crate::utils::config::{PipelineConfig, PipelineMode};
use crate::utils::get_memory_usage;
use crate::utils::progress_bars::{
    log_pipeline_completion, log_pipeline_start, ProgressConfig, Stage, StageLogger,
};

pub const MEMBER_LISTS_FILE: &str = "member_lists.tsv";
pub const ANNOTATIONS_FILE: &str = "annotations.tsv";
pub const OPINIONS_FILE: &str = "opinions.tsv";
pub const EDGES_FILE: &str = "edges.tsv";
pub const USER_OPINIONS_FILE: &str = "user_opinions.tsv";
pub const SUMMARY_FILE: &str = "summary.json";

/// Everything a run produces, before it is written anywhere.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub member_lists: Vec<MemberList>,
    pub annotations: Vec<MemberAnnotation>,
    pub opinions: Vec<NeighborhoodOpinion>,
    pub edges: Vec<SimilarityEdge>,
    pub map_stats: MapStats,
    pub reduce_stats: ReduceStats,
    pub score_stats: ScoreStats,
    pub errors: ErrorLedger,
    pub join_records: usize,
    /// Set when the join refused its input; no edges were produced.
    pub join_skipped: bool,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub mode: &'static str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub input_records: usize,
    pub member_lists: usize,
    pub annotations: usize,
    pub opinions: usize,
    pub user_opinions: usize,
    pub edges: usize,
    pub join_records: usize,
    pub join_skipped: bool,
    pub map_stats: MapStats,
    pub reduce_stats: ReduceStats,
    pub score_stats: ScoreStats,
    pub errors: ErrorLedger,
    pub cache_hits: Option<usize>,
    pub cache_misses: Option<usize>,
    pub memory_mb: u64,
}

/// Runs every stage over in-memory records. Per-record failures end up in
/// `PipelineOutput::errors`; nothing here aborts the batch.
pub async fn run_with_records<P: RedirectProbe>(
    config: &PipelineConfig,
    run_id: &str,
    posts: Vec<String>,
    followees: Vec<String>,
    canonicalizer: Arc<UrlCanonicalizer<P>>,
    table: Option<Arc<BroadcastTable>>,
) -> PipelineOutput {
    let input_records = posts.len();
    let audience_filter = match (&table, config.audience_filter) {
        (Some(table), true) => Some(table.clone()),
        (None, true) => {
            warn!("AUDIENCE_FILTER is set but no broadcast table is loaded; filter disabled");
            None
        }
        _ => None,
    };

    let batch: AudienceBatch = match config.mode {
        PipelineMode::UrlMentions => {
            let logger = StageLogger::new(Stage::Mentions);
            logger.log_start(run_id, input_records);
            let mut builder =
                MentionGraphBuilder::new(canonicalizer).with_min_mentions(config.min_mentions);
            if let Some(table) = audience_filter {
                builder = builder.with_audience_filter(table);
            }
            let batch = builder.build(posts, config.map_concurrency).await;
            logger.log_map_stats(&batch.map_stats);
            logger.log_reduce_stats(&batch.reduce_stats);
            logger.log_errors(&batch.errors);
            logger.log_completion(batch.lists.len());
            batch
        }
        PipelineMode::RetweetAudience => {
            let logger = StageLogger::new(Stage::Retweets);
            logger.log_start(run_id, input_records);
            let mut builder =
                RetweetAudienceBuilder::new().with_min_audience(config.min_retweet_audience);
            if let Some(table) = audience_filter {
                builder = builder.with_audience_filter(table);
            }
            let batch = builder.build(&posts);
            logger.log_map_stats(&batch.map_stats);
            logger.log_reduce_stats(&batch.reduce_stats);
            logger.log_errors(&batch.errors);
            logger.log_completion(batch.lists.len());
            batch
        }
    };

    let AudienceBatch {
        lists,
        mut errors,
        map_stats,
        reduce_stats,
    } = batch;

    let mut output = PipelineOutput {
        map_stats,
        reduce_stats,
        ..Default::default()
    };

    join_and_score(config, &lists, &mut output, &mut errors);

    if let Some(table) = table {
        let logger = StageLogger::new(Stage::Annotate);
        let annotator = BroadcastAnnotator::new(table);
        logger.log_phase(
            "Member annotation",
            Some(&format!("{} table entries", annotator.table().len())),
        );
        output.annotations = lists
            .iter()
            .map(|list| annotator.annotate_members(list))
            .collect();
        if !followees.is_empty() {
            logger.log_phase(
                "Neighbourhood opinions",
                Some(&format!("{} followee lines", followees.len())),
            );
        }
        output.opinions = neighborhood_opinions(&annotator, &followees, &mut errors);
        logger.log_completion(output.annotations.len() + output.opinions.len());
    } else if !followees.is_empty() {
        warn!("Followee lists supplied without a broadcast table; opinions skipped");
    }

    output.member_lists = lists;
    output.errors = errors;
    output
}

/// Funnels every list onto one partition, enumerates all pairs and scores them.
fn join_and_score(
    config: &PipelineConfig,
    lists: &[MemberList],
    output: &mut PipelineOutput,
    errors: &mut ErrorLedger,
) {
    let join_logger = StageLogger::new(Stage::Join);
    let mut joiner = AllPairsJoiner::new();
    if let Some(limit) = config.max_join_records {
        joiner = joiner.with_capacity_limit(limit);
    }
    join_logger.log_phase(
        "Materializing",
        Some(&format!("{} member lists on one partition", lists.len())),
    );
    match joiner.materialize(funnel_to_single_partition(lists.iter())) {
        Ok(()) => {
            output.join_records = joiner.len();
            join_logger.log_pair_generation(joiner.len(), joiner.pair_count());

            let score_logger = StageLogger::new(Stage::Score);
            let scorer = config.scorer();
            if config.decode_keys {
                score_logger.log_phase("Scoring", Some("base64 keys decoded after scoring"));
            } else {
                score_logger.log_phase("Scoring", None);
            }
            let (edges, score_stats) = scorer.score_pairs(joiner.pairs().map(|(l, r)| (*l, *r)));
            score_logger.log_score_stats(&score_stats, scorer.threshold());
            score_logger.log_completion(edges.len());
            output.edges = edges;
            output.score_stats = score_stats;
        }
        Err(e) => {
            join_logger.log_warning(&format!("{}; skipping similarity scoring", e));
            errors.record("JOIN", &e);
            output.join_records = lists.len();
            output.join_skipped = true;
        }
    }
}

/// Neighbourhood opinion for every `<user-id><TAB><followee-csv>` line whose
/// user is in the table.
pub fn neighborhood_opinions(
    annotator: &BroadcastAnnotator,
    lines: &[String],
    errors: &mut ErrorLedger,
) -> Vec<NeighborhoodOpinion> {
    let mut opinions = Vec::new();
    for line in lines {
        let parsed = line
            .split_once('\t')
            .ok_or_else(|| PipelineError::parse("missing tab separator", line.as_str()))
            .and_then(|(user, csv)| {
                user.trim()
                    .parse::<u64>()
                    .map(|user_id| (user_id, csv))
                    .map_err(|e| PipelineError::parse(format!("invalid user id: {}", e), line.as_str()))
            });
        match parsed {
            Ok((user_id, csv)) => opinions.extend(annotator.neighborhood_opinion(user_id, csv)),
            Err(e) => errors.record("OPINIONS", &e),
        }
    }
    opinions
}

/// Full run: read inputs, build, join, score, annotate, write outputs.
pub async fn run_pipeline(config: &PipelineConfig, progress: &ProgressConfig) -> Result<RunSummary> {
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let start_time = Instant::now();
    log_pipeline_start(&run_id, config.mode.as_str(), config.map_concurrency);

    let multi = progress.create_multi_progress();
    let main_bar = progress.stage_bar(multi.as_ref(), 3);
    if let Some(bar) = &main_bar {
        bar.set_message("Loading inputs");
    }

    let table = match &config.broadcast_table_path {
        Some(path) => {
            let table = BroadcastTable::load(path)
                .with_context(|| format!("Failed to load broadcast table {}", path.display()))?;
            Some(Arc::new(table))
        }
        None => None,
    };
    let retweet_labels = match (&config.retweet_opinion_path, config.mode) {
        (Some(path), PipelineMode::RetweetAudience) => Some(
            TextOpinionTable::load(path)
                .with_context(|| format!("Failed to load retweet opinions {}", path.display()))?,
        ),
        (Some(_), PipelineMode::UrlMentions) => {
            warn!("RETWEET_OPINION_PATH only applies to retweet_audience mode; ignored");
            None
        }
        (None, _) => None,
    };
    let posts = read_records(&config.input_path).await?;
    let followees = match &config.followees_path {
        Some(path) => read_records(path).await?,
        None => Vec::new(),
    };
    let input_records = posts.len();
    if let Some(bar) = &main_bar {
        bar.inc(1);
        bar.set_message(format!("Building {} graph", config.mode.as_str()));
    }

    let cache = create_shared_cache(config.resolution_cache_size);
    let canonicalizer = Arc::new(
        UrlCanonicalizer::with_http(config.resolver_settings(), config.connect_timeout())?
            .with_cache(cache.clone()),
    );
    let spinner = progress.stage_spinner(multi.as_ref(), "map → reduce → join → score");
    let output =
        run_with_records(config, &run_id, posts, followees, canonicalizer, table.clone()).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    if let Some(bar) = &main_bar {
        bar.inc(1);
        bar.set_message("Writing outputs");
    }

    let (cache_hits, cache_misses) = if config.mode == PipelineMode::UrlMentions {
        let cache = cache.lock().await;
        if progress.should_show_cache_stats() {
            StageLogger::new(Stage::Mentions).log_cache_results(cache.hits, cache.misses);
        }
        (Some(cache.hits), Some(cache.misses))
    } else {
        (None, None)
    };

    let dir = &config.output_dir;
    ensure_dir(dir).await?;
    write_records(&dir.join(MEMBER_LISTS_FILE), &output.member_lists).await?;
    write_records(&dir.join(EDGES_FILE), &output.edges).await?;
    if table.is_some() {
        write_records(&dir.join(ANNOTATIONS_FILE), &output.annotations).await?;
    }
    if !output.opinions.is_empty() {
        write_records(&dir.join(OPINIONS_FILE), &output.opinions).await?;
    }
    let user_opinions = match &retweet_labels {
        Some(labels) => {
            let logger = StageLogger::new(Stage::Annotate);
            logger.log_phase(
                "Retweet opinions",
                Some(&format!("{} labelled texts", labels.len())),
            );
            let user_opinions = labels.user_opinions(&output.member_lists);
            write_records(&dir.join(USER_OPINIONS_FILE), &user_opinions).await?;
            logger.log_completion(user_opinions.len());
            user_opinions.len()
        }
        None => 0,
    };

    let memory_mb = get_memory_usage().await;
    if progress.should_show_memory() {
        info!("💾 Memory usage: {} MB", memory_mb);
    }

    let summary = RunSummary {
        run_id: run_id.clone(),
        mode: config.mode.as_str(),
        started_at,
        finished_at: Utc::now(),
        duration_secs: start_time.elapsed().as_secs_f64(),
        input_records,
        member_lists: output.member_lists.len(),
        annotations: output.annotations.len(),
        opinions: output.opinions.len(),
        user_opinions,
        edges: output.edges.len(),
        join_records: output.join_records,
        join_skipped: output.join_skipped,
        map_stats: output.map_stats,
        reduce_stats: output.reduce_stats,
        score_stats: output.score_stats,
        errors: output.errors,
        cache_hits,
        cache_misses,
        memory_mb,
    };
    write_json(&dir.join(SUMMARY_FILE), &summary).await?;

    if let Some(bar) = &main_bar {
        bar.inc(1);
        bar.finish_with_message("Done");
    }
    log_pipeline_completion(&run_id, start_time.elapsed(), summary.member_lists, summary.edges);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::ResolverSettings;
    use async_trait::async_trait;
    use base64::{engine::general_purpose, Engine as _};
    use std::time::Duration;
    use tempfile::tempdir;
    use url::Url;

    struct TerminalProbe;

    #[async_trait]
    impl RedirectProbe for TerminalProbe {
        async fn probe(&self, _url: &Url) -> Result<Option<String>, PipelineError> {
            Ok(None)
        }
    }

    fn canonicalizer() -> Arc<UrlCanonicalizer<TerminalProbe>> {
        let settings = ResolverSettings {
            max_hops: 10,
            hop_delay: Duration::ZERO,
            follow_redirects: true,
        };
        Arc::new(UrlCanonicalizer::new(TerminalProbe, settings))
    }

    fn url_post(author: u64, url: &str) -> String {
        format!(
            "{}\t{{\"text\":\"t\",\"entities\":{{\"urls\":[{{\"url\":\"{}\"}}]}}}}",
            author, url
        )
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            map_concurrency: 2,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_url_mode_produces_lists_and_edges() {
        let posts = vec![
            url_post(1, "http://a.example/p"),
            url_post(2, "http://a.example/p"),
            url_post(2, "http://b.example/q"),
            url_post(3, "http://c.example/r"),
        ];
        let output =
            run_with_records(&config(), "test", posts, Vec::new(), canonicalizer(), None).await;
        assert_eq!(output.member_lists.len(), 3);
        assert_eq!(output.join_records, 3);
        assert_eq!(output.score_stats.pairs_scored, 3);
        assert_eq!(output.edges.len(), 3);
        let ab = output
            .edges
            .iter()
            .find(|e| e.key() == "http://a.example/p,http://b.example/q")
            .unwrap();
        assert_eq!(ab.coefficient, 0.5);
        assert!(output.annotations.is_empty());
    }

    #[tokio::test]
    async fn test_join_limit_skips_scoring_but_keeps_lists() {
        let posts = vec![
            url_post(1, "http://a.example/"),
            url_post(2, "http://b.example/"),
            url_post(3, "http://c.example/"),
        ];
        let config = PipelineConfig {
            max_join_records: Some(2),
            ..config()
        };
        let output =
            run_with_records(&config, "test", posts, Vec::new(), canonicalizer(), None).await;
        assert!(output.join_skipped);
        assert!(output.edges.is_empty());
        assert_eq!(output.member_lists.len(), 3);
        assert_eq!(
            output.errors.count(crate::errors::ErrorKind::JoinCapacityExceeded),
            1
        );
    }

    #[tokio::test]
    async fn test_retweet_mode_decodes_edge_keys() {
        let rt = |author: u64, text: &str| {
            format!(
                "{}\t{{\"text\":\"RT\",\"retweeted_status\":{{\"text\":\"{}\"}}}}",
                author, text
            )
        };
        let posts = vec![rt(1, "alpha"), rt(2, "alpha"), rt(2, "beta"), rt(3, "beta")];
        let config = PipelineConfig {
            mode: PipelineMode::RetweetAudience,
            min_retweet_audience: 2,
            decode_keys: true,
            ..config()
        };
        let output =
            run_with_records(&config, "test", posts, Vec::new(), canonicalizer(), None).await;
        assert_eq!(output.member_lists.len(), 2);
        assert_eq!(output.member_lists[0].key, general_purpose::STANDARD.encode("alpha"));
        assert_eq!(output.edges.len(), 1);
        assert_eq!(output.edges[0].to_string(), format!("alpha,beta\t{:?}", 1.0 / 3.0));
    }

    #[tokio::test]
    async fn test_table_enables_annotation_filter_and_opinions() {
        let table = Arc::new(BroadcastTable::from_entries(vec![(1, 1), (2, -1), (9, 1)]));
        let posts = vec![
            url_post(1, "http://a.example/"),
            url_post(2, "http://a.example/"),
            url_post(3, "http://a.example/"),
        ];
        let followees = vec![
            "1\t2,9,404".to_string(),
            "404\t1".to_string(),
            "oops".to_string(),
        ];
        let config = PipelineConfig {
            audience_filter: true,
            ..config()
        };
        let output =
            run_with_records(&config, "test", posts, followees, canonicalizer(), Some(table)).await;
        assert_eq!(output.member_lists[0].members_csv(), "1,2");
        assert_eq!(output.map_stats.authors_filtered, 1);
        assert_eq!(output.annotations[0].to_string(), "http://a.example/\t2\t2\t0");
        assert_eq!(output.opinions.len(), 1);
        assert_eq!(output.opinions[0].to_string(), "1\t1\t2\t0.0");
        assert_eq!(output.errors.total(), 1);
    }

    #[tokio::test]
    async fn test_run_pipeline_writes_outputs() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("posts.tsv");
        std::fs::write(
            &input,
            format!(
                "{}\n{}\nnot a record\n",
                url_post(1, "mailto:someone@example.com"),
                url_post(2, "mailto:someone@example.com")
            ),
        )
        .unwrap();
        let out_dir = dir.path().join("out");
        let config = PipelineConfig {
            input_path: input,
            output_dir: out_dir.clone(),
            ..config()
        };
        let progress = ProgressConfig {
            enabled: false,
            ..ProgressConfig::default()
        };

        let summary = run_pipeline(&config, &progress).await.unwrap();
        assert_eq!(summary.input_records, 3);
        assert_eq!(summary.member_lists, 1);
        assert_eq!(summary.edges, 0);
        assert_eq!(summary.errors.total(), 1);

        let lists = std::fs::read_to_string(out_dir.join(MEMBER_LISTS_FILE)).unwrap();
        assert_eq!(lists, "mailto:someone@example.com\t1,2\n");
        assert!(out_dir.join(EDGES_FILE).exists());
        assert!(out_dir.join(SUMMARY_FILE).exists());
        assert!(!out_dir.join(ANNOTATIONS_FILE).exists());
        assert!(!out_dir.join(USER_OPINIONS_FILE).exists());
    }

    #[tokio::test]
    async fn test_run_pipeline_labels_retweeting_users() {
        let dir = tempdir().unwrap();
        let rt = |author: u64, text: &str| {
            format!(
                "{}\t{{\"text\":\"RT\",\"retweeted_status\":{{\"text\":\"{}\"}}}}",
                author, text
            )
        };
        let input = dir.path().join("retweets.tsv");
        let posts = vec![
            rt(1, "keep it"),
            rt(2, "keep it"),
            rt(1, "scrap it"),
            rt(3, "scrap it"),
            rt(1, "scrap it too"),
            rt(4, "scrap it too"),
        ];
        std::fs::write(&input, posts.join("\n")).unwrap();
        let labels = dir.path().join("labels.tsv");
        std::fs::write(&labels, "keep it\t1\nscrap it\t0\nscrap it too\t0\n").unwrap();

        let out_dir = dir.path().join("out");
        let config = PipelineConfig {
            mode: PipelineMode::RetweetAudience,
            min_retweet_audience: 2,
            decode_keys: true,
            input_path: input,
            output_dir: out_dir.clone(),
            retweet_opinion_path: Some(labels),
            ..config()
        };
        let progress = ProgressConfig {
            enabled: false,
            ..ProgressConfig::default()
        };

        let summary = run_pipeline(&config, &progress).await.unwrap();
        assert_eq!(summary.member_lists, 3);
        assert_eq!(summary.user_opinions, 4);
        let written = std::fs::read_to_string(out_dir.join(USER_OPINIONS_FILE)).unwrap();
        assert_eq!(written, "1\t0\t3\t3\n2\t1\t1\t1\n3\t0\t1\t1\n4\t0\t1\t1\n");
    }
}
