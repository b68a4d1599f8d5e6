// src/utils/config.rs
use log::{info, warn};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::canonical::ResolverSettings;
use crate::similarity::{JaccardScorer, KeyDecoding};
use crate::utils::constants::{
    CONSERVATIVE_MAX_HOPS, DEFAULT_CACHE_SIZE, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HOP_DELAY_MS,
    DEFAULT_MIN_JACCARD, DEFAULT_MIN_MENTIONS, DEFAULT_MIN_RETWEET_AUDIENCE,
};

/// Which audience graph a run builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Canonical URL → users who posted it.
    UrlMentions,
    /// Retweeted text → users who retweeted it.
    RetweetAudience,
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url_mentions" | "urls" => Ok(PipelineMode::UrlMentions),
            "retweet_audience" | "retweets" => Ok(PipelineMode::RetweetAudience),
            other => Err(format!("unknown pipeline mode '{}'", other)),
        }
    }
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineMode::UrlMentions => "url_mentions",
            PipelineMode::RetweetAudience => "retweet_audience",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: PipelineMode,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub min_mentions: usize,
    pub min_retweet_audience: usize,
    pub min_jaccard: f64,
    pub max_redirect_hops: usize,
    pub resolve_redirects: bool,
    pub hop_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub map_concurrency: usize,
    pub resolution_cache_size: usize,
    /// `None` leaves the all-pairs join unbounded.
    pub max_join_records: Option<usize>,
    pub broadcast_table_path: Option<PathBuf>,
    /// Restrict contributing authors to those present in the broadcast table.
    pub audience_filter: bool,
    /// `<user-id><TAB><followee-csv>` lines for neighbourhood opinions.
    pub followees_path: Option<PathBuf>,
    /// `<retweet-text><TAB><opinion>` labels; retweet mode only.
    pub retweet_opinion_path: Option<PathBuf>,
    pub decode_keys: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl PipelineConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any name → value source. Unparseable
    /// values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |name: &str, default: &str| -> String {
            lookup(name).unwrap_or_else(|| default.to_string())
        };

        let mode = match parsed("PIPELINE_MODE", "url_mentions").parse::<PipelineMode>() {
            Ok(mode) => mode,
            Err(e) => {
                warn!("{}; falling back to url_mentions", e);
                PipelineMode::UrlMentions
            }
        };

        Self {
            mode,
            input_path: PathBuf::from(parsed("INPUT_PATH", "posts.tsv")),
            output_dir: PathBuf::from(parsed("OUTPUT_DIR", "output")),
            min_mentions: parsed("MIN_MENTIONS", "1")
                .parse()
                .unwrap_or(DEFAULT_MIN_MENTIONS),
            min_retweet_audience: parsed("MIN_RETWEET_AUDIENCE", "10")
                .parse()
                .unwrap_or(DEFAULT_MIN_RETWEET_AUDIENCE),
            min_jaccard: parsed("MIN_JACCARD", "0.0")
                .parse()
                .unwrap_or(DEFAULT_MIN_JACCARD),
            max_redirect_hops: parsed("MAX_REDIRECT_HOPS", "10")
                .parse()
                .unwrap_or(CONSERVATIVE_MAX_HOPS),
            resolve_redirects: parsed("RESOLVE_REDIRECTS", "true")
                .parse()
                .unwrap_or(true),
            hop_delay_ms: parsed("HOP_DELAY_MS", "50")
                .parse()
                .unwrap_or(DEFAULT_HOP_DELAY_MS),
            connect_timeout_secs: parsed("CONNECT_TIMEOUT_SECS", "10")
                .parse()
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            map_concurrency: lookup("MAP_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or_else(|| num_cpus::get() * 4),
            resolution_cache_size: parsed("RESOLUTION_CACHE_SIZE", "20000")
                .parse()
                .unwrap_or(DEFAULT_CACHE_SIZE),
            max_join_records: lookup("MAX_JOIN_RECORDS").and_then(|v| v.parse().ok()),
            broadcast_table_path: lookup("BROADCAST_TABLE_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            audience_filter: parsed("AUDIENCE_FILTER", "false")
                .parse()
                .unwrap_or(false),
            followees_path: lookup("FOLLOWEES_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            retweet_opinion_path: lookup("RETWEET_OPINION_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            decode_keys: lookup("DECODE_KEYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(mode == PipelineMode::RetweetAudience),
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            max_hops: self.max_redirect_hops,
            hop_delay: Duration::from_millis(self.hop_delay_ms),
            follow_redirects: self.resolve_redirects,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn scorer(&self) -> JaccardScorer {
        let decoding = if self.decode_keys {
            KeyDecoding::Base64
        } else {
            KeyDecoding::Plain
        };
        JaccardScorer::new(self.min_jaccard).with_key_decoding(decoding)
    }

    pub fn log_config(&self) {
        info!("⚙️  Pipeline configuration:");
        info!("   • Mode: {}", self.mode.as_str());
        info!("   • Input: {}", self.input_path.display());
        info!("   • Output directory: {}", self.output_dir.display());
        match self.mode {
            PipelineMode::UrlMentions => {
                info!("   • Minimum mentions per URL: {}", self.min_mentions);
                if self.resolve_redirects {
                    info!(
                        "   • Redirect resolution ENABLED: max {} hops, {}ms between hops, {}s connect timeout",
                        self.max_redirect_hops, self.hop_delay_ms, self.connect_timeout_secs
                    );
                    info!("   • Resolution cache: {} entries", self.resolution_cache_size);
                } else {
                    info!("   • Redirect resolution DISABLED - trimming only");
                }
            }
            PipelineMode::RetweetAudience => {
                info!("   • Minimum retweet audience: {}", self.min_retweet_audience);
                if let Some(path) = &self.retweet_opinion_path {
                    info!("   • Retweet opinion labels: {}", path.display());
                }
            }
        }
        info!("   • Minimum Jaccard coefficient: {:?}", self.min_jaccard);
        info!("   • Map concurrency: {}", self.map_concurrency);
        match self.max_join_records {
            Some(limit) => info!("   • All-pairs join limit: {} records", limit),
            None => info!("   • All-pairs join limit: unbounded"),
        }
        match &self.broadcast_table_path {
            Some(path) => info!("   • Broadcast table: {}", path.display()),
            None => info!("   • Broadcast table: none (no audience filter, no annotation)"),
        }
        if self.audience_filter {
            info!("   • Audience filter ENABLED - only authors in the broadcast table contribute");
        }
        if let Some(path) = &self.followees_path {
            info!("   • Followee lists: {}", path.display());
        }
        info!("   • Decode keys after scoring: {}", self.decode_keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> PipelineConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.mode, PipelineMode::UrlMentions);
        assert_eq!(config.min_mentions, 1);
        assert_eq!(config.min_retweet_audience, 10);
        assert_eq!(config.min_jaccard, 0.0);
        assert_eq!(config.max_redirect_hops, 10);
        assert!(config.resolve_redirects);
        assert_eq!(config.hop_delay_ms, 50);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.resolution_cache_size, 20_000);
        assert!(config.map_concurrency > 0);
        assert!(config.max_join_records.is_none());
        assert!(config.broadcast_table_path.is_none());
        assert!(!config.audience_filter);
        assert!(config.followees_path.is_none());
        assert!(config.retweet_opinion_path.is_none());
        assert!(!config.decode_keys);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = config_from(&[
            ("PIPELINE_MODE", "retweet_audience"),
            ("MIN_JACCARD", "0.25"),
            ("MAX_REDIRECT_HOPS", "not-a-number"),
            ("MAX_JOIN_RECORDS", "500"),
            ("BROADCAST_TABLE_PATH", "/tmp/opinions.tsv"),
            ("MAP_CONCURRENCY", "0"),
            ("RETWEET_OPINION_PATH", "/tmp/rt_labels.tsv"),
        ]);
        assert_eq!(config.mode, PipelineMode::RetweetAudience);
        assert_eq!(config.min_jaccard, 0.25);
        assert_eq!(config.max_redirect_hops, 10);
        assert_eq!(config.max_join_records, Some(500));
        assert_eq!(
            config.broadcast_table_path,
            Some(PathBuf::from("/tmp/opinions.tsv"))
        );
        assert!(config.map_concurrency > 0);
        assert_eq!(
            config.retweet_opinion_path,
            Some(PathBuf::from("/tmp/rt_labels.tsv"))
        );
        assert!(config.decode_keys);
    }

    #[test]
    fn test_unknown_mode_falls_back() {
        let config = config_from(&[("PIPELINE_MODE", "hashtags")]);
        assert_eq!(config.mode, PipelineMode::UrlMentions);
    }

    #[test]
    fn test_resolver_settings_follow_config() {
        let config = config_from(&[("RESOLVE_REDIRECTS", "false"), ("HOP_DELAY_MS", "0")]);
        let settings = config.resolver_settings();
        assert!(!settings.follow_redirects);
        assert!(settings.hop_delay.is_zero());
    }
}
