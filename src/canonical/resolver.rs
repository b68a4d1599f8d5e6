// src/canonical/resolver.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::canonical::cache::SharedCanonicalCache;
use crate::canonical::trim::{parse_http_url, trim_with, NumericParamPolicy, QueryRetention};
use crate::errors::PipelineError;
use crate::utils::constants::{
    CONSERVATIVE_MAX_HOPS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HOP_DELAY_MS, DIAGNOSTIC_MAX_HOPS,
};

/// One redirect-suppressed request. Returns the raw `Location` header, if any.
#[async_trait]
pub trait RedirectProbe: Send + Sync {
    async fn probe(&self, url: &Url) -> Result<Option<String>, PipelineError>;
}

/// HEAD requests over reqwest with automatic redirects disabled.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .timeout(connect_timeout * 2)
            .build()
            .context("Failed to build HTTP client for redirect probing")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RedirectProbe for HttpProbe {
    async fn probe(&self, url: &Url) -> Result<Option<String>, PipelineError> {
        let response = self
            .client
            .head(url.as_str())
            .send()
            .await
            .map_err(|e| PipelineError::NetworkFailure {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()))
    }
}

/// Terminal state of a redirect resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Destination reached: the last hop carried no `Location`.
    Resolved { url: String, hops: usize },
    /// Hop limit reached. The chain's endpoint is unproven, so the original input is kept.
    LoopDetected { original: String, hops: usize },
    /// A hop failed on the network; `last_url` is the last URL that answered.
    Unreachable {
        last_url: String,
        hops: usize,
        reason: String,
    },
}

impl Resolution {
    /// The URL callers should use as the resolution result.
    pub fn url(&self) -> &str {
        match self {
            Resolution::Resolved { url, .. } => url,
            Resolution::LoopDetected { original, .. } => original,
            Resolution::Unreachable { last_url, .. } => last_url,
        }
    }

    pub fn hop_count(&self) -> usize {
        match self {
            Resolution::Resolved { hops, .. }
            | Resolution::LoopDetected { hops, .. }
            | Resolution::Unreachable { hops, .. } => *hops,
        }
    }

    pub fn loop_detected(&self) -> bool {
        matches!(self, Resolution::LoopDetected { .. })
    }

    /// `(final_url, hop_count, loop_detected)`.
    pub fn into_parts(self) -> (String, usize, bool) {
        let hops = self.hop_count();
        let looped = self.loop_detected();
        let url = match self {
            Resolution::Resolved { url, .. } => url,
            Resolution::LoopDetected { original, .. } => original,
            Resolution::Unreachable { last_url, .. } => last_url,
        };
        (url, hops, looped)
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub max_hops: usize,
    /// Pause between consecutive hops of one chain, bounding outbound request rate.
    pub hop_delay: Duration,
    /// When false, canonicalization only trims.
    pub follow_redirects: bool,
}

impl ResolverSettings {
    /// Hop limit 10, used on the batch path.
    pub fn conservative() -> Self {
        Self {
            max_hops: CONSERVATIVE_MAX_HOPS,
            hop_delay: Duration::from_millis(DEFAULT_HOP_DELAY_MS),
            follow_redirects: true,
        }
    }

    /// Hop limit 20, for manual inspection of long chains.
    pub fn diagnostic() -> Self {
        Self {
            max_hops: DIAGNOSTIC_MAX_HOPS,
            ..Self::conservative()
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::conservative()
    }
}

/// How a canonical value was obtained. Used for stage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalState {
    Trimmed,
    Resolved,
    LoopDetected,
    Unreachable,
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalOutcome {
    pub canonical: String,
    pub state: CanonicalState,
    pub hops: usize,
}

pub struct UrlCanonicalizer<P: RedirectProbe = HttpProbe> {
    probe: P,
    settings: ResolverSettings,
    policy: Arc<dyn QueryRetention>,
    cache: Option<SharedCanonicalCache>,
}

impl UrlCanonicalizer<HttpProbe> {
    /// Canonicalizer backed by real HTTP probing.
    pub fn with_http(settings: ResolverSettings, connect_timeout: Duration) -> Result<Self> {
        Ok(Self::new(HttpProbe::new(connect_timeout)?, settings))
    }

    pub fn default_http() -> Result<Self> {
        Self::with_http(
            ResolverSettings::conservative(),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }
}

impl<P: RedirectProbe> UrlCanonicalizer<P> {
    pub fn new(probe: P, settings: ResolverSettings) -> Self {
        Self {
            probe,
            settings,
            policy: Arc::new(NumericParamPolicy),
            cache: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn QueryRetention>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cache(mut self, cache: SharedCanonicalCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn trim(&self, url: &str) -> String {
        trim_with(url, self.policy.as_ref())
    }

    /// Follows the redirect chain starting at the trimmed input.
    ///
    /// Fails fast with `MalformedUrl` when the input cannot be probed. Network
    /// failures are not errors: they end the chain as `Unreachable`.
    pub async fn resolve(&self, url: &str) -> Result<Resolution, PipelineError> {
        let max_hops = self.settings.max_hops;
        let start = self.trim(url);
        let mut current = parse_http_url(&start)?;
        let mut last_reached: Option<Url> = None;
        let mut hops = 0usize;

        loop {
            if hops > 0 && !self.settings.hop_delay.is_zero() {
                tokio::time::sleep(self.settings.hop_delay).await;
            }

            let probed = self.probe.probe(&current).await;
            hops += 1;

            let location = match probed {
                Ok(location) => location,
                Err(e) => {
                    let last_url = last_reached
                        .as_ref()
                        .map(Url::to_string)
                        .unwrap_or_else(|| start.clone());
                    warn!(
                        "Redirect chain for '{}' stopped at hop {}: {}",
                        url, hops, e
                    );
                    return Ok(Resolution::Unreachable {
                        last_url,
                        hops,
                        reason: e.to_string(),
                    });
                }
            };

            if hops >= max_hops {
                debug!(
                    "Redirect chain for '{}' reached the hop limit ({}); keeping the original",
                    url, max_hops
                );
                return Ok(Resolution::LoopDetected {
                    original: url.to_string(),
                    hops,
                });
            }

            let Some(location) = location else {
                return Ok(Resolution::Resolved {
                    url: current.to_string(),
                    hops,
                });
            };

            let next = current
                .join(&location)
                .map_err(|e| e.to_string())
                .and_then(|mut next| match next.scheme() {
                    "http" | "https" => {
                        // Fragments never reach the server.
                        next.set_fragment(None);
                        Ok(next)
                    }
                    other => Err(format!("unsupported scheme '{}'", other)),
                });
            match next {
                Ok(next) => {
                    debug!("Hop {}: {} -> {}", hops, current, next);
                    last_reached = Some(std::mem::replace(&mut current, next));
                }
                Err(reason) => {
                    warn!(
                        "Unusable Location '{}' returned by '{}': {}",
                        location, current, reason
                    );
                    return Ok(Resolution::Unreachable {
                        last_url: current.to_string(),
                        hops,
                        reason,
                    });
                }
            }
        }
    }

    /// `trim(resolve(trim(url)))`, with the unmodified input kept for malformed URLs.
    pub async fn canonicalize(&self, url: &str) -> CanonicalOutcome {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().await.get(url) {
                return hit;
            }
        }

        let outcome = if !self.settings.follow_redirects {
            CanonicalOutcome {
                canonical: self.trim(url),
                state: CanonicalState::Trimmed,
                hops: 0,
            }
        } else {
            match self.resolve(url).await {
                Ok(resolution) => {
                    let state = match &resolution {
                        Resolution::Resolved { .. } => CanonicalState::Resolved,
                        Resolution::LoopDetected { .. } => CanonicalState::LoopDetected,
                        Resolution::Unreachable { .. } => CanonicalState::Unreachable,
                    };
                    CanonicalOutcome {
                        canonical: self.trim(resolution.url()),
                        state,
                        hops: resolution.hop_count(),
                    }
                }
                Err(e) => {
                    debug!("Keeping unmodified input: {}", e);
                    CanonicalOutcome {
                        canonical: url.to_string(),
                        state: CanonicalState::Malformed,
                        hops: 0,
                    }
                }
            }
        };

        if outcome.state != CanonicalState::Unreachable {
            if let Some(cache) = &self.cache {
                cache.lock().await.put(url, outcome.clone());
            }
        }
        outcome
    }
}
