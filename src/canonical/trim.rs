// src/canonical/trim.rs
//
// Strips the non-semantic parts of a URL: the fragment always, the query
// string unless the retention policy says it identifies the resource.

use url::Url;

use crate::errors::PipelineError;

/// Decides whether a URL's query string survives trimming.
pub trait QueryRetention: Send + Sync {
    fn retain_query(&self, url: &Url) -> bool;
}

/// Keeps the query when at least one parameter value is purely numeric
/// (`?id=5`, `?p=123`), which usually marks a permalink-style id.
/// Known to misfire on tracking params like `?utm_id=42` and on slug ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericParamPolicy;

impl QueryRetention for NumericParamPolicy {
    fn retain_query(&self, url: &Url) -> bool {
        url.query_pairs()
            .any(|(_, value)| !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DropAllQueries;

impl QueryRetention for DropAllQueries {
    fn retain_query(&self, _url: &Url) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAllQueries;

impl QueryRetention for KeepAllQueries {
    fn retain_query(&self, _url: &Url) -> bool {
        true
    }
}

/// Trims with the default [`NumericParamPolicy`].
pub fn trim(url: &str) -> String {
    trim_with(url, &NumericParamPolicy)
}

/// Pure and total: an unparseable input is returned unchanged.
pub fn trim_with(url: &str, policy: &dyn QueryRetention) -> String {
    let mut parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return url.to_string(),
    };
    parsed.set_fragment(None);
    if parsed.query().is_some() && !policy.retain_query(&parsed) {
        parsed.set_query(None);
    }
    parsed.to_string()
}

/// Parses a URL the redirect resolver can actually probe.
pub fn parse_http_url(url: &str) -> Result<Url, PipelineError> {
    let parsed = Url::parse(url).map_err(|e| PipelineError::malformed(url, e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(PipelineError::malformed(
                url,
                format!("unsupported scheme '{}'", other),
            ))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(PipelineError::malformed(url, "missing host"));
    }
    Ok(parsed)
}
