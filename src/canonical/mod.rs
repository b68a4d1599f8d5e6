// src/canonical/mod.rs
pub mod cache;
pub mod resolver;
pub mod trim;

// Re-export main canonicalization API
pub use cache::{create_shared_cache, CanonicalCache, SharedCanonicalCache};
pub use resolver::{
    CanonicalOutcome, CanonicalState, HttpProbe, RedirectProbe, Resolution, ResolverSettings,
    UrlCanonicalizer,
};
pub use trim::{
    parse_http_url, trim, trim_with, DropAllQueries, KeepAllQueries, NumericParamPolicy,
    QueryRetention,
};
