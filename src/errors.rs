//! Error taxonomy for the mention-graph core.
//!
//! Every variant describes a per-record failure. Stages isolate them: the
//! offending record is logged and omitted, the batch keeps going.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input record could not be parsed (bad JSON, missing author, bad id list).
    #[error("parse failure: {reason} (raw: {raw})")]
    ParseFailure { reason: String, raw: String },

    /// URL string could not be parsed or uses an unsupported scheme.
    #[error("malformed url '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    /// Timeout, DNS failure or refused connection while probing a hop.
    #[error("network failure at '{url}': {reason}")]
    NetworkFailure { url: String, reason: String },

    /// Hop limit reached before the chain converged.
    #[error("redirect loop: '{url}' exceeded {max_hops} hops")]
    RedirectLoop { url: String, max_hops: usize },

    /// Both member sets empty; the similarity edge is suppressed.
    #[error("empty union for pair ({left}, {right})")]
    EmptyUnion { left: String, right: String },

    /// Broadcast side file could not be opened or read.
    #[error("failed to load broadcast table from '{path}': {source}")]
    BroadcastLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// All-pairs join refused to materialize more records than its bound.
    #[error("all-pairs join capacity exceeded: {records} records > limit {limit}")]
    JoinCapacityExceeded { records: usize, limit: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn parse(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        PipelineError::ParseFailure {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::MalformedUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Short label used as the key in error ledgers and log prefixes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ParseFailure { .. } => ErrorKind::ParseFailure,
            PipelineError::MalformedUrl { .. } => ErrorKind::MalformedUrl,
            PipelineError::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            PipelineError::RedirectLoop { .. } => ErrorKind::RedirectLoop,
            PipelineError::EmptyUnion { .. } => ErrorKind::EmptyUnion,
            PipelineError::BroadcastLoad { .. } => ErrorKind::BroadcastLoad,
            PipelineError::JoinCapacityExceeded { .. } => ErrorKind::JoinCapacityExceeded,
            PipelineError::Io(_) => ErrorKind::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum ErrorKind {
    ParseFailure,
    MalformedUrl,
    NetworkFailure,
    RedirectLoop,
    EmptyUnion,
    BroadcastLoad,
    JoinCapacityExceeded,
    Io,
}
