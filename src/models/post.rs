// src/models/post.rs
use serde::Deserialize;

use crate::errors::PipelineError;

/// A URL reference attached to a post by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UrlRef {
    /// The form that appeared in the post, often a platform shortener link.
    #[serde(rename = "url")]
    pub raw: String,
    /// Platform-provided expansion, when the platform supplied one.
    #[serde(rename = "expanded_url", default)]
    pub expanded: Option<String>,
}

impl UrlRef {
    /// Prefer the platform expansion, fall back to the raw shortened form.
    pub fn preferred(&self) -> &str {
        match self.expanded.as_deref() {
            Some(expanded) if !expanded.trim().is_empty() => expanded,
            _ => &self.raw,
        }
    }
}

/// The status a retweet points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetweetedStatus {
    pub id: Option<u64>,
    pub author_id: Option<u64>,
    pub text: String,
}

/// Immutable input record. Built once per ingested line and consumed by the map stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub author_id: u64,
    pub text: String,
    pub urls: Vec<UrlRef>,
    pub retweet_count: u64,
    pub retweeted: Option<RetweetedStatus>,
    pub quoted_status_id: Option<u64>,
}

// Wire shape of a captured status. Only the fields the core reads are declared.
#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    entities: Option<RawEntities>,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    retweeted_status: Option<Box<RawStatus>>,
    #[serde(default)]
    quoted_status_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntities {
    #[serde(default)]
    urls: Vec<UrlRef>,
}

impl Post {
    /// Parses a captured record. `author_key` is the id assigned at capture
    /// time; 0 marks a record whose author could not be read upstream.
    pub fn from_record(author_key: u64, raw_json: &str) -> Result<Self, PipelineError> {
        if author_key == 0 {
            return Err(PipelineError::parse("author id is 0", raw_json));
        }
        let status: RawStatus = serde_json::from_str(raw_json)
            .map_err(|e| PipelineError::parse(format!("invalid status json: {}", e), raw_json))?;

        let retweeted = status.retweeted_status.map(|rt| RetweetedStatus {
            id: rt.id,
            author_id: rt.user.map(|u| u.id),
            text: rt.text,
        });

        Ok(Post {
            author_id: author_key,
            text: status.text,
            urls: status.entities.unwrap_or_default().urls,
            retweet_count: status.retweet_count,
            retweeted,
            quoted_status_id: status.quoted_status_id,
        })
    }

    /// Parses one `<author-id><TAB><raw-json>` input line.
    pub fn from_line(line: &str) -> Result<Self, PipelineError> {
        let (key, json) = line
            .split_once('\t')
            .ok_or_else(|| PipelineError::parse("missing tab separator", line))?;
        let author_key = key
            .trim()
            .parse::<u64>()
            .map_err(|e| PipelineError::parse(format!("invalid author id: {}", e), line))?;
        Self::from_record(author_key, json)
    }

    pub fn is_retweet(&self) -> bool {
        self.retweeted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"id":10,"text":"read this","user":{"id":42},
        "entities":{"urls":[{"url":"http://t.co/abc","expanded_url":"http://bit.ly/A"},
                            {"url":"http://t.co/def","expanded_url":null}]},
        "retweet_count":3}"#;

    #[test]
    fn test_parse_status_with_urls() {
        let post = Post::from_record(42, SAMPLE).unwrap();
        assert_eq!(post.author_id, 42);
        assert_eq!(post.urls.len(), 2);
        assert_eq!(post.urls[0].preferred(), "http://bit.ly/A");
        assert_eq!(post.urls[1].preferred(), "http://t.co/def");
        assert_eq!(post.retweet_count, 3);
        assert!(!post.is_retweet());
    }

    #[test]
    fn test_zero_author_is_parse_failure() {
        let err = Post::from_record(0, SAMPLE).unwrap_err();
        assert!(matches!(err, PipelineError::ParseFailure { .. }));
    }

    #[test]
    fn test_invalid_json_is_parse_failure() {
        let err = Post::from_record(7, "{not json").unwrap_err();
        assert!(matches!(err, PipelineError::ParseFailure { .. }));
    }

    #[test]
    fn test_retweet_linkage() {
        let raw = r#"{"text":"RT @a: hello","user":{"id":9},
            "retweeted_status":{"id":1,"text":"hello","user":{"id":8}}}"#;
        let post = Post::from_record(9, raw).unwrap();
        let rt = post.retweeted.as_ref().unwrap();
        assert_eq!(rt.text, "hello");
        assert_eq!(rt.author_id, Some(8));
        assert!(post.urls.is_empty());
    }

    #[test]
    fn test_from_line() {
        let post = Post::from_line("5\t{\"text\":\"x\"}").unwrap();
        assert_eq!(post.author_id, 5);
        assert!(Post::from_line("no tab here").is_err());
        assert!(Post::from_line("abc\t{}").is_err());
    }

    #[test]
    fn test_blank_expansion_falls_back_to_raw() {
        let url = UrlRef {
            raw: "http://t.co/x".to_string(),
            expanded: Some("  ".to_string()),
        };
        assert_eq!(url.preferred(), "http://t.co/x");
    }
}
