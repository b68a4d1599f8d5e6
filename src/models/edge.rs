// src/models/edge.rs
use serde::Serialize;
use std::fmt;

/// Unordered pair of distinct entity keys with their Jaccard coefficient in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityEdge {
    pub left: String,
    pub right: String,
    pub coefficient: f64,
}

impl SimilarityEdge {
    /// Output key `<id1>,<id2>`.
    pub fn key(&self) -> String {
        format!("{},{}", self.left, self.right)
    }
}

impl fmt::Display for SimilarityEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{:?}", self.key(), self.coefficient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_record_format() {
        let edge = SimilarityEdge {
            left: "http://example.com/x?id=5".to_string(),
            right: "http://example.com/y".to_string(),
            coefficient: 0.0,
        };
        assert_eq!(
            edge.to_string(),
            "http://example.com/x?id=5,http://example.com/y\t0.0"
        );

        let half = SimilarityEdge {
            left: "a".to_string(),
            right: "b".to_string(),
            coefficient: 0.5,
        };
        assert_eq!(half.to_string(), "a,b\t0.5");
    }
}
