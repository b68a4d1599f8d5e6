// src/models/member_list.rs
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::errors::PipelineError;

/// An entity key (canonical URL, encoded retweet text, ...) and the distinct
/// users associated with it. Members are kept sorted so rendering is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberList {
    pub key: String,
    pub members: BTreeSet<u64>,
}

impl MemberList {
    pub fn new(key: impl Into<String>, members: impl IntoIterator<Item = u64>) -> Self {
        Self {
            key: key.into(),
            members: members.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Comma-separated member ids, ascending.
    pub fn members_csv(&self) -> String {
        join_ids(&self.members)
    }

    /// `<key>,<id>,<id>...` as used inside joined-pair records.
    pub fn to_flat(&self) -> String {
        if self.members.is_empty() {
            self.key.clone()
        } else {
            format!("{},{}", self.key, self.members_csv())
        }
    }

    /// Parses `<key><TAB><id>,<id>...`, the intermediate mention record.
    pub fn parse_record(line: &str) -> Result<Self, PipelineError> {
        let (key, csv) = line
            .split_once('\t')
            .ok_or_else(|| PipelineError::parse("missing tab separator", line))?;
        let members = parse_ids(csv).map_err(|reason| PipelineError::parse(reason, line))?;
        Ok(Self {
            key: key.to_string(),
            members,
        })
    }

    /// Parses `<key>,<id>,<id>...`. The first comma field is the key.
    pub fn parse_flat(flat: &str) -> Result<Self, PipelineError> {
        let (key, csv) = match flat.split_once(',') {
            Some((key, csv)) => (key, csv),
            None => (flat, ""),
        };
        if key.is_empty() {
            return Err(PipelineError::parse("empty key", flat));
        }
        let members = parse_ids(csv).map_err(|reason| PipelineError::parse(reason, flat))?;
        Ok(Self {
            key: key.to_string(),
            members,
        })
    }
}

impl fmt::Display for MemberList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.key, self.members_csv())
    }
}

/// Renders the joined-pair text record `<key1>,<ids>\t<key2>,<ids>`.
pub fn format_joined_record(left: &MemberList, right: &MemberList) -> String {
    format!("{}\t{}", left.to_flat(), right.to_flat())
}

/// Parses a joined-pair text record. Any whitespace separates the two halves.
pub fn parse_joined_record(line: &str) -> Result<(MemberList, MemberList), PipelineError> {
    let mut halves = line.split_whitespace();
    let (left, right) = match (halves.next(), halves.next(), halves.next()) {
        (Some(left), Some(right), None) => (left, right),
        _ => return Err(PipelineError::parse("expected exactly two halves", line)),
    };
    Ok((MemberList::parse_flat(left)?, MemberList::parse_flat(right)?))
}

fn join_ids(ids: &BTreeSet<u64>) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_ids(csv: &str) -> Result<BTreeSet<u64>, String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|e| format!("invalid member id '{}': {}", s, e))
        })
        .collect()
}

/// Canonical key → distinct referrers, accumulated across a batch partition.
#[derive(Debug, Default, Clone)]
pub struct MentionSet {
    entries: BTreeMap<String, BTreeSet<u64>>,
}

impl MentionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, user_id: u64) {
        self.entries.entry(key.into()).or_default().insert(user_id);
    }

    pub fn extend(&mut self, key: impl Into<String>, user_ids: impl IntoIterator<Item = u64>) {
        self.entries.entry(key.into()).or_default().extend(user_ids);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&BTreeSet<u64>> {
        self.entries.get(key)
    }

    /// Consumes the set into member lists ordered by key.
    pub fn into_member_lists(self) -> Vec<MemberList> {
        self.entries
            .into_iter()
            .map(|(key, members)| MemberList { key, members })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rendering_is_sorted() {
        let list = MemberList::new("http://example.com/x", vec![3, 1, 2, 1]);
        assert_eq!(list.to_string(), "http://example.com/x\t1,2,3");
        assert_eq!(list.to_flat(), "http://example.com/x,1,2,3");
    }

    #[test]
    fn test_parse_record() {
        let list = MemberList::parse_record("http://example.com/y\t3,1").unwrap();
        assert_eq!(list.key, "http://example.com/y");
        assert_eq!(list.members.into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert!(MemberList::parse_record("http://example.com/y\t3,abc").is_err());
        assert!(MemberList::parse_record("no-tab").is_err());
    }

    #[test]
    fn test_joined_record_format() {
        let a = MemberList::new("a", vec![1, 2]);
        let b = MemberList::new("b", vec![2]);
        let line = format_joined_record(&a, &b);
        assert_eq!(line, "a,1,2\tb,2");
        let (left, right) = parse_joined_record(&line).unwrap();
        assert_eq!(left, a);
        assert_eq!(right, b);
    }

    #[test]
    fn test_joined_record_rejects_single_half() {
        assert!(parse_joined_record("a,1,2").is_err());
        assert!(parse_joined_record("a,1 b,2 c,3").is_err());
    }

    #[test]
    fn test_flat_with_no_members() {
        let list = MemberList::parse_flat("lonely").unwrap();
        assert!(list.is_empty());
        assert_eq!(list.to_flat(), "lonely");
        assert!(MemberList::parse_flat(",1,2").is_err());
    }

    #[test]
    fn test_mention_set_deduplicates() {
        let mut set = MentionSet::new();
        set.insert("u", 2);
        set.insert("u", 1);
        set.insert("u", 2);
        set.extend("v", vec![5, 5]);
        assert_eq!(set.len(), 2);
        let lists = set.into_member_lists();
        assert_eq!(lists[0].members_csv(), "1,2");
        assert_eq!(lists[1].members_csv(), "5");
    }
}
