// src/broadcast/text_opinion.rs
//
// Opinion labels keyed by retweeted text. Users inherit the majority label of
// the retweets they made.

use base64::{engine::general_purpose, Engine as _};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::errors::PipelineError;
use crate::models::MemberList;
use crate::similarity::jaccard::flatten_decoded;

/// `<retweet-text><TAB><integer-opinion>` per line, held fully in memory.
#[derive(Debug, Clone, Default)]
pub struct TextOpinionTable {
    entries: HashMap<String, i64>,
    skipped_lines: usize,
}

/// Majority opinion of one user over the labelled retweets they made.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserOpinion {
    pub user_id: u64,
    pub opinion: i64,
    /// Retweets whose text has a label.
    pub labelled: usize,
    pub retweets: usize,
}

impl fmt::Display for UserOpinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.user_id, self.opinion, self.labelled, self.retweets
        )
    }
}

impl TextOpinionTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| PipelineError::BroadcastLoad {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_reader(BufReader::new(file)).map_err(|e| match e {
            PipelineError::Io(source) => PipelineError::BroadcastLoad {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;
        info!(
            "Loaded retweet opinion table from {}: {} texts ({} lines skipped)",
            path.display(),
            table.len(),
            table.skipped_lines
        );
        Ok(table)
    }

    /// The opinion is the last tab field, so texts may hold tabs themselves.
    /// Later lines win for a repeated text.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, PipelineError> {
        let mut table = Self::default();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = line
                .rsplit_once('\t')
                .and_then(|(text, value)| Some((text, value.trim().parse::<i64>().ok()?)));
            match parsed {
                Some((text, value)) => {
                    table.entries.insert(text.to_string(), value);
                }
                None => {
                    table.skipped_lines += 1;
                    warn!("Skipping malformed opinion line {}: {:?}", line_no + 1, line);
                }
            }
        }
        debug!("Retweet opinion table built with {} texts", table.entries.len());
        Ok(table)
    }

    pub fn from_entries<S: Into<String>>(entries: impl IntoIterator<Item = (S, i64)>) -> Self {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            skipped_lines: 0,
        }
    }

    /// Label for a decoded text. Tables written from edge keys hold the
    /// flattened form, so that is tried second.
    pub fn get(&self, text: &str) -> Option<i64> {
        self.entries
            .get(text)
            .or_else(|| self.entries.get(&flatten_decoded(text)))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Label of a base64 retweet key. Undecodable keys have none.
    pub fn label_for_key(&self, key: &str) -> Option<i64> {
        let bytes = general_purpose::STANDARD.decode(key).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        self.get(&text)
    }

    /// Inverts retweet audiences into per-user retweet lists and gives every
    /// user the most frequent label among them. Users with no labelled
    /// retweet, or with a tie for the top label, get no opinion.
    pub fn user_opinions(&self, lists: &[MemberList]) -> Vec<UserOpinion> {
        let mut per_user: BTreeMap<u64, (usize, HashMap<i64, usize>)> = BTreeMap::new();
        for list in lists {
            let label = self.label_for_key(&list.key);
            for &user_id in &list.members {
                let (retweets, tally) = per_user.entry(user_id).or_default();
                *retweets += 1;
                if let Some(value) = label {
                    *tally.entry(value).or_default() += 1;
                }
            }
        }

        per_user
            .into_iter()
            .filter_map(|(user_id, (retweets, tally))| {
                let opinion = majority(&tally)?;
                Some(UserOpinion {
                    user_id,
                    opinion,
                    labelled: tally.values().sum(),
                    retweets,
                })
            })
            .collect()
    }
}

/// Strictly most frequent label.
fn majority(tally: &HashMap<i64, usize>) -> Option<i64> {
    let top = *tally.values().max()?;
    let mut leaders = tally.iter().filter(|(_, count)| **count == top);
    let (&value, _) = leaders.next()?;
    if leaders.next().is_some() {
        return None;
    }
    Some(value)
}
