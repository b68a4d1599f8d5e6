// src/broadcast/annotate.rs
//
// Map-side joins against a broadcast table. The table is looked up in place
// instead of being shuffled against the records.

use log::warn;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::broadcast::table::BroadcastTable;
use crate::models::MemberList;

/// A member list with the table attribute of each member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberAnnotation {
    pub key: String,
    pub attributes: Vec<(u64, i64)>,
    /// Members actually present in the table.
    pub present: usize,
}

impl MemberAnnotation {
    pub fn total(&self) -> i64 {
        self.attributes.iter().map(|(_, value)| value).sum()
    }
}

impl fmt::Display for MemberAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.key,
            self.attributes.len(),
            self.present,
            self.total()
        )
    }
}

/// Opinion of a user next to the mean opinion of the followees the table knows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborhoodOpinion {
    pub user_id: u64,
    pub opinion: i64,
    pub known_followees: usize,
    pub mean_followee_opinion: f64,
}

impl fmt::Display for NeighborhoodOpinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{:?}",
            self.user_id, self.opinion, self.known_followees, self.mean_followee_opinion
        )
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastAnnotator {
    table: Arc<BroadcastTable>,
}

impl BroadcastAnnotator {
    pub fn new(table: Arc<BroadcastTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &BroadcastTable {
        &self.table
    }

    pub fn annotate_members(&self, list: &MemberList) -> MemberAnnotation {
        let mut present = 0;
        let attributes = list
            .members
            .iter()
            .map(|&member| {
                if self.table.contains(member) {
                    present += 1;
                }
                (member, self.table.lookup(member))
            })
            .collect();
        MemberAnnotation {
            key: list.key.clone(),
            attributes,
            present,
        }
    }

    /// `None` when the user is not in the table. Unparseable followee ids are
    /// logged and skipped.
    pub fn neighborhood_opinion(&self, user_id: u64, followees_csv: &str) -> Option<NeighborhoodOpinion> {
        let opinion = self.table.get(user_id)?;

        let mut known = 0usize;
        let mut sum = 0i64;
        for raw in followees_csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match raw.parse::<u64>() {
                Ok(followee) => {
                    if let Some(value) = self.table.get(followee) {
                        known += 1;
                        sum += value;
                    }
                }
                Err(e) => warn!("Skipping followee id {:?} of user {}: {}", raw, user_id, e),
            }
        }

        let mean_followee_opinion = if known > 0 {
            sum as f64 / known as f64
        } else {
            0.0
        };
        Some(NeighborhoodOpinion {
            user_id,
            opinion,
            known_followees: known,
            mean_followee_opinion,
        })
    }
}
