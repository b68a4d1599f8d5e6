// src/broadcast/table.rs
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::errors::PipelineError;

/// Value returned for keys the table does not hold.
pub const ABSENT_VALUE: i64 = 0;

/// Small reference table (`<numeric-id><TAB><integer-value>` per line) held
/// fully in memory. Built once per worker and never mutated afterwards, so
/// parallel map tasks can share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct BroadcastTable {
    entries: HashMap<u64, i64>,
    skipped_lines: usize,
}

impl BroadcastTable {
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
            "Loaded broadcast table from {}: {} entries ({} lines skipped)",
            path.display(),
            table.len(),
            table.skipped_lines
        );
        Ok(table)
    }

    /// Later lines overwrite earlier ones for the same key. Lines that do not
    /// parse are skipped and counted.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, PipelineError> {
        let mut table = Self::default();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some((key, value)) => {
                    table.entries.insert(key, value);
                }
                None => {
                    table.skipped_lines += 1;
                    warn!("Skipping malformed broadcast line {}: {:?}", line_no + 1, line);
                }
            }
        }
        debug!("Broadcast table built with {} entries", table.entries.len());
        Ok(table)
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (u64, i64)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            skipped_lines: 0,
        }
    }

    /// Stored value, or [`ABSENT_VALUE`]. Absence is the common case.
    pub fn lookup(&self, key: u64) -> i64 {
        self.entries.get(&key).copied().unwrap_or(ABSENT_VALUE)
    }

    pub fn get(&self, key: u64) -> Option<i64> {
        self.entries.get(&key).copied()
    }

    pub fn contains(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
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
}

fn parse_line(line: &str) -> Option<(u64, i64)> {
    let mut fields = line.split('\t');
    let key = fields.next()?.trim().parse::<u64>().ok()?;
    let value = fields.next()?.trim().parse::<i64>().ok()?;
    Some((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_lookup_present_and_absent() {
        let table = BroadcastTable::from_reader(Cursor::new("100\t3\n200\t-1\n")).unwrap();
        assert_eq!(table.lookup(100), 3);
        assert_eq!(table.lookup(200), -1);
        assert_eq!(table.lookup(999), 0);
        assert!(table.get(999).is_none());
        assert!(table.contains(200));
    }

    #[test]
    fn test_duplicate_key_keeps_last_value() {
        let table = BroadcastTable::from_reader(Cursor::new("7\t1\n8\t5\n7\t9\n")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup(7), 9);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let table =
            BroadcastTable::from_reader(Cursor::new("1\t1\nabc\t2\n3\n\n4\tx\n5\t6\n")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.skipped_lines(), 3);
        assert_eq!(table.lookup(5), 6);
    }

    #[test]
    fn test_load_from_side_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "42\t1").unwrap();
        writeln!(file, "43\t0").unwrap();
        writeln!(file, "42\t2").unwrap();
        let table = BroadcastTable::load(file.path()).unwrap();
        assert_eq!(table.lookup(42), 2);
        assert_eq!(table.lookup(43), 0);
        assert!(table.contains(43));
        assert_eq!(table.lookup(44), 0);
    }

    #[test]
    fn test_missing_side_file_is_load_error() {
        let err = BroadcastTable::load("/definitely/not/here.tsv").unwrap_err();
        assert!(matches!(err, PipelineError::BroadcastLoad { .. }));
    }
}
