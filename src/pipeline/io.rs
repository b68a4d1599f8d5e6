// src/pipeline/io.rs
use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use std::fmt::Display;
use std::path::Path;

/// Reads every non-blank line of a record file.
pub async fn read_records(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read input records from {}", path.display()))?;
    let lines: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();
    info!("Read {} records from {}", lines.len(), path.display());
    Ok(lines)
}

/// Writes one record per line using each item's `Display` form.
pub async fn write_records<T: Display>(path: &Path, records: &[T]) -> Result<()> {
    let mut body = String::new();
    for record in records {
        body.push_str(&record.to_string());
        body.push('\n');
    }
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write records to {}", path.display()))?;
    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value).context("Failed to serialize JSON output")?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create output directory {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_records_round_trip_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.tsv");
        write_records(&path, &["a\t1", "", "b\t2"]).await.unwrap();
        let lines = read_records(&path).await.unwrap();
        assert_eq!(lines, vec!["a\t1".to_string(), "b\t2".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_input_has_context() {
        let dir = tempdir().unwrap();
        let err = read_records(&dir.path().join("missing.tsv")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read input records"));
    }
}
