//! Loading the list of repositories to mine.
//!
//! Two formats are accepted:
//! - CSV with `owner` and `repository_name` columns (others are ignored)
//! - one `owner/name` or repository URL per line
//!
//! Blank lines and `#` comments are skipped; repeats keep their first position.

use crate::error::{MinerError, MinerResult};
use crate::hosting::RepositoryRef;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RepositoryRow {
    owner: String,
    repository_name: String,
}

pub fn load_repository_list(path: &Path) -> MinerResult<Vec<RepositoryRef>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MinerError::config(format!("failed to read repository list {}: {}", path.display(), e))
    })?;
    let repos = parse_repository_list(&content)?;
    tracing::info!("Loaded {} repositories from {}", repos.len(), path.display());
    Ok(repos)
}

pub fn parse_repository_list(content: &str) -> MinerResult<Vec<RepositoryRef>> {
    let content = content.trim_start_matches('\u{feff}');
    let first = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'));

    let parsed = match first {
        Some(header) if is_csv_header(header) => parse_csv(content)?,
        _ => parse_lines(content)?,
    };

    let mut seen = HashSet::new();
    Ok(parsed.into_iter().filter(|r| seen.insert(r.clone())).collect())
}

fn is_csv_header(line: &str) -> bool {
    let columns: Vec<&str> = line.split(',').map(str::trim).collect();
    columns.contains(&"owner") && columns.contains(&"repository_name")
}

fn parse_csv(content: &str) -> MinerResult<Vec<RepositoryRef>> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut repos = Vec::new();
    for (i, row) in reader.deserialize::<RepositoryRow>().enumerate() {
        let row = row.map_err(|e| MinerError::config(format!("repository list row {}: {}", i + 1, e)))?;
        if row.owner.is_empty() || row.repository_name.is_empty() {
            tracing::warn!("Skipping repository list row {} with empty owner or name", i + 1);
            continue;
        }
        repos.push(RepositoryRef::new(row.owner, row.repository_name));
    }
    Ok(repos)
}

fn parse_lines(content: &str) -> MinerResult<Vec<RepositoryRef>> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(RepositoryRef::parse)
        .collect()
}
