//! In-memory hosting service and classifier shared by the pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use provenance_miner::category::CategoryClassifier;
use provenance_miner::config::MiningConfig;
use provenance_miner::hosting::{
    ChangedFile, FileStatus, HostingApi, RepositoryInfo, RepositoryRef, RevisionDetail,
    RevisionQuery, RevisionSummary,
};
use provenance_miner::retry::{ConnectivityProbe, RetryPolicy, RetryingClient};
use provenance_miner::{MinerError, MinerResult, MiningOrchestrator, RunCache};
use provenance_store::Dataset;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn day(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, month, day, 12, 0, 0).unwrap()
}

struct FakeRevision {
    summary: RevisionSummary,
    files: Vec<ChangedFile>,
}

/// Hosting service backed by a fixed set of revisions per repository.
#[derive(Default)]
pub struct FakeHost {
    repos: HashMap<String, Vec<FakeRevision>>,
    /// Transport failures served before `changed_files` starts answering
    changed_files_failures: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a revision by `author` touching `files` as `(path, status, additions)`.
    pub fn revision(
        mut self,
        repo: &str,
        id: &str,
        author: &str,
        date: DateTime<Utc>,
        files: &[(&str, FileStatus, u64)],
    ) -> Self {
        let revision = FakeRevision {
            summary: RevisionSummary {
                id: id.to_string(),
                author: author.to_string(),
                committer: None,
                date,
                message: format!("{} by {}", id, author),
            },
            files: files
                .iter()
                .map(|(path, status, additions)| ChangedFile {
                    path: path.to_string(),
                    status: *status,
                    additions: Some(*additions),
                    deletions: Some(0),
                })
                .collect(),
        };
        self.repos.entry(repo.to_string()).or_default().push(revision);
        self
    }

    pub fn failing_changed_files(self, failures: usize) -> Self {
        self.changed_files_failures.store(failures, Ordering::SeqCst);
        self
    }

    fn revisions(&self, repo: &RepositoryRef) -> MinerResult<&Vec<FakeRevision>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.repos
            .get(&repo.full_name())
            .ok_or_else(|| MinerError::NotFound(repo.full_name()))
    }

    fn find(&self, repo: &RepositoryRef, revision: &str) -> MinerResult<&FakeRevision> {
        self.revisions(repo)?
            .iter()
            .find(|r| r.summary.id == revision)
            .ok_or_else(|| MinerError::NotFound(format!("{}@{}", repo, revision)))
    }
}

#[async_trait]
impl HostingApi for FakeHost {
    async fn resolve_repository(&self, repo: &RepositoryRef) -> MinerResult<RepositoryInfo> {
        self.revisions(repo)?;
        Ok(RepositoryInfo {
            full_name: repo.full_name(),
            default_branch: "main".to_string(),
        })
    }

    async fn list_revisions(
        &self,
        repo: &RepositoryRef,
        query: &RevisionQuery,
    ) -> MinerResult<Vec<RevisionSummary>> {
        let mut matching: Vec<RevisionSummary> = self
            .revisions(repo)?
            .iter()
            .filter(|r| query.since.map_or(true, |since| r.summary.date >= since))
            .filter(|r| query.until.map_or(true, |until| r.summary.date <= until))
            .filter(|r| match &query.path {
                Some(path) => r.files.iter().any(|f| &f.path == path),
                None => true,
            })
            .map(|r| r.summary.clone())
            .collect();

        // Newest first, like the real listing.
        matching.sort_by(|a, b| b.date.cmp(&a.date));
        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn changed_files(
        &self,
        repo: &RepositoryRef,
        revision: &str,
    ) -> MinerResult<Vec<ChangedFile>> {
        let pending = self.changed_files_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.changed_files_failures.store(pending - 1, Ordering::SeqCst);
            return Err(MinerError::Transport("connection reset by peer".to_string()));
        }
        Ok(self.find(repo, revision)?.files.clone())
    }

    async fn file_content(
        &self,
        repo: &RepositoryRef,
        _path: &str,
        revision: &str,
    ) -> MinerResult<String> {
        self.find(repo, revision)?;
        Ok("a\nb\nc\n".to_string())
    }

    async fn revision_detail(
        &self,
        repo: &RepositoryRef,
        revision: &str,
    ) -> MinerResult<RevisionDetail> {
        let found = self.find(repo, revision)?;
        Ok(RevisionDetail {
            message: found.summary.message.clone(),
            diff: format!("+ change in {}", revision),
            changed_lines: found
                .files
                .iter()
                .map(|f| f.additions.unwrap_or(0) + f.deletions.unwrap_or(0))
                .sum(),
        })
    }
}

/// Labels every revision `feature`.
pub struct FixedClassifier {
    pub available: bool,
}

#[async_trait]
impl CategoryClassifier for FixedClassifier {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn classify(&self, _message: &str, _diff: &str) -> MinerResult<String> {
        Ok("feature".to_string())
    }
}

pub struct AlwaysUp;

#[async_trait]
impl ConnectivityProbe for AlwaysUp {
    async fn is_reachable(&self) -> bool {
        true
    }
}

pub fn test_config() -> MiningConfig {
    MiningConfig {
        since: day(1, 1),
        until: day(6, 30),
        history_until: Some(day(12, 31)),
        request_delay_ms: 0,
        ..MiningConfig::default()
    }
}

pub fn fast_retry() -> RetryingClient {
    let policy = RetryPolicy {
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        outage_deadline: Some(Duration::from_secs(5)),
    };
    RetryingClient::new(policy, Arc::new(AlwaysUp))
}

pub fn orchestrator(config: MiningConfig, host: Arc<FakeHost>, dataset: Dataset) -> MiningOrchestrator {
    let cache = Arc::new(RunCache::new(config.cache_capacity));
    MiningOrchestrator::new(config, host, fast_retry(), dataset, cache)
        .with_category_classifier(Arc::new(FixedClassifier { available: true }))
}
