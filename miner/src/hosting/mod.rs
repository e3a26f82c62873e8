//! Read-only view of a remote version-control host.
//!
//! The orchestrator only talks to [`HostingApi`]; [`GitHubClient`] is the
//! production implementation and tests plug in an in-memory fake.

mod github;

pub use github::GitHubClient;

use crate::error::{MinerError, MinerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use provenance_store::ActorSet;
use std::fmt;

/// `owner/name` handle of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Accepts `owner/name` or a `https://host/owner/name(.git)` URL.
    pub fn parse(input: &str) -> MinerResult<Self> {
        let trimmed = input.trim();
        let path = match trimmed.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
            None => trimmed,
        };
        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);

        let mut parts = path.split('/').filter(|p| !p.is_empty());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => Ok(Self::new(owner, name)),
            _ => Err(MinerError::config(format!(
                "not a repository reference: {:?}",
                input
            ))),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Metadata returned when a repository handle is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub full_name: String,
    pub default_branch: String,
}

/// Filter for a revision listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Only revisions touching this path.
    pub path: Option<String>,
    /// Stop after this many revisions.
    pub limit: Option<usize>,
}

impl RevisionQuery {
    pub fn window(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
            ..Self::default()
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One entry of a revision listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionSummary {
    pub id: String,
    pub author: String,
    pub committer: Option<String>,
    pub date: DateTime<Utc>,
    pub message: String,
}

impl RevisionSummary {
    pub fn actors(&self) -> ActorSet {
        ActorSet::from_commit(&self.author, self.committer.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Other,
}

impl FileStatus {
    pub fn from_api(status: &str) -> Self {
        match status {
            "added" => FileStatus::Added,
            "modified" | "changed" => FileStatus::Modified,
            "removed" => FileStatus::Removed,
            "renamed" => FileStatus::Renamed,
            _ => FileStatus::Other,
        }
    }
}

/// A file touched by one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub path: String,
    pub status: FileStatus,
    /// Absent when the host omits line statistics (e.g. binary files)
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
}

/// Message and diff of one revision, as fed to the category classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionDetail {
    pub message: String,
    pub diff: String,
    pub changed_lines: u64,
}

/// Read-only operations the miner needs from a hosting service.
///
/// Implementations return `MinerError::Transport` for connectivity problems so
/// the retry layer can wait them out.
#[async_trait]
pub trait HostingApi: Send + Sync {
    async fn resolve_repository(&self, repo: &RepositoryRef) -> MinerResult<RepositoryInfo>;

    /// Revisions matching `query`, in the order the host returns them.
    async fn list_revisions(
        &self,
        repo: &RepositoryRef,
        query: &RevisionQuery,
    ) -> MinerResult<Vec<RevisionSummary>>;

    async fn changed_files(
        &self,
        repo: &RepositoryRef,
        revision: &str,
    ) -> MinerResult<Vec<ChangedFile>>;

    /// Raw file content at `revision`, decoded lossily as UTF-8.
    async fn file_content(
        &self,
        repo: &RepositoryRef,
        path: &str,
        revision: &str,
    ) -> MinerResult<String>;

    async fn revision_detail(
        &self,
        repo: &RepositoryRef,
        revision: &str,
    ) -> MinerResult<RevisionDetail>;
}
