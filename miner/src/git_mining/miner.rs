//! Repository-level mining pipeline.
//!
//! Each repository walks `Listed → Connected → EnumeratingAdditions →
//! SelectingSample → MiningHistory → Classifying → Persisted`, or stops in
//! `Failed(reason)`. A failed repository never stops the run, and a failed
//! file never fails its repository.

use super::classifier::AuthorshipClassifier;
use super::sampling::{balance, repository_rng};
use crate::cache::RunCache;
use crate::category::CategoryClassifier;
use crate::config::MiningConfig;
use crate::error::{MinerError, MinerResult};
use crate::hosting::{ChangedFile, FileStatus, HostingApi, RepositoryRef, RevisionQuery, RevisionSummary};
use crate::retry::RetryingClient;
use futures::stream::{self, StreamExt};
use provenance_store::{
    ActorSet, AuthorshipTag, Dataset, FileProvenanceRecord, RevisionRecord, UnitKey, UnitState,
    CLASSIFICATION_ERROR, FETCH_ERROR, NOT_CLASSIFIED,
};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where a repository is in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoState {
    Listed,
    Connected,
    EnumeratingAdditions,
    SelectingSample,
    MiningHistory,
    Classifying,
    Persisted,
    Failed(FailureReason),
}

impl fmt::Display for RepoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoState::Listed => f.write_str("listed"),
            RepoState::Connected => f.write_str("connected"),
            RepoState::EnumeratingAdditions => f.write_str("enumerating-additions"),
            RepoState::SelectingSample => f.write_str("selecting-sample"),
            RepoState::MiningHistory => f.write_str("mining-history"),
            RepoState::Classifying => f.write_str("classifying"),
            RepoState::Persisted => f.write_str("persisted"),
            RepoState::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// Why a repository ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No file was added inside the time window.
    NoAdditions,
    /// Additions exist but none by an automated agent.
    NoAutomatedFiles,
    /// Automated additions exist but no human ones to balance against.
    NoHumanFiles,
    /// A permanent error, with its message.
    Error(String),
}

impl From<&MinerError> for FailureReason {
    fn from(err: &MinerError) -> Self {
        FailureReason::Error(err.to_string())
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoAdditions => f.write_str("no-additions"),
            FailureReason::NoAutomatedFiles => f.write_str("no-automated-files"),
            FailureReason::NoHumanFiles => f.write_str("no-human-files"),
            FailureReason::Error(msg) => f.write_str(msg),
        }
    }
}

/// A file first added inside the time window.
#[derive(Debug, Clone)]
pub struct AddedFile {
    pub path: String,
    pub revision: RevisionSummary,
    pub actors: ActorSet,
    pub tag: AuthorshipTag,
    /// Lines added by the creating revision, when the host reported it
    pub additions: Option<u64>,
}

/// Per-repository result reported in the run summary.
#[derive(Debug, Clone)]
pub struct RepoOutcome {
    pub repository: String,
    pub state: RepoState,
    pub files_added: usize,
    pub files_selected: usize,
    pub units_mined: usize,
    pub units_skipped: usize,
    pub units_failed: usize,
    pub revisions_written: usize,
}

impl RepoOutcome {
    fn new(repository: &RepositoryRef) -> Self {
        Self {
            repository: repository.full_name(),
            state: RepoState::Listed,
            files_added: 0,
            files_selected: 0,
            units_mined: 0,
            units_skipped: 0,
            units_failed: 0,
            revisions_written: 0,
        }
    }

    fn enter(&mut self, state: RepoState) {
        tracing::debug!("{}: {} -> {}", self.repository, self.state, state);
        self.state = state;
    }

    fn fail(mut self, reason: FailureReason) -> Self {
        tracing::warn!("{}: failed ({})", self.repository, reason);
        self.state = RepoState::Failed(reason);
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.state == RepoState::Persisted
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<RepoOutcome>,
}

impl RunSummary {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_persisted()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    pub fn units_mined(&self) -> usize {
        self.outcomes.iter().map(|o| o.units_mined).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Repositories: {} attempted, {} succeeded, {} failed",
            self.attempted(),
            self.succeeded(),
            self.failed()
        )?;
        for o in &self.outcomes {
            match &o.state {
                RepoState::Failed(reason) => writeln!(f, "  {}: failed ({})", o.repository, reason)?,
                state => writeln!(
                    f,
                    "  {}: {} ({} added, {} selected, {} mined, {} skipped, {} failed, {} revisions)",
                    o.repository,
                    state,
                    o.files_added,
                    o.files_selected,
                    o.units_mined,
                    o.units_skipped,
                    o.units_failed,
                    o.revisions_written
                )?,
            }
        }
        Ok(())
    }
}

enum UnitOutcome {
    AlreadyComplete,
    Mined { revisions: usize },
}

/// Fetched inputs of one WorkUnit awaiting classification.
struct PendingUnit {
    unit: UnitKey,
    history: Vec<RevisionSummary>,
    /// History length before the per-file cap
    total_revisions: u64,
    line_count: u64,
}

/// Drives mining of a list of repositories into a [`Dataset`].
pub struct MiningOrchestrator {
    config: MiningConfig,
    api: Arc<dyn HostingApi>,
    retry: RetryingClient,
    authorship: AuthorshipClassifier,
    categories: Option<Arc<dyn CategoryClassifier>>,
    dataset: Mutex<Dataset>,
    cache: Arc<RunCache>,
}

impl MiningOrchestrator {
    pub fn new(
        config: MiningConfig,
        api: Arc<dyn HostingApi>,
        retry: RetryingClient,
        dataset: Dataset,
        cache: Arc<RunCache>,
    ) -> Self {
        let authorship = AuthorshipClassifier::new(&config.agents);
        Self {
            config,
            api,
            retry,
            authorship,
            categories: None,
            dataset: Mutex::new(dataset),
            cache,
        }
    }

    pub fn with_category_classifier(mut self, classifier: Arc<dyn CategoryClassifier>) -> Self {
        self.categories = Some(classifier);
        self
    }

    /// Give the dataset back once the run is over.
    pub fn into_dataset(self) -> Dataset {
        self.dataset.into_inner()
    }

    /// Mine every repository and report what happened to each.
    pub async fn run(&self, repositories: &[RepositoryRef]) -> RunSummary {
        let categories = match &self.categories {
            Some(classifier) if classifier.is_available().await => Some(classifier.as_ref()),
            Some(_) => {
                tracing::warn!("Category classifier unavailable, labelling rows {}", NOT_CLASSIFIED);
                None
            }
            None => None,
        };

        tracing::info!(
            "Mining {} repositories ({} at a time)",
            repositories.len(),
            self.config.concurrency
        );

        let outcomes = stream::iter(repositories)
            .map(|repo| self.mine_repository(repo, categories))
            .buffered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let summary = RunSummary { outcomes };
        let stats = self.cache.stats();
        tracing::info!(
            "Run finished: {} succeeded, {} failed, {} units mined (cache: {} listings, {} histories)",
            summary.succeeded(),
            summary.failed(),
            summary.units_mined(),
            stats.changed_files,
            stats.histories
        );
        summary
    }

    /// Run one repository through the pipeline.
    pub async fn mine_repository(
        &self,
        repo: &RepositoryRef,
        categories: Option<&dyn CategoryClassifier>,
    ) -> RepoOutcome {
        let mut outcome = RepoOutcome::new(repo);
        tracing::info!("{}: mining", repo);

        if let Err(e) = self
            .remote("resolve repository", || self.api.resolve_repository(repo))
            .await
        {
            return outcome.fail(FailureReason::from(&e));
        }
        outcome.enter(RepoState::Connected);

        outcome.enter(RepoState::EnumeratingAdditions);
        let additions = match self.enumerate_additions(repo).await {
            Ok(additions) => additions,
            Err(e) => return outcome.fail(FailureReason::from(&e)),
        };
        outcome.files_added = additions.len();
        if additions.is_empty() {
            return outcome.fail(FailureReason::NoAdditions);
        }

        outcome.enter(RepoState::SelectingSample);
        let (automated, human): (Vec<AddedFile>, Vec<AddedFile>) =
            additions.into_iter().partition(|f| f.tag.is_automated());
        tracing::info!(
            "{}: {} automated and {} human additions",
            repo,
            automated.len(),
            human.len()
        );
        if automated.is_empty() {
            return outcome.fail(FailureReason::NoAutomatedFiles);
        }
        if human.is_empty() {
            return outcome.fail(FailureReason::NoHumanFiles);
        }

        let mut rng = repository_rng(self.config.seed, &repo.full_name());
        let (automated, human) = balance(automated, human, self.config.target_per_group, &mut rng);
        let selected: Vec<AddedFile> = automated.into_iter().chain(human).collect();
        outcome.files_selected = selected.len();

        for file in &selected {
            outcome.enter(RepoState::MiningHistory);
            let result = match self.prepare_unit(repo, file).await {
                Ok(None) => Ok(UnitOutcome::AlreadyComplete),
                Ok(Some(pending)) => {
                    outcome.enter(RepoState::Classifying);
                    self.classify_and_commit(repo, file, pending, categories).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(UnitOutcome::AlreadyComplete) => outcome.units_skipped += 1,
                Ok(UnitOutcome::Mined { revisions }) => {
                    outcome.units_mined += 1;
                    outcome.revisions_written += revisions;
                }
                Err(e @ (MinerError::Store(_) | MinerError::OutageDeadline(_))) => {
                    return outcome.fail(FailureReason::from(&e));
                }
                Err(e) => {
                    tracing::warn!("{}: skipping {}: {}", repo, file.path, e);
                    outcome.units_failed += 1;
                }
            }
        }

        outcome.enter(RepoState::Persisted);
        tracing::info!(
            "{}: persisted {} units ({} already complete, {} failed)",
            repo,
            outcome.units_mined,
            outcome.units_skipped,
            outcome.units_failed
        );
        outcome
    }

    /// Files added inside the configured window, earliest addition per path.
    pub async fn enumerate_additions(&self, repo: &RepositoryRef) -> MinerResult<Vec<AddedFile>> {
        let query = RevisionQuery::window(self.config.since, self.config.until)
            .limit(self.config.max_revisions_scanned);
        let mut revisions = self
            .remote("list revisions", || self.api.list_revisions(repo, &query))
            .await?;
        revisions.sort_by_key(|r| r.date);

        let mut seen = HashSet::new();
        let mut added = Vec::new();
        for revision in revisions {
            let files = match self.changed_files(repo, &revision.id).await {
                Ok(files) => files,
                Err(e @ MinerError::OutageDeadline(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!("{}: skipping revision {}: {}", repo, short(&revision.id), e);
                    continue;
                }
            };

            let actors = revision.actors();
            let tag = self.authorship.classify(&actors);
            for file in files {
                if file.status == FileStatus::Added && seen.insert(file.path.clone()) {
                    added.push(AddedFile {
                        path: file.path,
                        revision: revision.clone(),
                        actors: actors.clone(),
                        tag: tag.clone(),
                        additions: file.additions,
                    });
                }
            }
        }

        tracing::debug!("{}: {} files added in window", repo, added.len());
        Ok(added)
    }

    /// Fetch what one WorkUnit needs, or `None` when it is already complete.
    ///
    /// Leftovers of a partially written unit are discarded first.
    async fn prepare_unit(
        &self,
        repo: &RepositoryRef,
        file: &AddedFile,
    ) -> MinerResult<Option<PendingUnit>> {
        let unit = UnitKey::new(repo.full_name(), &file.path);
        {
            let mut dataset = self.dataset.lock().await;
            match dataset.unit_state(&unit) {
                UnitState::Complete => {
                    tracing::debug!("{}: already complete", unit);
                    return Ok(None);
                }
                UnitState::Partial => {
                    let removed = dataset.discard_unit(&unit)?;
                    tracing::warn!("{}: discarded {} rows of a partial unit", unit, removed);
                }
                UnitState::Absent => {}
            }
        }

        let (history, total_revisions) = self.history(repo, file).await?;
        let line_count = match file.additions {
            Some(lines) => lines,
            None => {
                let content = self
                    .remote("file content", || {
                        self.api.file_content(repo, &file.path, &file.revision.id)
                    })
                    .await?;
                content.lines().count() as u64
            }
        };

        Ok(Some(PendingUnit {
            unit,
            history,
            total_revisions,
            line_count,
        }))
    }

    /// Tag and categorize every revision of a unit, then commit it.
    async fn classify_and_commit(
        &self,
        repo: &RepositoryRef,
        file: &AddedFile,
        pending: PendingUnit,
        categories: Option<&dyn CategoryClassifier>,
    ) -> MinerResult<UnitOutcome> {
        let PendingUnit {
            unit,
            history,
            total_revisions,
            line_count,
        } = pending;

        let mut rows = Vec::with_capacity(history.len());
        for revision in &history {
            let actors = revision.actors();
            let tag = self.authorship.classify(&actors);
            let (category, changed_lines) = self.categorize(repo, revision, categories).await?;
            rows.push(RevisionRecord {
                repository: unit.repository.clone(),
                file_path: unit.file_path.clone(),
                revision_id: revision.id.clone(),
                revision_date: revision.date.to_rfc3339(),
                actors,
                authorship: tag.authorship(),
                agent: tag.agent_label().to_string(),
                origin_authorship: file.tag.authorship(),
                message: revision.message.clone(),
                category,
                changed_lines,
            });
        }

        let file_row = FileProvenanceRecord {
            repository: unit.repository.clone(),
            file_path: unit.file_path.clone(),
            creator_actors: file.actors.clone(),
            creator_authorship: file.tag.authorship(),
            creator_agent: file.tag.agent_label().to_string(),
            creation_date: file.revision.date.to_rfc3339(),
            creation_revision: file.revision.id.clone(),
            line_count,
            revision_count: total_revisions,
            revisions_mined: rows.len() as u64,
        };

        self.dataset.lock().await.commit_unit(&file_row, &rows)?;
        tracing::info!("{}: committed {} revisions", unit, rows.len());
        Ok(UnitOutcome::Mined {
            revisions: rows.len(),
        })
    }

    /// History of one file from its creation on, oldest first and capped,
    /// with the uncapped length.
    ///
    /// The creating revision always leads, even when later revisions share
    /// its timestamp.
    async fn history(
        &self,
        repo: &RepositoryRef,
        file: &AddedFile,
    ) -> MinerResult<(Vec<RevisionSummary>, u64)> {
        let key = repo.full_name();
        let history = match self.cache.get_history(&key, &file.path) {
            Some(history) => history,
            None => {
                let query = RevisionQuery {
                    since: Some(file.revision.date),
                    until: self.config.history_until,
                    path: Some(file.path.clone()),
                    limit: None,
                };
                let history = self
                    .remote("file history", || self.api.list_revisions(repo, &query))
                    .await?;
                self.cache.set_history(&key, &file.path, history.clone());
                history
            }
        };

        let total = history.len() as u64;
        let history = chronological(history, &file.revision.id, self.config.revision_cap);
        Ok((history, total))
    }

    /// Category label and changed-line count of one revision.
    async fn categorize(
        &self,
        repo: &RepositoryRef,
        revision: &RevisionSummary,
        categories: Option<&dyn CategoryClassifier>,
    ) -> MinerResult<(String, u64)> {
        let detail = match self
            .remote("revision detail", || self.api.revision_detail(repo, &revision.id))
            .await
        {
            Ok(detail) => detail,
            Err(e @ MinerError::OutageDeadline(_)) => return Err(e),
            Err(e) => {
                tracing::warn!("{}: no detail for {}: {}", repo, short(&revision.id), e);
                let label = if categories.is_some() { FETCH_ERROR } else { NOT_CLASSIFIED };
                return Ok((label.to_string(), 0));
            }
        };

        let Some(classifier) = categories else {
            return Ok((NOT_CLASSIFIED.to_string(), detail.changed_lines));
        };
        let label = match classifier.classify(&detail.message, &detail.diff).await {
            Ok(label) => label,
            Err(e) => {
                tracing::warn!("{}: classifier failed on {}: {}", repo, short(&revision.id), e);
                CLASSIFICATION_ERROR.to_string()
            }
        };
        Ok((label, detail.changed_lines))
    }

    async fn changed_files(&self, repo: &RepositoryRef, revision: &str) -> MinerResult<Vec<ChangedFile>> {
        let key = repo.full_name();
        if let Some(files) = self.cache.get_changed_files(&key, revision) {
            return Ok(files);
        }
        let files = self
            .remote("changed files", || self.api.changed_files(repo, revision))
            .await?;
        self.cache.set_changed_files(&key, revision, files.clone());
        Ok(files)
    }

    /// One retried remote call followed by the courtesy delay.
    async fn remote<T, F, Fut>(&self, what: &str, operation: F) -> MinerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MinerResult<T>>,
    {
        let result = self.retry.call(what, operation).await;
        let delay = self.config.request_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

/// Oldest first with `creation` leading, cut to `cap` revisions.
fn chronological(
    mut history: Vec<RevisionSummary>,
    creation: &str,
    cap: usize,
) -> Vec<RevisionSummary> {
    // Hosts list newest first; reversed, the stable sort keeps ties chronological.
    history.reverse();
    history.sort_by_key(|r| r.date);
    if let Some(pos) = history.iter().position(|r| r.id == creation) {
        let first = history.remove(pos);
        history.insert(0, first);
    }
    history.truncate(cap);
    history
}

fn short(revision: &str) -> &str {
    revision.get(..8).unwrap_or(revision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_labels() {
        assert_eq!(FailureReason::NoAdditions.to_string(), "no-additions");
        assert_eq!(FailureReason::NoAutomatedFiles.to_string(), "no-automated-files");
        let err = MinerError::NotFound("octo/missing".to_string());
        assert_eq!(FailureReason::from(&err).to_string(), "Not found: octo/missing");
    }

    #[test]
    fn test_summary_counts_and_display() {
        let mut ok = RepoOutcome::new(&RepositoryRef::new("octo", "a"));
        ok.state = RepoState::Persisted;
        ok.units_mined = 2;
        let failed = RepoOutcome::new(&RepositoryRef::new("octo", "b")).fail(FailureReason::NoAdditions);

        let summary = RunSummary {
            outcomes: vec![ok, failed],
        };
        assert_eq!(summary.attempted(), 2);
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.units_mined(), 2);

        let text = summary.to_string();
        assert!(text.starts_with("Repositories: 2 attempted, 1 succeeded, 1 failed"));
        assert!(text.contains("octo/b: failed (no-additions)"));
    }

    fn revision(id: &str, second: u32) -> RevisionSummary {
        use chrono::TimeZone;
        RevisionSummary {
            id: id.to_string(),
            author: "alice".to_string(),
            committer: None,
            date: chrono::Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, second).unwrap(),
            message: String::new(),
        }
    }

    fn ids(history: &[RevisionSummary]) -> Vec<&str> {
        history.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_chronological_keeps_same_second_order() {
        // Newest first, as listed by the host; m1 and c1 share a second.
        let listed = vec![revision("m2", 5), revision("m1", 0), revision("c1", 0)];
        assert_eq!(ids(&chronological(listed.clone(), "c1", 10)), ["c1", "m1", "m2"]);
        assert_eq!(ids(&chronological(listed, "c1", 1)), ["c1"]);
    }

    #[test]
    fn test_chronological_pins_creation_first() {
        // Listed out of order for the same second.
        let listed = vec![revision("c1", 0), revision("m1", 0)];
        assert_eq!(ids(&chronological(listed, "c1", 1)), ["c1"]);
    }

    #[test]
    fn test_short_revision() {
        assert_eq!(short("0123456789abcdef"), "01234567");
        assert_eq!(short("abc"), "abc");
    }
}
