//! Run-scoped caching of hosting API responses.

use crate::hosting::{ChangedFile, RevisionSummary};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Changed-file listings keyed by (repository, revision).
type ChangedFilesCache = LruCache<(String, String), Vec<ChangedFile>>;

/// File histories keyed by (repository, path).
type HistoryCache = LruCache<(String, String), Vec<RevisionSummary>>;

const FALLBACK_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => unreachable!(),
};

/// Responses already fetched during one mining run.
///
/// Created by the caller and handed to the orchestrator; dropped with the run.
pub struct RunCache {
    changed_files: Mutex<ChangedFilesCache>,
    histories: Mutex<HistoryCache>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub changed_files: usize,
    pub histories: usize,
}

impl RunCache {
    /// Create a new cache with the specified capacity per kind.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(FALLBACK_CAPACITY);
        Self {
            changed_files: Mutex::new(LruCache::new(capacity)),
            histories: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get_changed_files(&self, repository: &str, revision: &str) -> Option<Vec<ChangedFile>> {
        self.changed_files
            .lock()
            .get(&(repository.to_string(), revision.to_string()))
            .cloned()
    }

    pub fn set_changed_files(&self, repository: &str, revision: &str, files: Vec<ChangedFile>) {
        self.changed_files
            .lock()
            .put((repository.to_string(), revision.to_string()), files);
    }

    pub fn get_history(&self, repository: &str, path: &str) -> Option<Vec<RevisionSummary>> {
        self.histories
            .lock()
            .get(&(repository.to_string(), path.to_string()))
            .cloned()
    }

    pub fn set_history(&self, repository: &str, path: &str, history: Vec<RevisionSummary>) {
        self.histories
            .lock()
            .put((repository.to_string(), path.to_string()), history);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            changed_files: self.changed_files.lock().len(),
            histories: self.histories.lock().len(),
        }
    }
}
