//! Error types for provenance-store

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or appending dataset tables
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Existing table header differs from the record schema
    #[error("Schema mismatch in {path}: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// A persisted row could not be decoded
    #[error("Malformed row {line} in {path}: {reason}")]
    MalformedRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// Rows handed to a unit commit do not describe one complete unit
    #[error("Inconsistent unit {unit}: {reason}")]
    InconsistentUnit { unit: String, reason: String },

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Atomic rewrite failed while persisting the temp file
    #[error("Failed to replace {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl StoreError {
    /// Create a schema mismatch error
    pub fn schema_mismatch(path: impl Into<PathBuf>, expected: &[&str], found: &[String]) -> Self {
        Self::SchemaMismatch {
            path: path.into(),
            expected: expected.join(","),
            found: found.join(","),
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_display() {
        let err = StoreError::schema_mismatch(
            "/data/revisions.csv",
            &["repository", "file_path"],
            &["repository".to_string(), "path".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "Schema mismatch in /data/revisions.csv: expected [repository,file_path], found [repository,path]"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        match StoreError::from(io_err) {
            StoreError::Io(_) => {}
            other => panic!("Expected StoreError::Io, got {other:?}"),
        }
    }
}
