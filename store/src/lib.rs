//! Provenance dataset layer
//!
//! Append-only tables for mined authorship provenance, with primary-key
//! indexing so a mining run can be killed at any point and resumed without
//! losing or duplicating rows.
//!
//! ## Features
//!
//! - **Idempotent appends** - rows whose primary key is already on disk are skipped
//! - **Schema pinning** - a table's header is fixed at first write; mismatches are errors
//! - **Crash repair** - torn trailing rows are truncated on open, partial units can be discarded
//! - **Post-hoc dedup** - rewrite a table keeping the first row per key
//!
//! ## Example
//!
//! ```ignore
//! use provenance_store::{Dataset, UnitKey};
//!
//! let mut dataset = Dataset::open("results/")?;
//! let unit = UnitKey::new("octo/repo", "src/a.py");
//! if !dataset.is_unit_complete(&unit) {
//!     dataset.discard_unit(&unit)?;
//!     dataset.commit_unit(&file_row, &revision_rows)?;
//! }
//! ```

pub mod checkpoint;
pub mod dataset;
pub mod error;
pub mod record;

// Re-exports for convenience
pub use checkpoint::{is_unit_done, table_path, CheckpointStore};
pub use dataset::{Dataset, DedupReport, UnitState};
pub use error::{Result, StoreError};
pub use record::{
    ActorSet, Authorship, AuthorshipTag, BlameRow, FileProvenanceRecord, Record, RecordKey,
    RevisionRecord, UnitKey, CLASSIFICATION_ERROR, FETCH_ERROR, HUMAN_AGENT, NOT_CLASSIFIED,
};
