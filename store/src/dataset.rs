//! File and revision tables kept in step per WorkUnit
//!
//! A unit is committed by appending its revision rows first and its file row
//! last. The file row records how many revision rows the unit wrote, so a unit
//! is complete exactly when its file row exists and that many revision rows
//! are on disk. Anything else left behind by a crash is partial and gets discarded
//! before the unit is mined again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::checkpoint::CheckpointStore;
use crate::error::{Result, StoreError};
use crate::record::{FileProvenanceRecord, Record, RevisionRecord, UnitKey};

/// Progress of one WorkUnit as seen from the output tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// No rows of the unit exist
    Absent,
    /// Some rows exist but the unit was never fully committed
    Partial,
    /// File row plus every revision row exist
    Complete,
}

/// Rows dropped by a dataset-wide dedup pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupReport {
    pub file_rows: usize,
    pub revision_rows: usize,
}

/// The file-provenance and revision tables of one output directory
pub struct Dataset {
    dir: PathBuf,
    files: CheckpointStore<FileProvenanceRecord>,
    revisions: CheckpointStore<RevisionRecord>,
    expected_revisions: HashMap<UnitKey, u64>,
}

impl Dataset {
    /// Open both tables under `dir`, creating the directory when missing
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if dir.exists() && !dir.is_dir() {
            return Err(StoreError::invalid_path(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        std::fs::create_dir_all(dir)?;

        let files = CheckpointStore::<FileProvenanceRecord>::in_dir(dir)?;
        let revisions = CheckpointStore::<RevisionRecord>::in_dir(dir)?;

        let mut dataset = Self {
            dir: dir.to_path_buf(),
            files,
            revisions,
            expected_revisions: HashMap::new(),
        };
        dataset.load_expectations()?;
        Ok(dataset)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &CheckpointStore<FileProvenanceRecord> {
        &self.files
    }

    pub fn revisions(&self) -> &CheckpointStore<RevisionRecord> {
        &self.revisions
    }

    pub fn unit_state(&self, unit: &UnitKey) -> UnitState {
        let revision_rows = self.revisions.unit_row_count(unit) as u64;
        match self.expected_revisions.get(unit) {
            Some(&expected) if revision_rows >= expected => UnitState::Complete,
            Some(_) => UnitState::Partial,
            None if revision_rows > 0 => UnitState::Partial,
            None => UnitState::Absent,
        }
    }

    pub fn is_unit_complete(&self, unit: &UnitKey) -> bool {
        self.unit_state(unit) == UnitState::Complete
    }

    /// Units with a committed file row, in no particular order
    pub fn completed_units(&self) -> impl Iterator<Item = &UnitKey> {
        self.expected_revisions
            .keys()
            .filter(move |unit| self.is_unit_complete(unit))
    }

    /// Durably write one unit: revision rows, then the file row.
    ///
    /// Rows already on disk are skipped, so re-committing a complete unit is a
    /// no-op.
    pub fn commit_unit(
        &mut self,
        file: &FileProvenanceRecord,
        revisions: &[RevisionRecord],
    ) -> Result<()> {
        let unit = file.unit();
        if let Some(stray) = revisions.iter().find(|row| row.unit() != unit) {
            return Err(StoreError::InconsistentUnit {
                unit: unit.to_string(),
                reason: format!("revision row belongs to {}", stray.unit()),
            });
        }
        if file.revisions_mined != revisions.len() as u64 {
            return Err(StoreError::InconsistentUnit {
                unit: unit.to_string(),
                reason: format!(
                    "file row expects {} revisions, got {}",
                    file.revisions_mined,
                    revisions.len()
                ),
            });
        }

        self.revisions.append_rows(revisions)?;
        self.files.append_rows(std::slice::from_ref(file))?;
        self.expected_revisions
            .entry(unit)
            .or_insert(file.revisions_mined);
        Ok(())
    }

    /// Delete every row of `unit` from both tables (the only repair for a
    /// partially written unit)
    pub fn discard_unit(&mut self, unit: &UnitKey) -> Result<usize> {
        let removed = self.files.remove_unit(unit)? + self.revisions.remove_unit(unit)?;
        self.expected_revisions.remove(unit);
        Ok(removed)
    }

    /// Post-hoc repair: keep the first row per primary key in both tables
    pub fn dedup(&mut self) -> Result<DedupReport> {
        let report = DedupReport {
            file_rows: self.files.dedup()?,
            revision_rows: self.revisions.dedup()?,
        };
        self.load_expectations()?;
        Ok(report)
    }

    fn load_expectations(&mut self) -> Result<()> {
        self.expected_revisions.clear();
        for row in self.files.read_all()? {
            self.expected_revisions
                .entry(row.unit())
                .or_insert(row.revisions_mined);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ActorSet, Authorship, NOT_CLASSIFIED};
    use tempfile::TempDir;

    fn file_row(file: &str, revisions: u64) -> FileProvenanceRecord {
        FileProvenanceRecord {
            repository: "octo/repo".to_string(),
            file_path: file.to_string(),
            creator_actors: ActorSet::new(["copilot[bot]"]),
            creator_authorship: Authorship::Automated,
            creator_agent: "copilot".to_string(),
            creation_date: "2025-01-05T00:00:00+00:00".to_string(),
            creation_revision: "r1".to_string(),
            line_count: 20,
            revision_count: revisions,
            revisions_mined: revisions,
        }
    }

    fn revision_rows(file: &str, count: usize) -> Vec<RevisionRecord> {
        (1..=count)
            .map(|i| RevisionRecord {
                repository: "octo/repo".to_string(),
                file_path: file.to_string(),
                revision_id: format!("r{i}"),
                revision_date: format!("2025-01-0{i}T00:00:00+00:00"),
                actors: ActorSet::new(["alice"]),
                authorship: Authorship::Human,
                agent: "human".to_string(),
                origin_authorship: Authorship::Automated,
                message: "chore".to_string(),
                category: NOT_CLASSIFIED.to_string(),
                changed_lines: 1,
            })
            .collect()
    }

    #[test]
    fn test_commit_then_reopen_is_complete() {
        let dir = TempDir::new().unwrap();
        let unit = UnitKey::new("octo/repo", "a.py");
        {
            let mut dataset = Dataset::open(dir.path()).unwrap();
            assert_eq!(dataset.unit_state(&unit), UnitState::Absent);
            dataset
                .commit_unit(&file_row("a.py", 3), &revision_rows("a.py", 3))
                .unwrap();
            assert!(dataset.is_unit_complete(&unit));
        }

        let dataset = Dataset::open(dir.path()).unwrap();
        assert_eq!(dataset.unit_state(&unit), UnitState::Complete);
        assert_eq!(dataset.completed_units().count(), 1);
    }

    #[test]
    fn test_revisions_without_file_row_are_partial() {
        let dir = TempDir::new().unwrap();
        let unit = UnitKey::new("octo/repo", "a.py");
        {
            let mut revisions = CheckpointStore::<RevisionRecord>::in_dir(dir.path()).unwrap();
            revisions.append_rows(&revision_rows("a.py", 2)).unwrap();
        }

        let mut dataset = Dataset::open(dir.path()).unwrap();
        assert_eq!(dataset.unit_state(&unit), UnitState::Partial);

        assert_eq!(dataset.discard_unit(&unit).unwrap(), 2);
        assert_eq!(dataset.unit_state(&unit), UnitState::Absent);
    }

    #[test]
    fn test_recommit_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let mut dataset = Dataset::open(dir.path()).unwrap();
        let file = file_row("a.py", 2);
        let revisions = revision_rows("a.py", 2);
        dataset.commit_unit(&file, &revisions).unwrap();
        dataset.commit_unit(&file, &revisions).unwrap();

        assert_eq!(dataset.files().row_count(), 1);
        assert_eq!(dataset.revisions().row_count(), 2);
    }

    #[test]
    fn test_commit_rejects_inconsistent_rows() {
        let dir = TempDir::new().unwrap();
        let mut dataset = Dataset::open(dir.path()).unwrap();

        let err = dataset
            .commit_unit(&file_row("a.py", 3), &revision_rows("a.py", 2))
            .unwrap_err();
        assert!(matches!(err, StoreError::InconsistentUnit { .. }));

        let err = dataset
            .commit_unit(&file_row("a.py", 1), &revision_rows("b.py", 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::InconsistentUnit { .. }));
        assert!(dataset.revisions().is_empty());
    }

    #[test]
    fn test_open_rejects_a_file_as_output_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results");
        std::fs::write(&path, b"not a directory").unwrap();

        assert!(matches!(Dataset::open(&path), Err(StoreError::InvalidPath(_))));
    }

    #[test]
    fn test_capped_unit_is_judged_by_rows_mined() {
        let dir = TempDir::new().unwrap();
        let unit = UnitKey::new("octo/repo", "a.py");
        let file = FileProvenanceRecord {
            revision_count: 7,
            ..file_row("a.py", 2)
        };
        {
            let mut dataset = Dataset::open(dir.path()).unwrap();
            dataset.commit_unit(&file, &revision_rows("a.py", 2)).unwrap();
        }

        let dataset = Dataset::open(dir.path()).unwrap();
        assert_eq!(dataset.unit_state(&unit), UnitState::Complete);
        assert_eq!(dataset.files().read_all().unwrap()[0].revision_count, 7);
    }
}
