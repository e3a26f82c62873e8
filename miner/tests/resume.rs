//! Killing a run mid-way and starting it again must converge on the same dataset.

mod common;

use common::{day, orchestrator, test_config, FakeHost};
use provenance_miner::hosting::{FileStatus, RepositoryRef};
use provenance_store::{CheckpointStore, Dataset, RevisionRecord, UnitKey, UnitState};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn beta() -> Arc<FakeHost> {
    let mut host = FakeHost::new();
    for (i, name) in ["c1.py", "c2.py", "c3.py"].iter().enumerate() {
        host = host.revision(
            "octo/beta",
            &format!("c{}", i + 1),
            "Copilot",
            day(2, 1 + i as u32),
            &[(*name, FileStatus::Added, 8)],
        );
    }
    for (i, name) in ["h1.py", "h2.py", "h3.py"].iter().enumerate() {
        host = host.revision(
            "octo/beta",
            &format!("h{}", i + 1),
            "alice",
            day(3, 1 + i as u32),
            &[(*name, FileStatus::Added, 6)],
        );
    }
    let host = host.revision(
        "octo/beta",
        "m1",
        "bob",
        day(4, 1),
        &[
            ("c1.py", FileStatus::Modified, 1),
            ("h1.py", FileStatus::Modified, 2),
        ],
    );
    Arc::new(host)
}

fn repos() -> Vec<RepositoryRef> {
    vec![RepositoryRef::new("octo", "beta")]
}

/// (file path, revision id) of every revision row, and every file path.
fn snapshot(dir: &Path) -> (BTreeSet<String>, BTreeSet<(String, String)>) {
    let dataset = Dataset::open(dir).unwrap();
    assert_eq!(dataset.files().duplicate_rows(), 0);
    assert_eq!(dataset.revisions().duplicate_rows(), 0);

    let files = dataset
        .files()
        .read_all()
        .unwrap()
        .into_iter()
        .map(|f| f.file_path)
        .collect();
    let revisions = dataset
        .revisions()
        .read_all()
        .unwrap()
        .into_iter()
        .map(|r| (r.file_path, r.revision_id))
        .collect();
    (files, revisions)
}

#[tokio::test]
async fn test_resume_after_crash_matches_uninterrupted_run() {
    let full = TempDir::new().unwrap();
    let miner = orchestrator(test_config(), beta(), Dataset::open(full.path()).unwrap());
    let summary = miner.run(&repos()).await;
    assert_eq!(summary.outcomes[0].units_mined, 6);
    let complete = miner.into_dataset();
    let all_files = complete.files().read_all().unwrap();
    let all_revisions = complete.revisions().read_all().unwrap();
    drop(complete);

    // Simulate a crash: c1.py fully committed, h1.py cut off after one revision row.
    let crashed = TempDir::new().unwrap();
    {
        let mut dataset = Dataset::open(crashed.path()).unwrap();
        let file = all_files.iter().find(|f| f.file_path == "c1.py").unwrap();
        let rows: Vec<RevisionRecord> = all_revisions
            .iter()
            .filter(|r| r.file_path == "c1.py")
            .cloned()
            .collect();
        dataset.commit_unit(file, &rows).unwrap();
    }
    {
        let mut revisions = CheckpointStore::<RevisionRecord>::in_dir(crashed.path()).unwrap();
        let torn: Vec<RevisionRecord> = all_revisions
            .iter()
            .filter(|r| r.file_path == "h1.py")
            .take(1)
            .cloned()
            .collect();
        assert_eq!(revisions.append_rows(&torn).unwrap(), 1);
    }

    let dataset = Dataset::open(crashed.path()).unwrap();
    assert_eq!(
        dataset.unit_state(&UnitKey::new("octo/beta", "c1.py")),
        UnitState::Complete
    );
    assert_eq!(
        dataset.unit_state(&UnitKey::new("octo/beta", "h1.py")),
        UnitState::Partial
    );

    let miner = orchestrator(test_config(), beta(), dataset);
    let summary = miner.run(&repos()).await;
    let outcome = &summary.outcomes[0];
    assert!(outcome.is_persisted());
    assert_eq!(outcome.units_skipped, 1);
    assert_eq!(outcome.units_mined, 5);
    drop(miner);

    assert_eq!(snapshot(crashed.path()), snapshot(full.path()));
}

#[tokio::test]
async fn test_rerun_of_finished_output_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let miner = orchestrator(test_config(), beta(), Dataset::open(dir.path()).unwrap());
    miner.run(&repos()).await;
    let dataset = miner.into_dataset();
    let file_rows = dataset.files().row_count();
    let revision_rows = dataset.revisions().row_count();
    assert_eq!(file_rows, 6);
    drop(dataset);

    let miner = orchestrator(test_config(), beta(), Dataset::open(dir.path()).unwrap());
    let summary = miner.run(&repos()).await;
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.units_skipped, 6);
    assert_eq!(outcome.units_mined, 0);
    assert_eq!(outcome.revisions_written, 0);

    let dataset = miner.into_dataset();
    assert_eq!(dataset.files().row_count(), file_rows);
    assert_eq!(dataset.revisions().row_count(), revision_rows);
}
