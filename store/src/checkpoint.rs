//! Append-only CSV tables with a primary-key index
//!
//! A `CheckpointStore` owns one table file. Opening it scans the existing rows
//! into an in-memory key index, so appends after a restart skip rows that are
//! already on disk and completion checks never touch the file again. Each
//! append is flushed and synced before returning.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::record::{Record, RecordKey, UnitKey};

/// One append-only table of `R` rows
pub struct CheckpointStore<R: Record> {
    path: PathBuf,
    units: HashMap<UnitKey, HashSet<String>>,
    rows: usize,
    duplicates: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> CheckpointStore<R> {
    /// Open (or lazily create) the table at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut store = Self {
            path: path.as_ref().to_path_buf(),
            units: HashMap::new(),
            rows: 0,
            duplicates: 0,
            _record: PhantomData,
        };
        store.load_index()?;

        log::info!(
            "Opened {} table at {} ({} rows, {} units)",
            R::TABLE,
            store.path.display(),
            store.rows,
            store.units.len()
        );
        if store.duplicates > 0 {
            log::warn!(
                "{} holds {} rows with an already-seen primary key; run dedup to repair",
                store.path.display(),
                store.duplicates
            );
        }

        Ok(store)
    }

    /// Open `<dir>/<table>.csv`
    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(table_path::<R>(dir.as_ref()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct primary keys on disk
    pub fn len(&self) -> usize {
        self.units.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Physical row count, duplicates included
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Rows whose key was already seen earlier in the file
    pub fn duplicate_rows(&self) -> usize {
        self.duplicates
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.units
            .get(&key.unit)
            .is_some_and(|items| items.contains(&key.item))
    }

    /// Distinct rows stored for `unit`
    pub fn unit_row_count(&self, unit: &UnitKey) -> usize {
        self.units.get(unit).map_or(0, HashSet::len)
    }

    /// True only when every expected item of `unit` is already stored.
    ///
    /// An empty expectation is never "done": nothing proves the unit ran.
    pub fn is_unit_done(&self, unit: &UnitKey, expected_items: &[String]) -> bool {
        if expected_items.is_empty() {
            return false;
        }
        match self.units.get(unit) {
            Some(items) => expected_items.iter().all(|item| items.contains(item)),
            None => false,
        }
    }

    /// Append rows whose key is not stored yet; returns how many were written.
    ///
    /// Duplicates inside `rows` keep their first occurrence. The header is
    /// written when the file is new, otherwise it must match `R::COLUMNS`.
    pub fn append_rows(&mut self, rows: &[R]) -> Result<usize> {
        let mut batch_keys = HashSet::new();
        let fresh: Vec<&R> = rows
            .iter()
            .filter(|row| {
                let key = row.key();
                !self.contains(&key) && batch_keys.insert(key)
            })
            .collect();

        if fresh.is_empty() {
            return Ok(0);
        }

        let write_header = !has_content(&self.path)?;
        if write_header {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        } else {
            self.verify_header()?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if write_header {
            writer.write_record(R::COLUMNS)?;
        }
        for row in &fresh {
            writer.serialize(row)?;
        }
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_data()?;

        for row in &fresh {
            self.index(row.key());
        }

        log::debug!(
            "Appended {} of {} rows to {}",
            fresh.len(),
            rows.len(),
            self.path.display()
        );

        Ok(fresh.len())
    }

    /// Decode every stored row, in file order
    pub fn read_all(&self) -> Result<Vec<R>> {
        if !has_content(&self.path)? {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize::<R>() {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Delete every row of `unit`; returns how many rows were dropped
    pub fn remove_unit(&mut self, unit: &UnitKey) -> Result<usize> {
        if !self.units.contains_key(unit) {
            return Ok(0);
        }
        let removed = self.rewrite(|row, _| row.unit() != *unit)?;
        log::info!(
            "Removed {} rows of {} from {}",
            removed,
            unit,
            self.path.display()
        );
        Ok(removed)
    }

    /// Keep the first row per primary key; returns how many rows were dropped
    pub fn dedup(&mut self) -> Result<usize> {
        if self.duplicates == 0 {
            return Ok(0);
        }
        let removed = self.rewrite(|row, seen| seen.insert(row.key()))?;
        log::info!(
            "Dropped {} duplicate rows from {}",
            removed,
            self.path.display()
        );
        Ok(removed)
    }

    /// Rewrite the table through a temp file, keeping rows accepted by `keep`
    fn rewrite<F>(&mut self, mut keep: F) -> Result<usize>
    where
        F: FnMut(&R, &mut HashSet<RecordKey>) -> bool,
    {
        let rows = self.read_all()?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        let mut seen = HashSet::new();
        let mut kept = 0;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut temp);
            writer.write_record(R::COLUMNS)?;
            for row in &rows {
                if keep(row, &mut seen) {
                    writer.serialize(row)?;
                    kept += 1;
                }
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path)?;

        self.load_index()?;
        Ok(rows.len() - kept)
    }

    fn index(&mut self, key: RecordKey) -> bool {
        self.rows += 1;
        let fresh = self.units.entry(key.unit).or_default().insert(key.item);
        if !fresh {
            self.duplicates += 1;
        }
        fresh
    }

    fn verify_header(&self) -> Result<()> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let found: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        check_schema::<R>(&self.path, &found)
    }

    /// Scan the file into the key index, truncating a torn final row
    fn load_index(&mut self) -> Result<()> {
        self.units.clear();
        self.rows = 0;
        self.duplicates = 0;

        if !has_content(&self.path)? {
            return Ok(());
        }

        let bytes = std::fs::read(&self.path)?;
        if !bytes.contains(&b'\n') {
            // Crashed while writing the header of a brand new table.
            log::warn!("Discarding torn header in {}", self.path.display());
            return self.truncate(0, bytes.len());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes.as_slice());

        let headers = reader.headers()?.clone();
        let found: Vec<String> = headers.iter().map(String::from).collect();
        check_schema::<R>(&self.path, &found)?;

        // (key, byte offset where the row starts)
        let mut rows: Vec<(RecordKey, u64)> = Vec::new();
        let mut record = csv::StringRecord::new();
        let mut torn_at: Option<u64> = None;

        loop {
            let start = reader.position().byte();
            let failure = match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => match record.deserialize::<R>(Some(&headers)) {
                    Ok(row) => {
                        rows.push((row.key(), start));
                        continue;
                    }
                    Err(e) => (record.position().map_or(0, |p| p.line()), e.to_string()),
                },
                Err(e) => (e.position().map_or(0, |p| p.line()), e.to_string()),
            };

            if !at_end(&mut reader) {
                return Err(StoreError::MalformedRow {
                    path: self.path.clone(),
                    line: failure.0,
                    reason: failure.1,
                });
            }
            torn_at = Some(start);
            break;
        }

        // A row without its terminator was cut off mid-write.
        if torn_at.is_none() && bytes.last() != Some(&b'\n') {
            torn_at = rows.pop().map(|(_, start)| start);
        }

        if let Some(end) = torn_at {
            log::warn!(
                "Truncating torn trailing row in {} at byte {}",
                self.path.display(),
                end
            );
            self.truncate(end, bytes.len())?;
        }

        for (key, _) in rows {
            self.index(key);
        }
        Ok(())
    }

    fn truncate(&self, len: u64, was: usize) -> Result<()> {
        log::debug!("Truncating {} from {} to {} bytes", self.path.display(), was, len);
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(len)?;
        file.sync_data()?;
        Ok(())
    }
}

/// `<dir>/<table>.csv`
pub fn table_path<R: Record>(dir: &Path) -> PathBuf {
    dir.join(format!("{}.csv", R::TABLE))
}

/// One-shot completion check against a table file
pub fn is_unit_done<R: Record>(
    path: impl AsRef<Path>,
    unit: &UnitKey,
    expected_items: &[String],
) -> Result<bool> {
    Ok(CheckpointStore::<R>::open(path)?.is_unit_done(unit, expected_items))
}

fn check_schema<R: Record>(path: &Path, found: &[String]) -> Result<()> {
    if found.len() != R::COLUMNS.len() || found.iter().zip(R::COLUMNS).any(|(f, e)| f != e) {
        return Err(StoreError::schema_mismatch(path, R::COLUMNS, found));
    }
    Ok(())
}

fn has_content(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len() > 0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// True when nothing decodable follows the current reader position
fn at_end(reader: &mut csv::Reader<&[u8]>) -> bool {
    let mut probe = csv::StringRecord::new();
    !matches!(reader.read_record(&mut probe), Ok(true))
}
