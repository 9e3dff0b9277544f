//! Loading and atomically rewriting `puzzles.json`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::ImportError;
use crate::record::PuzzleRecord;

/// The ordered collection of puzzles persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    records: Vec<PuzzleRecord>,
}

impl Dataset {
    pub fn new(records: Vec<PuzzleRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[PuzzleRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PuzzleRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn push(&mut self, record: PuzzleRecord) {
        self.records.push(record);
    }

    /// Ids are exactly `1..=len` in stored order.
    pub fn ids_contiguous(&self) -> bool {
        self.records
            .iter()
            .enumerate()
            .all(|(idx, r)| r.assigned_id as usize == idx + 1)
    }

    /// Already in the form [`DatasetStore::save_atomic`] would write.
    pub fn is_canonical(&self) -> bool {
        self.ids_contiguous() && self.records.windows(2).all(|w| w[0].rating <= w[1].rating)
    }

    /// Renumber ids `1..=len` in stored order. Returns whether anything changed.
    pub fn normalize_ids(&mut self) -> bool {
        let mut changed = false;
        for (idx, record) in self.records.iter_mut().enumerate() {
            let id = idx as u32 + 1;
            if record.assigned_id != id {
                record.assigned_id = id;
                changed = true;
            }
        }
        changed
    }

    /// Remove records that fail [`PuzzleRecord::validate`], keeping the
    /// rest in order. Returns the id and reason of each removed record.
    pub fn drop_invalid(&mut self) -> Vec<(u32, String)> {
        let mut dropped = Vec::new();
        self.records.retain(|record| match record.validate() {
            Ok(()) => true,
            Err(reason) => {
                dropped.push((record.assigned_id, reason));
                false
            }
        });
        dropped
    }

    /// Sort by rating (stable, ties keep id order) and renumber.
    pub fn canonicalize(mut self) -> Self {
        self.records.sort_by_key(|r| (r.rating, r.assigned_id));
        self.normalize_ids();
        self
    }
}

/// File-backed dataset. No other writer is assumed.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Load the persisted dataset, or an empty one if nothing exists yet.
    ///
    /// An existing but unreadable file is `CorruptState`; it is never
    /// treated as empty. Records that could not be written back (bad
    /// position, missing or malformed solution) are dropped with a warning.
    pub fn load(&self) -> Result<Dataset, ImportError> {
        self.load_checked().map(|(dataset, _)| dataset)
    }

    /// [`load`](Self::load), plus the number of invalid records dropped.
    pub fn load_checked(&self) -> Result<(Dataset, usize), ImportError> {
        if !self.path.exists() {
            info!("No existing dataset at {}; starting empty", self.path.display());
            return Ok((Dataset::default(), 0));
        }
        let contents =
            fs::read_to_string(&self.path).map_err(|err| ImportError::io(&self.path, err))?;
        let mut dataset: Dataset =
            serde_json::from_str(&contents).map_err(|err| ImportError::CorruptState {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
        let dropped = dataset.drop_invalid();
        for (id, reason) in &dropped {
            warn!("Dropping existing puzzle {id}: {reason}");
        }
        if !dropped.is_empty() {
            warn!(
                "Dropped {} invalid puzzle(s) from {}",
                dropped.len(),
                self.path.display()
            );
        }
        info!(
            "Loaded {} existing puzzles from {}",
            dataset.len(),
            self.path.display()
        );
        Ok((dataset, dropped.len()))
    }

    /// Write `dataset` in canonical order via a temp file and rename, so
    /// readers see either the old file or the new one. Returns what was written.
    pub fn save_atomic(&self, dataset: &Dataset) -> Result<Dataset, ImportError> {
        let canonical = dataset.clone().canonicalize();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| ImportError::io(parent, err))?;
        }
        let tmp = self.tmp_path();
        if let Err(err) = write_json(&tmp, &canonical) {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        fs::rename(&tmp, &self.path).map_err(|err| {
            let _ = fs::remove_file(&tmp);
            ImportError::io(&self.path, err)
        })?;
        sync_parent(&self.path);
        info!(
            "Saved total {} puzzles to {}",
            canonical.len(),
            self.path.display()
        );
        Ok(canonical)
    }
}

fn write_json(path: &Path, dataset: &Dataset) -> Result<(), ImportError> {
    let file = File::create(path).map_err(|err| ImportError::io(path, err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, dataset)
        .map_err(|err| ImportError::io(path, err.into()))?;
    writer
        .write_all(b"\n")
        .map_err(|err| ImportError::io(path, err))?;
    let file = writer
        .into_inner()
        .map_err(|err| ImportError::io(path, err.into_error()))?;
    file.sync_all().map_err(|err| ImportError::io(path, err))
}

// Persist the rename itself. Best effort: not every platform can open a
// directory for syncing.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: u32, rating: u32, position: &str) -> PuzzleRecord {
        PuzzleRecord {
            assigned_id: id,
            position: position.into(),
            solution: vec!["a1a2".into()],
            rating,
            themes: vec!["endgame".into()],
            popularity: 90,
            external_id: Some(format!("p{id}")),
            rating_deviation: Some(75),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = DatasetStore::new(dir.path().join("puzzles.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn unreadable_file_is_corrupt_state_and_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("puzzles.json");
        fs::write(&path, "[{\"id\": 1, \"fen\": ").unwrap();
        let store = DatasetStore::new(&path);
        assert!(matches!(
            store.load(),
            Err(ImportError::CorruptState { .. })
        ));
        fs::write(&path, "").unwrap();
        assert!(matches!(
            store.load(),
            Err(ImportError::CorruptState { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn save_sorts_by_rating_and_renumbers() {
        let dir = tempdir().unwrap();
        let store = DatasetStore::new(dir.path().join("nested/puzzles.json"));
        let dataset = Dataset::new(vec![
            record(1, 1500, "8/8/8/8/8/8/8/K6k w - - 0 1"),
            record(2, 900, "8/8/8/8/8/8/8/K5k1 w - - 0 1"),
            record(3, 1500, "8/8/8/8/8/8/8/K4k2 w - - 0 1"),
            record(4, 1200, "8/8/8/8/8/8/8/K3k3 w - - 0 1"),
        ]);
        let written = store.save_atomic(&dataset).unwrap();
        let ids: Vec<u32> = written.records().iter().map(|r| r.assigned_id).collect();
        let origin: Vec<&str> = written
            .records()
            .iter()
            .map(|r| r.external_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        // Equal ratings keep their previous relative order.
        assert_eq!(origin, vec!["p2", "p4", "p1", "p3"]);
        assert!(written.is_canonical());
        assert_eq!(store.load().unwrap(), written);
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn rewriting_canonical_data_is_byte_identical() {
        let dir = tempdir().unwrap();
        let store = DatasetStore::new(dir.path().join("puzzles.json"));
        let dataset = Dataset::new(vec![
            record(1, 1300, "8/8/8/8/8/8/8/K6k w - - 0 1"),
            record(2, 800, "8/8/8/8/8/8/8/K5k1 w - - 0 1"),
        ]);
        store.save_atomic(&dataset).unwrap();
        let first = fs::read(store.path()).unwrap();
        let loaded = store.load().unwrap();
        store.save_atomic(&loaded).unwrap();
        assert_eq!(fs::read(store.path()).unwrap(), first);
        assert!(first.ends_with(b"]\n"));
    }

    #[test]
    fn failed_save_keeps_previous_file() {
        let dir = tempdir().unwrap();
        let store = DatasetStore::new(dir.path().join("puzzles.json"));
        let original = Dataset::new(vec![record(1, 1000, "8/8/8/8/8/8/8/K6k w - - 0 1")]);
        store.save_atomic(&original).unwrap();
        let before = fs::read(store.path()).unwrap();

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(store.tmp_path()).unwrap();
        let bigger = Dataset::new(vec![
            record(1, 1000, "8/8/8/8/8/8/8/K6k w - - 0 1"),
            record(2, 1100, "8/8/8/8/8/8/8/K5k1 w - - 0 1"),
        ]);
        assert!(matches!(
            store.save_atomic(&bigger),
            Err(ImportError::Io { .. })
        ));
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn load_drops_records_that_cannot_be_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("puzzles.json");
        fs::write(
            &path,
            r#"[
  {"id": 1, "fen": "not a fen", "moves": "", "rating": 900, "themes": "", "popularity": 90},
  {"id": 2, "fen": "8/8/8/8/8/8/8/K6k w - - 0 1", "moves": "", "rating": 950, "themes": "", "popularity": 90},
  {"id": 3, "fen": "8/8/8/8/8/8/8/K5k1 w - - 0 1", "moves": "a1a2", "rating": 1000, "themes": "", "popularity": 90}
]"#,
        )
        .unwrap();
        let store = DatasetStore::new(&path);
        let (dataset, dropped) = store.load_checked().unwrap();
        assert_eq!(dropped, 2);
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records()[0].assigned_id, 3);

        let written = store.save_atomic(&dataset).unwrap();
        assert_eq!(written.records()[0].assigned_id, 1);
        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("not a fen"));
        assert!(!on_disk.contains("\"moves\": \"\""));
    }

    #[test]
    fn normalize_ids_reports_changes() {
        let mut dataset = Dataset::new(vec![
            record(1001, 600, "8/8/8/8/8/8/8/K6k w - - 0 1"),
            record(2001, 700, "8/8/8/8/8/8/8/K5k1 w - - 0 1"),
        ]);
        assert!(!dataset.ids_contiguous());
        assert!(dataset.normalize_ids());
        assert!(dataset.ids_contiguous());
        assert!(!dataset.normalize_ids());
    }
}
