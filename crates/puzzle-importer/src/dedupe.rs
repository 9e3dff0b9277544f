use std::collections::HashSet;

use crate::record::{DedupeKey, PuzzleRecord};

/// Positions already present in the dataset or accepted earlier in the run.
///
/// Only grows. `try_insert` is the single check-and-insert step, so the same
/// position appearing twice in the corpus is accepted at most once.
#[derive(Debug, Default)]
pub struct DedupeIndex {
    keys: HashSet<DedupeKey>,
}

impl DedupeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every existing record's key. Returns how many records collided
    /// with an earlier one, i.e. duplicates already on disk.
    pub fn seed(&mut self, records: &[PuzzleRecord]) -> usize {
        self.keys.reserve(records.len());
        records
            .iter()
            .filter(|record| !self.keys.insert(record.dedupe_key()))
            .count()
    }

    /// Returns `true` when the key was not present and has been added.
    pub fn try_insert(&mut self, key: DedupeKey) -> bool {
        self.keys.insert(key)
    }

    pub fn contains(&self, key: &DedupeKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(position: &str) -> PuzzleRecord {
        PuzzleRecord {
            assigned_id: 1,
            position: position.into(),
            solution: vec!["a1a2".into()],
            rating: 1000,
            themes: Vec::new(),
            popularity: 90,
            external_id: None,
            rating_deviation: Some(70),
        }
    }

    #[test]
    fn seeded_keys_block_reinsertion() {
        let mut index = DedupeIndex::new();
        let dupes = index.seed(&[
            record("6k1/5ppp/8/8/8/8/5PPP/3R2K1 w - - 0 1"),
            record("6k1/5ppp/8/8/8/8/5PPP/3R2K1 b - - 0 1"),
        ]);
        assert_eq!(dupes, 0);
        assert_eq!(index.len(), 2);
        // Same tactical content, different move counters.
        assert!(!index.try_insert(DedupeKey::from_position(
            "6k1/5ppp/8/8/8/8/5PPP/3R2K1 w - - 12 40"
        )));
        assert!(index.try_insert(DedupeKey::from_position(
            "6k1/5ppp/8/8/8/8/5PPP/4R1K1 w - - 0 1"
        )));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn try_insert_accepts_a_key_once() {
        let mut index = DedupeIndex::new();
        let key = DedupeKey::from_position("8/8/8/8/8/8/8/K6k w - - 0 1");
        assert!(index.try_insert(key.clone()));
        assert!(!index.try_insert(key.clone()));
        assert!(index.contains(&key));
    }

    #[test]
    fn seed_reports_existing_duplicates() {
        let mut index = DedupeIndex::new();
        let dupes = index.seed(&[
            record("8/8/8/8/8/8/8/K6k w - - 0 1"),
            record("8/8/8/8/8/8/8/K6k w - - 3 9"),
        ]);
        assert_eq!(dupes, 1);
        assert_eq!(index.len(), 1);
    }
}
