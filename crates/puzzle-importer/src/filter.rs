use crate::config::ImportConfig;
use crate::record::PuzzleRecord;

/// Acceptance thresholds for community quality signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityFilter {
    /// Reject puzzles voted down (or barely voted on) by players.
    pub min_popularity: i32,
    /// Reject puzzles whose rating estimate has not settled yet.
    pub max_rating_deviation: u32,
}

impl QualityFilter {
    pub fn new(min_popularity: i32, max_rating_deviation: u32) -> Self {
        Self {
            min_popularity,
            max_rating_deviation,
        }
    }

    pub fn from_config(config: &ImportConfig) -> Self {
        Self::new(config.min_popularity, config.max_rating_deviation)
    }

    /// Records without a known deviation never pass.
    pub fn accept(&self, record: &PuzzleRecord) -> bool {
        let deviation_ok = record
            .rating_deviation
            .is_some_and(|rd| rd <= self.max_rating_deviation);
        record.popularity >= self.min_popularity && deviation_ok
    }
}
