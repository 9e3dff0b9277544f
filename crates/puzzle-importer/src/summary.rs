//! Post-run statistics over a dataset.

use std::collections::HashMap;
use std::fmt;

use crate::record::PuzzleRecord;

/// Rating bands reported in the distribution, half-open `[lo, hi)`.
pub const RATING_BANDS: [(u32, u32); 5] = [
    (600, 1000),
    (1000, 1400),
    (1400, 1800),
    (1800, 2200),
    (2200, 2800),
];

const TOP_THEMES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub total: usize,
    pub min_rating: Option<u32>,
    pub max_rating: Option<u32>,
    pub mean_rating: Option<u32>,
    /// One count per entry of [`RATING_BANDS`].
    pub band_counts: [usize; 5],
    /// Ratings outside every band.
    pub other_band: usize,
    pub unique_themes: usize,
    /// Most frequent themes, ties broken alphabetically.
    pub top_themes: Vec<(String, usize)>,
}

impl DatasetSummary {
    pub fn from_records(records: &[PuzzleRecord]) -> Self {
        let mut band_counts = [0usize; 5];
        let mut other_band = 0usize;
        let mut theme_counts: HashMap<&str, usize> = HashMap::new();
        let mut rating_sum = 0u64;
        for record in records {
            rating_sum += u64::from(record.rating);
            match RATING_BANDS
                .iter()
                .position(|&(lo, hi)| (lo..hi).contains(&record.rating))
            {
                Some(idx) => band_counts[idx] += 1,
                None => other_band += 1,
            }
            for theme in &record.themes {
                *theme_counts.entry(theme.as_str()).or_default() += 1;
            }
        }
        let unique_themes = theme_counts.len();
        let mut top_themes: Vec<(String, usize)> = theme_counts
            .into_iter()
            .map(|(theme, count)| (theme.to_string(), count))
            .collect();
        top_themes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_themes.truncate(TOP_THEMES);

        Self {
            total: records.len(),
            min_rating: records.iter().map(|r| r.rating).min(),
            max_rating: records.iter().map(|r| r.rating).max(),
            mean_rating: (!records.is_empty()).then(|| (rating_sum / records.len() as u64) as u32),
            band_counts,
            other_band,
            unique_themes,
            top_themes,
        }
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Puzzle statistics:")?;
        writeln!(f, "  Total puzzles: {}", self.total)?;
        if let (Some(min), Some(max), Some(mean)) = (self.min_rating, self.max_rating, self.mean_rating) {
            writeln!(f, "  Rating range: {min} - {max}")?;
            writeln!(f, "  Average rating: {mean}")?;
        }
        writeln!(f, "  Rating distribution:")?;
        for ((lo, hi), count) in RATING_BANDS.iter().zip(self.band_counts.iter()) {
            writeln!(f, "    {lo}-{hi}: {count} puzzles")?;
        }
        if self.other_band > 0 {
            writeln!(f, "    other: {} puzzles", self.other_band)?;
        }
        writeln!(f, "  Unique themes: {}", self.unique_themes)?;
        write!(f, "  Top themes:")?;
        for (theme, count) in &self.top_themes {
            write!(f, "\n    - {theme}: {count}")?;
        }
        Ok(())
    }
}
