//! Decode → parse → filter → dedupe → accumulate, up to a target size.
//!
//! A run is single-threaded and owns its working copy of the dataset. It
//! never writes to disk; committing is the caller's job, and only on success
//! (or on a stream failure when partial persistence is enabled).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::config::ImportConfig;
use crate::dedupe::DedupeIndex;
use crate::error::{ImportError, ParseError};
use crate::filter::QualityFilter;
use crate::parser::RecordParser;
use crate::source::CorpusSource;
use crate::store::Dataset;

/// Cooperative cancellation flag, checked once per corpus line.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The shared flag, for registering with signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Per-run counters. Row-level rejections end up here instead of in errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines_read: u64,
    pub header_rows: u64,
    pub blank_lines: u64,
    pub malformed: u64,
    pub bad_numeric: u64,
    pub filtered: u64,
    pub duplicates: u64,
    pub accepted: usize,
}

impl IngestStats {
    /// Rows dropped because they could not be parsed.
    pub fn skipped(&self) -> u64 {
        self.malformed + self.bad_numeric
    }
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} accepted from {} lines ({} malformed, {} bad numeric, {} below quality, {} duplicate)",
            self.accepted,
            self.lines_read,
            self.malformed,
            self.bad_numeric,
            self.filtered,
            self.duplicates
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The dataset was already at or above target; the source was not opened.
    AlreadyAtTarget,
    ReachedTarget,
    /// The corpus ran out before the target was reached.
    SourceExhausted,
}

/// Snapshot handed to the progress hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub accepted: usize,
    pub needed: usize,
    pub lines_read: u64,
}

#[derive(Debug)]
pub struct IngestReport {
    pub dataset: Dataset,
    pub stats: IngestStats,
    pub status: RunStatus,
}

/// A run that stopped on a stream-level, state-level or cancellation error.
#[derive(Debug)]
pub struct IngestFailure {
    pub error: ImportError,
    pub stats: IngestStats,
    /// Working copy at the time of failure; only kept when partial
    /// persistence is enabled and the failure was a stream error.
    pub partial: Option<Dataset>,
    /// Set once the partial dataset has been written.
    pub persisted: bool,
}

impl IngestFailure {
    pub fn new(error: ImportError, stats: IngestStats) -> Self {
        Self {
            error,
            stats,
            partial: None,
            persisted: false,
        }
    }
}

impl From<ImportError> for IngestFailure {
    fn from(error: ImportError) -> Self {
        IngestFailure::new(error, IngestStats::default())
    }
}

impl fmt::Display for IngestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for IngestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

type ProgressHook<'a> = Box<dyn FnMut(&Progress) + 'a>;

pub struct IngestionPipeline<'a> {
    target_total_count: usize,
    progress_every: usize,
    persist_partial: bool,
    parser: RecordParser,
    filter: QualityFilter,
    cancel: CancelToken,
    progress: Option<ProgressHook<'a>>,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(config: &ImportConfig) -> Self {
        Self {
            target_total_count: config.target_total_count,
            progress_every: config.progress_every.max(1),
            persist_partial: config.persist_partial,
            parser: RecordParser::new(),
            filter: QualityFilter::from_config(config),
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called every `progress_every` accepted puzzles.
    pub fn with_progress(mut self, hook: impl FnMut(&Progress) + 'a) -> Self {
        self.progress = Some(Box::new(hook));
        self
    }

    /// Merge new puzzles from `source` into `existing`.
    ///
    /// `existing` is returned untouched, without opening `source`, when it
    /// already holds `target_total_count` puzzles. Otherwise ids are
    /// renumbered `1..=len` first so new ids cannot collide.
    pub fn run(
        &mut self,
        existing: Dataset,
        source: &dyn CorpusSource,
    ) -> Result<IngestReport, IngestFailure> {
        let mut stats = IngestStats::default();
        let existing_count = existing.len();
        if existing_count >= self.target_total_count {
            info!(
                "Already have {} puzzles (target {}); nothing to import",
                existing_count, self.target_total_count
            );
            return Ok(IngestReport {
                dataset: existing,
                stats,
                status: RunStatus::AlreadyAtTarget,
            });
        }
        if self.cancel.is_cancelled() {
            return Err(IngestFailure::new(ImportError::Cancelled, stats));
        }
        if u32::try_from(self.target_total_count).is_err() {
            return Err(IngestFailure::new(
                ImportError::Config(format!(
                    "target_total_count {} exceeds the id range",
                    self.target_total_count
                )),
                stats,
            ));
        }

        let mut dataset = existing;
        if dataset.normalize_ids() {
            warn!("Existing puzzle ids were not 1..{existing_count}; renumbered in stored order");
        }
        let mut index = DedupeIndex::new();
        let already_duplicated = index.seed(dataset.records());
        if already_duplicated > 0 {
            warn!("{already_duplicated} existing puzzle(s) repeat an earlier position");
        }

        let needed = self.target_total_count - existing_count;
        let lines = source
            .open()
            .map_err(|err| IngestFailure::new(err, stats))?;
        info!("Need {needed} more puzzles from {}", source.describe());

        let mut status = RunStatus::SourceExhausted;
        for line in lines {
            if self.cancel.is_cancelled() {
                info!("Import cancelled after {} accepted puzzles", stats.accepted);
                return Err(IngestFailure::new(ImportError::Cancelled, stats));
            }
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("Stream failed after {} lines: {err}", stats.lines_read);
                    return Err(self.fail(err, stats, dataset));
                }
            };
            stats.lines_read += 1;
            if line.trim().is_empty() {
                stats.blank_lines += 1;
                continue;
            }

            let mut record = match self.parser.parse(&line) {
                Ok(record) => record,
                Err(ParseError::Header) => {
                    stats.header_rows += 1;
                    continue;
                }
                Err(err @ ParseError::Malformed(_)) => {
                    debug!("line {}: {err}", stats.lines_read);
                    stats.malformed += 1;
                    continue;
                }
                Err(err @ ParseError::BadNumeric { .. }) => {
                    debug!("line {}: {err}", stats.lines_read);
                    stats.bad_numeric += 1;
                    continue;
                }
            };
            if !self.filter.accept(&record) {
                stats.filtered += 1;
                continue;
            }
            if !index.try_insert(record.dedupe_key()) {
                stats.duplicates += 1;
                continue;
            }

            // Bounded by target_total_count, checked above to fit in u32.
            record.assigned_id = (existing_count + stats.accepted + 1) as u32;
            dataset.push(record);
            stats.accepted += 1;

            if stats.accepted % self.progress_every == 0 {
                if let Some(hook) = self.progress.as_mut() {
                    hook(&Progress {
                        accepted: stats.accepted,
                        needed,
                        lines_read: stats.lines_read,
                    });
                }
            }
            if existing_count + stats.accepted == self.target_total_count {
                status = RunStatus::ReachedTarget;
                break;
            }
        }

        info!("Collected {} new puzzles: {stats}", stats.accepted);
        Ok(IngestReport {
            dataset,
            stats,
            status,
        })
    }

    fn fail(&self, error: ImportError, stats: IngestStats, dataset: Dataset) -> IngestFailure {
        let keep = self.persist_partial && error.is_retryable() && stats.accepted > 0;
        IngestFailure {
            error,
            stats,
            partial: keep.then_some(dataset),
            persisted: false,
        }
    }
}
