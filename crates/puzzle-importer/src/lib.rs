//! Merge the Lichess puzzle corpus into the app's `puzzles.json`.
//!
//! [`import_puzzles`] is the whole run: load the existing dataset, stream
//! new puzzles from the corpus until the target size is reached, and rewrite
//! the file atomically. Nothing is written when the run fails, unless
//! partial persistence was asked for.

pub mod config;
pub mod decoder;
pub mod dedupe;
pub mod error;
pub mod filter;
pub mod parser;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod store;
pub mod summary;

use log::{error, info, warn};

pub use config::ImportConfig;
pub use decoder::{Compression, Decoder};
pub use dedupe::DedupeIndex;
pub use error::{ImportError, ParseError};
pub use filter::QualityFilter;
pub use parser::RecordParser;
pub use pipeline::{
    CancelToken, IngestFailure, IngestReport, IngestStats, IngestionPipeline, Progress, RunStatus,
};
pub use record::{DedupeKey, Fen, PuzzleRecord};
pub use source::{CorpusSource, FileCorpus, HttpCorpus, LineStream, corpus_for};
pub use store::{Dataset, DatasetStore};
pub use summary::DatasetSummary;

/// Everything one import run needs.
pub struct ImportOptions<'a> {
    pub config: ImportConfig,
    /// Defaults to the source named by `config.source_url`.
    pub source: Option<Box<dyn CorpusSource>>,
    pub cancel: CancelToken,
    /// Run the pipeline but leave the dataset file untouched.
    pub dry_run: bool,
    pub progress: Option<Box<dyn FnMut(&Progress) + 'a>>,
}

impl<'a> ImportOptions<'a> {
    pub fn new(config: ImportConfig) -> Self {
        Self {
            config,
            source: None,
            cancel: CancelToken::new(),
            dry_run: false,
            progress: None,
        }
    }
}

#[derive(Debug)]
pub struct ImportOutcome {
    pub status: RunStatus,
    pub stats: IngestStats,
    /// The dataset as written (or as it would have been, for dry runs).
    pub dataset: Dataset,
    pub saved: bool,
    pub summary: DatasetSummary,
}

pub fn import_puzzles(opts: ImportOptions<'_>) -> Result<ImportOutcome, IngestFailure> {
    let ImportOptions {
        config,
        source,
        cancel,
        dry_run,
        progress,
    } = opts;
    config.validate()?;

    let store = DatasetStore::new(&config.output_path);
    let (existing, dropped) = store.load_checked()?;
    let already_canonical = existing.is_canonical();
    let source = source.unwrap_or_else(|| corpus_for(&config));

    let mut pipeline = IngestionPipeline::new(&config).with_cancel(cancel);
    if let Some(hook) = progress {
        pipeline = pipeline.with_progress(hook);
    }

    let report = match pipeline.run(existing, source.as_ref()) {
        Ok(report) => report,
        Err(mut failure) => {
            if let Some(partial) = failure.partial.take() {
                if dry_run {
                    info!("Dry run: not saving partial progress");
                } else {
                    match store.save_atomic(&partial) {
                        Ok(_) => {
                            warn!(
                                "Saved {} puzzles accepted before the failure",
                                failure.stats.accepted
                            );
                            failure.persisted = true;
                        }
                        Err(err) => error!("Failed to save partial progress: {err}"),
                    }
                }
            }
            return Err(failure);
        }
    };

    // Invalid records dropped at load must not survive on disk, even when
    // the run itself was a no-op.
    let needs_write = dropped > 0
        || (report.status != RunStatus::AlreadyAtTarget
            && (report.stats.accepted > 0 || !already_canonical));
    let (dataset, saved) = if !needs_write {
        (report.dataset, false)
    } else if dry_run {
        info!("Dry run: leaving {} untouched", store.path().display());
        (report.dataset.canonicalize(), false)
    } else {
        let written = store
            .save_atomic(&report.dataset)
            .map_err(|err| IngestFailure::new(err, report.stats))?;
        (written, true)
    };

    Ok(ImportOutcome {
        status: report.status,
        stats: report.stats,
        summary: DatasetSummary::from_records(dataset.records()),
        dataset,
        saved,
    })
}
