use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use puzzle_importer::{
    CancelToken, Compression, ImportConfig, ImportError, ImportOptions, IngestFailure, Progress,
    RunStatus, import_puzzles,
};

const EXIT_STREAM: u8 = 1;
const EXIT_CORRUPT_STATE: u8 = 2;
const EXIT_USAGE: u8 = 3;
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Merge Lichess puzzles into puzzles.json until it reaches the target size"
)]
struct Cli {
    /// TOML file with import settings; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Dataset file to extend (created if missing)
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Corpus location: https:// URL, file:// URL or local path
    #[arg(long, value_name = "URL")]
    source: Option<String>,

    /// Compression of the corpus (inferred from the suffix when omitted)
    #[arg(long, value_name = "FORMAT", value_parser = parse_compression)]
    compression: Option<Compression>,

    /// Desired total number of puzzles after the run
    #[arg(long, value_name = "N")]
    target: Option<usize>,

    /// Minimum community popularity score
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    min_popularity: Option<i32>,

    /// Maximum rating deviation
    #[arg(long, value_name = "N")]
    max_rating_deviation: Option<u32>,

    /// Report progress every N accepted puzzles
    #[arg(long, value_name = "N")]
    progress_every: Option<usize>,

    /// Save puzzles accepted before a download failure
    #[arg(long)]
    persist_partial: bool,

    /// Run the import without writing the dataset
    #[arg(long)]
    dry_run: bool,

    /// Hide the progress spinner
    #[arg(long)]
    quiet: bool,
}

impl Cli {
    fn apply(&self, config: &mut ImportConfig) {
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(source) = &self.source {
            config.source_url = source.clone();
        }
        if self.compression.is_some() {
            config.compression = self.compression;
        }
        if let Some(target) = self.target {
            config.target_total_count = target;
        }
        if let Some(min) = self.min_popularity {
            config.min_popularity = min;
        }
        if let Some(max) = self.max_rating_deviation {
            config.max_rating_deviation = max;
        }
        if let Some(every) = self.progress_every {
            config.progress_every = every;
        }
        if self.persist_partial {
            config.persist_partial = true;
        }
    }
}

fn parse_compression(raw: &str) -> Result<Compression, String> {
    match raw {
        "zstd" | "zst" => Ok(Compression::Zstd),
        "gzip" | "gz" => Ok(Compression::Gzip),
        "plain" | "none" => Ok(Compression::Plain),
        other => Err(format!("unknown compression '{other}' (zstd, gzip, plain)")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => ImportConfig::from_toml(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ImportConfig::default(),
    };
    cli.apply(&mut config);
    let target = config.target_total_count;

    let cancel = CancelToken::new();
    install_signal_handlers(&cancel).context("failed to install signal handler")?;

    let spinner = (!cli.quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message("waiting for corpus");
        pb
    });

    let mut opts = ImportOptions::new(config);
    opts.cancel = cancel;
    opts.dry_run = cli.dry_run;
    if let Some(pb) = spinner.clone() {
        opts.progress = Some(Box::new(move |p: &Progress| {
            pb.set_message(format!(
                "found {}/{} valid puzzles (scanned {} lines)",
                p.accepted, p.needed, p.lines_read
            ));
        }));
    }

    let result = import_puzzles(opts);
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    match result {
        Ok(outcome) => {
            match outcome.status {
                RunStatus::AlreadyAtTarget => info!(
                    "No new puzzles needed: already have {} (target {target})",
                    outcome.dataset.len()
                ),
                RunStatus::ReachedTarget | RunStatus::SourceExhausted => {
                    if outcome.status == RunStatus::SourceExhausted {
                        warn!("Corpus exhausted before reaching target {target}");
                    }
                    info!("Import finished: {}", outcome.stats);
                    if outcome.saved {
                        info!("Dataset now holds {} puzzles", outcome.dataset.len());
                    }
                }
            }
            info!("{}", outcome.summary);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            report_failure(&failure);
            Ok(ExitCode::from(exit_code(&failure.error)))
        }
    }
}

/// First SIGINT/SIGTERM asks the pipeline to stop at the next line; a second
/// one exits immediately, for when a read is stalled.
fn install_signal_handlers(cancel: &CancelToken) -> std::io::Result<()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        // Must be registered before the flag setter so the first signal
        // sees the flag still unset.
        signal_hook::flag::register_conditional_shutdown(
            signal,
            i32::from(EXIT_CANCELLED),
            cancel.flag(),
        )?;
        signal_hook::flag::register(signal, cancel.flag())?;
    }
    Ok(())
}

fn report_failure(failure: &IngestFailure) {
    let accepted = failure.stats.accepted;
    match &failure.error {
        ImportError::Transport { .. } | ImportError::StreamCorrupt { .. } => {
            if failure.persisted {
                error!(
                    "Partial failure: {accepted} puzzles accepted before error were saved: {}",
                    failure.error
                );
            } else {
                error!(
                    "Partial failure: {accepted} puzzles accepted before error, nothing persisted: {}",
                    failure.error
                );
            }
            error!("Re-run the import to resume toward the target");
        }
        ImportError::CorruptState { .. } => {
            error!("Fatal: existing dataset unreadable: {}", failure.error);
        }
        ImportError::Cancelled => {
            warn!("Cancelled: {accepted} puzzles accepted, nothing persisted");
        }
        ImportError::Io { .. } | ImportError::Config(_) => {
            error!("{}", failure.error);
        }
    }
}

fn exit_code(err: &ImportError) -> u8 {
    match err {
        ImportError::Transport { .. } | ImportError::StreamCorrupt { .. } => EXIT_STREAM,
        ImportError::CorruptState { .. } => EXIT_CORRUPT_STATE,
        ImportError::Io { .. } | ImportError::Config(_) => EXIT_USAGE,
        ImportError::Cancelled => EXIT_CANCELLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_interrupt_sets_the_cancel_flag() {
        let cancel = CancelToken::new();
        install_signal_handlers(&cancel).unwrap();
        assert!(!cancel.is_cancelled());
        signal_hook::low_level::raise(signal_hook::consts::SIGINT).unwrap();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(exit_code(&ImportError::Cancelled), EXIT_CANCELLED);
        assert_eq!(
            exit_code(&ImportError::Config("bad".into())),
            EXIT_USAGE
        );
        assert_eq!(
            exit_code(&ImportError::Transport {
                source_name: "x".into(),
                reason: "reset".into(),
            }),
            EXIT_STREAM
        );
    }
}
