//! Where corpus lines come from.
//!
//! The pipeline only sees [`CorpusSource`]; opening is deferred until the
//! pipeline knows it actually needs more puzzles.

use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use log::info;

use crate::config::ImportConfig;
use crate::decoder::{Compression, Decoder};
use crate::error::ImportError;

/// A finite, single-pass stream of corpus lines.
pub type LineStream = Box<dyn Iterator<Item = Result<String, ImportError>>>;

pub trait CorpusSource {
    /// Open the underlying resource and start decoding. Called at most once
    /// per run.
    fn open(&self) -> Result<LineStream, ImportError>;

    /// Human-readable location for logs and error messages.
    fn describe(&self) -> String;
}

/// Streams the corpus over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpCorpus {
    pub url: String,
    pub compression: Compression,
    pub timeout: Duration,
}

impl HttpCorpus {
    pub fn new(url: impl Into<String>, compression: Compression, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            compression,
            timeout,
        }
    }
}

impl CorpusSource for HttpCorpus {
    fn open(&self) -> Result<LineStream, ImportError> {
        info!("Downloading stream from {}", self.url);
        // Connect/read timeouts only; a whole-request timeout would cut off
        // multi-gigabyte downloads.
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(self.timeout)
            .timeout_read(self.timeout)
            .build();
        let response = agent
            .get(&self.url)
            .set(
                "User-Agent",
                concat!("puzzle-importer/", env!("CARGO_PKG_VERSION")),
            )
            .call()
            .map_err(|err| ImportError::Transport {
                source_name: self.url.clone(),
                reason: err.to_string(),
            })?;
        let decoder = Decoder::new(self.url.clone(), response.into_reader(), self.compression)?;
        Ok(Box::new(decoder))
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.url, self.compression)
    }
}

/// Reads a previously downloaded dump from disk.
#[derive(Debug, Clone)]
pub struct FileCorpus {
    pub path: PathBuf,
    pub compression: Compression,
}

impl FileCorpus {
    pub fn new(path: impl Into<PathBuf>, compression: Compression) -> Self {
        Self {
            path: path.into(),
            compression,
        }
    }
}

impl CorpusSource for FileCorpus {
    fn open(&self) -> Result<LineStream, ImportError> {
        info!("Reading corpus from {}", self.path.display());
        let file = File::open(&self.path).map_err(|err| ImportError::Transport {
            source_name: self.path.display().to_string(),
            reason: err.to_string(),
        })?;
        let decoder = Decoder::new(self.path.display().to_string(), file, self.compression)?;
        Ok(Box::new(decoder))
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.path.display(), self.compression)
    }
}

/// Build the source named by `config.source_url`: `http(s)://` goes over the
/// network, `file://` and bare paths read from disk.
pub fn corpus_for(config: &ImportConfig) -> Box<dyn CorpusSource> {
    let location = config.source_url.as_str();
    let compression = config
        .compression
        .unwrap_or_else(|| Compression::infer(location));
    if location.starts_with("http://") || location.starts_with("https://") {
        Box::new(HttpCorpus::new(
            location,
            compression,
            Duration::from_secs(config.http_timeout_secs),
        ))
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        Box::new(FileCorpus::new(path, compression))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn picks_source_kind_from_location() {
        let mut config = ImportConfig::default();
        assert!(corpus_for(&config).describe().starts_with("https://"));
        assert!(corpus_for(&config).describe().ends_with("(zstd)"));

        config.source_url = "file:///data/dump.csv.gz".into();
        assert_eq!(corpus_for(&config).describe(), "/data/dump.csv.gz (gzip)");

        config.source_url = "dump.csv".into();
        config.compression = Some(Compression::Zstd);
        assert_eq!(corpus_for(&config).describe(), "dump.csv (zstd)");
    }

    #[test]
    fn file_corpus_streams_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.csv.zst");
        let body = zstd::stream::encode_all(&b"a\nb\n"[..], 3).unwrap();
        File::create(&path).unwrap().write_all(&body).unwrap();

        let source = FileCorpus::new(&path, Compression::Zstd);
        let lines: Vec<String> = source.open().unwrap().map(Result::unwrap).collect();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn missing_file_is_a_transport_error() {
        let dir = tempdir().unwrap();
        let source = FileCorpus::new(dir.path().join("absent.csv.zst"), Compression::Zstd);
        assert!(matches!(
            source.open().err(),
            Some(ImportError::Transport { .. })
        ));
    }
}
