//! Error taxonomy for an import run.
//!
//! Stream-level and state-level failures are [`ImportError`]s and abort the
//! run. Row-level failures are [`ParseError`]s; the pipeline counts and skips
//! them without ever surfacing them as a failure.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that terminate an import run.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The corpus could not be reached, or the connection dropped mid-stream.
    #[error("transport error reading '{source_name}': {reason}")]
    Transport { source_name: String, reason: String },
    /// The compressed framing (or the text inside it) is invalid.
    #[error("corrupt corpus stream '{source_name}': {reason}")]
    StreamCorrupt { source_name: String, reason: String },
    /// A dataset exists on disk but cannot be deserialized.
    #[error("existing dataset {} is unreadable: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("import cancelled")]
    Cancelled,
}

impl ImportError {
    /// Re-invoking the import may succeed after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ImportError::Transport { .. } | ImportError::StreamCorrupt { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ImportError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a single corpus row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The row is the corpus' column header.
    #[error("header row")]
    Header,
    #[error("malformed row: {0}")]
    Malformed(String),
    #[error("bad numeric field {field}: '{value}'")]
    BadNumeric { field: &'static str, value: String },
}
