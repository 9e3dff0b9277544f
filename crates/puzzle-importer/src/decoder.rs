//! Streaming decompression of the corpus into text lines.
//!
//! Nothing is buffered beyond the reader's internal block: lines are decoded
//! on demand as the pipeline pulls them. Errors raised by the underlying byte
//! source are tagged on the way in so they can be told apart from framing
//! errors raised by the decompressor.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};

use flate2::read::MultiGzDecoder;
use serde::Deserialize;

use crate::error::ImportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Zstd,
    Gzip,
    Plain,
}

impl Compression {
    /// Pick a format from a URL or path suffix.
    pub fn infer(location: &str) -> Self {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        if path.ends_with(".zst") || path.ends_with(".zstd") {
            Compression::Zstd
        } else if path.ends_with(".gz") {
            Compression::Gzip
        } else {
            Compression::Plain
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::Zstd => "zstd",
            Compression::Gzip => "gzip",
            Compression::Plain => "plain",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct TransportFault(io::Error);

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for TransportFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Marks every error coming out of the raw byte source as a transport fault.
struct TaggedReader<R> {
    inner: R,
}

impl<R: Read> Read for TaggedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner
            .read(buf)
            .map_err(|err| io::Error::new(err.kind(), TransportFault(err)))
    }
}

/// Lazy, single-pass line iterator over a (possibly compressed) byte stream.
///
/// Yields at most one error, after which the iterator is exhausted.
pub struct Decoder {
    source_name: String,
    reader: Box<dyn BufRead>,
    lines_read: u64,
    finished: bool,
}

impl Decoder {
    pub fn new<R: Read + 'static>(
        source_name: impl Into<String>,
        raw: R,
        compression: Compression,
    ) -> Result<Self, ImportError> {
        let source_name = source_name.into();
        let tagged = TaggedReader { inner: raw };
        let reader: Box<dyn BufRead> = match compression {
            Compression::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(tagged).map_err(|err| {
                    ImportError::Transport {
                        source_name: source_name.clone(),
                        reason: format!("zstd decoder unavailable: {err}"),
                    }
                })?;
                Box::new(BufReader::new(decoder))
            }
            Compression::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(BufReader::new(
                tagged,
            )))),
            Compression::Plain => Box::new(BufReader::new(tagged)),
        };
        Ok(Self {
            source_name,
            reader,
            lines_read: 0,
            finished: false,
        })
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    fn classify(&self, err: io::Error) -> ImportError {
        let from_source = err
            .get_ref()
            .is_some_and(|inner| inner.is::<TransportFault>());
        let reason = format!("after line {}: {err}", self.lines_read);
        if from_source {
            ImportError::Transport {
                source_name: self.source_name.clone(),
                reason,
            }
        } else {
            ImportError::StreamCorrupt {
                source_name: self.source_name.clone(),
                reason,
            }
        }
    }
}

impl Iterator for Decoder {
    type Item = Result<String, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => {
                self.finished = true;
                None
            }
            Ok(_) => {
                self.lines_read += 1;
                let trimmed = line.trim_end_matches(['\n', '\r']).len();
                line.truncate(trimmed);
                Some(Ok(line))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(self.classify(err)))
            }
        }
    }
}
