//! Error type shared by every loader and sampler in the crate.

use std::path::PathBuf;

/// Errors raised while building a chunk store or sampling from one.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("directory traversal failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("glob expansion failed: {0}")]
    Glob(#[from] glob::GlobError),

    /// The input exists but this loader cannot consume it (e.g. an archive
    /// handed to the QnA loader).
    #[error("unsupported format for {}: {reason}", .path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// A pre-encoded archive is corrupt or holds something other than 1-D
    /// integer token arrays.
    #[error("malformed archive {}: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("encode: {0}")]
    Encode(String),

    #[error("Dataset files are too small to sample {length} tokens at a time ({reason})")]
    SamplingInfeasible { length: usize, reason: String },

    /// A QnA record that is not exactly a question line and an answer line.
    #[error("malformed record {index} in {}: expected 2 lines, found {lines}", .path.display())]
    MalformedRecord {
        path: PathBuf,
        index: usize,
        lines: usize,
    },

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
