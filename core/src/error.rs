//! Error types shared by the build, merge and query paths.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Source path for a build is missing or not a directory.
    #[error("source path {0:?} does not exist or is not a directory")]
    NotADirectory(PathBuf),

    /// The document id registry is needed but absent; build partial indices first.
    #[error("document id registry {0:?} not found; build partial indices first")]
    MissingRegistry(PathBuf),

    #[error("no partial indices found in {0:?}")]
    NoPartialIndices(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An on-disk index file did not have the expected shape.
    #[error("corrupt index file {path:?} at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}
