//! Unpacking published result archives into the serving directory.

mod unpack;

pub use unpack::{unpack, UnpackReport, STUDY_DATA_FILE};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while unpacking an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Archive could not be read as a zip file.
    #[error("Invalid archive {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// An entry would be written outside the destination.
    #[error("Archive entry escapes destination: {0}")]
    UnsafeEntry(String),

    /// Filesystem error while extracting.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }
}
