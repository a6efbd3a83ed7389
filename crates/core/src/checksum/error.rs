//! Error types for checksum verification.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading manifests or verifying digests.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// No manifest file in the directory.
    #[error("No md5sum manifest found in {dir}")]
    ManifestMissing { dir: PathBuf },

    /// More than one manifest candidate; refusing to guess.
    #[error("Multiple md5sum manifests found in {dir}: {}", .candidates.join(", "))]
    ManifestAmbiguous {
        dir: PathBuf,
        candidates: Vec<String>,
    },

    /// A manifest line could not be parsed.
    #[error("Invalid manifest line {line}: {reason}")]
    ManifestParse { line: usize, reason: String },

    /// Manifest entries and transferred files do not correspond one to one.
    #[error(
        "Manifest does not match transferred files (no entry for: [{}]; no file for: [{}])",
        .missing.join(", "),
        .unexpected.join(", ")
    )]
    ManifestIncomplete {
        /// Transferred files without a manifest entry.
        missing: Vec<String>,
        /// Manifest entries without a transferred file.
        unexpected: Vec<String>,
    },

    /// Digest of a transferred file differs from the manifest.
    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// I/O error while reading a manifest or hashing a file.
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ChecksumError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
