//! Error types for run locks.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while acquiring or releasing a run lock.
///
/// Contention is not an error; see [`super::LockAcquisition::AlreadyHeld`].
#[derive(Debug, Error)]
pub enum LockError {
    /// Lock names become file names and may not contain path separators.
    #[error("Invalid lock name: {0:?}")]
    InvalidName(String),

    /// The marker could not be created for a reason other than contention.
    #[error("Failed to create lock marker {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The marker exists but could not be removed.
    #[error("Failed to remove lock marker {path}")]
    Release {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
