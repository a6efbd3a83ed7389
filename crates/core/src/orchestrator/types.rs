//! Types for the stage runner.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checksum::ChecksumError;
use crate::lock::LockError;
use crate::submission::{StoreError, SubmissionStatus};
use crate::transfer::TransferError;

/// Errors that can occur during a stage run.
///
/// Every variant aborts the current submission only. See [`ErrorKind`] for
/// the process exit code each one maps to.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Run lock could not be created or removed.
    #[error("run lock error: {0}")]
    Lock(#[from] LockError),

    /// Submission store error.
    #[error("submission store error: {0}")]
    Store(#[from] StoreError),

    /// Local payload or destination directory is unusable.
    #[error("invalid local path {path}: {reason}")]
    LocalPathInvalid { path: PathBuf, reason: String },

    /// Connection, directory creation or file transfer failed.
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Manifest problem or digest mismatch.
    #[error("checksum error: {0}")]
    Checksum(#[from] ChecksumError),

    /// Post-commit step failed; the status has already advanced.
    #[error("housekeeping for {submission} failed: {reason}")]
    Housekeeping { submission: String, reason: String },

    /// Blocking task failed to complete.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub(crate) fn housekeeping(submission: &str, reason: impl ToString) -> Self {
        OrchestratorError::Housekeeping {
            submission: submission.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Lock(_) | OrchestratorError::Internal(_) => ErrorKind::Internal,
            OrchestratorError::Store(_) => ErrorKind::Store,
            OrchestratorError::LocalPathInvalid { .. } => ErrorKind::LocalPathInvalid,
            OrchestratorError::Transfer(e) if e.is_connection_failure() => {
                ErrorKind::ConnectionFailure
            }
            OrchestratorError::Transfer(TransferError::RemoteDirCreate { .. }) => {
                ErrorKind::RemoteDirCreateFailure
            }
            OrchestratorError::Transfer(_) => ErrorKind::Transfer,
            OrchestratorError::Checksum(ChecksumError::ChecksumMismatch { .. }) => {
                ErrorKind::ChecksumMismatch
            }
            OrchestratorError::Checksum(ChecksumError::Io { .. }) => ErrorKind::Transfer,
            OrchestratorError::Checksum(_) => ErrorKind::Manifest,
            OrchestratorError::Housekeeping { .. } => ErrorKind::Housekeeping,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}

/// Failure classes, each with a distinct process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Internal,
    Config,
    ConnectionFailure,
    RemoteDirCreateFailure,
    Manifest,
    ChecksumMismatch,
    LocalPathInvalid,
    Store,
    Transfer,
    Housekeeping,
}

impl ErrorKind {
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::Internal => 1,
            ErrorKind::Config => 2,
            ErrorKind::ConnectionFailure => 3,
            ErrorKind::RemoteDirCreateFailure => 4,
            ErrorKind::Manifest => 5,
            ErrorKind::ChecksumMismatch => 6,
            ErrorKind::LocalPathInvalid => 7,
            ErrorKind::Store => 8,
            ErrorKind::Transfer => 9,
            ErrorKind::Housekeeping => 10,
        }
    }
}

/// How a stage run ended without error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// One submission was transferred, verified and committed.
    Advanced {
        submission: String,
        from: SubmissionStatus,
        to: SubmissionStatus,
        /// Files moved, manifest included.
        files: usize,
    },
    /// No eligible submission.
    NothingToDo,
    /// Another run of the same stage holds the lock.
    LockContention {
        path: PathBuf,
        owner_pid: Option<u32>,
    },
}

impl RunOutcome {
    /// Exit code for a run that returned this outcome.
    pub fn exit_code(&self) -> u8 {
        0
    }
}
