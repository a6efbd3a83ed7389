//! Submission storage trait and types.

use std::fmt;

use super::{NewSubmission, StatusUpdate, Submission, SubmissionStatus};

/// Error type for submission store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Submission not found.
    NotFound(String),
    /// A submission with this name already exists.
    AlreadyExists(String),
    /// The update would not move the status forward, or the stored status
    /// changed underneath us.
    InvalidTransition {
        name: String,
        from: SubmissionStatus,
        to: SubmissionStatus,
    },
    /// Database error.
    Database(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(name) => write!(f, "Submission not found: {}", name),
            StoreError::AlreadyExists(name) => write!(f, "Submission already exists: {}", name),
            StoreError::InvalidTransition { name, from, to } => write!(
                f,
                "Cannot move submission {} from {} to {}",
                name, from, to
            ),
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Trait for submission storage backends.
///
/// The core only relies on `list_by_status` and `update_status` for the
/// pipeline itself; the remaining operations support failure accounting and
/// registration.
pub trait SubmissionStore: Send + Sync {
    /// Register a new submission in `Intake`.
    fn create(&self, request: NewSubmission) -> Result<Submission, StoreError>;

    /// Get a submission by name.
    fn get(&self, name: &str) -> Result<Option<Submission>, StoreError>;

    /// Submissions with the given status, oldest first (ties by name).
    /// Errored submissions are included; callers filter them.
    fn list_by_status(&self, status: SubmissionStatus) -> Result<Vec<Submission>, StoreError>;

    /// Advance the status and apply the extra fields as a single commit.
    /// Also resets the checksum failure counter.
    fn update_status(&self, name: &str, update: &StatusUpdate) -> Result<Submission, StoreError>;

    /// Increment the consecutive checksum failure counter.
    fn record_checksum_failure(&self, name: &str) -> Result<Submission, StoreError>;

    /// Exclude the submission from automatic selection.
    fn flag_error(&self, name: &str) -> Result<Submission, StoreError>;
}
