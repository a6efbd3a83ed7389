//! Submission records and their status state machine.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress of a submission through the pipeline.
///
/// Variants are declared in pipeline order; `Ord` follows that order and a
/// stored status only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Received by the upload host.
    Intake,
    /// Copied to the processing host and verified.
    UploadedToProcessingHost,
    /// Analysis output is ready on the processing host.
    Processed,
    /// Results copied to the results host and verified.
    PublishedToResultsHost,
}

impl SubmissionStatus {
    /// All statuses in pipeline order.
    pub const ALL: [SubmissionStatus; 4] = [
        SubmissionStatus::Intake,
        SubmissionStatus::UploadedToProcessingHost,
        SubmissionStatus::Processed,
        SubmissionStatus::PublishedToResultsHost,
    ];

    /// Canonical stored name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Intake => "intake",
            SubmissionStatus::UploadedToProcessingHost => "uploaded_to_processing_host",
            SubmissionStatus::Processed => "processed",
            SubmissionStatus::PublishedToResultsHost => "published_to_results_host",
        }
    }

    /// Name the web application's schema uses for this status, if different.
    pub fn legacy_name(&self) -> Option<&'static str> {
        match self {
            SubmissionStatus::Intake => None,
            SubmissionStatus::UploadedToProcessingHost => Some("transfer_to_sftp_server_complete"),
            SubmissionStatus::Processed => Some("transfer_from_framework_to_sftp_server_complete"),
            SubmissionStatus::PublishedToResultsHost => Some("transfer_to_web_server_complete"),
        }
    }

    /// Every stored spelling of this status.
    pub fn stored_names(&self) -> Vec<&'static str> {
        std::iter::once(self.as_str())
            .chain(self.legacy_name())
            .collect()
    }

    /// The status following this one, if any.
    pub fn next(&self) -> Option<SubmissionStatus> {
        match self {
            SubmissionStatus::Intake => Some(SubmissionStatus::UploadedToProcessingHost),
            SubmissionStatus::UploadedToProcessingHost => Some(SubmissionStatus::Processed),
            SubmissionStatus::Processed => Some(SubmissionStatus::PublishedToResultsHost),
            SubmissionStatus::PublishedToResultsHost => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown submission status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for SubmissionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        SubmissionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s || status.legacy_name() == Some(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// One unit of work moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Unique name; also the base name of its directory and archive.
    pub name: String,
    /// Identifier of the submitting user.
    pub owner: String,
    /// Address used for notifications.
    pub owner_email: Option<String>,
    /// Display name used in notifications.
    pub owner_name: Option<String>,
    pub status: SubmissionStatus,
    /// Once set, the submission is never selected automatically again.
    pub error_occurred: bool,
    /// Overrides the conventional local payload directory.
    pub local_path: Option<PathBuf>,
    /// Overrides the conventional remote directory.
    pub remote_path: Option<String>,
    /// Consecutive checksum mismatches since the last successful stage.
    pub checksum_failures: u32,
    pub display_online: bool,
    pub data_explorer: bool,
    /// When results reached the results host.
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to register a new submission.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub name: String,
    pub owner: String,
    pub owner_email: Option<String>,
    pub owner_name: Option<String>,
    pub local_path: Option<PathBuf>,
    pub remote_path: Option<String>,
    /// Defaults to now.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewSubmission {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            owner_email: None,
            owner_name: None,
            local_path: None,
            remote_path: None,
            created_at: None,
        }
    }

    pub fn with_owner_contact(mut self, email: impl Into<String>, name: impl Into<String>) -> Self {
        self.owner_email = Some(email.into());
        self.owner_name = Some(name.into());
        self
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_remote_path(mut self, path: impl Into<String>) -> Self {
        self.remote_path = Some(path.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Fields committed together when a stage completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: SubmissionStatus,
    pub display_online: Option<bool>,
    pub data_explorer: Option<bool>,
    pub published_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    /// Advance to `status`, leaving other fields untouched.
    pub fn to(status: SubmissionStatus) -> Self {
        Self {
            status,
            display_online: None,
            data_explorer: None,
            published_at: None,
        }
    }

    pub fn with_display_online(mut self, value: bool) -> Self {
        self.display_online = Some(value);
        self
    }

    pub fn with_data_explorer(mut self, value: bool) -> Self {
        self.data_explorer = Some(value);
        self
    }

    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}
