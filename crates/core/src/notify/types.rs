use std::fmt;

use serde::{Deserialize, Serialize};

use crate::submission::Submission;

/// Events the mail service knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    /// Results are published and browsable.
    AnalysisReadyForReview,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::AnalysisReadyForReview => "analysis_ready_for_review",
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message to a submission's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub email: String,
    pub recipient_name: String,
    pub event: NotificationEvent,
    /// Submission name.
    pub submission: String,
}

impl Notification {
    /// Builds the notification for `submission`'s owner.
    ///
    /// Returns `None` when the owner has no email on record. The recipient
    /// name falls back to the owner id.
    pub fn for_owner(submission: &Submission, event: NotificationEvent) -> Option<Self> {
        let email = submission.owner_email.clone()?;
        Some(Self {
            email,
            recipient_name: submission
                .owner_name
                .clone()
                .unwrap_or_else(|| submission.owner.clone()),
            event,
            submission: submission.name.clone(),
        })
    }
}
