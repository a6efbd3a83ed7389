//! Pipeline stages run by this crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::submission::SubmissionStatus;

/// Which way files move relative to this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local payload is sent to the processing host.
    Push,
    /// Remote output is fetched from the processing host.
    Pull,
}

/// One edge of the status state machine driven by a [`super::StageRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Intake to processing host.
    Upload,
    /// Processing host to results host.
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 2] = [Stage::Upload, Stage::Publish];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Publish => "publish",
        }
    }

    /// Status a submission must have to be selected.
    pub fn source_status(&self) -> SubmissionStatus {
        match self {
            Stage::Upload => SubmissionStatus::Intake,
            Stage::Publish => SubmissionStatus::Processed,
        }
    }

    /// Status committed when the stage succeeds.
    pub fn dest_status(&self) -> SubmissionStatus {
        match self {
            Stage::Upload => SubmissionStatus::UploadedToProcessingHost,
            Stage::Publish => SubmissionStatus::PublishedToResultsHost,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Stage::Upload => Direction::Push,
            Stage::Publish => Direction::Pull,
        }
    }

    /// Run lock name; one per stage so different stages may overlap.
    pub fn lock_name(&self) -> String {
        format!("shuttle-{}", self.as_str())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(Stage::Upload),
            "publish" => Ok(Stage::Publish),
            other => Err(format!(
                "unknown stage '{}', expected one of: upload, publish",
                other
            )),
        }
    }
}
