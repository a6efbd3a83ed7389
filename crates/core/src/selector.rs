//! Choosing which submission a stage works on next.
//!
//! Candidates come from the store, never from directory listing order.
//! Errored submissions are skipped and the rest are taken oldest first,
//! ties broken by name, so repeated runs over the same data pick the same
//! submission.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::submission::{StoreError, Submission, SubmissionStatus, SubmissionStore};

/// Picks the next submission for a stage.
pub struct SubmissionSelector {
    store: Arc<dyn SubmissionStore>,
}

impl SubmissionSelector {
    pub fn new(store: Arc<dyn SubmissionStore>) -> Self {
        Self { store }
    }

    /// All selectable submissions in `status`, in selection order.
    pub fn candidates(&self, status: SubmissionStatus) -> Result<Vec<Submission>, StoreError> {
        let mut candidates: Vec<Submission> = self
            .store
            .list_by_status(status)?
            .into_iter()
            .filter(|s| {
                if s.error_occurred {
                    debug!("Skipping {}: error flag set", s.name);
                }
                !s.error_occurred
            })
            .collect();
        sort_candidates(&mut candidates);
        Ok(candidates)
    }

    /// The first candidate in `status` accepted by `eligible`.
    pub fn select<F>(
        &self,
        status: SubmissionStatus,
        eligible: F,
    ) -> Result<Option<Submission>, StoreError>
    where
        F: Fn(&Submission) -> bool,
    {
        Ok(self
            .candidates(status)?
            .into_iter()
            .find(|s| eligible(s)))
    }
}

/// Sorts by `created_at`, then `name`, ascending.
pub fn sort_candidates(candidates: &mut [Submission]) {
    candidates.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// A payload directory found on disk at `<base>/<owner>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionDir {
    pub owner: String,
    pub name: String,
    pub path: PathBuf,
}

/// Lists every `<base>/<owner>/<name>` directory, sorted by owner then name.
///
/// A missing base directory yields an empty list. Plain files at either
/// level are ignored.
pub fn scan_submission_dirs(base: &Path) -> io::Result<Vec<SubmissionDir>> {
    let owners = match fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    for owner_entry in owners {
        let owner_entry = owner_entry?;
        if !owner_entry.file_type()?.is_dir() {
            continue;
        }
        let owner = owner_entry.file_name().to_string_lossy().into_owned();

        for entry in fs::read_dir(owner_entry.path())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            found.push(SubmissionDir {
                owner: owner.clone(),
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
            });
        }
    }

    found.sort_by(|a, b| a.owner.cmp(&b.owner).then_with(|| a.name.cmp(&b.name)));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::{NewSubmission, SqliteSubmissionStore, StatusUpdate};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn store_with(names: &[(&str, i64)]) -> Arc<SqliteSubmissionStore> {
        let store = Arc::new(SqliteSubmissionStore::in_memory().unwrap());
        let base = Utc::now();
        for (name, age_hours) in names {
            store
                .create(
                    NewSubmission::new(*name, "alice")
                        .with_created_at(base - Duration::hours(*age_hours)),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn test_candidates_oldest_first_then_name() {
        let store = store_with(&[("S3", 1), ("S2", 5), ("S1", 5), ("S0", 0)]);
        let selector = SubmissionSelector::new(store);

        let names: Vec<String> = selector
            .candidates(SubmissionStatus::Intake)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["S1", "S2", "S3", "S0"]);
    }

    #[test]
    fn test_errored_submissions_are_never_selected() {
        let store = store_with(&[("old", 10), ("new", 1)]);
        store.flag_error("old").unwrap();
        let selector = SubmissionSelector::new(store.clone());

        let selected = selector
            .select(SubmissionStatus::Intake, |_| true)
            .unwrap()
            .unwrap();
        assert_eq!(selected.name, "new");

        store.flag_error("new").unwrap();
        assert!(selector
            .select(SubmissionStatus::Intake, |_| true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_select_only_matches_requested_status() {
        let store = store_with(&[("S1", 2), ("S2", 1)]);
        store
            .update_status("S1", &StatusUpdate::to(SubmissionStatus::Processed))
            .unwrap();
        let selector = SubmissionSelector::new(store);

        let processed = selector
            .select(SubmissionStatus::Processed, |_| true)
            .unwrap()
            .unwrap();
        assert_eq!(processed.name, "S1");
        assert!(selector
            .select(SubmissionStatus::PublishedToResultsHost, |_| true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_select_applies_eligibility() {
        let store = store_with(&[("S1", 2), ("S2", 1)]);
        let selector = SubmissionSelector::new(store);

        let selected = selector
            .select(SubmissionStatus::Intake, |s| s.name != "S1")
            .unwrap()
            .unwrap();
        assert_eq!(selected.name, "S2");
    }

    #[test]
    fn test_scan_submission_dirs() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("bob/S2")).unwrap();
        std::fs::create_dir_all(temp.path().join("alice/S9")).unwrap();
        std::fs::create_dir_all(temp.path().join("alice/S1")).unwrap();
        std::fs::write(temp.path().join("alice/stray.txt"), "x").unwrap();
        std::fs::write(temp.path().join("README"), "x").unwrap();

        let dirs = scan_submission_dirs(temp.path()).unwrap();
        let keys: Vec<(&str, &str)> = dirs
            .iter()
            .map(|d| (d.owner.as_str(), d.name.as_str()))
            .collect();
        assert_eq!(keys, vec![("alice", "S1"), ("alice", "S9"), ("bob", "S2")]);
        assert_eq!(dirs[0].path, temp.path().join("alice/S1"));
    }

    #[test]
    fn test_scan_missing_base_is_empty() {
        let temp = TempDir::new().unwrap();
        let dirs = scan_submission_dirs(&temp.path().join("absent")).unwrap();
        assert!(dirs.is_empty());
    }
}
