//! Stage runner implementation.
//!
//! One run moves at most one submission across one stage:
//! lock, select, validate, connect, transfer, verify, commit, housekeeping.
//! The session is disconnected and the lock released on every path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::archive;
use crate::checksum::{
    digest_file, digests_match, load_manifest, ChecksumError, ChecksumManifest,
    MANIFEST_EXTENSION,
};
use crate::lock::{LockAcquisition, RunLock};
use crate::notify::{Notification, NotificationEvent, Notifier};
use crate::selector::{scan_submission_dirs, SubmissionSelector};
use crate::submission::{StatusUpdate, Submission, SubmissionStore};
use crate::transfer::{remote_join, TransferClient, TransferSession};

use super::config::StageRunnerConfig;
use super::stage::{Direction, Stage};
use super::types::{OrchestratorError, RunOutcome};

/// A file in a local upload payload.
#[derive(Debug, Clone)]
struct PayloadFile {
    name: String,
    path: PathBuf,
}

/// Runs one stage of the pipeline.
pub struct StageRunner {
    stage: Stage,
    config: StageRunnerConfig,
    lock: RunLock,
    store: Arc<dyn SubmissionStore>,
    client: Arc<dyn TransferClient>,
    notifier: Arc<dyn Notifier>,
}

impl StageRunner {
    /// Create a new runner for `stage`.
    pub fn new(
        stage: Stage,
        config: StageRunnerConfig,
        lock: RunLock,
        store: Arc<dyn SubmissionStore>,
        client: Arc<dyn TransferClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            stage,
            config,
            lock,
            store,
            client,
            notifier,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Process at most one submission.
    pub async fn run(&self) -> Result<RunOutcome, OrchestratorError> {
        let guard = match self.lock.acquire(&self.stage.lock_name())? {
            LockAcquisition::Held(guard) => guard,
            LockAcquisition::AlreadyHeld { path, owner_pid } => {
                info!(
                    "Stage {} is already running (lock {}), exiting",
                    self.stage,
                    path.display()
                );
                return Ok(RunOutcome::LockContention { path, owner_pid });
            }
        };

        let result = self.run_locked().await;

        match &result {
            Ok(RunOutcome::Advanced { submission, to, .. }) => {
                info!("Stage {} finished: {} is now {}", self.stage, submission, to)
            }
            Ok(_) => debug!("Stage {} finished with nothing to do", self.stage),
            Err(e) => error!("Stage {} failed: {}", self.stage, e),
        }

        if let Err(e) = guard.release() {
            error!("Failed to release run lock for {}: {}", self.stage, e);
            if result.is_ok() {
                return Err(e.into());
            }
        }

        result
    }

    async fn run_locked(&self) -> Result<RunOutcome, OrchestratorError> {
        let selector = SubmissionSelector::new(Arc::clone(&self.store));
        let source = self.stage.source_status();

        let selected = match self.stage.direction() {
            Direction::Push => selector.select(source, |s| {
                let path = self.upload_dir(s);
                let present = path.exists();
                if !present {
                    warn!(
                        "Skipping {}: payload directory {} does not exist",
                        s.name,
                        path.display()
                    );
                }
                present
            })?,
            Direction::Pull => selector.select(source, |_| true)?,
        };

        let Some(submission) = selected else {
            info!("There are no submissions to {}", self.stage);
            if self.stage.direction() == Direction::Push {
                self.report_unregistered();
            }
            return Ok(RunOutcome::NothingToDo);
        };

        info!(
            "Selected submission {} (owner {}) for {}",
            submission.name, submission.owner, self.stage
        );

        match self.stage {
            Stage::Upload => self.upload(&submission).await,
            Stage::Publish => self.publish(&submission).await,
        }
    }

    fn upload_dir(&self, submission: &Submission) -> PathBuf {
        submission
            .local_path
            .clone()
            .unwrap_or_else(|| self.config.upload_dir(&submission.owner, &submission.name))
    }

    /// Logs payload directories that have no submission record.
    fn report_unregistered(&self) {
        let dirs = match scan_submission_dirs(&self.config.uploads_dir) {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!("Could not scan {}: {}", self.config.uploads_dir.display(), e);
                return;
            }
        };

        for dir in dirs {
            match self.store.get(&dir.name) {
                Ok(Some(_)) => {}
                Ok(None) => warn!(
                    "Directory {} has no submission record and will not be transferred",
                    dir.path.display()
                ),
                Err(e) => warn!("Could not look up {}: {}", dir.name, e),
            }
        }
    }

    async fn upload(&self, submission: &Submission) -> Result<RunOutcome, OrchestratorError> {
        let local_dir = self.upload_dir(submission);
        let files = list_payload(&local_dir).await?;

        // Manifest problems are local; fail before touching the network.
        let manifest = load_manifest(&local_dir).await?;
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        manifest.check_coverage(&names)?;

        let remote_dir = self
            .config
            .remote_upload_dir(&submission.owner, &submission.name);

        info!("Establishing connection with {}", self.client.describe());
        let session = self.client.connect().await?;
        let result = push_and_verify(session.as_ref(), &files, &remote_dir, &manifest).await;
        session.disconnect().await;
        result.map_err(|e| self.account_failure(submission, e))?;

        let from = submission.status;
        let to = self.stage.dest_status();
        self.store
            .update_status(&submission.name, &StatusUpdate::to(to))?;
        info!("The submission status of {} has been updated to {}", submission.name, to);

        match tokio::fs::remove_dir_all(&local_dir).await {
            Ok(()) => info!("Removed local copy {}", local_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Local copy {} was already gone", local_dir.display())
            }
            Err(e) => {
                return Err(OrchestratorError::housekeeping(
                    &submission.name,
                    format!("failed to remove {}: {}", local_dir.display(), e),
                ))
            }
        }

        Ok(RunOutcome::Advanced {
            submission: submission.name.clone(),
            from,
            to,
            files: files.len(),
        })
    }

    async fn publish(&self, submission: &Submission) -> Result<RunOutcome, OrchestratorError> {
        let dest_dir = self.config.explorer_dir(&submission.name);
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| OrchestratorError::LocalPathInvalid {
                path: dest_dir.clone(),
                reason: e.to_string(),
            })?;

        let remote_dir = submission.remote_path.clone().unwrap_or_else(|| {
            self.config
                .remote_output_dir(&submission.owner, &submission.name)
        });
        let archive_name = format!("{}.zip", submission.name);
        let manifest_name = format!("{}.{}", submission.name, MANIFEST_EXTENSION);

        info!("Establishing connection with {}", self.client.describe());
        let session = self.client.connect().await?;
        let result = pull_and_verify(
            session.as_ref(),
            &remote_dir,
            &dest_dir,
            &archive_name,
            &manifest_name,
        )
        .await;
        session.disconnect().await;
        result.map_err(|e| self.account_failure(submission, e))?;

        let from = submission.status;
        let to = self.stage.dest_status();
        let update = StatusUpdate::to(to)
            .with_display_online(true)
            .with_data_explorer(true)
            .with_published_at(Utc::now());
        let published = self.store.update_status(&submission.name, &update)?;
        info!("The submission status of {} has been updated to {}", submission.name, to);

        let archive_path = dest_dir.join(&archive_name);
        let unpack_dest = dest_dir.clone();
        tokio::task::spawn_blocking(move || archive::unpack(&archive_path, &unpack_dest))
            .await
            .map_err(|e| OrchestratorError::housekeeping(&submission.name, e))?
            .map_err(|e| OrchestratorError::housekeeping(&submission.name, e))?;

        match Notification::for_owner(&published, NotificationEvent::AnalysisReadyForReview) {
            Some(notification) => self
                .notifier
                .notify(&notification)
                .await
                .map_err(|e| OrchestratorError::housekeeping(&submission.name, e))?,
            None => warn!(
                "Owner {} of {} has no email; skipping notification",
                submission.owner, submission.name
            ),
        }

        Ok(RunOutcome::Advanced {
            submission: submission.name.clone(),
            from,
            to,
            files: 2,
        })
    }

    /// Counts checksum mismatches and flags the submission once the limit is
    /// reached. Other failures are not counted. Returns `err` unchanged.
    fn account_failure(
        &self,
        submission: &Submission,
        err: OrchestratorError,
    ) -> OrchestratorError {
        if !matches!(
            err,
            OrchestratorError::Checksum(ChecksumError::ChecksumMismatch { .. })
        ) {
            return err;
        }

        let failures = match self.store.record_checksum_failure(&submission.name) {
            Ok(updated) => updated.checksum_failures,
            Err(e) => {
                error!("Failed to record checksum failure for {}: {}", submission.name, e);
                return err;
            }
        };
        warn!("Checksum mismatch #{} for {}", failures, submission.name);

        if self.config.should_flag(failures) {
            match self.store.flag_error(&submission.name) {
                Ok(_) => error!(
                    "Submission {} flagged as errored after {} checksum mismatches",
                    submission.name, failures
                ),
                Err(e) => error!("Failed to flag {} as errored: {}", submission.name, e),
            }
        }
        err
    }
}

/// Regular files directly inside `dir`, sorted by name. Any other entry
/// makes the payload invalid.
async fn list_payload(dir: &Path) -> Result<Vec<PayloadFile>, OrchestratorError> {
    let invalid = |reason: String| OrchestratorError::LocalPathInvalid {
        path: dir.to_path_buf(),
        reason,
    };

    let metadata = tokio::fs::metadata(dir)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }

    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    let mut files = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| invalid(e.to_string()))?
    {
        let file_type = entry.file_type().await.map_err(|e| invalid(e.to_string()))?;
        // The whole directory is removed after commit.
        if !file_type.is_file() {
            return Err(invalid(format!(
                "{} is not a regular file",
                entry.file_name().to_string_lossy()
            )));
        }
        files.push(PayloadFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

async fn push_and_verify(
    session: &dyn TransferSession,
    files: &[PayloadFile],
    remote_dir: &str,
    manifest: &ChecksumManifest,
) -> Result<(), OrchestratorError> {
    session.ensure_remote_dir(remote_dir).await?;
    info!("Remote submission path exists or was created: {}", remote_dir);

    for file in files {
        let remote = remote_join(remote_dir, &file.name);
        let bytes = session.put_file(&file.path, &remote).await?;
        debug!("Sent {} ({} bytes)", file.name, bytes);
    }
    info!("Transferred {} files to {}", files.len(), remote_dir);

    for (name, expected) in manifest.entries() {
        let actual = session.remote_digest(&remote_join(remote_dir, name)).await?;
        if !digests_match(&actual, expected) {
            error!(
                "The MD5 checksum of {} does not match: expected {}, got {}",
                name, expected, actual
            );
            return Err(ChecksumError::ChecksumMismatch {
                file: name.to_string(),
                expected: expected.to_string(),
                actual,
            }
            .into());
        }
        debug!("The MD5 checksum of {} matches", name);
    }
    info!("Verified {} checksums", manifest.len());
    Ok(())
}

async fn pull_and_verify(
    session: &dyn TransferSession,
    remote_dir: &str,
    dest_dir: &Path,
    archive_name: &str,
    manifest_name: &str,
) -> Result<(), OrchestratorError> {
    let listing = session.list_dir(remote_dir).await?;
    if !listing.iter().any(|e| !e.is_dir && e.name == manifest_name) {
        return Err(ChecksumError::ManifestMissing {
            dir: PathBuf::from(remote_dir),
        }
        .into());
    }

    for name in [archive_name, manifest_name] {
        let local = dest_dir.join(name);
        let bytes = session
            .get_file(&remote_join(remote_dir, name), &local)
            .await?;
        info!("Fetched {} ({} bytes) to {}", name, bytes, dest_dir.display());
    }

    let manifest_path = dest_dir.join(manifest_name);
    let text = tokio::fs::read_to_string(&manifest_path)
        .await
        .map_err(|e| ChecksumError::io(&manifest_path, e))?;
    let manifest = ChecksumManifest::parse_for_archive(&text, archive_name)?;
    manifest.check_coverage(&[archive_name, manifest_name])?;

    let expected = manifest.get(archive_name).unwrap_or_default();
    let actual = digest_file(&dest_dir.join(archive_name)).await?;
    if !digests_match(&actual, expected) {
        error!(
            "The MD5 checksum of {} does not match: expected {}, got {}",
            archive_name, expected, actual
        );
        return Err(ChecksumError::ChecksumMismatch {
            file: archive_name.to_string(),
            expected: expected.to_string(),
            actual,
        }
        .into());
    }
    info!("MD5 checksum of {} matches", archive_name);
    Ok(())
}
