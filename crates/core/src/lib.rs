pub mod archive;
pub mod checksum;
pub mod config;
pub mod lock;
pub mod notify;
pub mod orchestrator;
pub mod selector;
pub mod submission;
pub mod testing;
pub mod transfer;

pub use archive::{unpack, ArchiveError, UnpackReport};
pub use checksum::{digest_file, load_manifest, verify, ChecksumError, ChecksumManifest};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, NotifierBackend,
    SanitizedConfig,
};
pub use lock::{LockAcquisition, LockError, RunLock, RunLockGuard};
pub use notify::{
    create_notifier, LogNotifier, Notification, NotificationEvent, Notifier, NotifyError,
    WebhookNotifier,
};
pub use orchestrator::{
    Direction, ErrorKind, OrchestratorError, RunOutcome, Stage, StageRunner, StageRunnerConfig,
};
pub use selector::{scan_submission_dirs, SubmissionDir, SubmissionSelector};
pub use submission::{
    NewSubmission, SqliteSubmissionStore, StatusUpdate, StoreError, Submission, SubmissionStatus,
    SubmissionStore,
};
pub use transfer::{
    Credentials, Endpoint, LocalTransferClient, SftpTransferClient, TransferClient,
    TransferError, TransferSession,
};
