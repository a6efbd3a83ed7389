//! Submission records and their persistent store.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteSubmissionStore;
pub use store::{StoreError, SubmissionStore};
pub use types::{NewSubmission, StatusUpdate, Submission, SubmissionStatus, UnknownStatus};
