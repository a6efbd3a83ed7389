//! Remote file transfer.
//!
//! A [`TransferClient`] opens a [`TransferSession`]; the session is the only
//! place that speaks the wire protocol. Sessions are single-owner and
//! blocking per call from the caller's point of view: there is no in-flight
//! cancellation, and a failed call aborts the caller's work for this run.
//!
//! Backends:
//! - [`SftpTransferClient`]: SFTP over SSH with password authentication
//! - [`LocalTransferClient`]: a local or mounted directory standing in for the
//!   remote host

mod error;
mod local;
mod sftp;
mod traits;
mod types;

pub use error::TransferError;
pub use local::LocalTransferClient;
pub use sftp::SftpTransferClient;
pub use traits::{TransferClient, TransferSession};
pub use types::{dir_segments, remote_join, Credentials, Endpoint, RemoteEntry};
