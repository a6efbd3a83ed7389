//! Error types for the transfer module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while talking to the remote host.
#[derive(Debug, Error)]
pub enum TransferError {
    /// TCP connect, SSH handshake or SFTP subsystem start failed.
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// The server rejected the credentials.
    #[error("Authentication failed for {username}@{endpoint}")]
    Authentication { endpoint: String, username: String },

    /// The session was already disconnected.
    #[error("Not connected to remote host")]
    NotConnected,

    /// A directory segment could not be created and does not exist.
    #[error("Failed to create remote directory {path}: {reason}")]
    RemoteDirCreate { path: String, reason: String },

    /// Upload failed.
    #[error("Failed to upload {local} to {remote}: {reason}")]
    Put {
        local: PathBuf,
        remote: String,
        reason: String,
    },

    /// Download failed.
    #[error("Failed to download {remote} to {local}: {reason}")]
    Get {
        remote: String,
        local: PathBuf,
        reason: String,
    },

    /// Directory listing failed.
    #[error("Failed to list remote directory {path}: {reason}")]
    List { path: String, reason: String },

    /// Opening or reading a remote file failed.
    #[error("Failed to read remote file {path}: {reason}")]
    Read { path: String, reason: String },

    /// The blocking worker running a protocol call failed.
    #[error("Transfer task failed: {0}")]
    Task(String),
}

impl TransferError {
    /// Whether the session could not be established at all.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Authentication { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failure_classification() {
        let err = TransferError::Connection {
            endpoint: "sftp:22".to_string(),
            reason: "refused".to_string(),
        };
        assert!(err.is_connection_failure());
        assert_eq!(err.to_string(), "Failed to connect to sftp:22: refused");

        let err = TransferError::RemoteDirCreate {
            path: "/home/u/uploads".to_string(),
            reason: "permission denied".to_string(),
        };
        assert!(!err.is_connection_failure());
    }
}
