//! Trait definitions for the transfer module.

use async_trait::async_trait;
use std::path::Path;

use super::error::TransferError;
use super::types::RemoteEntry;

/// Opens sessions against one remote host.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Returns the name of this client implementation.
    fn name(&self) -> &str;

    /// Human-readable description of the remote side, for logs.
    fn describe(&self) -> String;

    /// Establishes an authenticated session.
    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError>;
}

/// An open session. Calls run one at a time and block until complete.
#[async_trait]
pub trait TransferSession: Send + Sync {
    /// Creates every segment of `path` from the root down.
    ///
    /// Existing segments are success. A failed create is only an error if
    /// the segment still does not exist afterwards, so a sibling run creating
    /// the same directory concurrently is not a failure.
    async fn ensure_remote_dir(&self, path: &str) -> Result<(), TransferError>;

    /// Uploads a local file, replacing any remote file. Returns bytes written.
    async fn put_file(&self, local: &Path, remote: &str) -> Result<u64, TransferError>;

    /// Downloads a remote file, replacing any local file. Returns bytes read.
    async fn get_file(&self, remote: &str, local: &Path) -> Result<u64, TransferError>;

    /// Lists a remote directory (without `.` and `..`).
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, TransferError>;

    /// MD5 of a remote file, streamed in fixed-size chunks.
    async fn remote_digest(&self, path: &str) -> Result<String, TransferError>;

    /// Closes the session. Safe to call more than once.
    async fn disconnect(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NullSession {
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TransferSession for NullSession {
        async fn ensure_remote_dir(&self, _path: &str) -> Result<(), TransferError> {
            Ok(())
        }

        async fn put_file(&self, _local: &Path, _remote: &str) -> Result<u64, TransferError> {
            Ok(0)
        }

        async fn get_file(&self, _remote: &str, _local: &Path) -> Result<u64, TransferError> {
            Ok(0)
        }

        async fn list_dir(&self, _path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
            Ok(vec![])
        }

        async fn remote_digest(&self, _path: &str) -> Result<String, TransferError> {
            Ok(String::new())
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NullClient {
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TransferClient for NullClient {
        fn name(&self) -> &str {
            "null"
        }

        fn describe(&self) -> String {
            "nowhere".to_string()
        }

        async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError> {
            Ok(Box::new(NullSession {
                disconnects: Arc::clone(&self.disconnects),
            }))
        }
    }

    #[tokio::test]
    async fn test_sessions_are_usable_as_trait_objects() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let client: Box<dyn TransferClient> = Box::new(NullClient {
            disconnects: Arc::clone(&disconnects),
        });

        let session = client.connect().await.unwrap();
        session.ensure_remote_dir("/a/b").await.unwrap();
        session.disconnect().await;

        assert_eq!(client.name(), "null");
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }
}
