//! Mock transfer client for testing.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::checksum::digest_reader;
use crate::transfer::{dir_segments, RemoteEntry, TransferClient, TransferError, TransferSession};

/// A recorded file transfer for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransfer {
    /// Remote path written or read.
    pub remote: String,
    /// Bytes moved.
    pub bytes: u64,
}

/// Shared state behind the client and every session it opens.
#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    connects: usize,
    disconnects: usize,
    puts: Vec<RecordedTransfer>,
    gets: Vec<RecordedTransfer>,
    fail_connect: bool,
    fail_mkdir: Option<String>,
    corrupt_uploads: bool,
}

/// Mock implementation of the TransferClient trait.
///
/// Keeps an in-memory remote filesystem shared by all sessions:
/// - Track connects, disconnects and file transfers for assertions
/// - Seed remote files for pull stages
/// - Simulate connection failures, directory creation failures and
///   corruption in transit
///
/// # Example
///
/// ```rust,ignore
/// let client = MockTransferClient::new();
/// client.seed_file("/home/sftp/outputs/alice/S1/S1.zip", zip_bytes).await;
///
/// // ... run a stage with the client ...
///
/// assert_eq!(client.connect_count().await, 1);
/// assert_eq!(client.disconnect_count().await, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransferClient {
    state: Arc<RwLock<MockState>>,
}

impl MockTransferClient {
    /// Create a new mock client with an empty remote filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful and failed connect attempts.
    pub async fn connect_count(&self) -> usize {
        self.state.read().await.connects
    }

    /// Number of sessions closed.
    pub async fn disconnect_count(&self) -> usize {
        self.state.read().await.disconnects
    }

    /// All put_file calls that succeeded, in order.
    pub async fn uploads(&self) -> Vec<RecordedTransfer> {
        self.state.read().await.puts.clone()
    }

    /// All get_file calls that succeeded, in order.
    pub async fn downloads(&self) -> Vec<RecordedTransfer> {
        self.state.read().await.gets.clone()
    }

    /// Make every connect attempt fail.
    pub async fn set_fail_connect(&self, fail: bool) {
        self.state.write().await.fail_connect = fail;
    }

    /// Make creation of the given directory fail.
    pub async fn set_fail_mkdir(&self, path: Option<&str>) {
        self.state.write().await.fail_mkdir = path.map(String::from);
    }

    /// Alter every uploaded file so remote digests stop matching.
    pub async fn set_corrupt_uploads(&self, corrupt: bool) {
        self.state.write().await.corrupt_uploads = corrupt;
    }

    /// Place a file on the remote side, creating its parent directories.
    pub async fn seed_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let mut state = self.state.write().await;
        if let Some((parent, _)) = path.rsplit_once('/') {
            for segment in dir_segments(parent) {
                state.dirs.insert(segment);
            }
        }
        state.files.insert(path.to_string(), contents.into());
    }

    /// Contents of a remote file.
    pub async fn remote_file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.read().await.files.get(path).cloned()
    }

    /// Whether a remote directory exists.
    pub async fn has_dir(&self, path: &str) -> bool {
        self.state.read().await.dirs.contains(path)
    }
}

#[async_trait]
impl TransferClient for MockTransferClient {
    fn name(&self) -> &str {
        "mock"
    }

    fn describe(&self) -> String {
        "mock://remote".to_string()
    }

    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError> {
        let mut state = self.state.write().await;
        state.connects += 1;
        if state.fail_connect {
            return Err(TransferError::Connection {
                endpoint: self.describe(),
                reason: "simulated connection failure".to_string(),
            });
        }
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            connected: AtomicBool::new(true),
        }))
    }
}

struct MockSession {
    state: Arc<RwLock<MockState>>,
    connected: AtomicBool,
}

impl MockSession {
    fn ensure_connected(&self) -> Result<(), TransferError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransferError::NotConnected)
        }
    }
}

fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => "",
    }
}

#[async_trait]
impl TransferSession for MockSession {
    async fn ensure_remote_dir(&self, path: &str) -> Result<(), TransferError> {
        self.ensure_connected()?;
        let mut state = self.state.write().await;
        for segment in dir_segments(path) {
            if state.dirs.contains(&segment) {
                continue;
            }
            if state.fail_mkdir.as_deref() == Some(segment.as_str())
                || state.files.contains_key(&segment)
            {
                return Err(TransferError::RemoteDirCreate {
                    path: segment,
                    reason: "simulated mkdir failure".to_string(),
                });
            }
            state.dirs.insert(segment);
        }
        Ok(())
    }

    async fn put_file(&self, local: &Path, remote: &str) -> Result<u64, TransferError> {
        self.ensure_connected()?;
        let put_error = |reason: String| TransferError::Put {
            local: local.to_path_buf(),
            remote: remote.to_string(),
            reason,
        };

        let mut contents = tokio::fs::read(local)
            .await
            .map_err(|e| put_error(e.to_string()))?;

        let mut state = self.state.write().await;
        if !state.dirs.contains(parent_of(remote)) {
            return Err(put_error("no such directory".to_string()));
        }
        if state.corrupt_uploads {
            contents.push(b'!');
        }
        let bytes = contents.len() as u64;
        state.files.insert(remote.to_string(), contents);
        state.puts.push(RecordedTransfer {
            remote: remote.to_string(),
            bytes,
        });
        Ok(bytes)
    }

    async fn get_file(&self, remote: &str, local: &Path) -> Result<u64, TransferError> {
        self.ensure_connected()?;
        let get_error = |reason: String| TransferError::Get {
            remote: remote.to_string(),
            local: local.to_path_buf(),
            reason,
        };

        let contents = self
            .state
            .read()
            .await
            .files
            .get(remote)
            .cloned()
            .ok_or_else(|| get_error("no such file".to_string()))?;
        tokio::fs::write(local, &contents)
            .await
            .map_err(|e| get_error(e.to_string()))?;

        let bytes = contents.len() as u64;
        self.state.write().await.gets.push(RecordedTransfer {
            remote: remote.to_string(),
            bytes,
        });
        Ok(bytes)
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        let dir = path.trim_end_matches('/');
        if !state.dirs.contains(dir) {
            return Err(TransferError::List {
                path: path.to_string(),
                reason: "no such directory".to_string(),
            });
        }

        let name_of = |p: &str| p.rsplit('/').next().unwrap_or(p).to_string();
        let mut listing: Vec<RemoteEntry> = state
            .dirs
            .iter()
            .filter(|d| parent_of(d) == dir)
            .map(|d| RemoteEntry {
                name: name_of(d),
                is_dir: true,
                size: 0,
            })
            .chain(
                state
                    .files
                    .iter()
                    .filter(|(f, _)| parent_of(f) == dir)
                    .map(|(f, data)| RemoteEntry {
                        name: name_of(f),
                        is_dir: false,
                        size: data.len() as u64,
                    }),
            )
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn remote_digest(&self, path: &str) -> Result<String, TransferError> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        let contents = state.files.get(path).ok_or_else(|| TransferError::Read {
            path: path.to_string(),
            reason: "no such file".to_string(),
        })?;
        digest_reader(contents.as_slice()).map_err(|e| TransferError::Read {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.state.write().await.disconnects += 1;
        }
    }
}
