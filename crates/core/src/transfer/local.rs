//! Local-directory backend.
//!
//! Treats a directory on this machine (typically a network mount of the
//! processing host's SFTP root) as the remote side. Remote paths are resolved
//! below the root; `/home/u/uploads` maps to `<root>/home/u/uploads`.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use super::error::TransferError;
use super::traits::{TransferClient, TransferSession};
use super::types::{dir_segments, RemoteEntry};
use crate::checksum::digest_file;

/// Opens sessions against a local directory.
#[derive(Debug, Clone)]
pub struct LocalTransferClient {
    root: PathBuf,
}

impl LocalTransferClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TransferClient for LocalTransferClient {
    fn name(&self) -> &str {
        "local"
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError> {
        let is_dir = fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(TransferError::Connection {
                endpoint: self.describe(),
                reason: "root is not an accessible directory".to_string(),
            });
        }

        info!("Opened local transfer session at {}", self.root.display());
        Ok(Box::new(LocalSession {
            root: self.root.clone(),
            connected: AtomicBool::new(true),
        }))
    }
}

struct LocalSession {
    root: PathBuf,
    connected: AtomicBool,
}

impl LocalSession {
    fn ensure_connected(&self) -> Result<(), TransferError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransferError::NotConnected)
        }
    }

    /// Maps a remote path below the root, refusing `..` escapes.
    fn resolve(&self, remote: &str) -> Option<PathBuf> {
        let relative = Path::new(remote.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(resolved)
    }

    fn resolve_or(
        &self,
        remote: &str,
        error: impl FnOnce(String) -> TransferError,
    ) -> Result<PathBuf, TransferError> {
        self.resolve(remote)
            .ok_or_else(|| error("path escapes the transfer root".to_string()))
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

#[async_trait]
impl TransferSession for LocalSession {
    async fn ensure_remote_dir(&self, path: &str) -> Result<(), TransferError> {
        self.ensure_connected()?;

        for segment in dir_segments(path) {
            let target = self.resolve_or(&segment, |reason| TransferError::RemoteDirCreate {
                path: segment.clone(),
                reason,
            })?;
            if is_dir(&target).await {
                continue;
            }
            if let Err(e) = fs::create_dir(&target).await {
                if is_dir(&target).await {
                    debug!("Directory {} appeared concurrently", segment);
                    continue;
                }
                return Err(TransferError::RemoteDirCreate {
                    path: segment,
                    reason: e.to_string(),
                });
            }
            debug!("Created directory {}", target.display());
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
        let target = self.resolve_or(remote, put_error)?;
        fs::copy(local, &target)
            .await
            .map_err(|e| put_error(e.to_string()))
    }

    async fn get_file(&self, remote: &str, local: &Path) -> Result<u64, TransferError> {
        self.ensure_connected()?;
        let get_error = |reason: String| TransferError::Get {
            remote: remote.to_string(),
            local: local.to_path_buf(),
            reason,
        };
        let source = self.resolve_or(remote, get_error)?;
        fs::copy(&source, local)
            .await
            .map_err(|e| get_error(e.to_string()))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        self.ensure_connected()?;
        let list_error = |reason: String| TransferError::List {
            path: path.to_string(),
            reason,
        };
        let dir = self.resolve_or(path, list_error)?;

        let mut read_dir = fs::read_dir(&dir)
            .await
            .map_err(|e| list_error(e.to_string()))?;
        let mut listing = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| list_error(e.to_string()))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| list_error(e.to_string()))?;
            listing.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size: metadata.len(),
            });
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn remote_digest(&self, path: &str) -> Result<String, TransferError> {
        self.ensure_connected()?;
        let read_error = |reason: String| TransferError::Read {
            path: path.to_string(),
            reason,
        };
        let source = self.resolve_or(path, read_error)?;
        digest_file(&source)
            .await
            .map_err(|e| read_error(e.to_string()))
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Closed local transfer session at {}", self.root.display());
        }
    }
}
