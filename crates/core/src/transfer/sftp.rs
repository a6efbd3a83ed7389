//! SFTP backend built on libssh2.
//!
//! libssh2 calls are blocking, so every protocol call runs on tokio's
//! blocking pool while the async caller awaits it. The connection sits
//! behind a mutex; calls on one session are therefore serialized.

use std::fs::File;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ssh2::{Session, Sftp};
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::traits::{TransferClient, TransferSession};
use super::types::{dir_segments, Credentials, Endpoint, RemoteEntry};
use crate::checksum::digest_reader;
use crate::config::SftpConfig;

/// Permissions for directories created on the remote host.
const REMOTE_DIR_MODE: i32 = 0o755;

/// Opens SFTP sessions with password authentication.
pub struct SftpTransferClient {
    endpoint: Endpoint,
    credentials: Credentials,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl SftpTransferClient {
    /// Creates a client with 30s connect and 300s I/O timeouts.
    pub fn new(endpoint: Endpoint, credentials: Credentials) -> Self {
        Self {
            endpoint,
            credentials,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(300),
        }
    }

    /// Creates a client from the `[sftp]` config section.
    pub fn from_config(config: &SftpConfig) -> Self {
        Self::new(
            Endpoint::new(config.host.clone(), config.port),
            Credentials::new(config.username.clone(), config.password.clone()),
        )
        .with_timeouts(
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.io_timeout_secs),
        )
    }

    /// Overrides the connect and per-call I/O timeouts.
    pub fn with_timeouts(mut self, connect: Duration, io: Duration) -> Self {
        self.connect_timeout = connect;
        self.io_timeout = io;
        self
    }
}

#[async_trait]
impl TransferClient for SftpTransferClient {
    fn name(&self) -> &str {
        "sftp"
    }

    fn describe(&self) -> String {
        format!("sftp://{}@{}", self.credentials.username, self.endpoint)
    }

    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError> {
        let endpoint = self.endpoint.clone();
        let credentials = self.credentials.clone();
        let connect_timeout = self.connect_timeout;
        let io_timeout = self.io_timeout;

        info!("Establishing connection with SFTP server {}", endpoint);

        let connection = tokio::task::spawn_blocking(move || {
            open_connection(&endpoint, &credentials, connect_timeout, io_timeout)
        })
        .await
        .map_err(|e| TransferError::Task(e.to_string()))??;

        info!("Connected to SFTP server {}", self.endpoint);

        Ok(Box::new(SftpSession {
            endpoint: self.endpoint.to_string(),
            connection: Arc::new(Mutex::new(Some(connection))),
        }))
    }
}

struct SftpConnection {
    session: Session,
    sftp: Sftp,
}

fn open_connection(
    endpoint: &Endpoint,
    credentials: &Credentials,
    connect_timeout: Duration,
    io_timeout: Duration,
) -> Result<SftpConnection, TransferError> {
    let connection_error = |reason: String| TransferError::Connection {
        endpoint: endpoint.to_string(),
        reason,
    };

    let addrs = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|e| connection_error(format!("address resolution failed: {}", e)))?;

    let mut last_error: Option<io::Error> = None;
    let mut stream = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, connect_timeout) {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }
    let tcp = stream.ok_or_else(|| {
        connection_error(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string()),
        )
    })?;

    tcp.set_read_timeout(Some(io_timeout))
        .and_then(|_| tcp.set_write_timeout(Some(io_timeout)))
        .map_err(|e| connection_error(e.to_string()))?;

    let mut session = Session::new().map_err(|e| connection_error(e.to_string()))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(io_timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|e| connection_error(format!("SSH handshake failed: {}", e)))?;

    let auth_failed = || TransferError::Authentication {
        endpoint: endpoint.to_string(),
        username: credentials.username.clone(),
    };
    session
        .userauth_password(&credentials.username, &credentials.password)
        .map_err(|e| {
            debug!("Password authentication error: {}", e);
            auth_failed()
        })?;
    if !session.authenticated() {
        return Err(auth_failed());
    }

    let sftp = session
        .sftp()
        .map_err(|e| connection_error(format!("SFTP subsystem unavailable: {}", e)))?;

    Ok(SftpConnection { session, sftp })
}

/// An open SFTP session.
pub struct SftpSession {
    endpoint: String,
    connection: Arc<Mutex<Option<SftpConnection>>>,
}

impl SftpSession {
    /// Runs `op` against the live connection on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, TransferError>
    where
        T: Send + 'static,
        F: FnOnce(&SftpConnection) -> Result<T, TransferError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection
                .lock()
                .map_err(|_| TransferError::Task("SFTP connection lock poisoned".to_string()))?;
            let conn = guard.as_ref().ok_or(TransferError::NotConnected)?;
            op(conn)
        })
        .await
        .map_err(|e| TransferError::Task(e.to_string()))?
    }
}

fn is_remote_dir(sftp: &Sftp, path: &str) -> bool {
    sftp.stat(Path::new(path))
        .map(|stat| stat.is_dir())
        .unwrap_or(false)
}

#[async_trait]
impl TransferSession for SftpSession {
    async fn ensure_remote_dir(&self, path: &str) -> Result<(), TransferError> {
        let path = path.to_string();
        self.blocking(move |conn| {
            for segment in dir_segments(&path) {
                if is_remote_dir(&conn.sftp, &segment) {
                    continue;
                }
                if let Err(e) = conn.sftp.mkdir(Path::new(&segment), REMOTE_DIR_MODE) {
                    if is_remote_dir(&conn.sftp, &segment) {
                        debug!("Remote directory {} appeared concurrently", segment);
                        continue;
                    }
                    return Err(TransferError::RemoteDirCreate {
                        path: segment,
                        reason: e.to_string(),
                    });
                }
                debug!("Created remote directory {}", segment);
            }
            Ok(())
        })
        .await
    }

    async fn put_file(&self, local: &Path, remote: &str) -> Result<u64, TransferError> {
        let local = local.to_path_buf();
        let remote = remote.to_string();
        self.blocking(move |conn| {
            let put_error = |reason: String| TransferError::Put {
                local: local.clone(),
                remote: remote.clone(),
                reason,
            };
            let mut source = File::open(&local).map_err(|e| put_error(e.to_string()))?;
            let mut target = conn
                .sftp
                .create(Path::new(&remote))
                .map_err(|e| put_error(e.to_string()))?;
            io::copy(&mut source, &mut target).map_err(|e| put_error(e.to_string()))
        })
        .await
    }

    async fn get_file(&self, remote: &str, local: &Path) -> Result<u64, TransferError> {
        let local: PathBuf = local.to_path_buf();
        let remote = remote.to_string();
        self.blocking(move |conn| {
            let get_error = |reason: String| TransferError::Get {
                remote: remote.clone(),
                local: local.clone(),
                reason,
            };
            let mut source = conn
                .sftp
                .open(Path::new(&remote))
                .map_err(|e| get_error(e.to_string()))?;
            let mut target = File::create(&local).map_err(|e| get_error(e.to_string()))?;
            io::copy(&mut source, &mut target).map_err(|e| get_error(e.to_string()))
        })
        .await
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        let path = path.to_string();
        self.blocking(move |conn| {
            let entries = conn
                .sftp
                .readdir(Path::new(&path))
                .map_err(|e| TransferError::List {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;

            let mut listing: Vec<RemoteEntry> = entries
                .into_iter()
                .filter_map(|(entry_path, stat)| {
                    let name = entry_path.file_name()?.to_string_lossy().into_owned();
                    if name == "." || name == ".." {
                        return None;
                    }
                    Some(RemoteEntry {
                        name,
                        is_dir: stat.is_dir(),
                        size: stat.size.unwrap_or(0),
                    })
                })
                .collect();
            listing.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(listing)
        })
        .await
    }

    async fn remote_digest(&self, path: &str) -> Result<String, TransferError> {
        let path = path.to_string();
        self.blocking(move |conn| {
            let read_error = |reason: String| TransferError::Read {
                path: path.clone(),
                reason,
            };
            let file = conn
                .sftp
                .open(Path::new(&path))
                .map_err(|e| read_error(e.to_string()))?;
            digest_reader(file).map_err(|e| read_error(e.to_string()))
        })
        .await
    }

    async fn disconnect(&self) {
        let connection = Arc::clone(&self.connection);
        let endpoint = self.endpoint.clone();
        let result = tokio::task::spawn_blocking(move || {
            let taken = match connection.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            match taken {
                Some(conn) => {
                    drop(conn.sftp);
                    if let Err(e) = conn.session.disconnect(None, "shuttle run finished", None) {
                        warn!("Error while disconnecting from {}: {}", endpoint, e);
                    }
                    info!("Disconnected from SFTP server {}", endpoint);
                }
                None => debug!("SFTP session to {} already closed", endpoint),
            }
        })
        .await;

        if let Err(e) = result {
            warn!("SFTP disconnect task failed: {}", e);
        }
    }
}
