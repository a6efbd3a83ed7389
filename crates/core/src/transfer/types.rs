//! Types shared by transfer backends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote host address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Username/password pair. The password never appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Basename of the entry.
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Joins remote path components with `/`, regardless of the local platform.
pub fn remote_join(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Cumulative prefixes of a remote directory path, root first.
///
/// `/home/u/uploads` yields `/home`, `/home/u`, `/home/u/uploads`. Empty
/// segments (double slashes, trailing slash) are skipped.
pub fn dir_segments(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut segments = Vec::new();

    for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(part);
        segments.push(current.clone());
    }

    segments
}
