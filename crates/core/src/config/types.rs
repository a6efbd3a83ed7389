use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub sftp: SftpConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// SFTP server connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SftpConfig {
    /// Hostname of the SFTP server (container name in the reference deployment)
    pub host: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Remote home directory; `uploads/` and `outputs/` live below it
    pub home: String,
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Timeout applied to every blocking SSH/SFTP call, in seconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,
}

fn default_sftp_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_io_timeout() -> u64 {
    300
}

/// Local directory layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Base of `<owner>/<submission>` upload directories
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    /// Base of per-submission serving directories for published results
    #[serde(default = "default_explorer_data_dir")]
    pub explorer_data_dir: PathBuf,
    /// Directory holding run lock markers
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            explorer_data_dir: default_explorer_data_dir(),
            lock_dir: default_lock_dir(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("/app/sp_app/uploads")
}

fn default_explorer_data_dir() -> PathBuf {
    PathBuf::from("/app/sp_app/explorer_data")
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("/var/lock")
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("shuttle.db")
}

/// Run lock behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockConfig {
    /// Reclaim markers whose owning process no longer exists
    #[serde(default = "default_true")]
    pub stale_detection: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_detection: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Stage pipeline policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Consecutive checksum mismatches after which a submission is flagged
    /// as errored (0 = never flag).
    #[serde(default = "default_max_checksum_failures")]
    pub max_checksum_failures: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_checksum_failures: default_max_checksum_failures(),
        }
    }
}

fn default_max_checksum_failures() -> u32 {
    3
}

/// Notification backend configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub backend: NotifierBackend,
    /// Webhook-specific configuration (required when backend = "webhook")
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

/// Available notification backends
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifierBackend {
    #[default]
    Log,
    Webhook,
}

/// Webhook notifier configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Endpoint receiving notification JSON (e.g., "http://mailer:8000/notify")
    pub url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u32,
}

fn default_webhook_timeout() -> u32 {
    30
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub sftp: SanitizedSftpConfig,
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub lock: LockConfig,
    pub pipeline: PipelineConfig,
    pub notifier: NotifierConfig,
}

/// Sanitized SFTP config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password_configured: bool,
    pub home: String,
    pub connect_timeout_secs: u64,
    pub io_timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            sftp: SanitizedSftpConfig {
                host: config.sftp.host.clone(),
                port: config.sftp.port,
                username: config.sftp.username.clone(),
                password_configured: !config.sftp.password.is_empty(),
                home: config.sftp.home.clone(),
                connect_timeout_secs: config.sftp.connect_timeout_secs,
                io_timeout_secs: config.sftp.io_timeout_secs,
            },
            paths: config.paths.clone(),
            database: config.database.clone(),
            lock: config.lock.clone(),
            pipeline: config.pipeline.clone(),
            notifier: config.notifier.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[sftp]
host = "sftp-server"
username = "symportal"
password = "hunter2"
home = "/home/symportal"
"#;

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.sftp.host, "sftp-server");
        assert_eq!(config.sftp.port, 22);
        assert_eq!(config.sftp.connect_timeout_secs, 30);
        assert_eq!(config.sftp.io_timeout_secs, 300);
        assert_eq!(config.paths.lock_dir, PathBuf::from("/var/lock"));
        assert_eq!(config.database.path, PathBuf::from("shuttle.db"));
        assert!(config.lock.stale_detection);
        assert_eq!(config.pipeline.max_checksum_failures, 3);
        assert_eq!(config.notifier.backend, NotifierBackend::Log);
        assert!(config.notifier.webhook.is_none());
    }

    #[test]
    fn test_deserialize_missing_sftp_fails() {
        let toml = r#"
[database]
path = "x.db"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[sftp]
host = "10.0.0.5"
port = 2222
username = "u"
password = "p"
home = "/srv/sftp"
connect_timeout_secs = 5
io_timeout_secs = 60

[paths]
uploads_dir = "/data/uploads"
explorer_data_dir = "/data/explorer"
lock_dir = "/tmp/locks"

[lock]
stale_detection = false

[pipeline]
max_checksum_failures = 0

[notifier]
backend = "webhook"

[notifier.webhook]
url = "http://mailer:8000/notify"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sftp.port, 2222);
        assert_eq!(config.paths.uploads_dir, PathBuf::from("/data/uploads"));
        assert!(!config.lock.stale_detection);
        assert_eq!(config.pipeline.max_checksum_failures, 0);
        assert_eq!(config.notifier.backend, NotifierBackend::Webhook);

        let webhook = config.notifier.webhook.as_ref().unwrap();
        assert_eq!(webhook.url, "http://mailer:8000/notify");
        assert_eq!(webhook.timeout_secs, 30); // default
    }

    #[test]
    fn test_sanitized_config_hides_password() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.sftp.password_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
