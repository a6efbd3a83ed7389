//! Stage runner configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::transfer::remote_join;

/// Directory layout and failure policy for stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRunnerConfig {
    /// Upload payloads live at `<uploads_dir>/<owner>/<name>`.
    pub uploads_dir: PathBuf,
    /// Published results are unpacked to `<explorer_data_dir>/<name>`.
    pub explorer_data_dir: PathBuf,
    /// Home directory of the transfer account on the processing host.
    pub remote_home: String,
    /// Consecutive checksum mismatches before a submission is flagged as
    /// errored. 0 never flags.
    pub max_checksum_failures: u32,
}

impl StageRunnerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            uploads_dir: config.paths.uploads_dir.clone(),
            explorer_data_dir: config.paths.explorer_data_dir.clone(),
            remote_home: config.sftp.home.clone(),
            max_checksum_failures: config.pipeline.max_checksum_failures,
        }
    }

    /// `<uploads_dir>/<owner>/<name>`
    pub fn upload_dir(&self, owner: &str, name: &str) -> PathBuf {
        self.uploads_dir.join(owner).join(name)
    }

    /// `<explorer_data_dir>/<name>`
    pub fn explorer_dir(&self, name: &str) -> PathBuf {
        self.explorer_data_dir.join(name)
    }

    /// `<home>/uploads/<owner>/<name>`
    pub fn remote_upload_dir(&self, owner: &str, name: &str) -> String {
        remote_join(&remote_join(&remote_join(&self.remote_home, "uploads"), owner), name)
    }

    /// `<home>/outputs/<owner>/<name>`
    pub fn remote_output_dir(&self, owner: &str, name: &str) -> String {
        remote_join(&remote_join(&remote_join(&self.remote_home, "outputs"), owner), name)
    }

    /// Whether `failures` consecutive mismatches should flag the submission.
    pub fn should_flag(&self, failures: u32) -> bool {
        self.max_checksum_failures > 0 && failures >= self.max_checksum_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StageRunnerConfig {
        StageRunnerConfig {
            uploads_dir: PathBuf::from("/app/sp_app/uploads"),
            explorer_data_dir: PathBuf::from("/app/sp_app/explorer_data"),
            remote_home: "/home/sftp/".to_string(),
            max_checksum_failures: 3,
        }
    }

    #[test]
    fn test_directory_layout() {
        let config = config();
        assert_eq!(
            config.upload_dir("alice", "S1"),
            PathBuf::from("/app/sp_app/uploads/alice/S1")
        );
        assert_eq!(
            config.explorer_dir("S1"),
            PathBuf::from("/app/sp_app/explorer_data/S1")
        );
        assert_eq!(
            config.remote_upload_dir("alice", "S1"),
            "/home/sftp/uploads/alice/S1"
        );
        assert_eq!(
            config.remote_output_dir("alice", "S1"),
            "/home/sftp/outputs/alice/S1"
        );
    }

    #[test]
    fn test_should_flag() {
        let mut config = config();
        assert!(!config.should_flag(2));
        assert!(config.should_flag(3));
        assert!(config.should_flag(4));

        config.max_checksum_failures = 0;
        assert!(!config.should_flag(100));
    }

    #[test]
    fn test_from_config() {
        let toml = r#"
[sftp]
host = "sftp"
username = "u"
password = "p"
home = "/home/u"

[paths]
uploads_dir = "/data/uploads"
explorer_data_dir = "/data/explorer"

[pipeline]
max_checksum_failures = 5
"#;
        let config = crate::config::load_config_from_str(toml).unwrap();
        let runner_config = StageRunnerConfig::from_config(&config);
        assert_eq!(runner_config.uploads_dir, PathBuf::from("/data/uploads"));
        assert_eq!(runner_config.remote_home, "/home/u");
        assert_eq!(runner_config.max_checksum_failures, 5);
    }
}
