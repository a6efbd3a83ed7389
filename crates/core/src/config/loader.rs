use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variables used by the original cron deployment, mapped onto
/// their config keys. `SHUTTLE_`-prefixed variables take precedence.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("SYMPORTAL_SFTP_SERVER_CONTAINER", "sftp.host"),
    ("SFTP_USERNAME", "sftp.username"),
    ("SFTP_PASSWORD", "sftp.password"),
    ("SFTP_HOME", "sftp.home"),
];

/// Load configuration from file with environment variable overrides.
///
/// The file is optional as long as the environment provides every required
/// key; a missing file is only reported when extraction fails.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let file_exists = path.exists();

    let mut figment = Figment::new();
    if file_exists {
        figment = figment.merge(Toml::file(path));
    }
    for (var, key) in LEGACY_ENV {
        let key: &'static str = key;
        figment = figment.merge(Env::raw().only(&[*var]).map(move |_| key.into()));
    }
    figment = figment.merge(Env::prefixed("SHUTTLE_").split("__"));

    figment.extract().map_err(|e| {
        if file_exists {
            ConfigError::ParseError(e.to_string())
        } else {
            ConfigError::FileNotFound(format!("{} ({})", path.display(), e))
        }
    })
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[sftp]
host = "sftp"
username = "u"
home = "/home/u"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.sftp.host, "sftp");
        assert_eq!(config.sftp.password, "");
    }

    #[test]
    fn test_load_config_from_str_missing_sftp() {
        let toml = r#"
[pipeline]
max_checksum_failures = 2
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        Jail::expect_with(|_jail| {
            let result = load_config(Path::new("/nonexistent/shuttle.toml"));
            assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
            Ok(())
        });
    }

    #[test]
    fn test_load_config_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "shuttle.toml",
                r#"
[sftp]
host = "127.0.0.1"
port = 2022
username = "shuttle"
password = "secret"
home = "/home/shuttle"

[paths]
lock_dir = "/tmp"
"#,
            )?;

            let config = load_config(Path::new("shuttle.toml")).unwrap();
            assert_eq!(config.sftp.port, 2022);
            assert_eq!(config.paths.lock_dir.to_str().unwrap(), "/tmp");
            Ok(())
        });
    }

    #[test]
    fn test_load_config_from_legacy_env_without_file() {
        Jail::expect_with(|jail| {
            jail.set_env("SYMPORTAL_SFTP_SERVER_CONTAINER", "legacyhost");
            jail.set_env("SFTP_USERNAME", "legacyuser");
            jail.set_env("SFTP_PASSWORD", "legacypass");
            jail.set_env("SFTP_HOME", "/home/legacy");
            jail.set_env("SHUTTLE_SFTP__PORT", "2200");

            let config = load_config(Path::new("missing.toml")).unwrap();
            assert_eq!(config.sftp.host, "legacyhost");
            assert_eq!(config.sftp.username, "legacyuser");
            assert_eq!(config.sftp.password, "legacypass");
            assert_eq!(config.sftp.home, "/home/legacy");
            assert_eq!(config.sftp.port, 2200);
            Ok(())
        });
    }

    #[test]
    fn test_env_precedence_over_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "shuttle.toml",
                r#"
[sftp]
host = "filehost"
username = "fileuser"
home = "/home/file"

[pipeline]
max_checksum_failures = 5
"#,
            )?;
            jail.set_env("SYMPORTAL_SFTP_SERVER_CONTAINER", "legacyhost");
            jail.set_env("SFTP_HOME", "/home/legacy");
            jail.set_env("SHUTTLE_SFTP__HOST", "shuttlehost");
            jail.set_env("SHUTTLE_PIPELINE__MAX_CHECKSUM_FAILURES", "1");

            let config = load_config(Path::new("shuttle.toml")).unwrap();
            // SHUTTLE_ beats legacy, legacy beats the file.
            assert_eq!(config.sftp.host, "shuttlehost");
            assert_eq!(config.sftp.home, "/home/legacy");
            assert_eq!(config.sftp.username, "fileuser");
            assert_eq!(config.pipeline.max_checksum_failures, 1);
            Ok(())
        });
    }
}
