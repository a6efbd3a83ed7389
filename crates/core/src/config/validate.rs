use super::{
    types::{Config, NotifierBackend},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - SFTP host and username are set, port is not 0
/// - SFTP home is an absolute remote path
/// - Timeouts are non-zero
/// - Webhook backend has a URL
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let sftp = &config.sftp;

    if sftp.host.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "sftp.host cannot be empty".to_string(),
        ));
    }

    if sftp.username.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "sftp.username cannot be empty".to_string(),
        ));
    }

    if sftp.port == 0 {
        return Err(ConfigError::ValidationError(
            "sftp.port cannot be 0".to_string(),
        ));
    }

    if !sftp.home.starts_with('/') {
        return Err(ConfigError::ValidationError(format!(
            "sftp.home must be an absolute path, got {:?}",
            sftp.home
        )));
    }

    if sftp.connect_timeout_secs == 0 || sftp.io_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "sftp timeouts must be greater than 0".to_string(),
        ));
    }

    if config.notifier.backend == NotifierBackend::Webhook {
        match &config.notifier.webhook {
            Some(webhook) if !webhook.url.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::ValidationError(
                    "notifier.webhook.url is required when notifier.backend = \"webhook\""
                        .to_string(),
                ))
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[sftp]
host = "sftp"
username = "u"
password = "p"
home = "/home/u"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid_config();
        config.sftp.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_empty_host_fails() {
        let mut config = valid_config();
        config.sftp.host = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_relative_home_fails() {
        let mut config = valid_config();
        config.sftp.home = "home/u".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("sftp.home"));
    }

    #[test]
    fn test_validate_webhook_requires_url() {
        let mut config = valid_config();
        config.notifier.backend = NotifierBackend::Webhook;
        assert!(validate_config(&config).is_err());

        config.notifier.webhook = Some(crate::config::WebhookConfig {
            url: "http://mailer/notify".to_string(),
            timeout_secs: 10,
        });
        assert!(validate_config(&config).is_ok());
    }
}
