//! Owner notifications fired after a stage completes.
//!
//! The notifier only hands an event to the mail service; rendering and
//! delivery live there.

mod log_notifier;
mod traits;
mod types;
mod webhook;

pub use log_notifier::LogNotifier;
pub use traits::Notifier;
pub use types::{Notification, NotificationEvent};
pub use webhook::WebhookNotifier;

use thiserror::Error;

use crate::config::{NotifierBackend, NotifierConfig};

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Notifier could not be built from its configuration.
    #[error("Notifier not configured: {0}")]
    NotConfigured(String),

    /// Request to the notification service failed.
    #[error("Notification request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Notification service answered with a non-success status.
    #[error("Notification service error: {status} - {message}")]
    Rejected { status: u16, message: String },
}

/// Factory function to create a notifier from config
pub fn create_notifier(config: &NotifierConfig) -> Result<Box<dyn Notifier>, NotifyError> {
    match config.backend {
        NotifierBackend::Log => Ok(Box::new(LogNotifier::new())),
        NotifierBackend::Webhook => {
            let webhook = config.webhook.as_ref().ok_or_else(|| {
                NotifyError::NotConfigured(
                    "notifier.webhook must be set when using the webhook backend".to_string(),
                )
            })?;
            Ok(Box::new(WebhookNotifier::new(webhook)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;

    #[test]
    fn test_create_notifier_log() {
        let notifier = create_notifier(&NotifierConfig::default()).unwrap();
        assert_eq!(notifier.name(), "log");
    }

    #[test]
    fn test_create_notifier_webhook() {
        let config = NotifierConfig {
            backend: NotifierBackend::Webhook,
            webhook: Some(WebhookConfig {
                url: "http://mailer:8000/notify".to_string(),
                timeout_secs: 5,
            }),
        };
        let notifier = create_notifier(&config).unwrap();
        assert_eq!(notifier.name(), "webhook");
    }

    #[test]
    fn test_create_notifier_webhook_missing_section() {
        let config = NotifierConfig {
            backend: NotifierBackend::Webhook,
            webhook: None,
        };
        let result = create_notifier(&config);
        assert!(matches!(result, Err(NotifyError::NotConfigured(_))));
    }
}
