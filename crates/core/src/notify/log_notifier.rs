use async_trait::async_trait;
use tracing::info;

use super::{Notification, Notifier, NotifyError};

/// Records notifications in the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            email = %notification.email,
            recipient = %notification.recipient_name,
            submission = %notification.submission,
            "Notification {}",
            notification.event
        );
        Ok(())
    }
}
