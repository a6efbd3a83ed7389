use async_trait::async_trait;

use super::{Notification, NotifyError};

/// Delivers owner notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Hand one notification to the backend.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}
