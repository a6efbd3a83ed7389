//! Mock notifier for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::notify::{Notification, Notifier, NotifyError};

/// Mock implementation of the Notifier trait.
///
/// Records every notification and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
    fail: Arc<RwLock<bool>>,
}

impl MockNotifier {
    /// Create a new mock notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications delivered so far.
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    /// Make subsequent notifications fail.
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if *self.fail.read().await {
            return Err(NotifyError::Rejected {
                status: 503,
                message: "simulated notification failure".to_string(),
            });
        }
        self.sent.write().await.push(notification.clone());
        Ok(())
    }
}
