//! Webhook notifier: POSTs each notification as JSON to the mail service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::{Notification, Notifier, NotifyError};
use crate::config::WebhookConfig;

pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        debug!("POST {} for {}", self.url, notification.submission);

        let response = self.client.post(&self.url).json(notification).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        info!(
            "Sent {} notification for {} to {}",
            notification.event, notification.submission, notification.email
        );
        Ok(())
    }
}
