// =====================================================================================
// NOTIFICATION SERVICE - OUTBOUND TEXT ALERTS
// =====================================================================================

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, instrument};

use shared_config::AppConfig;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook rejected notification with status {0}")]
    Rejected(u16),
}

/// Best-effort text notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Posts `{"text": ...}` to a Slack incoming webhook. Without a webhook it
/// only logs.
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook: Option<String>,
}

impl SlackNotifier {
    pub fn new(webhook: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.slack_webhook.clone())
    }

    pub fn is_configured(&self) -> bool {
        self.webhook.is_some()
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    #[instrument(skip(self, text))]
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let Some(webhook) = &self.webhook else {
            info!(text = %text, "Notification skipped, no webhook configured");
            return Ok(());
        };

        let response = self
            .client
            .post(webhook)
            .json(&json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        debug!("Notification delivered");
        Ok(())
    }
}
