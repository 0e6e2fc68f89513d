//! Outbound notification transports

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::shared::errors::{TrackerError, TrackerResult};

/// Delivery capability the threshold notifier depends on
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> TrackerResult<()>;
}

/// Writes alerts to the log; used when no webhook is configured
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, subject: &str, body: &str) -> TrackerResult<()> {
        warn!("🔔 {}", subject);
        for line in body.lines() {
            warn!("   {}", line);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
}

/// POSTs `{subject, body}` as JSON to a webhook
pub struct WebhookSink {
    http_client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> TrackerResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, subject: &str, body: &str) -> TrackerResult<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&WebhookPayload { subject, body })
            .send()
            .await
            .map_err(|e| TrackerError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TrackerError::Notification(format!(
                "webhook returned status {}",
                response.status()
            )));
        }

        info!("Webhook notified: {}", subject);
        Ok(())
    }
}
