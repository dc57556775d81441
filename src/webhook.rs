//! Notification sink posting to a Discord-compatible webhook.

use std::time::Duration;

use async_trait::async_trait;

use crate::monitor::dispatcher::{DeliveryError, NotificationSink};
use crate::render::MESSAGE_LIMIT;

#[derive(serde::Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookSink {
    /// A delivery that takes longer than `timeout` fails, so a stalled
    /// webhook cannot hold up the poll cycle.
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&WebhookPayload { content: message })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn max_message_len(&self) -> Option<usize> {
        Some(MESSAGE_LIMIT)
    }
}
