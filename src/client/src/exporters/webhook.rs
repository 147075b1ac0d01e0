use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::config_manager::AlarmSinkConfig;
use crate::exporters::alarm_sink::AlarmSink;
use jobwatch_common::http_client::post_webhook_text;

/// Delivers alarms as `{"text": ...}` POSTs to a webhook URL. The response
/// status is logged but never inspected: any answer from the endpoint counts
/// as a completed delivery.
pub struct WebhookSink {
    url: String,
    timeout: Duration,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        WebhookSink {
            url: url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &AlarmSinkConfig) -> Self {
        WebhookSink::new(config.url.clone(), config.timeout())
    }
}

impl AlarmSink for WebhookSink {
    async fn deliver(&self, message: &str) -> Result<()> {
        let status = post_webhook_text(&self.url, message, Some(self.timeout)).await?;
        debug!(status, "webhook delivery completed");
        Ok(())
    }
}
