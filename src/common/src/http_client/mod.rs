use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;

/// Posts `{"text": "<message>"}` to `url`. Returns the HTTP status code;
/// callers treat any response, success or not, as a completed delivery. Only
/// transport-level failures (connect error, timeout) surface as `Err`.
pub async fn post_webhook_text(
    url: &str,
    text: &str,
    timeout_duration: Option<Duration>,
) -> Result<u16> {
    let client = Client::new();
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(&json!({ "text": text }));

    if let Some(timeout_duration) = timeout_duration {
        request = request.timeout(timeout_duration)
    }

    let response = request
        .send()
        .await
        .context("Failed to send webhook request")?;

    Ok(response.status().as_u16())
}
