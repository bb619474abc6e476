// src/fetch/pages.rs

use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;

/// How often, and how patiently, a page request is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Wait before the first retry; doubles on each further retry.
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.backoff_ms,
        }
    }

    /// Wait before retry number `retry` (1-based).
    fn delay(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

async fn get_once(client: &Client, url: &Url) -> Result<String, reqwest::Error> {
    client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

/// Connection trouble, timeouts, throttling and 5xx are worth another go.
/// Any other 4xx means the request itself is wrong.
fn is_transient(err: &reqwest::Error) -> bool {
    match err.status() {
        Some(status) => {
            status.is_server_error()
                || status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::REQUEST_TIMEOUT
        }
        None => true,
    }
}

/// GET `url` as text under `policy`.
pub async fn get_text(client: &Client, url: &Url, policy: RetryPolicy) -> Result<String> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        debug!(%url, attempt, "GET");
        let err = match get_once(client, url).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        let status = err.status().map(|s| s.as_u16());
        if !is_transient(&err) {
            error!(%url, ?status, error = %err, "request rejected");
            return Err(anyhow!(err).context(format!("GET {} rejected", url)));
        }
        if attempt > policy.max_retries {
            error!(%url, attempt, ?status, error = %err, "giving up");
            return Err(anyhow!(err).context(format!(
                "GET {} failed after {} attempt(s)",
                url, attempt
            )));
        }

        let delay = policy.delay(attempt);
        warn!(
            %url,
            attempt,
            delay_ms = delay.as_millis() as u64,
            ?status,
            error = %err,
            "page request failed, retrying"
        );
        sleep(delay).await;
    }
}
