//! Shared HTTP plumbing for model clients

use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{Error, Result};

/// Build a pooled client with a per-request timeout
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(5)
        .build()
        .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))
}

/// Run `operation` up to `max_retries + 1` times with exponential backoff
///
/// Retrying is a client concern; the query engine itself makes exactly one call.
pub(crate) async fn retry_request<F, Fut, T>(max_retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries => {
                let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                tracing::warn!(
                    "Request failed (attempt {}/{}): {}, retrying in {:?}",
                    attempt + 1,
                    max_retries + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Turn a non-success response into a `ModelCall` error carrying the body
pub(crate) async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::model_call(format!("{} failed: HTTP {} - {}", what, status, body)))
}
