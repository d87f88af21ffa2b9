//! HTTP session helpers shared by the retailers
//!
//! This module handles:
//! - Building HTTP clients with the configured user agent and timeout
//! - GET requests returning text or decoded JSON
//! - Retry logic for transient failures
//! - Error classification into `SourceError`

use crate::config::UserAgentConfig;
use crate::{SourceError, SourceResult};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Default pause before the first retry; later retries wait proportionally longer
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout, applied to every network operation
/// * `cookie_store` - Whether the client keeps session cookies between requests
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
    cookie_store: bool,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .cookie_store(cookie_store)
        .gzip(true)
        .brotli(true)
        .build()
}

/// A client plus the retry policy applied to every request
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 404 | Immediate `Status` error |
/// | HTTP 429 | Immediate `Status` error |
/// | HTTP 5xx | Retry up to `retry_attempts` times |
/// | Timeout | Retry up to `retry_attempts` times, then `Timeout` |
/// | Other network error | Immediate `Http` error |
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpSession {
    pub fn new(client: Client, retry_attempts: u32) -> Self {
        Self {
            client,
            retry_attempts,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Fetches `url` and returns the body as text
    pub async fn get_text(&self, url: &str) -> SourceResult<String> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| classify(url, e))
    }

    /// Fetches `url` and decodes the body as JSON
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> SourceResult<T> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Sends a JSON body with PUT; the response body is ignored
    pub async fn put_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> SourceResult<()> {
        let response = self
            .client
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(|e| classify(url, e))?;
        check_status(url, response.status())
    }

    /// Sends a GET, retrying transient failures
    async fn get(&self, url: &str) -> SourceResult<Response> {
        let mut attempt = 0;
        loop {
            let result = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    check_status(url, status).map(|_| response)
                }
                Err(e) => Err(classify(url, e)),
            };

            match result {
                Err(e) if is_transient(&e) && attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::debug!(url, attempt, error = %e, "Retrying request");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                other => return other,
            }
        }
    }
}

fn check_status(url: &str, status: StatusCode) -> SourceResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn classify(url: &str, error: reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::Timeout {
            url: url.to_string(),
        }
    } else {
        SourceError::Http {
            url: url.to_string(),
            source: error,
        }
    }
}

fn is_transient(error: &SourceError) -> bool {
    match error {
        SourceError::Timeout { .. } => true,
        SourceError::Status { status, .. } => *status >= 500,
        _ => false,
    }
}
