//! HTTP fetching with bounded retries.

use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};
use thiserror::Error;

use super::retry::RetryPolicy;

/// A single fetch failure, before retry exhaustion.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, DNS, timeout or protocol failure.
    #[error("request error: {0}")]
    Transport(String),
    /// Server answered with a non-success status.
    #[error("HTTP status {status}")]
    Status { status: u16 },
    /// Retry budget exhausted; carries the last per-attempt error.
    #[error("failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Bytes and content type of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// HTTP client wrapper applying the injected retry policy to every fetch.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, retry })
    }

    /// Fetch a URL, retrying transient failures with increasing backoff.
    ///
    /// Connection errors, timeouts and HTTP error statuses all count as
    /// transient until the attempt cap is reached; only then does the fetch
    /// become terminal.
    pub async fn fetch(&self, url: &str) -> Result<FetchedAsset, FetchError> {
        let mut last_error = String::new();
        for attempt in 1..=self.retry.max_attempts {
            match self.fetch_once(url).await {
                Ok(asset) => return Ok(asset),
                Err(e) => {
                    debug!("fetch attempt {attempt} failed for {url}: {e}");
                    last_error = e.to_string();
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }
        warn!("giving up on {url}: {last_error}");
        Err(FetchError::RetriesExhausted {
            attempts: self.retry.max_attempts,
            last_error,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedAsset, FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "*/*")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .to_vec();

        Ok(FetchedAsset { body, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_succeeds_and_captures_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/a.css")
            .with_status(200)
            .with_header("content-type", "text/css")
            .with_body("body { color: red }")
            .create_async()
            .await;

        let fetcher = Fetcher::new(
            "sitelocal-test",
            Duration::from_secs(5),
            RetryPolicy::without_delay(3),
        )
        .unwrap();
        let asset = fetcher.fetch(&format!("{}/a.css", server.url())).await.unwrap();
        assert_eq!(asset.content_type, "text/css");
        assert_eq!(asset.body, b"body { color: red }");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_errors_retry_until_exhaustion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gone")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let fetcher = Fetcher::new(
            "sitelocal-test",
            Duration::from_secs(5),
            RetryPolicy::without_delay(3),
        )
        .unwrap();
        let err = fetcher
            .fetch(&format!("{}/gone", server.url()))
            .await
            .unwrap_err();
        match err {
            FetchError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("500"));
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transient_failure_then_success_recovers() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/flaky")
            .with_status(200)
            .with_body("ok")
            .expect(1)
            .create_async()
            .await;

        let fetcher = Fetcher::new(
            "sitelocal-test",
            Duration::from_secs(5),
            RetryPolicy::without_delay(2),
        )
        .unwrap();
        let asset = fetcher
            .fetch(&format!("{}/flaky", server.url()))
            .await
            .unwrap();
        assert_eq!(asset.body, b"ok");
        failing.assert_async().await;
        ok.assert_async().await;
    }
}
