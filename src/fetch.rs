//! Fetch remote patch data over HTTP.
//!
//! One [`Fetcher`] per apply: it owns the connection pool and a counting
//! semaphore bounding how many requests are in flight at once. `fetch` is
//! a single attempt that classifies its failures; retry policy lives with
//! the caller, because what's worth retrying depends on what's being
//! fetched (a bundle retries on bad bytes, a changelog doesn't).

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tracing::*;

use crate::changelog::{CHANGELOG_NAME, Changelog};
use crate::error::PatchError;

/// In-flight request cap.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Attempts per object before giving up.
pub const DEFAULT_ATTEMPTS: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Exponential backoff before retry number `attempt` (1-based).
pub fn backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    INITIAL_BACKOFF
        .saturating_mul(1 << exp)
        .min(MAX_BACKOFF)
}

pub struct Fetcher {
    client: reqwest::Client,
    base: String,
    permits: Semaphore,
}

impl Fetcher {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_concurrency(base_url, DEFAULT_CONCURRENCY)
    }

    pub fn with_concurrency(base_url: &str, concurrency: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Couldn't build an HTTP client")?;
        Ok(Self {
            client,
            base: base_url.trim_end_matches('/').to_owned(),
            permits: Semaphore::new(concurrency),
        })
    }

    /// One GET of `key` under the base URL.
    ///
    /// 5xx, timeouts, and connection trouble come back as
    /// [`PatchError::Network`] (worth retrying); anything else the server
    /// says definitively (404 and friends) is [`PatchError::Input`].
    pub async fn fetch(&self, key: &str) -> Result<Vec<u8>, PatchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("fetch semaphore closed");

        let url = format!("{}/{}", self.base, key);
        trace!("GET {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PatchError::Network(format!("GET {url}: {e}")))?;

        let status = response.status();
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            return Err(PatchError::Network(format!("GET {url}: {status}")));
        }
        if !status.is_success() {
            return Err(PatchError::Input(format!("GET {url}: {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PatchError::Network(format!("GET {url}: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// GETs `key`, retrying transient network failures with backoff.
    pub async fn fetch_with_retry(&self, key: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch(key).await {
                Ok(bytes) => return Ok(bytes),
                Err(e @ PatchError::Network(_)) if attempt < DEFAULT_ATTEMPTS => {
                    warn!("{e} (attempt {attempt}/{DEFAULT_ATTEMPTS})");
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(e) => return Err(e).with_context(|| format!("Couldn't fetch {key}")),
            }
        }
    }

    /// Fetches and parses the remote changelog.
    pub async fn fetch_changelog(&self) -> Result<Changelog> {
        let bytes = self.fetch_with_retry(CHANGELOG_NAME).await?;
        Changelog::from_json(&bytes)
            .with_context(|| format!("Remote {CHANGELOG_NAME} is malformed"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff(1), Duration::from_millis(250));
        assert_eq!(backoff(2), Duration::from_millis(500));
        assert_eq!(backoff(3), Duration::from_secs(1));
        assert_eq!(backoff(10), MAX_BACKOFF);
        assert_eq!(backoff(u32::MAX), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn classifies_server_and_client_errors() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/present"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"bytes".as_slice()))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&server.uri()).unwrap();

        assert!(matches!(
            fetcher.fetch("flaky").await,
            Err(PatchError::Network(_))
        ));
        assert!(matches!(
            fetcher.fetch("missing").await,
            Err(PatchError::Input(_))
        ));
        assert_eq!(fetcher.fetch("present").await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eventually"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/eventually"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"finally".as_slice()))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&server.uri()).unwrap();
        assert_eq!(fetcher.fetch_with_retry("eventually").await.unwrap(), b"finally");
    }
}
