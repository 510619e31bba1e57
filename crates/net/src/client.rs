//! HTTP client with connection pooling and bounded retry

use otad_config::NetworkConfig;
use otad_errors::{Error, NetworkError};
use reqwest::{Client, Response};
use std::time::Duration;

/// Reqwest wrapper shared by the downloader and the callback reporter.
#[derive(Debug, Clone)]
pub struct NetClient {
    client: Client,
    retry_count: u32,
    retry_delay: Duration,
}

impl NetClient {
    /// Create a new network client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to
    /// initialize.
    pub fn new(config: &NetworkConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(format!("otad/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::ConnectionRefused(e.to_string()))?;

        Ok(Self {
            client,
            retry_count: config.retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }

    /// GET with retries for transient failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the request still fails after all retry
    /// attempts.
    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        self.retry_request(|| self.client.get(url).send()).await
    }

    /// GET with a `Range: bytes=<offset>-` header for download resumption.
    ///
    /// # Errors
    ///
    /// Returns an error if the request still fails after all retry
    /// attempts.
    pub async fn get_range(&self, url: &str, offset: u64) -> Result<Response, Error> {
        self.retry_request(|| {
            self.client
                .get(url)
                .header(reqwest::header::RANGE, format!("bytes={offset}-"))
                .send()
        })
        .await
    }

    /// POST a JSON body without retries (callback delivery is best-effort).
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or a non-success status.
    pub async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(), Error> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| NetworkError::CallbackFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NetworkError::CallbackFailed(format!(
                "status {}",
                response.status()
            ))
            .into());
        }
        Ok(())
    }

    async fn retry_request<F, Fut>(&self, mut f: F) -> Result<Response, Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match f().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let retryable = Self::should_retry(&e);
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        match last_error {
            Some(e) if e.is_timeout() => Err(NetworkError::Timeout {
                url: e.url().map(ToString::to_string).unwrap_or_default(),
            }
            .into()),
            Some(e) if e.is_connect() => Err(NetworkError::ConnectionRefused(e.to_string()).into()),
            Some(e) => Err(NetworkError::DownloadFailed(e.to_string()).into()),
            None => Err(NetworkError::DownloadFailed("unknown error".to_string()).into()),
        }
    }

    /// Transport-level failures worth another attempt
    fn should_retry(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }
}
