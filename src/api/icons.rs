//! Icon fetching over HTTP
//!
//! Given a URL, returns the raw bytes or a [`FetchError`]. Dropping the
//! returned future cancels the request.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::error::FetchError;

/// Network fetch capability consumed by the icon downloader
#[async_trait]
pub trait IconFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default 30s timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IconFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let url = reqwest::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        let response = self
            .client
            .get(url)
            .header("Accept", "image/*")
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        match response.status() {
            status if status.is_success() => {
                response.bytes().await.map_err(FetchError::from_reqwest)
            }
            status => Err(FetchError::Status(status.as_u16())),
        }
    }
}
