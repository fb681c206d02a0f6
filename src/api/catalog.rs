//! Discovery catalog client
//!
//! Fetches the JSON catalog a discovery endpoint publishes: the devices in
//! range plus the apps and media sources they offer.

use anyhow::Result;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::models::CatalogDocument;

/// Catalog endpoint error types
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog not found (404)")]
    NotFound,

    #[error("Rate limited (429), retries exhausted")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Invalid catalog: {0}")]
    InvalidResponse(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// Catalog endpoint client
pub struct CatalogClient {
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl CatalogClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            max_retries: 3,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the catalog, retrying on rate limits
    pub async fn fetch(&self) -> Result<CatalogDocument> {
        let mut retries = 0;

        loop {
            let response = self
                .client
                .get(&self.url)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(CatalogError::from)?;

            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await.map_err(CatalogError::from)?;
                    let document: CatalogDocument = serde_json::from_str(&body).map_err(|e| {
                        CatalogError::InvalidResponse(format!("JSON parse error: {}", e))
                    })?;
                    return Ok(document);
                }
                StatusCode::NOT_FOUND => {
                    return Err(CatalogError::NotFound.into());
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    retries += 1;
                    if retries >= self.max_retries {
                        return Err(CatalogError::RateLimited.into());
                    }

                    let wait_secs = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(2u64.pow(retries));

                    tracing::warn!(url = %self.url, wait_secs, "catalog rate limited, backing off");
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    continue;
                }
                status => {
                    return Err(CatalogError::ServerError(status.as_u16()).into());
                }
            }
        }
    }
}
