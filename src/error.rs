//! Error types for icon acquisition
//!
//! Fetch and decode failures never leave the downloader: they are logged and
//! collapse into "finished without an icon". Cancellation is not an error at
//! all: it is the downloader's `Cancelled` state, and suppresses the completion
//! signal.

use thiserror::Error;

/// Network-layer failure while fetching icon bytes
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected status: {0}")]
    Status(u16),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl FetchError {
    /// Normalize a reqwest error, pulling timeouts out into their own variant
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Request(err)
        }
    }
}

/// Bytes that could not be turned into an image
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Empty response body")]
    Empty,

    #[error("Not a valid image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Decoder task failed: {0}")]
    Task(String),
}

/// Outcome of a single icon attempt that did not produce an icon
#[derive(Error, Debug)]
pub enum IconError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("No async runtime to run the download on: {0}")]
    NoRuntime(String),
}
