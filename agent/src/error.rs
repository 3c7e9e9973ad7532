use thiserror::Error;

/// Result type for hosting-platform calls
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Errors from the repository scanner
#[derive(Error, Debug)]
pub enum ScanError {
    /// Request never produced a response
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response other than a rate limit
    #[error("GitHub returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// 403 or 429; callers stop paginating
    #[error("GitHub rate limit hit ({status}) for {url}")]
    RateLimited { status: u16, url: String },

    /// Response body did not have the expected shape
    #[error("Unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ScanError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ScanError::RateLimited { .. })
    }
}
