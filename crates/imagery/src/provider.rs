use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stock photo selected for an article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockImage {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Attribution line required by the stock source's license.
    pub credit: String,
    /// Provider name the image came from.
    pub source: String,
}

/// Trait for stock-image providers — each backend implements this.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Search for one landscape image matching the query. `Ok(None)` means
    /// the source answered but had no acceptable match.
    async fn search(&self, query: &str) -> Result<Option<StockImage>, ImageError>;

    /// Provider name for logs and round-robin bookkeeping.
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} — {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ImageError {
    /// A 429 means this source's quota is gone for now; the dispatcher
    /// fails over to the next source regardless of schedule.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ImageError::ApiError { status: 429, .. })
    }
}
