use async_trait::async_trait;
use tracing::debug;

use crate::provider::{ImageError, ImageProvider, StockImage};

const PEXELS_SEARCH_URL: &str = "https://api.pexels.com/v1/search";

pub struct PexelsProvider {
    client: reqwest::Client,
    api_key: String,
}

impl PexelsProvider {
    pub fn new(api_key: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, api_key }
    }
}

#[async_trait]
impl ImageProvider for PexelsProvider {
    async fn search(&self, query: &str) -> Result<Option<StockImage>, ImageError> {
        debug!(query, "Pexels search");

        let response = self
            .client
            .get(PEXELS_SEARCH_URL)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", "1"),
                ("orientation", "landscape"),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::ApiError { status, body });
        }

        let resp: serde_json::Value = response.json().await?;
        let photo = match resp["photos"].as_array().and_then(|p| p.first()) {
            Some(photo) => photo,
            None => return Ok(None),
        };

        let url = photo["src"]["large"]
            .as_str()
            .or_else(|| photo["src"]["original"].as_str())
            .ok_or_else(|| ImageError::ParseError("missing photos[0].src.large".into()))?
            .to_string();
        let photographer = photo["photographer"].as_str().unwrap_or("Unknown");

        Ok(Some(StockImage {
            url,
            thumbnail_url: photo["src"]["medium"].as_str().map(String::from),
            credit: format!("Photo by {photographer} on Pexels"),
            source: "pexels".to_string(),
        }))
    }

    fn name(&self) -> &str {
        "pexels"
    }
}
