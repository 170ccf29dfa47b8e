use async_trait::async_trait;
use tracing::debug;

use crate::provider::{ImageError, ImageProvider, StockImage};

const UNSPLASH_SEARCH_URL: &str = "https://api.unsplash.com/search/photos";

pub struct UnsplashProvider {
    client: reqwest::Client,
    access_key: String,
}

impl UnsplashProvider {
    pub fn new(access_key: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, access_key }
    }
}

#[async_trait]
impl ImageProvider for UnsplashProvider {
    async fn search(&self, query: &str) -> Result<Option<StockImage>, ImageError> {
        debug!(query, "Unsplash search");

        let response = self
            .client
            .get(UNSPLASH_SEARCH_URL)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .query(&[("query", query), ("per_page", "1"), ("orientation", "landscape")])
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::ApiError { status, body });
        }

        let resp: serde_json::Value = response.json().await?;
        let result = match resp["results"].as_array().and_then(|r| r.first()) {
            Some(result) => result,
            None => return Ok(None),
        };

        let url = result["urls"]["regular"]
            .as_str()
            .or_else(|| result["urls"]["full"].as_str())
            .ok_or_else(|| ImageError::ParseError("missing results[0].urls.regular".into()))?
            .to_string();
        let photographer = result["user"]["name"].as_str().unwrap_or("Unknown");

        Ok(Some(StockImage {
            url,
            thumbnail_url: result["urls"]["small"].as_str().map(String::from),
            credit: format!("Photo by {photographer} on Unsplash"),
            source: "unsplash".to_string(),
        }))
    }

    fn name(&self) -> &str {
        "unsplash"
    }
}
