//! Syndication feed source: RSS/Atom via feed-rs.

use chrono::Utc;
use tracing::debug;

use mill_core::content::{CollectedItem, Engagement, SourceConfig};
use mill_core::ids;

use crate::error::CollectError;

pub struct FeedSource {
    pub config: SourceConfig,
    http: reqwest::Client,
    max_items: usize,
}

impl FeedSource {
    pub fn new(config: SourceConfig, http: reqwest::Client, max_items: usize) -> Self {
        Self {
            config,
            http,
            max_items,
        }
    }

    pub async fn fetch(&self) -> Result<Vec<CollectedItem>, CollectError> {
        debug!(source = %self.config.name, endpoint = %self.config.endpoint, "fetching feed");

        let response = self
            .http
            .get(&self.config.endpoint)
            .send()
            .await
            .map_err(|e| CollectError::SourceUnavailable(format!("{}: {e}", self.config.name)))?;

        if !response.status().is_success() {
            return Err(CollectError::SourceUnavailable(format!(
                "{}: HTTP {}",
                self.config.name,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CollectError::SourceUnavailable(format!("{}: {e}", self.config.name)))?;

        let feed = feed_rs::parser::parse(&bytes[..]).map_err(|e| {
            CollectError::SourceUnavailable(format!("{}: feed parse: {e}", self.config.name))
        })?;

        let fetched_at = Utc::now();
        let mut items = Vec::new();
        for entry in feed.entries.into_iter().take(self.max_items) {
            let title = match entry.title.as_ref().map(|t| t.content.trim().to_string()) {
                Some(t) if !t.is_empty() => t,
                _ => continue,
            };
            let url = match entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
            {
                Some(u) => u,
                None => continue,
            };

            items.push(CollectedItem {
                content_hash: ids::content_hash(&url, &title),
                topic_id: ids::topic_id(&self.config.name, &entry.id),
                item_id: entry.id,
                source: self.config.name.clone(),
                excerpt: entry.summary.map(|s| s.content),
                // Feeds expose no engagement numbers; quality templates for
                // feed sources must not demand them.
                engagement: Engagement::default(),
                title,
                url,
                fetched_at,
            });
        }

        debug!(source = %self.config.name, count = items.len(), "feed items fetched");
        Ok(items)
    }
}
