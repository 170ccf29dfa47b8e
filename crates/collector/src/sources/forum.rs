//! Forum source: Reddit-style JSON listing endpoints.

use chrono::Utc;
use tracing::debug;

use mill_core::content::{CollectedItem, Engagement, SourceConfig};
use mill_core::ids;

use crate::error::CollectError;

pub struct ForumSource {
    pub config: SourceConfig,
    http: reqwest::Client,
    max_items: usize,
}

impl ForumSource {
    pub fn new(config: SourceConfig, http: reqwest::Client, max_items: usize) -> Self {
        Self {
            config,
            http,
            max_items,
        }
    }

    pub async fn fetch(&self) -> Result<Vec<CollectedItem>, CollectError> {
        let url = format!(
            "{}.json?limit={}",
            self.config.endpoint.trim_end_matches('/'),
            self.max_items
        );
        debug!(source = %self.config.name, url, "fetching forum listing");

        let response = self
            .http
            .get(&url)
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

        let listing: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CollectError::SourceUnavailable(format!("{}: {e}", self.config.name)))?;

        let children = listing["data"]["children"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let fetched_at = Utc::now();
        let mut items = Vec::new();
        for child in children.iter().take(self.max_items) {
            let post = &child["data"];
            let id = match post["id"].as_str() {
                Some(id) => id.to_string(),
                None => continue,
            };
            let title = match post["title"].as_str() {
                Some(t) => t.to_string(),
                None => continue,
            };
            // Prefer the linked article; self-posts fall back to their
            // permalink on the forum host.
            let url = post["url"]
                .as_str()
                .filter(|u| u.starts_with("http"))
                .map(String::from)
                .or_else(|| {
                    post["permalink"]
                        .as_str()
                        .and_then(|p| absolute_permalink(&self.config.endpoint, p))
                });
            let url = match url {
                Some(u) => u,
                None => continue,
            };

            items.push(CollectedItem {
                content_hash: ids::content_hash(&url, &title),
                topic_id: ids::topic_id(&self.config.name, &id),
                item_id: id,
                source: self.config.name.clone(),
                excerpt: post["selftext"]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(|s| truncate(s, 500)),
                engagement: Engagement {
                    score: post["score"].as_i64().unwrap_or(0),
                    comments: post["num_comments"].as_u64().unwrap_or(0) as u32,
                },
                title,
                url,
                fetched_at,
            });
        }

        debug!(source = %self.config.name, count = items.len(), "forum items fetched");
        Ok(items)
    }
}

fn absolute_permalink(endpoint: &str, permalink: &str) -> Option<String> {
    let base = url::Url::parse(endpoint).ok()?;
    base.join(permalink).ok().map(|u| u.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s[..cut].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permalink_resolves_against_endpoint_host() {
        let abs = absolute_permalink(
            "https://www.reddit.com/r/programming/hot",
            "/r/programming/comments/abc/post/",
        )
        .unwrap();
        assert_eq!(abs, "https://www.reddit.com/r/programming/comments/abc/post/");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate(s, 3);
        assert!(t.len() <= 3);
        assert!(s.starts_with(&t));
    }
}
