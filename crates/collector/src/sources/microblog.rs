//! Microblog source: Mastodon-style trending statuses.

use chrono::Utc;
use tracing::debug;

use mill_core::content::{CollectedItem, Engagement, SourceConfig};
use mill_core::ids;

use crate::error::CollectError;

pub struct MicroblogSource {
    pub config: SourceConfig,
    http: reqwest::Client,
    max_items: usize,
}

impl MicroblogSource {
    pub fn new(config: SourceConfig, http: reqwest::Client, max_items: usize) -> Self {
        Self {
            config,
            http,
            max_items,
        }
    }

    pub async fn fetch(&self) -> Result<Vec<CollectedItem>, CollectError> {
        let url = format!(
            "{}/api/v1/trends/statuses?limit={}",
            self.config.endpoint.trim_end_matches('/'),
            self.max_items
        );
        debug!(source = %self.config.name, url, "fetching trending statuses");

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

        let statuses: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| CollectError::SourceUnavailable(format!("{}: {e}", self.config.name)))?;

        let fetched_at = Utc::now();
        let mut items = Vec::new();
        for status in statuses.iter().take(self.max_items) {
            let id = match status["id"].as_str() {
                Some(id) => id.to_string(),
                None => continue,
            };
            let url = match status["url"].as_str().or_else(|| status["uri"].as_str()) {
                Some(u) => u.to_string(),
                None => continue,
            };
            let text = strip_html(status["content"].as_str().unwrap_or(""));
            if text.is_empty() {
                continue;
            }
            let title = first_sentence(&text, 120);

            items.push(CollectedItem {
                content_hash: ids::content_hash(&url, &title),
                topic_id: ids::topic_id(&self.config.name, &id),
                item_id: id,
                source: self.config.name.clone(),
                excerpt: Some(text),
                engagement: Engagement {
                    score: status["favourites_count"].as_i64().unwrap_or(0)
                        + status["reblogs_count"].as_i64().unwrap_or(0),
                    comments: status["replies_count"].as_u64().unwrap_or(0) as u32,
                },
                title,
                url,
                fetched_at,
            });
        }

        debug!(source = %self.config.name, count = items.len(), "microblog items fetched");
        Ok(items)
    }
}

/// Drop tags, decode the handful of entities statuses actually contain, and
/// collapse whitespace. Status content is small; no full HTML parse needed.
fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                // Tags separate words in rendered statuses.
                text.push(' ');
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    let decoded = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First sentence of the text, capped at `max` chars on a word boundary.
fn first_sentence(text: &str, max: usize) -> String {
    let sentence = text
        .split_terminator(['.', '!', '?'])
        .next()
        .unwrap_or(text)
        .trim();
    if sentence.len() <= max {
        return sentence.to_string();
    }
    let mut cut = 0;
    for (idx, _) in sentence.match_indices(' ') {
        if idx > max {
            break;
        }
        cut = idx;
    }
    if cut == 0 {
        cut = max.min(sentence.len());
        while !sentence.is_char_boundary(cut) {
            cut -= 1;
        }
    }
    sentence[..cut].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_tags_and_entities() {
        let html = r#"<p>Rust 1.80 is out! <a href="https://example.com">notes</a> &amp; more</p>"#;
        assert_eq!(strip_html(html), "Rust 1.80 is out! notes & more");
    }

    #[test]
    fn first_sentence_stops_at_punctuation() {
        assert_eq!(
            first_sentence("Big release today. More details below.", 120),
            "Big release today"
        );
    }

    #[test]
    fn first_sentence_caps_long_text() {
        let long = "word ".repeat(100);
        let s = first_sentence(&long, 40);
        assert!(s.len() <= 40);
        assert!(!s.ends_with(' '));
    }
}
