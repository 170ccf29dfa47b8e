//! Content entities flowing through the pipeline.
//!
//! Everything here is immutable once written to the object store; a new
//! version means a new blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Sources ───────────────────────────────────────────────────

/// Kind of third-party source a collector adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Forum,
    Microblog,
    Feed,
}

/// Per-source quality thresholds. Items scoring below `min_score` or hitting
/// a blacklisted domain are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityTemplate {
    #[serde(default)]
    pub min_score: f64,
    #[serde(default)]
    pub min_comments: u32,
    #[serde(default = "default_min_title_chars")]
    pub min_title_chars: usize,
    #[serde(default)]
    pub blacklist_domains: Vec<String>,
}

fn default_min_title_chars() -> usize {
    12
}

impl Default for QualityTemplate {
    fn default() -> Self {
        Self {
            min_score: 0.0,
            min_comments: 0,
            min_title_chars: default_min_title_chars(),
            blacklist_domains: Vec::new(),
        }
    }
}

/// One configured third-party source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    /// Listing endpoint or feed URL, adapter-specific.
    pub endpoint: String,
    #[serde(default)]
    pub quality: QualityTemplate,
    #[serde(default)]
    pub max_items: Option<u32>,
}

// ── Collected items ───────────────────────────────────────────

/// Numeric engagement signals as reported by the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    pub score: i64,
    pub comments: u32,
}

/// One candidate piece of content pulled from a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedItem {
    /// Source-native id (post id, status id, feed entry id).
    pub item_id: String,
    pub source: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub engagement: Engagement,
    pub fetched_at: DateTime<Utc>,
    /// Dedup key over (normalized url, normalized title).
    pub content_hash: String,
    /// Stable hash of (source, item_id); keys the processing lease.
    pub topic_id: String,
}

/// Counters for one collection run. The audit blob is persisted before
/// fanout, so send counts live in logs and the run outcome, not here.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub fetched: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub duplicates: u32,
}

/// Audit record of one collection run. Written to the collected-content
/// container before any fanout message is sent, so every queue message
/// references a persisted row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub collection_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<String>,
    pub items: Vec<CollectedItem>,
    pub stats: CollectionStats,
}

// ── Processed articles ────────────────────────────────────────

/// One audit step in an article's lineage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub stage: String,
    pub processor_id: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub tokens: u64,
}

/// External reference cited by an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub source: String,
    pub url: String,
}

/// AI-generated article plus metadata; the done marker for its topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedArticle {
    pub article_id: String,
    pub topic_id: String,
    pub title: String,
    pub slug: String,
    pub seo_title: String,
    pub description: String,
    /// Markdown body.
    pub content: String,
    pub tags: Vec<String>,
    pub references: Vec<Reference>,
    pub word_count: usize,
    pub quality_score: f64,
    pub cost_usd: f64,
    pub tokens_used: u64,
    pub provenance: Vec<ProvenanceEntry>,
    pub generated_at: DateTime<Utc>,
    pub collected_at: DateTime<Utc>,
    pub source: String,
    pub url: String,
}

impl ProcessedArticle {
    /// Category used for the markdown path: first tag, or "general".
    pub fn category(&self) -> &str {
        self.tags.first().map(String::as_str).unwrap_or("general")
    }
}

// ── Markdown front-matter ─────────────────────────────────────

/// YAML front-matter for a rendered markdown article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontMatter {
    pub title: String,
    pub date: DateTime<Utc>,
    pub source: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_credit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub references: Vec<Reference>,
}

// ── Failure records ───────────────────────────────────────────

/// Operator-visible record of a permanently failed topic. Written before the
/// poisoned message is deleted so the failure stays diagnosable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub topic_id: String,
    pub correlation_id: String,
    pub stage: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids;

    fn make_item(title: &str) -> CollectedItem {
        CollectedItem {
            item_id: "t3_abc".to_string(),
            source: "forum".to_string(),
            title: title.to_string(),
            url: "https://example.com/post".to_string(),
            excerpt: None,
            engagement: Engagement { score: 42, comments: 7 },
            fetched_at: Utc::now(),
            content_hash: ids::content_hash("https://example.com/post", title),
            topic_id: ids::topic_id("forum", "t3_abc"),
        }
    }

    #[test]
    fn collected_item_roundtrip() {
        let item = make_item("A headline");
        let json = serde_json::to_string(&item).unwrap();
        let back: CollectedItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back.topic_id, item.topic_id);
        assert_eq!(back.engagement, item.engagement);
    }

    #[test]
    fn quality_template_defaults_from_empty_json() {
        let q: QualityTemplate = serde_json::from_str("{}").unwrap();
        assert_eq!(q.min_title_chars, 12);
        assert!(q.blacklist_domains.is_empty());
    }

    #[test]
    fn article_category_falls_back() {
        let mut article = ProcessedArticle {
            article_id: "a1".to_string(),
            topic_id: "t1".to_string(),
            title: "T".to_string(),
            slug: "t".to_string(),
            seo_title: "T".to_string(),
            description: String::new(),
            content: String::new(),
            tags: vec![],
            references: vec![],
            word_count: 0,
            quality_score: 0.0,
            cost_usd: 0.0,
            tokens_used: 0,
            provenance: vec![],
            generated_at: Utc::now(),
            collected_at: Utc::now(),
            source: "forum".to_string(),
            url: String::new(),
        };
        assert_eq!(article.category(), "general");
        article.tags = vec!["rust".to_string()];
        assert_eq!(article.category(), "rust");
    }

    #[test]
    fn front_matter_omits_empty_optionals() {
        let fm = FrontMatter {
            title: "T".to_string(),
            date: Utc::now(),
            source: "forum".to_string(),
            tags: vec!["rust".to_string()],
            hero_image: None,
            thumbnail: None,
            image_credit: None,
            description: None,
            references: vec![],
        };
        let json = serde_json::to_value(&fm).unwrap();
        assert!(json.get("hero_image").is_none());
        assert!(json.get("references").is_none());
    }
}
