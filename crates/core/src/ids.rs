//! Stable identifiers and deterministic blob paths.
//!
//! `topic_id` and `content_hash` are content hashes, so re-collecting the
//! same item always maps to the same lease and dedup key. Blob paths are
//! pure functions of the entity so every stage can recompute them.

use chrono::{DateTime, Datelike, Utc};
use sha2::{Digest, Sha256};

/// Hex sha256 of the input.
fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Normalize a URL for hashing: lowercase host, strip trailing slash and
/// `utm_*` tracking params.
pub fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            let kept: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| !k.starts_with("utm_"))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if kept.is_empty() {
                parsed.set_query(None);
            } else {
                let query = kept
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("&");
                parsed.set_query(Some(&query));
            }
            parsed.to_string().trim_end_matches('/').to_lowercase()
        }
        Err(_) => raw.trim().trim_end_matches('/').to_lowercase(),
    }
}

/// Normalize a title for hashing: lowercase, collapse whitespace.
pub fn normalize_title(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Dedup key: hash of normalized url + title.
pub fn content_hash(url: &str, title: &str) -> String {
    sha256_hex(&format!("{}\n{}", normalize_url(url), normalize_title(title)))
}

/// Stable per-item id: hash of (source, source-native id). Re-collection of
/// the same item maps to the same lease.
pub fn topic_id(source: &str, native_id: &str) -> String {
    sha256_hex(&format!("{source}:{native_id}"))
}

/// Kebab-case slug from a title, capped at `max_len` without splitting a word.
pub fn slugify(title: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut prev_dash = true; // suppress leading dash
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }
    let mut slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        slug = "untitled".to_string();
    }
    if slug.len() > max_len {
        let cut = slug[..max_len]
            .rfind('-')
            .filter(|&i| i > 0)
            .unwrap_or(max_len);
        slug.truncate(cut);
        slug = slug.trim_matches('-').to_string();
    }
    slug
}

/// Default slug length cap.
pub const SLUG_MAX_LEN: usize = 60;

/// `collections/<yyyy>/<mm>/<dd>/<collection_id>.json` in collected-content.
pub fn collection_path(started_at: DateTime<Utc>, collection_id: &str) -> String {
    format!(
        "collections/{:04}/{:02}/{:02}/{}.json",
        started_at.year(),
        started_at.month(),
        started_at.day(),
        collection_id
    )
}

/// Date prefix used for dedup-window listing.
pub fn collection_day_prefix(day: DateTime<Utc>) -> String {
    format!(
        "collections/{:04}/{:02}/{:02}/",
        day.year(),
        day.month(),
        day.day()
    )
}

/// `articles/<yyyy>/<mm>/<slug>.json` in processed-content. The date comes
/// from `collected_at`, not wall clock, so retries crossing a month boundary
/// cannot fork the done-marker path.
pub fn article_path(collected_at: DateTime<Utc>, slug: &str) -> String {
    format!(
        "articles/{:04}/{:02}/{}.json",
        collected_at.year(),
        collected_at.month(),
        slug
    )
}

/// `<category>/<yyyy>/<slug>.md` in markdown-content.
pub fn markdown_path(category: &str, collected_at: DateTime<Utc>, slug: &str) -> String {
    format!("{}/{:04}/{}.md", category, collected_at.year(), slug)
}

/// `failures/<topic_id>.json` in processed-content.
pub fn failure_path(topic_id: &str) -> String {
    format!("failures/{topic_id}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn topic_id_is_stable() {
        let a = topic_id("lobsters", "abc123");
        let b = topic_id("lobsters", "abc123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, topic_id("lobsters", "abc124"));
        assert_ne!(a, topic_id("hackernews", "abc123"));
    }

    #[test]
    fn content_hash_ignores_tracking_params_and_case() {
        let a = content_hash(
            "https://Example.com/post/?utm_source=x&utm_campaign=y",
            "Hello  World",
        );
        let b = content_hash("https://example.com/post", "hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_keeps_meaningful_params() {
        let a = content_hash("https://example.com/post?id=1", "t");
        let b = content_hash("https://example.com/post?id=2", "t");
        assert_ne!(a, b);
    }

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Hello, World!", 60), "hello-world");
        assert_eq!(slugify("  Rust's async/await  ", 60), "rust-s-async-await");
        assert_eq!(slugify("***", 60), "untitled");
    }

    #[test]
    fn slugify_caps_on_word_boundary() {
        let slug = slugify(
            "a very long headline that keeps going and going well past the cap",
            30,
        );
        assert!(slug.len() <= 30, "slug was {} chars: {slug}", slug.len());
        assert!(!slug.ends_with('-'));
        assert!(!slug.contains("--"));
    }

    #[test]
    fn article_path_uses_collected_at() {
        let collected = Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 0).unwrap();
        assert_eq!(
            article_path(collected, "some-post"),
            "articles/2026/01/some-post.json"
        );
    }

    #[test]
    fn collection_path_shape() {
        let t = Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap();
        assert_eq!(
            collection_path(t, "run-1"),
            "collections/2026/03/05/run-1.json"
        );
        assert_eq!(collection_day_prefix(t), "collections/2026/03/05/");
    }
}
