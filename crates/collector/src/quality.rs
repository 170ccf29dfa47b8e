//! Per-source quality filtering.

use mill_core::content::{CollectedItem, Engagement, QualityTemplate};

/// Outcome of scoring one item against its source template.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted { score: f64 },
    Rejected { reason: String },
}

/// Score an item: engagement-weighted with a small bonus for substantial
/// titles. Feed items (zero engagement) pass on title quality alone.
pub fn score(item: &CollectedItem) -> f64 {
    let engagement = item.engagement.score.max(0) as f64 + 2.0 * item.engagement.comments as f64;
    let title_bonus = if item.title.len() >= 40 { 5.0 } else { 0.0 };
    engagement + title_bonus
}

/// Apply the source's quality template.
pub fn evaluate(item: &CollectedItem, template: &QualityTemplate) -> Verdict {
    if item.title.len() < template.min_title_chars {
        return Verdict::Rejected {
            reason: format!(
                "title too short ({} < {} chars)",
                item.title.len(),
                template.min_title_chars
            ),
        };
    }

    if let Some(domain) = host_of(&item.url) {
        if template
            .blacklist_domains
            .iter()
            .any(|blocked| domain == *blocked || domain.ends_with(&format!(".{blocked}")))
        {
            return Verdict::Rejected {
                reason: format!("blacklisted domain {domain}"),
            };
        }
    }

    if item.engagement.comments < template.min_comments {
        return Verdict::Rejected {
            reason: format!(
                "comments below threshold ({} < {})",
                item.engagement.comments, template.min_comments
            ),
        };
    }

    let s = score(item);
    if s < template.min_score {
        return Verdict::Rejected {
            reason: format!("score below threshold ({s:.1} < {:.1})", template.min_score),
        };
    }

    Verdict::Accepted { score: s }
}

/// Normalized engagement in [0, 1) carried into the topic message so the
/// processor can prioritize without re-deriving source heuristics.
pub fn priority_score(engagement: &Engagement) -> f64 {
    let raw = engagement.score.max(0) as f64 + 2.0 * engagement.comments as f64;
    raw / (raw + 100.0)
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mill_core::ids;

    fn make_item(title: &str, url: &str, score: i64, comments: u32) -> CollectedItem {
        CollectedItem {
            item_id: "id-1".to_string(),
            source: "test".to_string(),
            title: title.to_string(),
            url: url.to_string(),
            excerpt: None,
            engagement: Engagement { score, comments },
            fetched_at: Utc::now(),
            content_hash: ids::content_hash(url, title),
            topic_id: ids::topic_id("test", "id-1"),
        }
    }

    fn template() -> QualityTemplate {
        QualityTemplate {
            min_score: 25.0,
            min_comments: 5,
            min_title_chars: 12,
            blacklist_domains: vec!["spam.example".to_string()],
        }
    }

    #[test]
    fn accepts_engaged_item() {
        let item = make_item(
            "A detailed writeup on async runtimes",
            "https://example.com/a",
            50,
            12,
        );
        assert!(matches!(
            evaluate(&item, &template()),
            Verdict::Accepted { .. }
        ));
    }

    #[test]
    fn rejects_short_title() {
        let item = make_item("tiny", "https://example.com/a", 500, 100);
        match evaluate(&item, &template()) {
            Verdict::Rejected { reason } => assert!(reason.contains("title too short")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn rejects_blacklisted_domain_and_subdomains() {
        let item = make_item(
            "A headline long enough to pass",
            "https://cdn.spam.example/post",
            500,
            100,
        );
        match evaluate(&item, &template()) {
            Verdict::Rejected { reason } => assert!(reason.contains("blacklisted")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn rejects_low_engagement() {
        let item = make_item(
            "A headline long enough to pass",
            "https://example.com/a",
            3,
            5,
        );
        match evaluate(&item, &template()) {
            Verdict::Rejected { reason } => assert!(reason.contains("score below")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn feed_items_pass_default_template() {
        let item = make_item(
            "Understanding borrow checking in depth",
            "https://example.com/borrow",
            0,
            0,
        );
        assert!(matches!(
            evaluate(&item, &QualityTemplate::default()),
            Verdict::Accepted { .. }
        ));
    }

    #[test]
    fn priority_score_is_normalized() {
        assert_eq!(priority_score(&Engagement::default()), 0.0);
        let mid = priority_score(&Engagement {
            score: 100,
            comments: 0,
        });
        assert!(mid > 0.4 && mid < 0.6);
        let high = priority_score(&Engagement {
            score: 100_000,
            comments: 500,
        });
        assert!(high > 0.99 && high < 1.0);
    }
}
