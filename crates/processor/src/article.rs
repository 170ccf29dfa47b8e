//! Article generation: prompts, response parsing, metadata extraction.

use mill_core::envelope::TopicPayload;
use mill_core::content::Reference;
use mill_llm::Message;

/// Version stamped into provenance entries written by this stage.
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

const DRAFT_SYSTEM_PROMPT: &str = "\
You are a technology journalist writing for a curated engineering blog. \
Research the given topic from what you know and write an original, factual \
article in markdown. Structure: a short introduction, three to five titled \
sections (## headings), a conclusion, and a final '## References' section \
listing the sources you drew on as markdown links. Do not fabricate \
references. No front-matter, no top-level title heading.";

/// Build the research + drafting conversation for a topic.
pub fn draft_messages(topic: &TopicPayload) -> Vec<Message> {
    let user = format!(
        "Topic: {title}\n\
         Discovered via: {source}\n\
         Original link: {url}\n\
         Community engagement: score {score}, {comments} comments\n\n\
         Write the article.",
        title = topic.title,
        source = topic.source,
        url = topic.url,
        score = topic.engagement.score,
        comments = topic.engagement.comments,
    );
    vec![Message::system(DRAFT_SYSTEM_PROMPT), Message::user(user)]
}

/// Build the optional follow-up asking for SEO title candidates.
pub fn title_messages(topic: &TopicPayload) -> Vec<Message> {
    let user = format!(
        "Propose 3 headline options for an article about: {}\n\
         One per line, numbered, 30-70 characters each, no quotes.",
        topic.title
    );
    vec![
        Message::system("You write concise, specific technology headlines."),
        Message::user(user),
    ]
}

/// Pick the best headline from the title-options response: first candidate
/// in the preferred 30-70 char band, else the original topic title.
pub fn select_title(options_response: &str, fallback: &str) -> String {
    for line in options_response.lines() {
        let candidate = line
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == '-')
            .trim()
            .trim_matches('"');
        if candidate.is_empty() {
            continue;
        }
        if (30..=70).contains(&candidate.chars().count()) {
            return candidate.to_string();
        }
    }
    fallback.to_string()
}

/// Markdown links in the body, deduplicated by URL. The article's own
/// source link is included by the prompt's references section.
pub fn extract_references(markdown: &str) -> Vec<Reference> {
    let mut refs: Vec<Reference> = Vec::new();
    let bytes = markdown.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            if let Some(close) = markdown[i..].find("](").map(|p| i + p) {
                let url_start = close + 2;
                if let Some(url_end) = markdown[url_start..].find(')').map(|p| url_start + p) {
                    let url = markdown[url_start..url_end].trim();
                    if url.starts_with("http") && !refs.iter().any(|r| r.url == url) {
                        refs.push(Reference {
                            source: host_of(url).unwrap_or_else(|| "link".to_string()),
                            url: url.to_string(),
                        });
                    }
                    i = url_end + 1;
                    continue;
                }
            }
        }
        i += 1;
    }
    refs
}

/// First body paragraph, truncated to ~160 chars on a word boundary.
pub fn derive_description(markdown: &str) -> String {
    let paragraph = markdown
        .split("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty() && !p.starts_with('#') && !p.starts_with('['))
        .unwrap_or("");
    let flat = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= 160 {
        return flat;
    }
    let mut cut = 0;
    for (idx, _) in flat.match_indices(' ') {
        if idx > 157 {
            break;
        }
        cut = idx;
    }
    format!("{}...", &flat[..cut])
}

const TAG_STOPWORDS: &[&str] = &[
    "about", "after", "against", "between", "could", "every", "first", "from", "inside", "into",
    "their", "there", "these", "thing", "this", "those", "through", "under", "using", "where",
    "which", "while", "with", "without", "would", "your",
];

/// Source name plus up to four keywords from the title.
pub fn derive_tags(title: &str, source: &str) -> Vec<String> {
    let mut tags = vec![source.to_lowercase()];
    for word in title.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.len() > 4
            && !TAG_STOPWORDS.contains(&cleaned.as_str())
            && !tags.contains(&cleaned)
        {
            tags.push(cleaned);
        }
        if tags.len() >= 5 {
            break;
        }
    }
    tags
}

/// Heuristic article quality in [0, 1]: weighted word count, reference
/// count, and section structure.
pub fn quality_score(markdown: &str, references: &[Reference]) -> f64 {
    let words = markdown.split_whitespace().count() as f64;
    let sections = markdown
        .lines()
        .filter(|l| l.trim_start().starts_with("## "))
        .count() as f64;
    let word_part = (words / 1200.0).min(1.0) * 0.5;
    let ref_part = (references.len() as f64 / 5.0).min(1.0) * 0.3;
    let structure_part = (sections / 4.0).min(1.0) * 0.2;
    word_part + ref_part + structure_part
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
    use mill_core::content::Engagement;

    fn topic() -> TopicPayload {
        TopicPayload {
            topic_id: "t".into(),
            title: "Understanding io_uring".into(),
            source: "reddit-programming".into(),
            url: "https://example.com/io-uring".into(),
            engagement: Engagement {
                score: 120,
                comments: 30,
            },
            collected_at: Utc::now(),
            priority_score: 0.6,
            collection_id: "c".into(),
            collection_blob: "collections/x.json".into(),
        }
    }

    #[test]
    fn draft_prompt_carries_topic_metadata() {
        let messages = draft_messages(&topic());
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Understanding io_uring"));
        assert!(messages[1].content.contains("score 120"));
    }

    #[test]
    fn select_title_prefers_band() {
        let response = "1. Short\n2. A Deep Dive Into io_uring For Async Linux IO\n3. x";
        assert_eq!(
            select_title(response, "fallback"),
            "A Deep Dive Into io_uring For Async Linux IO"
        );
    }

    #[test]
    fn select_title_falls_back() {
        assert_eq!(select_title("1. nope\n2. no", "Original Title Here Long Enough"),
            "Original Title Here Long Enough");
        assert_eq!(select_title("", "fallback"), "fallback");
    }

    #[test]
    fn references_deduped_and_http_only() {
        let md = "Intro [a](https://a.example/one) and [b](https://b.example/two).\n\
                  Again [a](https://a.example/one). Relative [c](/local).";
        let refs = extract_references(md);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].source, "a.example");
        assert_eq!(refs[1].url, "https://b.example/two");
    }

    #[test]
    fn description_skips_headings_and_caps() {
        let md = "## Section\n\nThe first real paragraph explains the idea in plain words.\n\nMore.";
        let desc = derive_description(md);
        assert_eq!(desc, "The first real paragraph explains the idea in plain words.");

        let long = format!("## H\n\n{}", "word ".repeat(100));
        let desc = derive_description(&long);
        assert!(desc.len() <= 163);
        assert!(desc.ends_with("..."));
    }

    #[test]
    fn tags_start_with_source() {
        let tags = derive_tags("Understanding io_uring for Linux servers", "reddit-programming");
        assert_eq!(tags[0], "reddit-programming");
        assert!(tags.contains(&"understanding".to_string()));
        assert!(tags.len() <= 5);
    }

    #[test]
    fn quality_score_bounds() {
        assert_eq!(quality_score("", &[]), 0.0);
        let rich = format!(
            "{}\n## A\n## B\n## C\n## D\n",
            "word ".repeat(1500)
        );
        let refs: Vec<Reference> = (0..6)
            .map(|i| Reference {
                source: "s".into(),
                url: format!("https://r.example/{i}"),
            })
            .collect();
        let s = quality_score(&rich, &refs);
        assert!(s > 0.99 && s <= 1.0);
    }
}
