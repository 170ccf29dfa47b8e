//! Markdown rendering with YAML front-matter.

use mill_core::content::{FrontMatter, ProcessedArticle};
use mill_core::ids;
use mill_imagery::StockImage;

use crate::error::RenderError;

/// Destination path for an article's markdown file, relative to the
/// markdown container.
pub fn markdown_path(article: &ProcessedArticle) -> String {
    ids::markdown_path(article.category(), article.collected_at, &article.slug)
}

/// Render front-matter and body into the final markdown document.
pub fn render(
    article: &ProcessedArticle,
    image: Option<&StockImage>,
) -> Result<String, RenderError> {
    let front = FrontMatter {
        title: article.seo_title.clone(),
        date: article.generated_at,
        source: article.source.clone(),
        tags: article.tags.clone(),
        hero_image: image.map(|i| i.url.clone()),
        thumbnail: image.and_then(|i| i.thumbnail_url.clone()),
        image_credit: image.map(|i| i.credit.clone()),
        description: (!article.description.is_empty()).then(|| article.description.clone()),
        references: article.references.clone(),
    };

    let yaml = serde_yaml::to_string(&front).map_err(|e| RenderError::Serialize(e.to_string()))?;
    Ok(format!("---\n{yaml}---\n\n{}\n", article.content.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mill_core::content::Reference;

    fn article() -> ProcessedArticle {
        let date = Utc.with_ymd_and_hms(2026, 7, 10, 9, 30, 0).unwrap();
        ProcessedArticle {
            article_id: "a-1".to_string(),
            topic_id: "t-1".to_string(),
            title: "Original title".to_string(),
            slug: "original-title".to_string(),
            seo_title: "A Better Headline For The Site".to_string(),
            description: "What the article covers.".to_string(),
            content: "Intro.\n\n## Section\n\nBody.".to_string(),
            tags: vec!["rust".to_string(), "async".to_string()],
            references: vec![Reference {
                source: "docs.example".to_string(),
                url: "https://docs.example/page".to_string(),
            }],
            word_count: 5,
            quality_score: 0.4,
            cost_usd: 0.01,
            tokens_used: 500,
            provenance: vec![],
            generated_at: date,
            collected_at: date,
            source: "test-source".to_string(),
            url: "https://example.com/x".to_string(),
        }
    }

    fn image() -> StockImage {
        StockImage {
            url: "https://img.example/hero.jpg".to_string(),
            thumbnail_url: Some("https://img.example/thumb.jpg".to_string()),
            credit: "Photo by Someone on Pexels".to_string(),
            source: "pexels".to_string(),
        }
    }

    #[test]
    fn path_uses_category_year_slug() {
        assert_eq!(markdown_path(&article()), "rust/2026/original-title.md");
    }

    #[test]
    fn rendered_document_shape() {
        let doc = render(&article(), Some(&image())).unwrap();
        assert!(doc.starts_with("---\n"));

        // Front-matter fences around parseable YAML.
        let parts: Vec<&str> = doc.splitn(3, "---").collect();
        assert_eq!(parts.len(), 3);
        let front: serde_yaml::Value = serde_yaml::from_str(parts[1]).unwrap();
        assert_eq!(front["title"], "A Better Headline For The Site");
        assert_eq!(front["source"], "test-source");
        assert_eq!(front["hero_image"], "https://img.example/hero.jpg");
        assert_eq!(front["image_credit"], "Photo by Someone on Pexels");
        assert_eq!(front["tags"][0], "rust");

        assert!(parts[2].contains("## Section"));
    }

    #[test]
    fn no_image_omits_image_keys() {
        let doc = render(&article(), None).unwrap();
        assert!(!doc.contains("hero_image"));
        assert!(!doc.contains("image_credit"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render(&article(), Some(&image())).unwrap();
        let b = render(&article(), Some(&image())).unwrap();
        assert_eq!(a, b);
    }
}
