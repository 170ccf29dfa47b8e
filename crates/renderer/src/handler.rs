//! Render message handling: one processed article to one markdown file.

use std::sync::Arc;

use tracing::{debug, info, warn};

use mill_core::content::ProcessedArticle;
use mill_core::envelope::{MessageEnvelope, RenderPayload};
use mill_core::ErrorKind;
use mill_imagery::ImageDispatcher;
use mill_queue::QueueClient;
use mill_storage::{containers, BlobStore, StorageError};

use crate::drain::DrainMonitor;
use crate::markdown;

/// Immutable per-replica context.
pub struct RendererContext {
    pub store: BlobStore,
    pub publish_queue: Arc<dyn QueueClient>,
    pub images: ImageDispatcher,
    pub drain: Arc<DrainMonitor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Rendered,
    /// The markdown file already existed; nothing written, counter untouched.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Delete,
    Keep,
}

#[derive(Debug)]
pub struct RenderResult {
    pub status: RenderStatus,
    pub disposition: Disposition,
    /// Taxonomy class for failed results.
    pub kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl RenderResult {
    fn failed(kind: ErrorKind, error: String) -> Self {
        Self {
            status: RenderStatus::Failed,
            disposition: if kind.retryable() {
                Disposition::Keep
            } else {
                Disposition::Delete
            },
            kind: Some(kind),
            error: Some(error),
        }
    }

    fn done(status: RenderStatus) -> Self {
        Self {
            status,
            disposition: Disposition::Delete,
            kind: None,
            error: None,
        }
    }
}

/// Handle one render message.
///
/// Image selection degrades gracefully: a markdown file without a hero
/// image still ships. Only an actual write bumps the drain counter, so
/// idempotent re-runs cannot trigger spurious rebuilds.
pub async fn handle_render_message(
    ctx: &RendererContext,
    envelope: &MessageEnvelope,
) -> RenderResult {
    let payload: RenderPayload = match envelope.payload_as() {
        Ok(p) => p,
        Err(e) => {
            return RenderResult::failed(
                ErrorKind::BadInput,
                format!("malformed render payload: {e}"),
            )
        }
    };

    // Load the processed article. A missing blob is not retriable — the
    // path is wrong or the article was removed — so consume the message.
    let article: ProcessedArticle = match ctx
        .store
        .get_json(containers::PROCESSED, &payload.processed_blob_path)
        .await
    {
        Ok(a) => a,
        Err(StorageError::NotFound(_)) | Err(StorageError::Serialize(_)) => {
            return RenderResult::failed(
                ErrorKind::BadInput,
                format!(
                    "processed article unreadable at {}",
                    payload.processed_blob_path
                ),
            )
        }
        Err(e) => {
            return RenderResult::failed(
                ErrorKind::TransientDependency,
                format!("article load failed: {e}"),
            )
        }
    };

    let path = markdown::markdown_path(&article);

    // Idempotent re-delivery: the file is already there.
    match ctx.store.exists(containers::MARKDOWN, &path).await {
        Ok(true) => {
            debug!(correlation_id = %envelope.correlation_id, path, "markdown already rendered");
            return RenderResult::done(RenderStatus::Skipped);
        }
        Ok(false) => {}
        Err(e) => {
            return RenderResult::failed(
                ErrorKind::TransientDependency,
                format!("markdown existence check failed: {e}"),
            )
        }
    }

    // Deterministic image query from title + top tags; never fails the
    // message.
    let query = image_query(&article);
    let image = ctx.images.find_image(&query).await;
    if image.is_none() {
        debug!(correlation_id = %envelope.correlation_id, query, "rendering without image");
    }

    let document = match markdown::render(&article, image.as_ref()) {
        Ok(doc) => doc,
        Err(e) => {
            return RenderResult::failed(ErrorKind::BadInput, format!("render failed: {e}"))
        }
    };

    if let Err(e) = ctx
        .store
        .put(
            containers::MARKDOWN,
            &path,
            document.into(),
            Some("text/markdown"),
        )
        .await
    {
        return RenderResult::failed(
            ErrorKind::StorageWrite,
            format!("markdown write failed: {e}"),
        );
    }

    ctx.drain.record_generated();
    info!(
        correlation_id = %envelope.correlation_id,
        topic_id = %article.topic_id,
        path,
        with_image = image.is_some(),
        "markdown rendered"
    );
    RenderResult::done(RenderStatus::Rendered)
}

/// Search query: title plus the two most specific tags (the first tag is
/// the source name, skip it).
fn image_query(article: &ProcessedArticle) -> String {
    let tags: Vec<&str> = article
        .tags
        .iter()
        .skip(1)
        .take(2)
        .map(String::as_str)
        .collect();
    if tags.is_empty() {
        article.title.clone()
    } else {
        format!("{} {}", article.title, tags.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mill_core::envelope::Operation;
    use mill_imagery::testing::ScriptedImageProvider;
    use mill_imagery::{ImageProvider, StockImage};
    use mill_queue::InMemoryQueue;
    use mill_throttle::TokenBucket;

    fn article(slug: &str) -> ProcessedArticle {
        let now = Utc::now();
        ProcessedArticle {
            article_id: "a".to_string(),
            topic_id: format!("topic-{slug}"),
            title: "Title".to_string(),
            slug: slug.to_string(),
            seo_title: "Headline".to_string(),
            description: "Desc".to_string(),
            content: "Intro.\n\n## S\n\nBody.".to_string(),
            tags: vec!["src".to_string(), "rust".to_string()],
            references: vec![],
            word_count: 5,
            quality_score: 0.3,
            cost_usd: 0.0,
            tokens_used: 0,
            provenance: vec![],
            generated_at: now,
            collected_at: now,
            source: "src".to_string(),
            url: "https://example.com".to_string(),
        }
    }

    fn ctx_with_images(providers: Vec<(Arc<dyn ImageProvider>, TokenBucket)>) -> RendererContext {
        RendererContext {
            store: BlobStore::in_memory(),
            publish_queue: Arc::new(InMemoryQueue::new()),
            images: ImageDispatcher::new(providers),
            drain: Arc::new(DrainMonitor::new()),
        }
    }

    fn ctx() -> RendererContext {
        let image = StockImage {
            url: "https://img.example/h.jpg".to_string(),
            thumbnail_url: None,
            credit: "Photo".to_string(),
            source: "a".to_string(),
        };
        ctx_with_images(vec![(
            Arc::new(ScriptedImageProvider::always_ok("a", image)),
            TokenBucket::new(100.0, 1.0),
        )])
    }

    async fn seed_article(ctx: &RendererContext, slug: &str) -> MessageEnvelope {
        let article = article(slug);
        let blob_path = format!("articles/2026/07/{slug}.json");
        ctx.store
            .put_json(containers::PROCESSED, &blob_path, &article)
            .await
            .unwrap();
        MessageEnvelope::new(
            "processor",
            Operation::RenderMarkdown,
            &RenderPayload {
                processed_blob_path: blob_path,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn renders_and_bumps_counter() {
        let ctx = ctx();
        let envelope = seed_article(&ctx, "one").await;

        let result = handle_render_message(&ctx, &envelope).await;
        assert_eq!(result.status, RenderStatus::Rendered);
        assert_eq!(result.disposition, Disposition::Delete);
        assert_eq!(ctx.drain.generated(), 1);

        let listed = ctx.store.list(containers::MARKDOWN, "").await.unwrap();
        assert_eq!(listed.len(), 1);
        let doc = ctx
            .store
            .get(containers::MARKDOWN, &listed[0].name)
            .await
            .unwrap();
        let doc = String::from_utf8(doc.to_vec()).unwrap();
        assert!(doc.contains("hero_image"));
    }

    #[tokio::test]
    async fn rerun_skips_and_does_not_bump_counter() {
        let ctx = ctx();
        let envelope = seed_article(&ctx, "one").await;

        handle_render_message(&ctx, &envelope).await;
        assert_eq!(ctx.drain.generated(), 1);

        let second = handle_render_message(&ctx, &envelope).await;
        assert_eq!(second.status, RenderStatus::Skipped);
        assert_eq!(second.disposition, Disposition::Delete);
        assert_eq!(ctx.drain.generated(), 1, "no spurious rebuild trigger");
    }

    #[tokio::test]
    async fn image_exhaustion_still_renders() {
        let ctx = ctx_with_images(vec![(
            Arc::new(ScriptedImageProvider::always_err(
                "a",
                mill_imagery::ImageError::ApiError {
                    status: 429,
                    body: "quota".into(),
                },
            )),
            TokenBucket::new(100.0, 1.0),
        )]);
        let envelope = seed_article(&ctx, "no-image").await;

        let result = handle_render_message(&ctx, &envelope).await;
        assert_eq!(result.status, RenderStatus::Rendered);

        let listed = ctx.store.list(containers::MARKDOWN, "").await.unwrap();
        let doc = ctx
            .store
            .get(containers::MARKDOWN, &listed[0].name)
            .await
            .unwrap();
        let doc = String::from_utf8(doc.to_vec()).unwrap();
        assert!(!doc.contains("hero_image"), "graceful degradation: no image keys");
    }

    #[tokio::test]
    async fn missing_article_blob_consumes_message() {
        let ctx = ctx();
        let envelope = MessageEnvelope::new(
            "processor",
            Operation::RenderMarkdown,
            &RenderPayload {
                processed_blob_path: "articles/2026/07/ghost.json".to_string(),
            },
        )
        .unwrap();

        let result = handle_render_message(&ctx, &envelope).await;
        assert_eq!(result.status, RenderStatus::Failed);
        assert_eq!(result.disposition, Disposition::Delete);
        assert_eq!(ctx.drain.generated(), 0);
    }
}
