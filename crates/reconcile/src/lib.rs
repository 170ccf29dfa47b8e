//! Out-of-band reconciliation.
//!
//! The hot path tolerates a small atomicity gap between "wrote the
//! artifact" and "sent the downstream message". This crate closes it:
//! scan the processed container for articles with no markdown, re-emit
//! their render messages, and force a publish when markdown exists that
//! the live site has never seen.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use mill_core::content::ProcessedArticle;
use mill_core::envelope::{BuildPayload, MessageEnvelope, Operation, RenderPayload};
use mill_core::ids;
use mill_queue::QueueClient;
use mill_storage::{containers, BlobStore};

/// Producer name stamped on every envelope this tool emits.
pub const SERVICE_NAME: &str = "reconciler";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("storage error: {0}")]
    Storage(#[from] mill_storage::StorageError),

    #[error("queue error: {0}")]
    Queue(#[from] mill_queue::QueueError),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An article blob whose markdown is missing.
#[derive(Debug, Clone)]
pub struct RenderGap {
    pub processed_blob_path: String,
    pub markdown_path: String,
    pub topic_id: String,
}

/// Scan C2 for articles lacking their C3 markdown counterpart.
pub async fn find_render_gaps(store: &BlobStore) -> Result<Vec<RenderGap>, ReconcileError> {
    let articles = store.list(containers::PROCESSED, "articles/").await?;
    let mut gaps = Vec::new();

    for meta in articles {
        let article: ProcessedArticle =
            match store.get_json(containers::PROCESSED, &meta.name).await {
                Ok(a) => a,
                Err(e) => {
                    warn!(blob = %meta.name, error = %e, "unreadable article skipped");
                    continue;
                }
            };
        let markdown_path =
            ids::markdown_path(article.category(), article.collected_at, &article.slug);
        if !store.exists(containers::MARKDOWN, &markdown_path).await? {
            gaps.push(RenderGap {
                processed_blob_path: meta.name,
                markdown_path,
                topic_id: article.topic_id,
            });
        }
    }

    info!(gaps = gaps.len(), "render gap scan complete");
    Ok(gaps)
}

/// Re-emit a render message for every gap. Returns how many were sent.
pub async fn emit_render_messages(
    render_queue: &Arc<dyn QueueClient>,
    gaps: &[RenderGap],
    dry_run: bool,
) -> Result<u32, ReconcileError> {
    let mut sent = 0u32;
    for gap in gaps {
        if dry_run {
            info!(
                blob = %gap.processed_blob_path,
                topic_id = %gap.topic_id,
                "would re-emit render message"
            );
            continue;
        }
        let body = MessageEnvelope::new(
            SERVICE_NAME,
            Operation::RenderMarkdown,
            &RenderPayload {
                processed_blob_path: gap.processed_blob_path.clone(),
            },
        )?
        .to_body()?;
        match render_queue.send(body).await {
            Ok(()) => sent += 1,
            Err(e) => warn!(blob = %gap.processed_blob_path, error = %e, "re-emit failed"),
        }
    }
    info!(sent, total = gaps.len(), "render messages re-emitted");
    Ok(sent)
}

/// Markdown files whose slug stem never shows up in the live container.
/// The generator rewrites layouts, so this is a best-effort stem match.
pub async fn find_unpublished_markdown(store: &BlobStore) -> Result<Vec<String>, ReconcileError> {
    let markdown = store.list(containers::MARKDOWN, "").await?;
    let web = store.list(containers::WEB, "").await?;

    let mut missing = Vec::new();
    for meta in markdown {
        let stem = match meta.name.rsplit('/').next().and_then(|f| f.strip_suffix(".md")) {
            Some(stem) => stem,
            None => continue,
        };
        if !web.iter().any(|w| w.name.contains(stem)) {
            missing.push(meta.name);
        }
    }

    info!(unpublished = missing.len(), "publish gap scan complete");
    Ok(missing)
}

/// Force one coalesced publish for reconciled content.
pub async fn force_publish(
    publish_queue: &Arc<dyn QueueClient>,
    markdown_count: u64,
    dry_run: bool,
) -> Result<bool, ReconcileError> {
    if dry_run {
        info!(markdown_count, "would force a publish");
        return Ok(false);
    }
    let body = MessageEnvelope::new(
        SERVICE_NAME,
        Operation::PublishSite,
        &BuildPayload {
            batch_id: Uuid::new_v4(),
            markdown_count,
            trigger: "reconciler".to_string(),
        },
    )?
    .to_body()?;
    publish_queue.send(body).await?;
    info!(markdown_count, "forced publish requested");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use mill_queue::InMemoryQueue;

    fn article(slug: &str, tag: &str) -> ProcessedArticle {
        let now = Utc::now();
        ProcessedArticle {
            article_id: "a".to_string(),
            topic_id: format!("topic-{slug}"),
            title: slug.to_string(),
            slug: slug.to_string(),
            seo_title: slug.to_string(),
            description: String::new(),
            content: "Body.".to_string(),
            tags: vec![tag.to_string()],
            references: vec![],
            word_count: 1,
            quality_score: 0.1,
            cost_usd: 0.0,
            tokens_used: 0,
            provenance: vec![],
            generated_at: now,
            collected_at: now,
            source: "src".to_string(),
            url: "https://example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn detects_and_reemits_render_gaps() {
        let store = BlobStore::in_memory();
        let rendered = article("has-markdown", "rust");
        let missing = article("no-markdown", "rust");

        for (blob, a) in [("articles/2026/07/has-markdown.json", &rendered),
                          ("articles/2026/07/no-markdown.json", &missing)] {
            store.put_json(containers::PROCESSED, blob, a).await.unwrap();
        }
        store
            .put(
                containers::MARKDOWN,
                &ids::markdown_path("rust", rendered.collected_at, "has-markdown"),
                Bytes::from("doc"),
                None,
            )
            .await
            .unwrap();

        let gaps = find_render_gaps(&store).await.unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].topic_id, "topic-no-markdown");

        let queue: Arc<dyn QueueClient> = Arc::new(InMemoryQueue::new());
        let sent = emit_render_messages(&queue, &gaps, false).await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(queue.peek_depth().await.unwrap(), 1);

        // Dry-run sends nothing.
        let sent = emit_render_messages(&queue, &gaps, true).await.unwrap();
        assert_eq!(sent, 0);
        assert_eq!(queue.peek_depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn publish_gap_uses_stem_matching() {
        let store = BlobStore::in_memory();
        store
            .put(containers::MARKDOWN, "rust/2026/published.md", Bytes::from("x"), None)
            .await
            .unwrap();
        store
            .put(containers::MARKDOWN, "rust/2026/fresh.md", Bytes::from("x"), None)
            .await
            .unwrap();
        store
            .put(
                containers::WEB,
                "rust/2026/published/index.html",
                Bytes::from("<html>"),
                None,
            )
            .await
            .unwrap();

        let missing = find_unpublished_markdown(&store).await.unwrap();
        assert_eq!(missing, vec!["rust/2026/fresh.md".to_string()]);
    }

    #[tokio::test]
    async fn force_publish_sends_one_build() {
        let queue: Arc<dyn QueueClient> = Arc::new(InMemoryQueue::new());
        assert!(force_publish(&queue, 3, false).await.unwrap());
        assert!(!force_publish(&queue, 3, true).await.unwrap());
        assert_eq!(queue.peek_depth().await.unwrap(), 1);

        let msg = &queue.receive(1, 30).await.unwrap()[0];
        let env = MessageEnvelope::from_body(&msg.body).unwrap();
        let payload: BuildPayload = env.payload_as().unwrap();
        assert_eq!(payload.trigger, "reconciler");
        assert_eq!(payload.markdown_count, 3);
    }
}
