//! Topic message handling: the at-most-once article generation protocol.
//!
//! Per message: validate, check the done marker, acquire the lease, generate
//! via the rate-limited LLM, write the article, trigger the renderer,
//! release the lease. The caller deletes the queue message only when the
//! returned disposition says so; anything left undeleted redelivers after
//! the visibility timeout.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mill_core::content::{FailureRecord, ProcessedArticle, ProvenanceEntry};
use mill_core::envelope::{MessageEnvelope, Operation, RenderPayload, TopicPayload};
use mill_core::ids;
use mill_core::ErrorKind;
use mill_llm::{LlmCallError, LlmClient};
use mill_queue::QueueClient;
use mill_storage::{containers, AcquireOutcome, BlobStore, LeaseManager, StorageError};

use crate::article;
use crate::SERVICE_NAME;

/// Immutable per-replica context; handlers own no state.
pub struct ProcessorContext {
    pub processor_id: String,
    pub store: BlobStore,
    pub leases: LeaseManager,
    pub render_queue: Arc<dyn QueueClient>,
    pub llm: LlmClient,
    /// Lease TTL; at least twice the p95 generation time.
    pub lease_ttl: chrono::Duration,
    /// Deadline for each LLM call, below the queue visibility timeout.
    pub call_deadline: std::time::Duration,
    /// In-process retries for the article write after generation.
    pub write_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicStatus {
    Success,
    Skipped,
    Failed,
}

/// What the worker loop should do with the queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Delete,
    Keep,
}

#[derive(Debug)]
pub struct TopicProcessingResult {
    pub status: TopicStatus,
    pub topic_id: String,
    pub cost_usd: f64,
    pub error: Option<String>,
    /// Taxonomy class for failed results; drives the log record, the
    /// disposition already encodes the queue action.
    pub kind: Option<ErrorKind>,
    pub disposition: Disposition,
}

impl TopicProcessingResult {
    fn failed(topic_id: &str, kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            status: TopicStatus::Failed,
            topic_id: topic_id.to_string(),
            cost_usd: 0.0,
            error: Some(error.into()),
            kind: Some(kind),
            disposition: if kind.retryable() {
                Disposition::Keep
            } else {
                Disposition::Delete
            },
        }
    }

    fn skipped(topic_id: &str) -> Self {
        Self {
            status: TopicStatus::Skipped,
            topic_id: topic_id.to_string(),
            cost_usd: 0.0,
            error: None,
            kind: None,
            disposition: Disposition::Delete,
        }
    }
}

enum SlugResolution {
    /// The deterministic article blob already exists for this topic.
    AlreadyDone,
    Fresh { slug: String, path: String },
}

/// Process one topic message end to end.
pub async fn handle_topic_message(
    ctx: &ProcessorContext,
    envelope: &MessageEnvelope,
) -> TopicProcessingResult {
    // 1. Validate. Malformed input is deleted without creating any state
    //    or external call.
    let topic: TopicPayload = match envelope.payload_as() {
        Ok(t) => t,
        Err(e) => {
            return TopicProcessingResult::failed(
                "",
                ErrorKind::BadInput,
                format!("malformed topic payload: {e}"),
            )
        }
    };
    if topic.topic_id.is_empty() || topic.title.is_empty() {
        return TopicProcessingResult::failed(
            &topic.topic_id,
            ErrorKind::BadInput,
            "topic_id and title are required",
        );
    }

    // 2. Done marker: the deterministically named article blob.
    let resolution = match resolve_slug(ctx, &topic).await {
        Ok(SlugResolution::AlreadyDone) => {
            debug!(topic_id = %topic.topic_id, "article already exists, skipping");
            return TopicProcessingResult::skipped(&topic.topic_id);
        }
        Ok(fresh) => fresh,
        Err(e) => {
            return TopicProcessingResult::failed(
                &topic.topic_id,
                ErrorKind::TransientDependency,
                format!("done-marker check failed: {e}"),
            )
        }
    };
    let SlugResolution::Fresh { slug, path } = resolution else {
        unreachable!()
    };

    // 3. Lease. Exactly one contender wins; the loser leaves the message
    //    for redelivery after the visibility timeout.
    match ctx
        .leases
        .acquire(&topic.topic_id, &ctx.processor_id, ctx.lease_ttl)
        .await
    {
        Ok(AcquireOutcome::Acquired(_)) => {}
        Ok(AcquireOutcome::Held {
            holder_id,
            expires_at,
        }) => {
            debug!(
                topic_id = %topic.topic_id,
                holder = %holder_id,
                %expires_at,
                "lease contention, backing off"
            );
            return TopicProcessingResult::failed(
                &topic.topic_id,
                ErrorKind::LeaseContention,
                format!("lease held by {holder_id}"),
            );
        }
        Err(e) => {
            return TopicProcessingResult::failed(
                &topic.topic_id,
                ErrorKind::TransientDependency,
                format!("lease acquire failed: {e}"),
            )
        }
    }

    // From here on the lease must be released on every exit path.
    let result = generate_and_store(ctx, envelope, &topic, &slug, &path).await;
    if let Err(e) = ctx.leases.release(&topic.topic_id, &ctx.processor_id).await {
        warn!(topic_id = %topic.topic_id, error = %e, "lease release failed, will expire by TTL");
    }
    result
}

/// Steps 4-7: generate, persist, trigger the renderer.
async fn generate_and_store(
    ctx: &ProcessorContext,
    envelope: &MessageEnvelope,
    topic: &TopicPayload,
    slug: &str,
    path: &str,
) -> TopicProcessingResult {
    let started = std::time::Instant::now();

    // 4. Research + draft.
    let draft = match ctx
        .llm
        .complete(article::draft_messages(topic), ctx.call_deadline)
        .await
    {
        Ok(completion) => completion,
        Err(LlmCallError::Transient(reason)) => {
            return TopicProcessingResult::failed(
                &topic.topic_id,
                ErrorKind::TransientDependency,
                reason,
            )
        }
        Err(LlmCallError::Permanent(reason)) => {
            return record_permanent_failure(ctx, envelope, topic, reason).await
        }
    };
    let mut cost_usd = ctx.llm.cost_usd(&draft);
    let mut tokens_used = draft.total_tokens();

    // Optional second call for headline options; any failure falls back to
    // the collected title.
    let seo_title = match ctx
        .llm
        .complete(article::title_messages(topic), ctx.call_deadline)
        .await
    {
        Ok(completion) => {
            cost_usd += ctx.llm.cost_usd(&completion);
            tokens_used += completion.total_tokens();
            article::select_title(&completion.text, &topic.title)
        }
        Err(e) => {
            debug!(topic_id = %topic.topic_id, error = %e, "title options call failed, using collected title");
            topic.title.clone()
        }
    };

    // 5. Metadata + provenance.
    let references = article::extract_references(&draft.text);
    let quality = article::quality_score(&draft.text, &references);
    let now = Utc::now();
    let processed = ProcessedArticle {
        article_id: Uuid::new_v4().to_string(),
        topic_id: topic.topic_id.clone(),
        title: topic.title.clone(),
        slug: slug.to_string(),
        seo_title,
        description: article::derive_description(&draft.text),
        content: draft.text.clone(),
        tags: article::derive_tags(&topic.title, &topic.source),
        word_count: draft.text.split_whitespace().count(),
        quality_score: quality,
        cost_usd,
        tokens_used,
        provenance: vec![ProvenanceEntry {
            stage: SERVICE_NAME.to_string(),
            processor_id: ctx.processor_id.clone(),
            version: article::GENERATOR_VERSION.to_string(),
            timestamp: now,
            cost_usd,
            tokens: tokens_used,
        }],
        generated_at: now,
        collected_at: topic.collected_at,
        source: topic.source.clone(),
        url: topic.url.clone(),
        references,
    };

    // 6. Durable write, bounded in-process retries. Create-if-absent: a
    //    concurrent winner turns this into a skip, not a duplicate.
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match ctx
            .store
            .put_json_if_absent(containers::PROCESSED, path, &processed)
            .await
        {
            Ok(()) => break,
            Err(StorageError::AlreadyExists(_)) => {
                debug!(topic_id = %topic.topic_id, path, "lost the write race, already done");
                return TopicProcessingResult::skipped(&topic.topic_id);
            }
            Err(e) if attempt < ctx.write_attempts => {
                warn!(topic_id = %topic.topic_id, attempt, error = %e, "article write failed, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(200 * attempt as u64)).await;
            }
            Err(e) => {
                // The expensive step will repeat on redelivery; cost is
                // bounded by queue retry policy.
                return TopicProcessingResult::failed(
                    &topic.topic_id,
                    ErrorKind::StorageWrite,
                    format!("article write failed after {attempt} attempts: {e}"),
                );
            }
        }
    }

    // 7. Trigger the renderer. The C2 write is durable; a lost trigger is
    //    re-emitted by reconciliation, so the message is still consumed.
    let mut trigger_error = None;
    match render_trigger_body(envelope, path) {
        Ok(body) => {
            if let Err(e) = ctx.render_queue.send(body).await {
                warn!(
                    correlation_id = %envelope.correlation_id,
                    topic_id = %topic.topic_id,
                    error = %e,
                    "render trigger send failed, reconciler will re-emit"
                );
                trigger_error = Some(format!("render trigger failed: {e}"));
            }
        }
        Err(e) => trigger_error = Some(format!("render trigger encode failed: {e}")),
    }

    info!(
        correlation_id = %envelope.correlation_id,
        topic_id = %topic.topic_id,
        slug,
        cost_usd,
        tokens = tokens_used,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "article generated"
    );
    TopicProcessingResult {
        status: TopicStatus::Success,
        topic_id: topic.topic_id.clone(),
        cost_usd,
        error: trigger_error,
        kind: None,
        disposition: Disposition::Delete,
    }
}

fn render_trigger_body(
    envelope: &MessageEnvelope,
    path: &str,
) -> Result<String, serde_json::Error> {
    MessageEnvelope::continuing(
        envelope.correlation_id,
        SERVICE_NAME,
        Operation::RenderMarkdown,
        &RenderPayload {
            processed_blob_path: path.to_string(),
        },
    )?
    .to_body()
}

/// Permanent failures write an operator-visible record and consume the
/// message, terminating the poison loop.
async fn record_permanent_failure(
    ctx: &ProcessorContext,
    envelope: &MessageEnvelope,
    topic: &TopicPayload,
    reason: String,
) -> TopicProcessingResult {
    let record = FailureRecord {
        topic_id: topic.topic_id.clone(),
        correlation_id: envelope.correlation_id.to_string(),
        stage: SERVICE_NAME.to_string(),
        reason: reason.clone(),
        failed_at: Utc::now(),
    };
    if let Err(e) = ctx
        .store
        .put_json(
            containers::PROCESSED,
            &ids::failure_path(&topic.topic_id),
            &record,
        )
        .await
    {
        warn!(topic_id = %topic.topic_id, error = %e, "failure record write failed");
    }
    warn!(
        correlation_id = %envelope.correlation_id,
        topic_id = %topic.topic_id,
        reason,
        "permanent generation failure recorded"
    );
    TopicProcessingResult::failed(&topic.topic_id, ErrorKind::PermanentDependency, reason)
}

/// Resolve the deterministic article path, handling slug collisions between
/// different topics by suffixing a short topic hash.
async fn resolve_slug(
    ctx: &ProcessorContext,
    topic: &TopicPayload,
) -> Result<SlugResolution, StorageError> {
    let base_slug = ids::slugify(&topic.title, ids::SLUG_MAX_LEN);
    let base_path = ids::article_path(topic.collected_at, &base_slug);

    match existing_topic_id(ctx, &base_path).await? {
        None => {
            return Ok(SlugResolution::Fresh {
                slug: base_slug,
                path: base_path,
            })
        }
        Some(existing) if existing == topic.topic_id => return Ok(SlugResolution::AlreadyDone),
        Some(_) => {}
    }

    // A different topic owns the natural slug; disambiguate.
    let suffix = &topic.topic_id[..8.min(topic.topic_id.len())];
    let slug = format!("{base_slug}-{suffix}");
    let path = ids::article_path(topic.collected_at, &slug);
    match existing_topic_id(ctx, &path).await? {
        Some(_) => Ok(SlugResolution::AlreadyDone),
        None => Ok(SlugResolution::Fresh { slug, path }),
    }
}

/// Topic id stored in the blob at `path`, or None when absent. An
/// unreadable blob is treated as present-but-foreign so we never overwrite.
async fn existing_topic_id(
    ctx: &ProcessorContext,
    path: &str,
) -> Result<Option<String>, StorageError> {
    match ctx
        .store
        .get_json::<ProcessedArticle>(containers::PROCESSED, path)
        .await
    {
        Ok(article) => Ok(Some(article.topic_id)),
        Err(StorageError::NotFound(_)) => Ok(None),
        Err(StorageError::Serialize(_)) => Ok(Some(String::new())),
        Err(e) => Err(e),
    }
}
