//! One collection run: fetch, filter, dedup, persist, fan out.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use mill_core::content::{CollectedItem, Collection, CollectionStats};
use mill_core::envelope::{MessageEnvelope, Operation, TopicPayload};
use mill_core::ids;
use mill_queue::QueueClient;
use mill_storage::{containers, BlobStore};
use mill_throttle::BackoffConfig;

use crate::dedup::DedupWindow;
use crate::error::CollectError;
use crate::quality::{self, Verdict};
use crate::sources::SourceAdapter;
use crate::SERVICE_NAME;

/// Immutable per-replica context passed into the run.
pub struct CollectorContext {
    pub store: BlobStore,
    pub process_queue: Arc<dyn QueueClient>,
    pub dedup_window_hours: u32,
    pub send_backoff: BackoffConfig,
}

/// Stats returned from one run.
#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    pub collection_id: String,
    pub accepted_count: u32,
    pub rejected_count: u32,
    pub duplicate_count: u32,
    pub queue_messages_sent: u32,
    pub sources_failed: u32,
}

/// Run one collection cycle across all configured sources.
///
/// The audit blob is persisted before any fanout message is sent, so every
/// queue message references a durable row and failed sends can be replayed
/// from it. A single unavailable source degrades the run; a failed blob
/// write aborts it with no messages emitted.
pub async fn run_collection(
    ctx: &CollectorContext,
    sources: &[SourceAdapter],
    run_id: Uuid,
) -> Result<CollectionOutcome, CollectError> {
    let started_at = Utc::now();
    let collection_id = run_id.to_string();
    let mut stats = CollectionStats::default();
    let mut sources_failed = 0u32;

    let mut window = DedupWindow::load(&ctx.store, ctx.dedup_window_hours).await;

    // Fetch and filter.
    let mut accepted: Vec<CollectedItem> = Vec::new();
    for source in sources {
        let items = match source.fetch().await {
            Ok(items) => items,
            Err(e) => {
                warn!(source = %source.name(), error = %e, "source unavailable, continuing");
                sources_failed += 1;
                continue;
            }
        };
        stats.fetched += items.len() as u32;

        let template = &source.config().quality;
        for item in items {
            match quality::evaluate(&item, template) {
                Verdict::Rejected { reason } => {
                    stats.rejected += 1;
                    tracing::debug!(source = %item.source, title = %item.title, reason, "item rejected");
                }
                Verdict::Accepted { .. } => {
                    if window.check_and_insert(&item.content_hash) {
                        stats.accepted += 1;
                        accepted.push(item);
                    } else {
                        stats.duplicates += 1;
                    }
                }
            }
        }
    }

    // Persist the audit blob. Fatal on failure: no fanout without it.
    let collection_blob = ids::collection_path(started_at, &collection_id);
    let collection = Collection {
        collection_id: collection_id.clone(),
        started_at,
        finished_at: Utc::now(),
        sources: sources.iter().map(|s| s.name().to_string()).collect(),
        items: accepted.clone(),
        stats,
    };
    ctx.store
        .put_json(containers::COLLECTED, &collection_blob, &collection)
        .await?;

    // Fanout: one message per accepted item. Sends are sequential with
    // bounded retries; a lost message is recoverable from the blob.
    let mut sent = 0u32;
    for item in &accepted {
        match send_topic_message(ctx, item, &collection_id, &collection_blob).await {
            Ok(()) => sent += 1,
            Err((correlation_id, e)) => {
                warn!(
                    %correlation_id,
                    topic_id = %item.topic_id,
                    error = %e,
                    "fanout send failed after retries, item left for replay"
                );
            }
        }
    }

    // The blob stays as written (collection records are immutable); the
    // actual send count is returned to the caller and logged.
    let outcome = CollectionOutcome {
        collection_id,
        accepted_count: collection.stats.accepted,
        rejected_count: collection.stats.rejected,
        duplicate_count: collection.stats.duplicates,
        queue_messages_sent: sent,
        sources_failed,
    };
    info!(
        collection_id = %outcome.collection_id,
        fetched = collection.stats.fetched,
        accepted = outcome.accepted_count,
        rejected = outcome.rejected_count,
        duplicates = outcome.duplicate_count,
        queued = outcome.queue_messages_sent,
        sources_failed,
        "collection run finished"
    );
    Ok(outcome)
}

/// Build and send one topic message, retrying transient send failures.
/// Message construction is a pure function of the item.
async fn send_topic_message(
    ctx: &CollectorContext,
    item: &CollectedItem,
    collection_id: &str,
    collection_blob: &str,
) -> Result<(), (Uuid, CollectError)> {
    let payload = TopicPayload {
        topic_id: item.topic_id.clone(),
        title: item.title.clone(),
        source: item.source.clone(),
        url: item.url.clone(),
        engagement: item.engagement,
        collected_at: item.fetched_at,
        priority_score: quality::priority_score(&item.engagement),
        collection_id: collection_id.to_string(),
        collection_blob: collection_blob.to_string(),
    };
    let envelope = MessageEnvelope::new(SERVICE_NAME, Operation::ProcessTopic, &payload)
        .map_err(|e| (Uuid::nil(), CollectError::Config(e.to_string())))?;
    let correlation_id = envelope.correlation_id;
    let body = envelope
        .to_body()
        .map_err(|e| (correlation_id, CollectError::Config(e.to_string())))?;

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match ctx.process_queue.send(body.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) if ctx.send_backoff.should_retry(attempt) => {
                let delay = ctx.send_backoff.delay_for(attempt);
                warn!(
                    %correlation_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "topic send failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err((correlation_id, CollectError::QueueSendFailed(e))),
        }
    }
}
