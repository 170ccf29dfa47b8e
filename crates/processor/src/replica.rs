//! Processor replica loop: batched dequeue, bounded parallel handling,
//! graceful shutdown.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{info, warn};

use mill_admin::StageCounters;
use mill_core::envelope::Operation;
use mill_core::Shutdown;
use mill_queue::{parse_envelope, QueueClient, QueueMessage};

use crate::dedup::MessageDeduplicator;
use crate::handler::{handle_topic_message, Disposition, ProcessorContext, TopicStatus};

#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Messages pulled and processed in parallel per batch.
    pub batch_size: u32,
    pub visibility_timeout_secs: u32,
    pub poll_interval: Duration,
    /// How long in-flight messages may finish after shutdown triggers.
    pub shutdown_grace: Duration,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            visibility_timeout_secs: 90,
            poll_interval: Duration::from_millis(1000),
            shutdown_grace: Duration::from_secs(25),
        }
    }
}

/// Run the replica until shutdown. Dequeuing stops within one poll interval
/// of the signal; in-flight messages get the grace window, and anything
/// unfinished stays undeleted for redelivery.
pub async fn run_replica(
    ctx: Arc<ProcessorContext>,
    queue: Arc<dyn QueueClient>,
    dedup: Arc<MessageDeduplicator>,
    counters: Arc<StageCounters>,
    config: ReplicaConfig,
    shutdown: Shutdown,
) {
    info!(
        batch_size = config.batch_size,
        visibility = config.visibility_timeout_secs,
        "processor replica started"
    );

    let mut tasks: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
        if shutdown.is_cancelled() {
            break;
        }

        let messages = match queue
            .receive(config.batch_size, config.visibility_timeout_secs)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "queue receive failed, retrying next poll");
                continue;
            }
        };

        for message in messages {
            counters.received.fetch_add(1, Ordering::Relaxed);
            let ctx = ctx.clone();
            let queue = queue.clone();
            let dedup = dedup.clone();
            let counters = counters.clone();
            tasks.spawn(async move {
                process_one(&ctx, &*queue, &dedup, &counters, message).await;
            });
        }

        // Reap finished tasks without blocking the poll cadence.
        while tasks.try_join_next().is_some() {}
    }

    // Grace window for in-flight work.
    info!(grace = ?config.shutdown_grace, in_flight = tasks.len(), "draining in-flight messages");
    let drain = async {
        while tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(config.shutdown_grace, drain).await.is_err() {
        warn!("grace window elapsed, abandoning in-flight messages for redelivery");
        tasks.abort_all();
    }
    info!("processor replica stopped");
}

async fn process_one(
    ctx: &ProcessorContext,
    queue: &dyn QueueClient,
    dedup: &MessageDeduplicator,
    counters: &StageCounters,
    message: QueueMessage,
) {
    let envelope = match parse_envelope(&message) {
        Ok(env) => env,
        Err(e) => {
            warn!(message_id = %message.id, error = %e, "malformed message dropped");
            counters.failed.fetch_add(1, Ordering::Relaxed);
            delete(queue, &message).await;
            return;
        }
    };

    // Forward compat: operations without a registered handler are dropped.
    if envelope.operation != Operation::ProcessTopic {
        warn!(
            correlation_id = %envelope.correlation_id,
            operation = envelope.operation.as_str(),
            "unhandled operation dropped"
        );
        counters.failed.fetch_add(1, Ordering::Relaxed);
        delete(queue, &message).await;
        return;
    }

    // Advisory duplicate-delivery guard; the done marker stays the real
    // idempotency check.
    if !dedup.check_and_record(&message.id).await {
        counters.skipped.fetch_add(1, Ordering::Relaxed);
        delete(queue, &message).await;
        return;
    }

    let result = handle_topic_message(ctx, &envelope).await;
    match result.status {
        TopicStatus::Success => counters.succeeded.fetch_add(1, Ordering::Relaxed),
        TopicStatus::Skipped => counters.skipped.fetch_add(1, Ordering::Relaxed),
        TopicStatus::Failed => match result.disposition {
            Disposition::Delete => counters.failed.fetch_add(1, Ordering::Relaxed),
            Disposition::Keep => counters.retried.fetch_add(1, Ordering::Relaxed),
        },
    };
    if let Some(error) = &result.error {
        warn!(
            correlation_id = %envelope.correlation_id,
            topic_id = %result.topic_id,
            stage = crate::SERVICE_NAME,
            kind = result.kind.map(|k| k.as_str()).unwrap_or("none"),
            retryable = result.disposition == Disposition::Keep,
            error,
            "topic processing reported an error"
        );
    }

    if result.disposition == Disposition::Delete {
        delete(queue, &message).await;
    }
}

async fn delete(queue: &dyn QueueClient, message: &QueueMessage) {
    if let Err(e) = queue.delete(&message.receipt_handle).await {
        warn!(message_id = %message.id, error = %e, "message delete failed, will redeliver");
    }
}
