//! Renderer replica loop: batched dequeue with bounded parallelism.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{info, warn};

use mill_admin::StageCounters;
use mill_core::envelope::Operation;
use mill_core::Shutdown;
use mill_queue::{parse_envelope, QueueClient, QueueMessage};

use crate::handler::{handle_render_message, Disposition, RenderStatus, RendererContext};

#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub batch_size: u32,
    pub visibility_timeout_secs: u32,
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            visibility_timeout_secs: 60,
            poll_interval: Duration::from_millis(1000),
            shutdown_grace: Duration::from_secs(25),
        }
    }
}

/// Run the replica until shutdown; undeleted messages redeliver.
pub async fn run_replica(
    ctx: Arc<RendererContext>,
    queue: Arc<dyn QueueClient>,
    counters: Arc<StageCounters>,
    config: ReplicaConfig,
    shutdown: Shutdown,
) {
    info!(
        batch_size = config.batch_size,
        visibility = config.visibility_timeout_secs,
        "renderer replica started"
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
            let counters = counters.clone();
            tasks.spawn(async move {
                render_one(&ctx, &*queue, &counters, message).await;
            });
        }

        while tasks.try_join_next().is_some() {}
    }

    info!(grace = ?config.shutdown_grace, in_flight = tasks.len(), "draining in-flight renders");
    let drain = async {
        while tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(config.shutdown_grace, drain).await.is_err() {
        warn!("grace window elapsed, abandoning in-flight renders for redelivery");
        tasks.abort_all();
    }
    info!("renderer replica stopped");
}

async fn render_one(
    ctx: &RendererContext,
    queue: &dyn QueueClient,
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

    if envelope.operation != Operation::RenderMarkdown {
        warn!(
            correlation_id = %envelope.correlation_id,
            operation = envelope.operation.as_str(),
            "unhandled operation dropped"
        );
        counters.failed.fetch_add(1, Ordering::Relaxed);
        delete(queue, &message).await;
        return;
    }

    let result = handle_render_message(ctx, &envelope).await;
    match result.status {
        RenderStatus::Rendered => counters.succeeded.fetch_add(1, Ordering::Relaxed),
        RenderStatus::Skipped => counters.skipped.fetch_add(1, Ordering::Relaxed),
        RenderStatus::Failed => match result.disposition {
            Disposition::Delete => counters.failed.fetch_add(1, Ordering::Relaxed),
            Disposition::Keep => counters.retried.fetch_add(1, Ordering::Relaxed),
        },
    };
    if let Some(error) = &result.error {
        warn!(
            correlation_id = %envelope.correlation_id,
            stage = crate::SERVICE_NAME,
            kind = result.kind.map(|k| k.as_str()).unwrap_or("none"),
            retryable = result.disposition == Disposition::Keep,
            error,
            "render reported an error"
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
