//! publisher-worker — serial consumer of coalesced build requests.
//!
//! Deployment invariant: at most one replica. The stage is serial by
//! design; parallel publishes of the same container cannot be made safe.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use mill_admin::{AdminState, StageCounters, TriggerRequest};
use mill_core::envelope::{BuildPayload, MessageEnvelope, Operation};
use mill_core::{config, Config, Shutdown};
use mill_publisher::{
    handle_build_message, CommandBuilder, DeployStatus, Disposition, PublisherContext,
};
use mill_queue::{parse_envelope, QueueClient};
use mill_storage::{BlobStore, StorageBackend};

/// Site publisher — build, validate, backup, swap, rollback.
#[derive(Parser, Debug)]
#[command(name = "publisher-worker", version, about)]
struct Cli {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _cli = Cli::parse();
    config::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let backend = StorageBackend::from_config(&config.storage, &config.aws)?;
    let store = BlobStore::new(&backend);
    let publish_queue =
        mill_queue::connect(&config.queues, &config.aws, &config.queues.publish_queue_url).await?;

    let ctx = PublisherContext {
        store,
        builder: Arc::new(CommandBuilder::new(
            config.publisher.build_command.clone(),
            config.publisher.site_config_path.clone(),
            Duration::from_secs(config.publisher.build_timeout_secs),
        )),
        work_dir: config.publisher.work_dir.clone(),
        output_max_mb: config.publisher.output_max_mb,
        progress_every: config.publisher.progress_every_files,
        site_url: config.publisher.site_url.clone(),
    };

    let shutdown = Shutdown::new();
    shutdown.listen_for_os_signals();

    let counters = Arc::new(StageCounters::new());
    let (trigger_tx, mut trigger_rx) = mpsc::channel::<TriggerRequest>(1);
    let admin_state = Arc::new(AdminState {
        service: mill_publisher::SERVICE_NAME.to_string(),
        counters: counters.clone(),
        queues: vec![("publish".to_string(), publish_queue.clone())],
        trigger: Some(trigger_tx),
    });
    let router = mill_admin::build_router(admin_state, Some("/publish"));
    let admin_shutdown = shutdown.clone();
    let server_config = config.server.clone();
    tokio::spawn(async move {
        if let Err(e) = mill_admin::serve(router, &server_config, admin_shutdown).await {
            error!(error = %e, "admin server failed");
        }
    });

    let visibility = config.queues.publisher_visibility_secs;
    let poll_interval = Duration::from_millis(config.queues.poll_interval_ms);
    info!("publisher ready");

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,

            // Manual trigger: enqueue a build message so the normal path
            // (including redelivery on failure) applies.
            Some(trigger) = trigger_rx.recv() => {
                let payload = BuildPayload {
                    batch_id: trigger.correlation_id,
                    markdown_count: 0,
                    trigger: trigger.reason,
                };
                match MessageEnvelope::new(mill_publisher::SERVICE_NAME, Operation::PublishSite, &payload)
                    .map_err(anyhow::Error::from)
                    .and_then(|env| env.to_body().map_err(anyhow::Error::from))
                {
                    Ok(body) => {
                        if let Err(e) = publish_queue.send(body).await {
                            warn!(error = %e, "manual build enqueue failed");
                        }
                    }
                    Err(e) => warn!(error = %e, "manual build encode failed"),
                }
            }

            _ = tokio::time::sleep(poll_interval) => {
                // Serial: one message at a time.
                let messages = match publish_queue.receive(1, visibility).await {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(error = %e, "publish queue receive failed");
                        continue;
                    }
                };
                for message in messages {
                    counters.received.fetch_add(1, Ordering::Relaxed);
                    let envelope = match parse_envelope(&message) {
                        Ok(env) => env,
                        Err(e) => {
                            warn!(message_id = %message.id, error = %e, "malformed message dropped");
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            let _ = publish_queue.delete(&message.receipt_handle).await;
                            continue;
                        }
                    };
                    if envelope.operation != Operation::PublishSite {
                        warn!(
                            correlation_id = %envelope.correlation_id,
                            operation = envelope.operation.as_str(),
                            "unhandled operation dropped"
                        );
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        let _ = publish_queue.delete(&message.receipt_handle).await;
                        continue;
                    }

                    let result = handle_build_message(&ctx, &envelope, &shutdown).await;
                    match result.status {
                        DeployStatus::Success => {
                            counters.succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        DeployStatus::Cancelled => {
                            counters.retried.fetch_add(1, Ordering::Relaxed);
                        }
                        DeployStatus::Failed => match result.disposition {
                            Disposition::Delete => {
                                counters.failed.fetch_add(1, Ordering::Relaxed);
                            }
                            Disposition::Keep => {
                                counters.retried.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                    }
                    for err in &result.errors {
                        warn!(
                            correlation_id = %envelope.correlation_id,
                            stage = mill_publisher::SERVICE_NAME,
                            kind = result.kind.map(|k| k.as_str()).unwrap_or("none"),
                            retryable = result.disposition == Disposition::Keep,
                            error = %err,
                            "deployment error"
                        );
                    }

                    if result.disposition == Disposition::Delete {
                        if let Err(e) = publish_queue.delete(&message.receipt_handle).await {
                            warn!(message_id = %message.id, error = %e, "message delete failed");
                        }
                    }
                }
            }
        }
    }

    info!("publisher-worker exited cleanly");
    Ok(())
}
