//! collector-worker — pulls candidate items from configured sources and
//! fans them out as per-item processing messages.
//!
//! Triggers, in precedence order: manual `POST /collect`, messages on the
//! collection-requests queue, the periodic timer, and an optional run at
//! startup (`AUTO_COLLECT_ON_STARTUP=true`).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use mill_admin::{AdminState, StageCounters, TriggerRequest};
use mill_collector::{build_sources, run_collection, CollectorContext, SourceAdapter};
use mill_core::envelope::{CollectPayload, Operation};
use mill_core::{config, Config, Shutdown};
use mill_queue::parse_envelope;
use mill_storage::{BlobStore, StorageBackend};
use mill_throttle::BackoffConfig;

// ── CLI ─────────────────────────────────────────────────────────────

/// Collection worker — fetch, filter, dedup, persist, fan out.
#[derive(Parser, Debug)]
#[command(name = "collector-worker", version, about)]
struct Cli {
    /// Run one collection cycle and exit.
    #[arg(long, default_value_t = false)]
    once: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    config::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let backend = StorageBackend::from_config(&config.storage, &config.aws)?;
    let store = BlobStore::new(&backend);
    let process_queue =
        mill_queue::connect(&config.queues, &config.aws, &config.queues.process_queue_url).await?;
    let collect_queue =
        mill_queue::connect(&config.queues, &config.aws, &config.queues.collect_queue_url).await?;

    let sources = build_sources(&config.collector)?;
    let ctx = Arc::new(CollectorContext {
        store,
        process_queue: process_queue.clone(),
        dedup_window_hours: config.collector.dedup_window_hours,
        send_backoff: BackoffConfig::default(),
    });

    let shutdown = Shutdown::new();
    shutdown.listen_for_os_signals();

    if cli.once {
        let outcome = run_collection(&ctx, &sources, Uuid::new_v4()).await?;
        info!(collection_id = %outcome.collection_id, "single run complete");
        return Ok(());
    }

    // Admin surface with the manual trigger channel (capacity 1: triggers
    // while a run is pending coalesce).
    let counters = Arc::new(StageCounters::new());
    let (trigger_tx, mut trigger_rx) = mpsc::channel::<TriggerRequest>(1);
    let admin_state = Arc::new(AdminState {
        service: mill_collector::SERVICE_NAME.to_string(),
        counters: counters.clone(),
        queues: vec![
            ("process".to_string(), process_queue.clone()),
            ("collect".to_string(), collect_queue.clone()),
        ],
        trigger: Some(trigger_tx),
    });
    let router = mill_admin::build_router(admin_state, Some("/collect"));
    let admin_shutdown = shutdown.clone();
    let server_config = config.server.clone();
    tokio::spawn(async move {
        if let Err(e) = mill_admin::serve(router, &server_config, admin_shutdown).await {
            error!(error = %e, "admin server failed");
        }
    });

    // On-boot collection, gated by env. Failure must not crash the process.
    if config.collector.auto_collect_on_startup {
        info!("startup collection triggered");
        run_and_record(&ctx, &sources, &counters).await;
    }

    let interval_minutes = config.collector.collect_interval_minutes;
    // A disabled timer still needs a finite period for the select arm; the
    // guard below keeps it from ever firing a run.
    let mut timer = tokio::time::interval(Duration::from_secs(
        if interval_minutes > 0 { interval_minutes * 60 } else { 365 * 24 * 3600 },
    ));
    timer.tick().await; // consume the immediate first tick

    let mut poll = tokio::time::interval(Duration::from_millis(config.queues.poll_interval_ms));

    info!(interval_minutes, "collector ready");
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,

            Some(trigger) = trigger_rx.recv() => {
                info!(correlation_id = %trigger.correlation_id, reason = %trigger.reason, "manual collection");
                run_and_record(&ctx, &sources, &counters).await;
            }

            _ = timer.tick(), if interval_minutes > 0 => {
                info!("scheduled collection");
                run_and_record(&ctx, &sources, &counters).await;
            }

            _ = poll.tick() => {
                drain_collect_queue(&collect_queue, &ctx, &sources, &counters).await;
            }
        }
    }

    info!("collector-worker exited cleanly");
    Ok(())
}

async fn run_and_record(
    ctx: &CollectorContext,
    sources: &[SourceAdapter],
    counters: &StageCounters,
) {
    counters.received.fetch_add(1, Ordering::Relaxed);
    match run_collection(ctx, sources, Uuid::new_v4()).await {
        Ok(outcome) => {
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
            info!(
                collection_id = %outcome.collection_id,
                queued = outcome.queue_messages_sent,
                "collection run ok"
            );
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "collection run failed");
        }
    }
}

/// Serve queued collect requests (operator tooling and cross-service
/// triggers land here).
async fn drain_collect_queue(
    queue: &Arc<dyn mill_queue::QueueClient>,
    ctx: &CollectorContext,
    sources: &[SourceAdapter],
    counters: &StageCounters,
) {
    let messages = match queue.receive(1, 30).await {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "collect queue poll failed");
            return;
        }
    };

    for msg in messages {
        match parse_envelope(&msg) {
            Ok(env) if env.operation == Operation::Collect => {
                let reason = env
                    .payload_as::<CollectPayload>()
                    .map(|p| p.reason)
                    .unwrap_or_else(|_| "queued".to_string());
                info!(correlation_id = %env.correlation_id, reason, "queued collection request");
                run_and_record(ctx, sources, counters).await;
            }
            Ok(env) => {
                warn!(
                    correlation_id = %env.correlation_id,
                    operation = env.operation.as_str(),
                    "unexpected operation on collect queue, dropping"
                );
            }
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "unparseable collect message, dropping");
            }
        }
        if let Err(e) = queue.delete(&msg.receipt_handle).await {
            warn!(message_id = %msg.id, error = %e, "failed to delete collect message");
        }
    }
}
