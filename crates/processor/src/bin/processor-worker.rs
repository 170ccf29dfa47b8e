//! processor-worker — consumes topic messages and generates articles with
//! at-most-once semantics per topic.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

use mill_admin::{AdminState, StageCounters};
use mill_core::{config, Config, Shutdown};
use mill_llm::LlmClient;
use mill_processor::{run_replica, MessageDeduplicator, ProcessorContext, ReplicaConfig};
use mill_storage::{BlobStore, LeaseManager, StorageBackend};

/// Topic processor — lease-guarded AI article generation.
#[derive(Parser, Debug)]
#[command(name = "processor-worker", version, about)]
struct Cli {
    /// Messages processed in parallel per batch.
    #[arg(long, env = "PROCESSOR_BATCH_SIZE", default_value_t = 5)]
    batch_size: u32,
}

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
    let render_queue =
        mill_queue::connect(&config.queues, &config.aws, &config.queues.render_queue_url).await?;

    let llm = LlmClient::from_config(&config.llm)?;
    let processor_id = format!("processor-{}", &Uuid::new_v4().to_string()[..8]);
    info!(%processor_id, "identity assigned");

    // Per-call deadline sits below the visibility timeout so a slow call
    // cannot outlive the message's invisibility.
    let visibility = config.queues.processor_visibility_secs;
    let call_deadline = Duration::from_secs(visibility.saturating_sub(10).max(10) as u64);

    let ctx = Arc::new(ProcessorContext {
        processor_id: processor_id.clone(),
        store: store.clone(),
        leases: LeaseManager::new(store.clone()),
        render_queue,
        llm,
        lease_ttl: chrono::Duration::seconds(300),
        call_deadline,
        write_attempts: 3,
    });
    let dedup = Arc::new(MessageDeduplicator::load(store, &processor_id, 4096).await);

    let shutdown = Shutdown::new();
    shutdown.listen_for_os_signals();

    let counters = Arc::new(StageCounters::new());
    let admin_state = Arc::new(AdminState {
        service: mill_processor::SERVICE_NAME.to_string(),
        counters: counters.clone(),
        queues: vec![("process".to_string(), process_queue.clone())],
        trigger: None,
    });
    let router = mill_admin::build_router(admin_state, None);
    let admin_shutdown = shutdown.clone();
    let server_config = config.server.clone();
    tokio::spawn(async move {
        if let Err(e) = mill_admin::serve(router, &server_config, admin_shutdown).await {
            error!(error = %e, "admin server failed");
        }
    });

    let replica_config = ReplicaConfig {
        batch_size: cli.batch_size,
        visibility_timeout_secs: visibility,
        poll_interval: Duration::from_millis(config.queues.poll_interval_ms),
        shutdown_grace: Duration::from_secs(25),
    };
    run_replica(ctx, process_queue, dedup, counters, replica_config, shutdown).await;

    info!("processor-worker exited cleanly");
    Ok(())
}
