//! renderer-worker — turns processed articles into markdown files and
//! coalesces queue drains into single site-build requests.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use mill_admin::{AdminState, StageCounters};
use mill_core::{config, Config, Shutdown};
use mill_imagery::ImageDispatcher;
use mill_renderer::{run_replica, DrainMonitor, RendererContext, ReplicaConfig};
use mill_storage::{BlobStore, StorageBackend};

/// Markdown renderer — front-matter, stock images, drain coalescing.
#[derive(Parser, Debug)]
#[command(name = "renderer-worker", version, about)]
struct Cli {
    /// Messages processed in parallel per batch.
    #[arg(long, env = "RENDERER_BATCH_SIZE", default_value_t = 10)]
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
    let render_queue =
        mill_queue::connect(&config.queues, &config.aws, &config.queues.render_queue_url).await?;
    let publish_queue =
        mill_queue::connect(&config.queues, &config.aws, &config.queues.publish_queue_url).await?;

    let drain = Arc::new(DrainMonitor::new());
    let ctx = Arc::new(RendererContext {
        store,
        publish_queue: publish_queue.clone(),
        images: ImageDispatcher::from_config(&config.images),
        drain: drain.clone(),
    });

    let shutdown = Shutdown::new();
    shutdown.listen_for_os_signals();

    let counters = Arc::new(StageCounters::new());
    let admin_state = Arc::new(AdminState {
        service: mill_renderer::SERVICE_NAME.to_string(),
        counters: counters.clone(),
        queues: vec![
            ("render".to_string(), render_queue.clone()),
            ("publish".to_string(), publish_queue.clone()),
        ],
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

    // Background drain monitor owns the coalesced build signal.
    let monitor = tokio::spawn(drain.clone().run(
        render_queue.clone(),
        publish_queue,
        Duration::from_secs(config.renderer.drain_check_interval_secs),
        Duration::from_secs(config.renderer.stable_empty_secs),
        shutdown.clone(),
    ));

    let replica_config = ReplicaConfig {
        batch_size: cli.batch_size,
        visibility_timeout_secs: config.queues.renderer_visibility_secs,
        poll_interval: Duration::from_millis(config.queues.poll_interval_ms),
        shutdown_grace: Duration::from_secs(25),
    };
    run_replica(ctx, render_queue, counters, replica_config, shutdown).await;

    monitor.await.ok();
    info!("renderer-worker exited cleanly");
    Ok(())
}
