//! reconciler — operator CLI closing the artifact/message atomicity gap.

use clap::{Parser, Subcommand};
use tracing::info;

use mill_core::{config, Config};
use mill_reconcile::{
    emit_render_messages, find_render_gaps, find_unpublished_markdown, force_publish,
};
use mill_storage::{BlobStore, StorageBackend};

/// Scan containers for dropped downstream work and re-emit it.
#[derive(Parser, Debug)]
#[command(name = "reconciler", version, about)]
struct Cli {
    /// Report what would be sent without sending anything.
    #[arg(long, global = true, default_value_t = false)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-emit render messages for articles with no markdown.
    RenderGaps,
    /// Force a publish when markdown exists that the live site lacks.
    PublishGaps,
    /// Both scans.
    All,
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

    let backend = StorageBackend::from_config(&config.storage, &config.aws)?;
    let store = BlobStore::new(&backend);

    match cli.command {
        Command::RenderGaps => render_gaps(&config, &store, cli.dry_run).await?,
        Command::PublishGaps => publish_gaps(&config, &store, cli.dry_run).await?,
        Command::All => {
            render_gaps(&config, &store, cli.dry_run).await?;
            publish_gaps(&config, &store, cli.dry_run).await?;
        }
    }

    Ok(())
}

async fn render_gaps(config: &Config, store: &BlobStore, dry_run: bool) -> anyhow::Result<()> {
    let gaps = find_render_gaps(store).await?;
    if gaps.is_empty() {
        info!("no render gaps");
        return Ok(());
    }
    let queue =
        mill_queue::connect(&config.queues, &config.aws, &config.queues.render_queue_url).await?;
    let sent = emit_render_messages(&queue, &gaps, dry_run).await?;
    info!(gaps = gaps.len(), sent, dry_run, "render reconciliation done");
    Ok(())
}

async fn publish_gaps(config: &Config, store: &BlobStore, dry_run: bool) -> anyhow::Result<()> {
    let missing = find_unpublished_markdown(store).await?;
    if missing.is_empty() {
        info!("no publish gaps");
        return Ok(());
    }
    let queue =
        mill_queue::connect(&config.queues, &config.aws, &config.queues.publish_queue_url).await?;
    force_publish(&queue, missing.len() as u64, dry_run).await?;
    info!(missing = missing.len(), dry_run, "publish reconciliation done");
    Ok(())
}
