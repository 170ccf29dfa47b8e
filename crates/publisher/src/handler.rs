//! Build message handling: rebuild the whole site from the markdown
//! container and swap it into the live container with a rollback path.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use mill_core::envelope::{BuildPayload, MessageEnvelope};
use mill_core::{ErrorKind, Shutdown};
use mill_storage::BlobStore;

use crate::build::SiteBuilder;
use crate::error::PublishError;
use crate::swap;
use crate::validate;
use crate::workspace::Workspace;

pub struct PublisherContext {
    pub store: BlobStore,
    pub builder: Arc<dyn SiteBuilder>,
    pub work_dir: PathBuf,
    pub output_max_mb: u64,
    pub progress_every: usize,
    pub site_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStatus {
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Delete,
    Keep,
}

#[derive(Debug)]
pub struct DeploymentResult {
    pub status: DeployStatus,
    pub build_ms: u64,
    pub uploaded_files: u64,
    pub site_url: String,
    pub errors: Vec<String>,
    /// Taxonomy class for failed results.
    pub kind: Option<ErrorKind>,
    pub disposition: Disposition,
}

impl DeploymentResult {
    fn failure(
        ctx: &PublisherContext,
        status: DeployStatus,
        kind: ErrorKind,
        disposition: Disposition,
        build_ms: u64,
        error: String,
    ) -> Self {
        Self {
            status,
            build_ms,
            uploaded_files: 0,
            site_url: ctx.site_url.clone(),
            errors: vec![error],
            kind: Some(kind),
            disposition,
        }
    }
}

/// Handle one coalesced build request.
///
/// Duplicates are idempotent: the same C3 snapshot produces the same site,
/// and a fresh message is always honored. The live container is mutated
/// only after validation passed and a backup exists; any later failure
/// rolls the backup over the live set.
pub async fn handle_build_message(
    ctx: &PublisherContext,
    envelope: &MessageEnvelope,
    shutdown: &Shutdown,
) -> DeploymentResult {
    let payload: BuildPayload = match envelope.payload_as() {
        Ok(p) => p,
        Err(e) => {
            return DeploymentResult::failure(
                ctx,
                DeployStatus::Failed,
                ErrorKind::BadInput,
                Disposition::Delete,
                0,
                format!("malformed build payload: {e}"),
            )
        }
    };
    info!(
        correlation_id = %envelope.correlation_id,
        batch_id = %payload.batch_id,
        markdown_count = payload.markdown_count,
        trigger = %payload.trigger,
        "build requested"
    );
    let started = std::time::Instant::now();

    // 1. Scratch workspace with the full C3 tree.
    let workspace = match Workspace::prepare(&ctx.work_dir) {
        Ok(w) => w,
        Err(e) => {
            return DeploymentResult::failure(
                ctx,
                DeployStatus::Failed,
                ErrorKind::TransientDependency,
                Disposition::Keep,
                0,
                format!("workspace prepare failed: {e}"),
            )
        }
    };
    match workspace
        .download_content(&ctx.store, ctx.progress_every, shutdown)
        .await
    {
        Ok(_) => {}
        Err(PublishError::Cancelled(step)) => {
            return DeploymentResult::failure(
                ctx,
                DeployStatus::Cancelled,
                ErrorKind::Cancelled,
                Disposition::Keep,
                0,
                format!("cancelled during {step}"),
            )
        }
        Err(e) => {
            return DeploymentResult::failure(
                ctx,
                DeployStatus::Failed,
                ErrorKind::TransientDependency,
                Disposition::Keep,
                0,
                format!("content download failed: {e}"),
            )
        }
    }

    // 2. Generate. A failing generator keeps the message: the cause may be
    //    environmental and the retry is cheap relative to losing a build.
    if let Err(e) = ctx
        .builder
        .build(&workspace.content_dir, &workspace.output_dir)
        .await
    {
        return DeploymentResult::failure(
            ctx,
            DeployStatus::Failed,
            ErrorKind::BuildFailure,
            Disposition::Keep,
            started.elapsed().as_millis() as u64,
            e.to_string(),
        );
    }
    let build_ms = started.elapsed().as_millis() as u64;

    // 3. Validate before anything destructive. A validation failure is
    //    reproducible from the same inputs, so looping the message would
    //    only repeat it: consume and surface.
    let report = match validate::validate_output(&workspace.output_dir, ctx.output_max_mb) {
        Ok(report) => report,
        Err(e) => {
            warn!(correlation_id = %envelope.correlation_id, error = %e, "output rejected");
            return DeploymentResult::failure(
                ctx,
                DeployStatus::Failed,
                ErrorKind::BuildFailure,
                Disposition::Delete,
                build_ms,
                e.to_string(),
            );
        }
    };

    // 4. Backup the live site. Cancellation here aborts cleanly with the
    //    live container untouched.
    match swap::backup_site(&ctx.store, ctx.progress_every, shutdown).await {
        Ok(_) => {}
        Err(PublishError::Cancelled(step)) => {
            return DeploymentResult::failure(
                ctx,
                DeployStatus::Cancelled,
                ErrorKind::Cancelled,
                Disposition::Keep,
                build_ms,
                format!("cancelled during {step}"),
            )
        }
        Err(e) => {
            return DeploymentResult::failure(
                ctx,
                DeployStatus::Failed,
                ErrorKind::StorageWrite,
                Disposition::Keep,
                build_ms,
                format!("backup failed: {e}"),
            )
        }
    }

    // 5. Upload; roll back on any failure.
    let uploaded = match swap::upload_site(
        &ctx.store,
        &workspace.output_dir,
        ctx.progress_every,
        shutdown,
    )
    .await
    {
        Ok(count) => count,
        Err(upload_err) => {
            let cancelled = matches!(upload_err, PublishError::Cancelled(_));
            warn!(
                correlation_id = %envelope.correlation_id,
                error = %upload_err,
                "upload failed, rolling back"
            );
            // Rollback runs even under shutdown pressure; a cancelled
            // rollback leaves redelivery to finish the job.
            let unblocked = Shutdown::new();
            if let Err(rollback_err) =
                swap::rollback_site(&ctx.store, ctx.progress_every, &unblocked).await
            {
                warn!(error = %rollback_err, "rollback failed, live site needs reconciliation");
            }
            return DeploymentResult::failure(
                ctx,
                if cancelled {
                    DeployStatus::Cancelled
                } else {
                    DeployStatus::Failed
                },
                if cancelled {
                    ErrorKind::Cancelled
                } else {
                    ErrorKind::StorageWrite
                },
                Disposition::Keep,
                build_ms,
                format!("upload failed: {upload_err}"),
            );
        }
    };

    info!(
        correlation_id = %envelope.correlation_id,
        batch_id = %payload.batch_id,
        build_ms,
        uploaded_files = uploaded,
        broken_links = report.broken_links.len(),
        "site published"
    );
    DeploymentResult {
        status: DeployStatus::Success,
        build_ms,
        uploaded_files: uploaded,
        site_url: ctx.site_url.clone(),
        errors: Vec::new(),
        kind: None,
        disposition: Disposition::Delete,
    }
}
