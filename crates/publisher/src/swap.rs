//! Atomic-swap machinery: backup, upload, rollback.
//!
//! The live container is only mutated after the new output validated and
//! the previous contents are mirrored to the backup prefix, so any failure
//! between upload start and completion is recoverable by copying the
//! backup over the live set. Every loop checks the shutdown token at file
//! boundaries and logs progress at fixed intervals.

use std::collections::HashSet;
use std::path::Path;

use bytes::Bytes;
use tracing::{info, warn};
use walkdir::WalkDir;

use mill_core::Shutdown;
use mill_storage::{containers, BlobStore};

use crate::error::PublishError;
use crate::workspace::content_type_for;

/// Mirror the live site into the backup prefix (copy, not move). The live
/// container is not touched.
pub async fn backup_site(
    store: &BlobStore,
    progress_every: usize,
    shutdown: &Shutdown,
) -> Result<u64, PublishError> {
    // Drop the previous backup first so a rollback can never resurrect
    // files from two deploys ago.
    let stale = store.list(containers::WEB_BACKUP, "").await?;
    for meta in &stale {
        if shutdown.is_cancelled() {
            return Err(PublishError::Cancelled("backup cleanup"));
        }
        store.delete(containers::WEB_BACKUP, &meta.name).await?;
    }

    let live = store.list(containers::WEB, "").await?;
    let total = live.len();
    for (index, meta) in live.iter().enumerate() {
        if shutdown.is_cancelled() {
            return Err(PublishError::Cancelled("site backup"));
        }
        store
            .copy(containers::WEB, &meta.name, containers::WEB_BACKUP, &meta.name)
            .await?;
        if (index + 1) % progress_every == 0 {
            info!(done = index + 1, total, "backing up site");
        }
    }

    info!(files = total, "site backed up");
    Ok(total as u64)
}

/// Upload the generated output over the live container, then prune files
/// that are no longer part of the site.
pub async fn upload_site(
    store: &BlobStore,
    output_dir: &Path,
    progress_every: usize,
    shutdown: &Shutdown,
) -> Result<u64, PublishError> {
    let mut uploaded: HashSet<String> = HashSet::new();
    let files: Vec<_> = WalkDir::new(output_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();
    let total = files.len();

    for (index, entry) in files.iter().enumerate() {
        if shutdown.is_cancelled() {
            return Err(PublishError::Cancelled("site upload"));
        }
        let rel = entry
            .path()
            .strip_prefix(output_dir)
            .map_err(|e| PublishError::Build(format!("path outside output dir: {e}")))?
            .to_string_lossy()
            .replace('\\', "/");
        let bytes = std::fs::read(entry.path())?;
        store
            .put(
                containers::WEB,
                &rel,
                Bytes::from(bytes),
                Some(content_type_for(entry.path())),
            )
            .await?;
        uploaded.insert(rel);
        if (index + 1) % progress_every == 0 {
            info!(done = index + 1, total, "uploading site");
        }
    }

    // Prune blobs from the previous deploy that the new build no longer
    // produces.
    let live = store.list(containers::WEB, "").await?;
    for meta in &live {
        if shutdown.is_cancelled() {
            return Err(PublishError::Cancelled("site prune"));
        }
        if !uploaded.contains(&meta.name) {
            store.delete(containers::WEB, &meta.name).await?;
        }
    }

    info!(files = total, "site uploaded");
    Ok(total as u64)
}

/// Copy the backup over the live container, restoring the pre-deploy site.
pub async fn rollback_site(
    store: &BlobStore,
    progress_every: usize,
    shutdown: &Shutdown,
) -> Result<u64, PublishError> {
    let backup = store.list(containers::WEB_BACKUP, "").await?;
    let keep: HashSet<&str> = backup.iter().map(|m| m.name.as_str()).collect();
    let total = backup.len();

    for (index, meta) in backup.iter().enumerate() {
        if shutdown.is_cancelled() {
            return Err(PublishError::Cancelled("rollback"));
        }
        store
            .copy(containers::WEB_BACKUP, &meta.name, containers::WEB, &meta.name)
            .await?;
        if (index + 1) % progress_every == 0 {
            info!(done = index + 1, total, "rolling back site");
        }
    }

    // Remove files the failed deploy added.
    let live = store.list(containers::WEB, "").await?;
    for meta in &live {
        if shutdown.is_cancelled() {
            return Err(PublishError::Cancelled("rollback prune"));
        }
        if !keep.contains(meta.name.as_str()) {
            store.delete(containers::WEB, &meta.name).await?;
        }
    }

    warn!(files = total, "site rolled back to backup");
    Ok(total as u64)
}
