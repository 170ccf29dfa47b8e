//! Scratch workspace: C3 download and file helpers.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use mill_core::Shutdown;
use mill_storage::{containers, BlobStore};

use crate::error::PublishError;

/// Layout of one build's scratch directory.
pub struct Workspace {
    pub root: PathBuf,
    /// Markdown tree the generator consumes.
    pub content_dir: PathBuf,
    /// Generator output.
    pub output_dir: PathBuf,
}

impl Workspace {
    /// Create a clean scratch layout under `work_dir`, wiping leftovers
    /// from earlier builds.
    pub fn prepare(work_dir: &Path) -> Result<Self, PublishError> {
        let root = work_dir.join("site");
        if root.exists() {
            std::fs::remove_dir_all(&root)?;
        }
        let content_dir = root.join("content");
        let output_dir = root.join("public");
        std::fs::create_dir_all(&content_dir)?;
        std::fs::create_dir_all(&output_dir)?;
        debug!(root = %root.display(), "workspace prepared");
        Ok(Self {
            root,
            content_dir,
            output_dir,
        })
    }

    /// Stream every markdown blob into the content directory, preserving
    /// the container's prefix layout. Cancellation-aware per blob.
    pub async fn download_content(
        &self,
        store: &BlobStore,
        progress_every: usize,
        shutdown: &Shutdown,
    ) -> Result<usize, PublishError> {
        let blobs = store.list(containers::MARKDOWN, "").await?;
        let total = blobs.len();

        for (index, meta) in blobs.iter().enumerate() {
            if shutdown.is_cancelled() {
                return Err(PublishError::Cancelled("content download"));
            }

            let bytes = store.get(containers::MARKDOWN, &meta.name).await?;
            let target = self.content_dir.join(&meta.name);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &bytes)?;

            if (index + 1) % progress_every == 0 {
                info!(done = index + 1, total, "downloading site content");
            }
        }

        info!(files = total, "site content downloaded");
        Ok(total)
    }
}

/// MIME type for uploaded site files, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}
