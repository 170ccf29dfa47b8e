//! Builder fakes for tests: deterministic output without a real generator.

use std::path::Path;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::build::SiteBuilder;
use crate::error::PublishError;

/// Copies every content file to the output as `.html` and writes an index
/// page. Deterministic for idempotence tests.
pub struct CopyBuilder;

#[async_trait]
impl SiteBuilder for CopyBuilder {
    async fn build(&self, source: &Path, destination: &Path) -> Result<(), PublishError> {
        let mut pages = Vec::new();
        for entry in WalkDir::new(source)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| PublishError::Build(e.to_string()))?;
            let target = destination.join(rel).with_extension("html");
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let body = std::fs::read_to_string(entry.path())?;
            std::fs::write(&target, format!("<html><body><pre>{body}</pre></body></html>"))?;
            pages.push(rel.with_extension("html").to_string_lossy().replace('\\', "/"));
        }

        let links: String = pages
            .iter()
            .map(|p| format!("<a href=\"/{p}\">{p}</a>"))
            .collect();
        std::fs::write(
            destination.join("index.html"),
            format!("<html><body>{links}</body></html>"),
        )?;
        Ok(())
    }
}

/// Produces output without an index page, tripping validation.
pub struct NoIndexBuilder;

#[async_trait]
impl SiteBuilder for NoIndexBuilder {
    async fn build(&self, _source: &Path, destination: &Path) -> Result<(), PublishError> {
        std::fs::write(destination.join("orphan.html"), "<html></html>")?;
        Ok(())
    }
}

/// Writes one file of the given size, for size-cap tests.
pub struct OversizeBuilder {
    pub bytes: usize,
}

#[async_trait]
impl SiteBuilder for OversizeBuilder {
    async fn build(&self, _source: &Path, destination: &Path) -> Result<(), PublishError> {
        std::fs::write(destination.join("index.html"), "x".repeat(self.bytes))?;
        Ok(())
    }
}

/// Always fails, standing in for a broken generator install.
pub struct FailingBuilder;

#[async_trait]
impl SiteBuilder for FailingBuilder {
    async fn build(&self, _source: &Path, _destination: &Path) -> Result<(), PublishError> {
        Err(PublishError::Build("generator exploded".to_string()))
    }
}
