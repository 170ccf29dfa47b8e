//! External site-generator invocation.
//!
//! CPU-heavy generation runs in a separate OS process and is awaited with a
//! timeout; the worker's async loop stays responsive.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::PublishError;

/// Seam for the static-site-generator tool. The pipeline only needs "turn
/// this content tree into that output tree".
#[async_trait]
pub trait SiteBuilder: Send + Sync {
    async fn build(&self, source: &Path, destination: &Path) -> Result<(), PublishError>;
}

/// Invokes a generator binary (hugo by default) with a pinned config.
pub struct CommandBuilder {
    command: String,
    config_path: Option<std::path::PathBuf>,
    timeout: Duration,
}

impl CommandBuilder {
    pub fn new(command: String, config_path: Option<std::path::PathBuf>, timeout: Duration) -> Self {
        Self {
            command,
            config_path,
            timeout,
        }
    }
}

#[async_trait]
impl SiteBuilder for CommandBuilder {
    async fn build(&self, source: &Path, destination: &Path) -> Result<(), PublishError> {
        // The generator expects the site root, not the content dir.
        let site_root = source.parent().unwrap_or(source);

        let mut cmd = Command::new(&self.command);
        cmd.arg("--source")
            .arg(site_root)
            .arg("--destination")
            .arg(destination)
            .arg("--minify");
        if let Some(config) = &self.config_path {
            cmd.arg("--config").arg(config);
        }
        cmd.kill_on_drop(true);

        debug!(command = %self.command, source = %site_root.display(), "running site generator");
        let started = std::time::Instant::now();

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                PublishError::Build(format!(
                    "{} timed out after {:?}",
                    self.command, self.timeout
                ))
            })?
            .map_err(|e| PublishError::Build(format!("{} failed to start: {e}", self.command)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            warn!(
                status = %output.status,
                stderr = %stderr,
                "site generator failed"
            );
            return Err(PublishError::Build(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            stdout_bytes = stdout.len(),
            "site generated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_build_error() {
        let builder = CommandBuilder::new(
            "definitely-not-a-site-generator".to_string(),
            None,
            Duration::from_secs(5),
        );
        let dir = std::env::temp_dir();
        let err = builder.build(&dir, &dir).await.unwrap_err();
        assert!(matches!(err, PublishError::Build(_)));
    }
}
