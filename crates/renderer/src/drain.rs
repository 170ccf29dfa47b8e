//! Drain coalescing: many renders, one site build.
//!
//! Rebuilding the site per article is wasteful. The monitor watches the
//! render queue; once it has stayed empty for the stable window and at
//! least one new markdown file was written, it emits a single build message
//! and resets. At most one build per drain cycle per replica.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use mill_core::envelope::{BuildPayload, MessageEnvelope, Operation};
use mill_core::Shutdown;
use mill_queue::QueueClient;

use crate::SERVICE_NAME;

pub struct DrainMonitor {
    /// Markdown files written since the last build signal. Incremented only
    /// on actual writes, never on idempotent re-runs.
    generated: AtomicU64,
    empty_since: Mutex<Option<Instant>>,
}

impl DrainMonitor {
    pub fn new() -> Self {
        Self {
            generated: AtomicU64::new(0),
            empty_since: Mutex::new(None),
        }
    }

    pub fn record_generated(&self) {
        self.generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    /// One observation of the render queue depth. Returns the build payload
    /// to emit when the drain cycle completes.
    pub fn observe(&self, queue_depth: u64, stable_window: Duration) -> Option<BuildPayload> {
        let mut empty_since = self.empty_since.lock().unwrap();

        if queue_depth > 0 {
            *empty_since = None;
            return None;
        }

        let since = empty_since.get_or_insert_with(Instant::now);
        if since.elapsed() < stable_window {
            return None;
        }

        let count = self.generated.swap(0, Ordering::Relaxed);
        if count == 0 {
            // Nothing new since the last signal; keep the clock so a later
            // write starts a fresh cycle.
            *empty_since = None;
            return None;
        }

        *empty_since = None;
        Some(BuildPayload {
            batch_id: Uuid::new_v4(),
            markdown_count: count,
            trigger: "queue_drained".to_string(),
        })
    }

    /// Background loop: poll depth, emit one build message per drain cycle.
    pub async fn run(
        self: std::sync::Arc<Self>,
        render_queue: std::sync::Arc<dyn QueueClient>,
        publish_queue: std::sync::Arc<dyn QueueClient>,
        check_interval: Duration,
        stable_window: Duration,
        shutdown: Shutdown,
    ) {
        info!(
            stable_secs = stable_window.as_secs(),
            "drain monitor started"
        );
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = tokio::time::sleep(check_interval) => {}
            }

            let depth = match render_queue.peek_depth().await {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "render queue depth check failed");
                    continue;
                }
            };

            if let Some(payload) = self.observe(depth, stable_window) {
                match build_message_body(&payload) {
                    Ok(body) => {
                        if let Err(e) = publish_queue.send(body).await {
                            // Restore the count so the next stable window
                            // re-emits.
                            self.generated.fetch_add(payload.markdown_count, Ordering::Relaxed);
                            warn!(error = %e, "build message send failed, will retry next cycle");
                        } else {
                            info!(
                                batch_id = %payload.batch_id,
                                markdown_count = payload.markdown_count,
                                "drain complete, build requested"
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, "build message encode failed"),
                }
            }
        }
        info!("drain monitor stopped");
    }
}

impl Default for DrainMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn build_message_body(payload: &BuildPayload) -> Result<String, serde_json::Error> {
    MessageEnvelope::new(SERVICE_NAME, Operation::PublishSite, payload)?.to_body()
}
