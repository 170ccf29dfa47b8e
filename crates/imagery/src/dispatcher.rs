//! Round-robin image-source dispatcher with rate limits and failover.
//!
//! Each source holds a token bucket sized to its documented free tier minus
//! a safety margin. Round-robin spreads usage evenly; a rate-limited or
//! failing source is skipped in favor of the next one regardless of
//! schedule. When every source is exhausted the caller gets `None` and the
//! article ships without an image — image selection never fails a message.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use mill_core::config::ImagesConfig;
use mill_throttle::TokenBucket;

use crate::pexels::PexelsProvider;
use crate::provider::{ImageProvider, StockImage};
use crate::unsplash::UnsplashProvider;

struct SourceSlot {
    provider: Arc<dyn ImageProvider>,
    bucket: TokenBucket,
    attempts: AtomicU64,
    hits: AtomicU64,
    failures: AtomicU64,
}

/// Per-source outcome counters for `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    pub source: String,
    pub attempts: u64,
    pub hits: u64,
    pub failures: u64,
}

/// Dispatches image searches across configured sources.
pub struct ImageDispatcher {
    slots: Vec<SourceSlot>,
    next: AtomicUsize,
    token_wait: Duration,
}

impl ImageDispatcher {
    /// Build from config according to `IMAGE_SOURCE_STRATEGY`. Missing API
    /// keys shrink the source set; an empty set is valid and means every
    /// search degrades to `None`.
    pub fn from_config(images: &ImagesConfig) -> Self {
        let timeout = Duration::from_secs(images.timeout_secs);
        let mut slots = Vec::new();

        let want_pexels = matches!(images.strategy.as_str(), "pexels-only" | "dual-roundrobin");
        let want_unsplash =
            matches!(images.strategy.as_str(), "unsplash-only" | "dual-roundrobin");

        if want_pexels {
            match &images.pexels_api_key {
                Some(key) => slots.push(SourceSlot::new(
                    Arc::new(PexelsProvider::new(key.clone(), timeout)),
                    TokenBucket::per_hour(images.pexels_hourly_limit),
                )),
                None => warn!("pexels requested by strategy but PEXELS_API_KEY is not set"),
            }
        }
        if want_unsplash {
            match &images.unsplash_access_key {
                Some(key) => slots.push(SourceSlot::new(
                    Arc::new(UnsplashProvider::new(key.clone(), timeout)),
                    TokenBucket::per_hour(images.unsplash_hourly_limit),
                )),
                None => warn!("unsplash requested by strategy but UNSPLASH_ACCESS_KEY is not set"),
            }
        }

        if slots.is_empty() {
            warn!(
                strategy = %images.strategy,
                "no image sources available, articles will render without images"
            );
        }

        Self {
            slots,
            next: AtomicUsize::new(0),
            token_wait: Duration::from_secs(5),
        }
    }

    /// Build from explicit providers and buckets (tests).
    pub fn new(providers: Vec<(Arc<dyn ImageProvider>, TokenBucket)>) -> Self {
        Self {
            slots: providers
                .into_iter()
                .map(|(provider, bucket)| SourceSlot::new(provider, bucket))
                .collect(),
            next: AtomicUsize::new(0),
            token_wait: Duration::from_millis(50),
        }
    }

    /// Search sources in round-robin order until one produces an image.
    pub async fn find_image(&self, query: &str) -> Option<StockImage> {
        if self.slots.is_empty() {
            return None;
        }

        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        for offset in 0..self.slots.len() {
            let slot = &self.slots[(start + offset) % self.slots.len()];
            let name = slot.provider.name().to_string();

            if !slot.bucket.acquire(1.0, self.token_wait).await {
                debug!(source = %name, "image source out of quota, trying next");
                continue;
            }

            slot.attempts.fetch_add(1, Ordering::Relaxed);
            match slot.provider.search(query).await {
                Ok(Some(image)) => {
                    slot.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(source = %name, query, "image selected");
                    return Some(image);
                }
                Ok(None) => {
                    debug!(source = %name, query, "no match, trying next source");
                }
                Err(e) => {
                    slot.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        source = %name,
                        rate_limited = e.is_rate_limited(),
                        error = %e,
                        "image source failed, trying next"
                    );
                }
            }
        }

        debug!(query, "all image sources exhausted");
        None
    }

    pub fn stats(&self) -> Vec<SourceStats> {
        self.slots
            .iter()
            .map(|slot| SourceStats {
                source: slot.provider.name().to_string(),
                attempts: slot.attempts.load(Ordering::Relaxed),
                hits: slot.hits.load(Ordering::Relaxed),
                failures: slot.failures.load(Ordering::Relaxed),
            })
            .collect()
    }
}

impl SourceSlot {
    fn new(provider: Arc<dyn ImageProvider>, bucket: TokenBucket) -> Self {
        Self {
            provider,
            bucket,
            attempts: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ImageError;
    use crate::testing::ScriptedImageProvider;

    fn image(source: &str) -> StockImage {
        StockImage {
            url: format!("https://img.example/{source}.jpg"),
            thumbnail_url: None,
            credit: format!("Photo on {source}"),
            source: source.to_string(),
        }
    }

    fn bucket() -> TokenBucket {
        TokenBucket::new(100.0, 1.0)
    }

    #[tokio::test]
    async fn round_robin_alternates_sources() {
        let a = Arc::new(ScriptedImageProvider::always_ok("a", image("a")));
        let b = Arc::new(ScriptedImageProvider::always_ok("b", image("b")));
        let dispatcher = ImageDispatcher::new(vec![
            (a.clone() as Arc<dyn ImageProvider>, bucket()),
            (b.clone() as Arc<dyn ImageProvider>, bucket()),
        ]);

        let first = dispatcher.find_image("sunset").await.unwrap();
        let second = dispatcher.find_image("sunset").await.unwrap();
        assert_ne!(first.source, second.source);
        assert_eq!(a.calls() + b.calls(), 2);
    }

    #[tokio::test]
    async fn fails_over_on_rate_limit() {
        let a = Arc::new(ScriptedImageProvider::always_err(
            "a",
            ImageError::ApiError {
                status: 429,
                body: "quota".into(),
            },
        ));
        let b = Arc::new(ScriptedImageProvider::always_ok("b", image("b")));
        let dispatcher = ImageDispatcher::new(vec![
            (a.clone() as Arc<dyn ImageProvider>, bucket()),
            (b.clone() as Arc<dyn ImageProvider>, bucket()),
        ]);

        for _ in 0..3 {
            let found = dispatcher.find_image("city").await.unwrap();
            assert_eq!(found.source, "b");
        }
        let stats = dispatcher.stats();
        let a_stats = stats.iter().find(|s| s.source == "a").unwrap();
        assert_eq!(a_stats.failures, a_stats.attempts);
    }

    #[tokio::test]
    async fn exhausted_sources_return_none() {
        let a = Arc::new(ScriptedImageProvider::always_err(
            "a",
            ImageError::ApiError {
                status: 500,
                body: "boom".into(),
            },
        ));
        let b = Arc::new(ScriptedImageProvider::always_none("b"));
        let dispatcher = ImageDispatcher::new(vec![
            (a as Arc<dyn ImageProvider>, bucket()),
            (b as Arc<dyn ImageProvider>, bucket()),
        ]);

        assert!(dispatcher.find_image("void").await.is_none());
    }

    #[tokio::test]
    async fn empty_dispatcher_degrades() {
        let dispatcher = ImageDispatcher::new(vec![]);
        assert!(dispatcher.find_image("anything").await.is_none());
    }

    #[tokio::test]
    async fn drained_bucket_skips_source() {
        let a = Arc::new(ScriptedImageProvider::always_ok("a", image("a")));
        let b = Arc::new(ScriptedImageProvider::always_ok("b", image("b")));
        // Source a has no tokens and a refill too slow to matter.
        let dispatcher = ImageDispatcher::new(vec![
            (a.clone() as Arc<dyn ImageProvider>, TokenBucket::new(0.0, 0.0001)),
            (b.clone() as Arc<dyn ImageProvider>, bucket()),
        ]);

        let found = dispatcher.find_image("tree").await.unwrap();
        assert_eq!(found.source, "b");
        assert_eq!(a.calls(), 0);
    }
}
