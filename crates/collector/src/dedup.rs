//! Rolling dedup window over recent collection blobs.
//!
//! Before fanout, every candidate's `content_hash` is checked against the
//! hashes of items accepted in the last `window_hours`. The window is
//! rebuilt per run from the collected-content container; a load failure
//! degrades to an empty window with a warning rather than blocking
//! collection.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use mill_core::content::Collection;
use mill_core::ids;
use mill_storage::{containers, BlobStore};

pub struct DedupWindow {
    hashes: HashSet<String>,
}

impl DedupWindow {
    pub fn empty() -> Self {
        Self {
            hashes: HashSet::new(),
        }
    }

    /// Load hashes from collection blobs covering the window. Listing walks
    /// one day-prefix per covered day, newest first.
    pub async fn load(store: &BlobStore, window_hours: u32) -> Self {
        let cutoff = Utc::now() - Duration::hours(window_hours as i64);
        let days_back = (window_hours as i64).div_euclid(24) + 1;

        let mut hashes = HashSet::new();
        let mut blobs = 0usize;
        for day_offset in 0..=days_back {
            let day = Utc::now() - Duration::days(day_offset);
            let prefix = ids::collection_day_prefix(day);

            let listed = match store.list(containers::COLLECTED, &prefix).await {
                Ok(listed) => listed,
                Err(e) => {
                    warn!(prefix, error = %e, "dedup window listing failed, continuing");
                    continue;
                }
            };

            for meta in listed {
                let collection: Collection =
                    match store.get_json(containers::COLLECTED, &meta.name).await {
                        Ok(c) => c,
                        Err(e) => {
                            warn!(blob = %meta.name, error = %e, "unreadable collection blob skipped");
                            continue;
                        }
                    };
                blobs += 1;
                for item in collection.items {
                    if item.fetched_at >= cutoff {
                        hashes.insert(item.content_hash);
                    }
                }
            }
        }

        debug!(
            window_hours,
            blobs,
            hashes = hashes.len(),
            "dedup window loaded"
        );
        Self { hashes }
    }

    /// Returns true when the hash is new, inserting it so the same item
    /// seen twice within one run also dedups.
    pub fn check_and_insert(&mut self, content_hash: &str) -> bool {
        self.hashes.insert(content_hash.to_string())
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mill_core::content::{CollectedItem, CollectionStats, Engagement};

    fn make_item(hash: &str, age_hours: i64) -> CollectedItem {
        CollectedItem {
            item_id: hash.to_string(),
            source: "test".to_string(),
            title: "t".to_string(),
            url: "https://example.com".to_string(),
            excerpt: None,
            engagement: Engagement::default(),
            fetched_at: Utc::now() - Duration::hours(age_hours),
            content_hash: hash.to_string(),
            topic_id: hash.to_string(),
        }
    }

    async fn write_collection(store: &BlobStore, id: &str, items: Vec<CollectedItem>) {
        let started_at = items
            .first()
            .map(|i| i.fetched_at)
            .unwrap_or_else(Utc::now);
        let collection = Collection {
            collection_id: id.to_string(),
            started_at,
            finished_at: started_at,
            sources: vec!["test".to_string()],
            items,
            stats: CollectionStats::default(),
        };
        store
            .put_json(
                containers::COLLECTED,
                &ids::collection_path(started_at, id),
                &collection,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn loads_recent_hashes_and_drops_stale() {
        let store = BlobStore::in_memory();
        write_collection(
            &store,
            "recent",
            vec![make_item("hash-new", 1), make_item("hash-old", 72)],
        )
        .await;

        let mut window = DedupWindow::load(&store, 48).await;
        assert_eq!(window.len(), 1);
        assert!(!window.check_and_insert("hash-new"), "known hash is a dup");
        assert!(window.check_and_insert("hash-old"), "stale hash was evicted");
    }

    #[tokio::test]
    async fn empty_store_gives_empty_window() {
        let store = BlobStore::in_memory();
        let window = DedupWindow::load(&store, 48).await;
        assert!(window.is_empty());
    }

    #[test]
    fn within_run_dedup() {
        let mut window = DedupWindow::empty();
        assert!(window.check_and_insert("h1"));
        assert!(!window.check_and_insert("h1"));
    }
}
