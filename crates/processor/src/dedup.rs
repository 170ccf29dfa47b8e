//! Best-effort duplicate-delivery guard.
//!
//! An LRU of recently processed message ids, snapshotted to the object
//! store so a restarted replica keeps some memory. Advisory only: the done
//! marker and lease remain the real idempotency mechanisms.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use tracing::{debug, warn};

use mill_storage::{containers, BlobStore, StorageError};

const SNAPSHOT_EVERY: u32 = 100;

pub struct MessageDeduplicator {
    seen: Mutex<LruCache<String, ()>>,
    admissions: AtomicU32,
    store: BlobStore,
    blob_name: String,
}

impl MessageDeduplicator {
    /// Load the previous snapshot for this processor id, if any.
    pub async fn load(store: BlobStore, processor_id: &str, capacity: usize) -> Self {
        let blob_name = format!("processed-messages/{processor_id}.json");
        let mut seen = LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap());

        match store
            .get_json::<Vec<String>>(containers::PROCESSED, &blob_name)
            .await
        {
            Ok(ids) => {
                let count = ids.len();
                for id in ids {
                    seen.put(id, ());
                }
                debug!(count, "message dedup snapshot loaded");
            }
            Err(StorageError::NotFound(_)) => {}
            Err(e) => warn!(error = %e, "message dedup snapshot unreadable, starting empty"),
        }

        Self {
            seen: Mutex::new(seen),
            admissions: AtomicU32::new(0),
            store,
            blob_name,
        }
    }

    /// Returns true when the message id is new. Periodically snapshots the
    /// cache; snapshot failures are logged and ignored.
    pub async fn check_and_record(&self, message_id: &str) -> bool {
        let is_new = {
            let mut seen = self.seen.lock().unwrap();
            seen.put(message_id.to_string(), ()).is_none()
        };

        if is_new {
            let admitted = self.admissions.fetch_add(1, Ordering::Relaxed) + 1;
            if admitted % SNAPSHOT_EVERY == 0 {
                self.snapshot().await;
            }
        }
        is_new
    }

    async fn snapshot(&self) {
        let ids: Vec<String> = {
            let seen = self.seen.lock().unwrap();
            seen.iter().map(|(id, _)| id.clone()).collect()
        };
        if let Err(e) = self
            .store
            .put_json(containers::PROCESSED, &self.blob_name, &ids)
            .await
        {
            warn!(error = %e, "message dedup snapshot write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_then_duplicate() {
        let dedup = MessageDeduplicator::load(BlobStore::in_memory(), "p1", 16).await;
        assert!(dedup.check_and_record("m1").await);
        assert!(!dedup.check_and_record("m1").await);
        assert!(dedup.check_and_record("m2").await);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let dedup = MessageDeduplicator::load(BlobStore::in_memory(), "p1", 2).await;
        assert!(dedup.check_and_record("m1").await);
        assert!(dedup.check_and_record("m2").await);
        assert!(dedup.check_and_record("m3").await);
        // m1 was evicted, so it reads as new again — acceptable for an
        // advisory guard.
        assert!(dedup.check_and_record("m1").await);
    }

    #[tokio::test]
    async fn snapshot_survives_reload() {
        let store = BlobStore::in_memory();
        {
            let dedup = MessageDeduplicator::load(store.clone(), "p1", 512).await;
            for i in 0..SNAPSHOT_EVERY {
                dedup.check_and_record(&format!("m{i}")).await;
            }
        }
        let reloaded = MessageDeduplicator::load(store, "p1", 512).await;
        assert!(!reloaded.check_and_record("m0").await, "snapshot should persist m0");
    }
}
