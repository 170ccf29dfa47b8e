//! Blob-backed leases: the only cross-replica coordination surface.
//!
//! A lease is a short-TTL JSON blob at `leases/<topic_id>` created with
//! create-if-absent semantics. An expired blob is treated as absent and
//! overwritten; release deletes only when the holder matches.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blob::{containers, BlobStore};
use crate::error::StorageError;

/// Contents of a lease blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Result of an acquire attempt.
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    Acquired(Lease),
    /// Someone else holds an unexpired lease.
    Held {
        holder_id: String,
        expires_at: DateTime<Utc>,
    },
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired(_))
    }
}

/// Lease operations over a [`BlobStore`].
#[derive(Clone)]
pub struct LeaseManager {
    store: BlobStore,
}

impl LeaseManager {
    pub fn new(store: BlobStore) -> Self {
        Self { store }
    }

    /// Try to acquire the lease for `key`.
    ///
    /// Exactly one contender wins the create; a holder re-acquiring its own
    /// lease (restart case) succeeds and refreshes the expiry.
    pub async fn acquire(
        &self,
        key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<AcquireOutcome, StorageError> {
        let now = Utc::now();
        let lease = Lease {
            holder_id: holder_id.to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        };

        match self
            .store
            .put_json_if_absent(containers::LEASES, key, &lease)
            .await
        {
            Ok(()) => {
                debug!(key, holder_id, "lease acquired");
                return Ok(AcquireOutcome::Acquired(lease));
            }
            Err(StorageError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }

        // Blob exists: inspect the current holder.
        let existing: Lease = match self.store.get_json(containers::LEASES, key).await {
            Ok(l) => l,
            // Deleted between our put and get, or unreadable: claim it.
            Err(StorageError::NotFound(_)) | Err(StorageError::Serialize(_)) => {
                warn!(key, "lease blob vanished or unreadable, overwriting");
                self.store.put_json(containers::LEASES, key, &lease).await?;
                return Ok(AcquireOutcome::Acquired(lease));
            }
            Err(e) => return Err(e),
        };

        if existing.is_expired(now) || existing.holder_id == holder_id {
            self.store.put_json(containers::LEASES, key, &lease).await?;
            debug!(
                key,
                holder_id,
                expired = existing.is_expired(now),
                "lease taken over"
            );
            return Ok(AcquireOutcome::Acquired(lease));
        }

        Ok(AcquireOutcome::Held {
            holder_id: existing.holder_id,
            expires_at: existing.expires_at,
        })
    }

    /// Release the lease if `holder_id` owns it; no-op otherwise.
    pub async fn release(&self, key: &str, holder_id: &str) -> Result<(), StorageError> {
        let existing: Lease = match self.store.get_json(containers::LEASES, key).await {
            Ok(l) => l,
            Err(StorageError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        if existing.holder_id != holder_id {
            debug!(key, holder_id, held_by = %existing.holder_id, "release skipped, not the holder");
            return Ok(());
        }
        self.store.delete(containers::LEASES, key).await
    }

    /// Extend the expiry of a lease we hold.
    pub async fn heartbeat(
        &self,
        key: &str,
        holder_id: &str,
        new_ttl: Duration,
    ) -> Result<bool, StorageError> {
        let mut existing: Lease = match self.store.get_json(containers::LEASES, key).await {
            Ok(l) => l,
            Err(StorageError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if existing.holder_id != holder_id {
            return Ok(false);
        }
        existing.expires_at = Utc::now() + new_ttl;
        self.store
            .put_json(containers::LEASES, key, &existing)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LeaseManager {
        LeaseManager::new(BlobStore::in_memory())
    }

    #[tokio::test]
    async fn first_acquire_wins() {
        let leases = manager();
        let outcome = leases
            .acquire("topic-a", "proc-1", Duration::seconds(300))
            .await
            .unwrap();
        assert!(outcome.is_acquired());
        if let AcquireOutcome::Acquired(lease) = outcome {
            assert!(lease.acquired_at <= lease.expires_at);
        }
    }

    #[tokio::test]
    async fn contender_sees_held() {
        let leases = manager();
        leases
            .acquire("topic-a", "proc-1", Duration::seconds(300))
            .await
            .unwrap();

        let outcome = leases
            .acquire("topic-a", "proc-2", Duration::seconds(300))
            .await
            .unwrap();
        match outcome {
            AcquireOutcome::Held { holder_id, .. } => assert_eq!(holder_id, "proc-1"),
            other => panic!("expected Held, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over() {
        let leases = manager();
        leases
            .acquire("topic-a", "proc-1", Duration::seconds(-10))
            .await
            .unwrap();

        let outcome = leases
            .acquire("topic-a", "proc-2", Duration::seconds(300))
            .await
            .unwrap();
        assert!(outcome.is_acquired());
    }

    #[tokio::test]
    async fn holder_reacquires_after_restart() {
        let leases = manager();
        leases
            .acquire("topic-a", "proc-1", Duration::seconds(300))
            .await
            .unwrap();

        let outcome = leases
            .acquire("topic-a", "proc-1", Duration::seconds(300))
            .await
            .unwrap();
        assert!(outcome.is_acquired());
    }

    #[tokio::test]
    async fn release_only_by_holder() {
        let leases = manager();
        leases
            .acquire("topic-a", "proc-1", Duration::seconds(300))
            .await
            .unwrap();

        // Non-holder release is a no-op.
        leases.release("topic-a", "proc-2").await.unwrap();
        let outcome = leases
            .acquire("topic-a", "proc-3", Duration::seconds(300))
            .await
            .unwrap();
        assert!(!outcome.is_acquired());

        // Holder release frees the key.
        leases.release("topic-a", "proc-1").await.unwrap();
        let outcome = leases
            .acquire("topic-a", "proc-3", Duration::seconds(300))
            .await
            .unwrap();
        assert!(outcome.is_acquired());
    }

    #[tokio::test]
    async fn release_missing_is_ok() {
        let leases = manager();
        leases.release("never-acquired", "proc-1").await.unwrap();
    }

    #[tokio::test]
    async fn heartbeat_extends_only_for_holder() {
        let leases = manager();
        leases
            .acquire("topic-a", "proc-1", Duration::seconds(5))
            .await
            .unwrap();

        assert!(leases
            .heartbeat("topic-a", "proc-1", Duration::seconds(600))
            .await
            .unwrap());
        assert!(!leases
            .heartbeat("topic-a", "proc-2", Duration::seconds(600))
            .await
            .unwrap());
        assert!(!leases
            .heartbeat("missing", "proc-1", Duration::seconds(600))
            .await
            .unwrap());
    }
}
