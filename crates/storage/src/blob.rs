//! Container-addressed blob store on top of object_store.
//!
//! Containers are logical top-level prefixes within one backing store, so a
//! single bucket (or data dir) carries the whole pipeline. `put_if_absent`
//! is the primitive under leases and deterministic article writes.

use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutMode, PutOptions, PutPayload};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// Well-known container names.
pub mod containers {
    /// C1: collection audit blobs.
    pub const COLLECTED: &str = "collected-content";
    /// C2: processed articles and failure records.
    pub const PROCESSED: &str = "processed-content";
    /// C3: rendered markdown — the single source of truth for site content.
    pub const MARKDOWN: &str = "markdown-content";
    /// C4: the served site, a derived projection of C3.
    pub const WEB: &str = "web";
    /// Backup mirror of C4 taken before each swap.
    pub const WEB_BACKUP: &str = "web-backup";
    /// Exclusivity claims keyed by topic_id.
    pub const LEASES: &str = "leases";
}

/// Metadata for one listed blob.
#[derive(Debug, Clone)]
pub struct BlobMeta {
    /// Name relative to the container.
    pub name: String,
    pub size: u64,
}

/// Shared handle to the pipeline's blob storage.
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl BlobStore {
    pub fn new(backend: &StorageBackend) -> Self {
        Self {
            store: backend.store(),
            prefix: backend.prefix().to_string(),
        }
    }

    /// Store handle for tests: in-memory, no prefix.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            prefix: String::new(),
        }
    }

    fn full_path(&self, container: &str, name: &str) -> Path {
        if self.prefix.is_empty() {
            Path::from(format!("{container}/{name}"))
        } else {
            Path::from(format!("{}/{container}/{name}", self.prefix))
        }
    }

    fn container_prefix(&self, container: &str, name_prefix: &str) -> Path {
        let joined = if name_prefix.is_empty() {
            container.to_string()
        } else {
            format!("{container}/{}", name_prefix.trim_end_matches('/'))
        };
        if self.prefix.is_empty() {
            Path::from(joined)
        } else {
            Path::from(format!("{}/{joined}", self.prefix))
        }
    }

    /// Write a blob, overwriting any existing one.
    pub async fn put(
        &self,
        container: &str,
        name: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let path = self.full_path(container, name);
        let opts = put_options(PutMode::Overwrite, content_type);
        self.store
            .put_opts(&path, PutPayload::from(bytes), opts)
            .await
            .map_err(|e| StorageError::from_store(e, path.as_ref()))?;
        debug!(container, name, "blob written");
        Ok(())
    }

    /// Create-if-absent write. Fails with [`StorageError::AlreadyExists`]
    /// when the blob is already present.
    pub async fn put_if_absent(
        &self,
        container: &str,
        name: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let path = self.full_path(container, name);
        let opts = put_options(PutMode::Create, content_type);
        self.store
            .put_opts(&path, PutPayload::from(bytes), opts)
            .await
            .map_err(|e| StorageError::from_store(e, path.as_ref()))?;
        debug!(container, name, "blob created");
        Ok(())
    }

    /// Serialize and write a JSON blob.
    pub async fn put_json<T: Serialize>(
        &self,
        container: &str,
        name: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StorageError::Serialize(e.to_string()))?;
        self.put(container, name, Bytes::from(bytes), Some("application/json"))
            .await
    }

    /// Serialize and create-if-absent a JSON blob.
    pub async fn put_json_if_absent<T: Serialize>(
        &self,
        container: &str,
        name: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StorageError::Serialize(e.to_string()))?;
        self.put_if_absent(container, name, Bytes::from(bytes), Some("application/json"))
            .await
    }

    /// Read a blob. [`StorageError::NotFound`] when absent.
    pub async fn get(&self, container: &str, name: &str) -> Result<Bytes, StorageError> {
        let path = self.full_path(container, name);
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| StorageError::from_store(e, path.as_ref()))?;
        result
            .bytes()
            .await
            .map_err(|e| StorageError::from_store(e, path.as_ref()))
    }

    /// Read and deserialize a JSON blob.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        container: &str,
        name: &str,
    ) -> Result<T, StorageError> {
        let bytes = self.get(container, name).await?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialize(e.to_string()))
    }

    /// List blobs under a name prefix within a container.
    pub async fn list(
        &self,
        container: &str,
        name_prefix: &str,
    ) -> Result<Vec<BlobMeta>, StorageError> {
        let prefix = self.container_prefix(container, name_prefix);
        let strip = format!("{}/", self.container_prefix(container, ""));
        let metas: Vec<object_store::ObjectMeta> =
            self.store.list(Some(&prefix)).try_collect().await?;
        Ok(metas
            .into_iter()
            .map(|m| {
                let full = m.location.to_string();
                let name = full.strip_prefix(&strip).unwrap_or(&full).to_string();
                BlobMeta {
                    name,
                    size: m.size as u64,
                }
            })
            .collect())
    }

    /// Delete a blob. Deleting a missing blob is not an error.
    pub async fn delete(&self, container: &str, name: &str) -> Result<(), StorageError> {
        let path = self.full_path(container, name);
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(StorageError::from_store(e, path.as_ref())),
        }
    }

    /// Whether a blob exists.
    pub async fn exists(&self, container: &str, name: &str) -> Result<bool, StorageError> {
        let path = self.full_path(container, name);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::from_store(e, path.as_ref())),
        }
    }

    /// Server-side copy, possibly across containers.
    pub async fn copy(
        &self,
        src_container: &str,
        src_name: &str,
        dst_container: &str,
        dst_name: &str,
    ) -> Result<(), StorageError> {
        let from = self.full_path(src_container, src_name);
        let to = self.full_path(dst_container, dst_name);
        self.store
            .copy(&from, &to)
            .await
            .map_err(|e| StorageError::from_store(e, from.as_ref()))
    }
}

fn put_options(mode: PutMode, content_type: Option<&str>) -> PutOptions {
    let mut attributes = Attributes::new();
    if let Some(ct) = content_type {
        attributes.insert(Attribute::ContentType, ct.to_string().into());
    }
    PutOptions {
        mode,
        attributes,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        id: u32,
        label: String,
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = BlobStore::in_memory();
        let doc = Doc {
            id: 7,
            label: "seven".to_string(),
        };
        store
            .put_json(containers::PROCESSED, "articles/2026/07/seven.json", &doc)
            .await
            .unwrap();

        let back: Doc = store
            .get_json(containers::PROCESSED, "articles/2026/07/seven.json")
            .await
            .unwrap();
        assert_eq!(back, doc);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = BlobStore::in_memory();
        let err = store
            .get(containers::PROCESSED, "articles/none.json")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn put_if_absent_rejects_second_writer() {
        let store = BlobStore::in_memory();
        store
            .put_if_absent(containers::LEASES, "topic-1", Bytes::from("a"), None)
            .await
            .unwrap();
        let err = store
            .put_if_absent(containers::LEASES, "topic-1", Bytes::from("b"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        // The first write wins.
        let bytes = store.get(containers::LEASES, "topic-1").await.unwrap();
        assert_eq!(&bytes[..], b"a");
    }

    #[tokio::test]
    async fn list_strips_container_prefix() {
        let store = BlobStore::in_memory();
        for name in [
            "collections/2026/07/01/a.json",
            "collections/2026/07/01/b.json",
            "collections/2026/07/02/c.json",
        ] {
            store
                .put(containers::COLLECTED, name, Bytes::from("{}"), None)
                .await
                .unwrap();
        }

        let day = store
            .list(containers::COLLECTED, "collections/2026/07/01/")
            .await
            .unwrap();
        assert_eq!(day.len(), 2);
        assert!(day.iter().all(|m| m.name.starts_with("collections/2026/07/01/")));

        let all = store.list(containers::COLLECTED, "").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let store = BlobStore::in_memory();
        store
            .delete(containers::MARKDOWN, "nope.md")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn copy_across_containers() {
        let store = BlobStore::in_memory();
        store
            .put(containers::WEB, "index.html", Bytes::from("<html>"), Some("text/html"))
            .await
            .unwrap();
        store
            .copy(containers::WEB, "index.html", containers::WEB_BACKUP, "index.html")
            .await
            .unwrap();
        let copied = store
            .get(containers::WEB_BACKUP, "index.html")
            .await
            .unwrap();
        assert_eq!(&copied[..], b"<html>");
    }

    #[tokio::test]
    async fn exists_reflects_state() {
        let store = BlobStore::in_memory();
        assert!(!store.exists(containers::WEB, "index.html").await.unwrap());
        store
            .put(containers::WEB, "index.html", Bytes::from("x"), None)
            .await
            .unwrap();
        assert!(store.exists(containers::WEB, "index.html").await.unwrap());
    }
}
