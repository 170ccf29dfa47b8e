use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::info;

use mill_core::config::{AwsConfig, StorageConfig};

use crate::error::StorageError;

/// Unified storage backend wrapping object_store.
pub enum StorageBackend {
    Local(LocalBackend),
    S3(S3Backend),
    /// In-memory store for tests and local development.
    Memory(MemoryBackend),
}

impl StorageBackend {
    /// Select and build a backend from config.
    pub fn from_config(storage: &StorageConfig, aws: &AwsConfig) -> Result<Self, StorageError> {
        match storage.backend.as_str() {
            "local" => Ok(StorageBackend::Local(LocalBackend::new(&storage.data_dir)?)),
            "s3" => Ok(StorageBackend::S3(S3Backend::new(aws)?)),
            "memory" => Ok(StorageBackend::Memory(MemoryBackend::new())),
            other => Err(StorageError::NotConfigured(format!(
                "unknown STORAGE_BACKEND '{other}'"
            ))),
        }
    }

    /// Get the underlying ObjectStore.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        match self {
            StorageBackend::Local(b) => b.store.clone(),
            StorageBackend::S3(b) => b.store.clone(),
            StorageBackend::Memory(b) => b.store.clone(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageBackend::S3(_))
    }

    /// Key prefix applied ahead of the container name (e.g. "production").
    pub fn prefix(&self) -> &str {
        match self {
            StorageBackend::Local(_) | StorageBackend::Memory(_) => "",
            StorageBackend::S3(b) => &b.prefix,
        }
    }
}

/// Local filesystem backend.
pub struct LocalBackend {
    pub store: Arc<dyn ObjectStore>,
    pub data_dir: PathBuf,
}

impl LocalBackend {
    pub fn new(data_dir: &std::path::Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StorageError::Other(format!("cannot create data dir: {e}")))?;
        let canonical = std::fs::canonicalize(data_dir).unwrap_or_else(|_| data_dir.to_path_buf());
        let store = LocalFileSystem::new_with_prefix(&canonical)
            .map_err(|e| StorageError::Other(format!("local filesystem error: {e}")))?;
        info!("Storage: local backend at {}", canonical.display());
        Ok(Self {
            store: Arc::new(store),
            data_dir: canonical,
        })
    }
}

/// S3 backend.
pub struct S3Backend {
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub prefix: String,
}

impl S3Backend {
    pub fn new(aws: &AwsConfig) -> Result<Self, StorageError> {
        let bucket = aws
            .s3_bucket
            .as_deref()
            .ok_or_else(|| StorageError::NotConfigured("S3_BUCKET not set".into()))?;

        let mut builder = AmazonS3Builder::new()
            .with_region(&aws.region)
            // Leases depend on create-if-absent, which S3 exposes through
            // conditional puts.
            .with_conditional_put(S3ConditionalPut::ETagMatch);

        if let Some(ref key) = aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = aws.session_token {
            builder = builder.with_token(token);
        }

        if let Some(ref endpoint) = aws.endpoint_url {
            if !endpoint.is_empty() {
                // Ensure endpoint has a scheme — object_store requires absolute URLs
                let endpoint_url =
                    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                        endpoint.clone()
                    } else {
                        format!("https://{}", endpoint)
                    };
                builder = builder
                    .with_bucket_name(bucket)
                    .with_endpoint(&endpoint_url)
                    .with_allow_http(endpoint_url.starts_with("http://"));
            }
        } else {
            let url = format!("s3://{}", bucket);
            builder = builder.with_url(&url);
        }

        let store = builder.build()?;

        let prefix = aws
            .s3_prefix
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/')
            .to_string();

        info!(
            "Storage: S3 backend s3://{}/{} (region: {})",
            bucket, prefix, aws.region
        );

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

/// In-memory backend.
pub struct MemoryBackend {
    pub store: Arc<dyn ObjectStore>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_backend_creates() {
        let tmp = std::env::temp_dir().join(format!("mill-storage-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&tmp).unwrap();
        let backend = LocalBackend::new(&tmp).unwrap();
        assert!(!StorageBackend::Local(backend).is_remote());
        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn unknown_backend_rejected() {
        let storage = StorageConfig {
            backend: "tape".to_string(),
            data_dir: PathBuf::from("data"),
        };
        let aws = AwsConfig {
            region: "eu-west-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            s3_bucket: None,
            s3_prefix: None,
            endpoint_url: None,
        };
        assert!(matches!(
            StorageBackend::from_config(&storage, &aws),
            Err(StorageError::NotConfigured(_))
        ));
    }
}
