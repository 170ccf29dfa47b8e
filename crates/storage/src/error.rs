//! Storage error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob already exists: {0}")]
    AlreadyExists(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("backend not configured: {0}")]
    NotConfigured(String),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Collapse the object_store error variants we branch on.
    pub fn from_store(err: object_store::Error, path: &str) -> Self {
        match err {
            object_store::Error::NotFound { .. } => StorageError::NotFound(path.to_string()),
            object_store::Error::AlreadyExists { .. } => {
                StorageError::AlreadyExists(path.to_string())
            }
            other => StorageError::ObjectStore(other),
        }
    }
}
