//! Renderer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("bad render payload: {0}")]
    BadPayload(String),

    #[error("storage error: {0}")]
    Storage(#[from] mill_storage::StorageError),

    #[error("queue error: {0}")]
    Queue(#[from] mill_queue::QueueError),

    #[error("serialization error: {0}")]
    Serialize(String),
}
