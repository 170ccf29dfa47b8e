//! Publisher error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("storage error: {0}")]
    Storage(#[from] mill_storage::StorageError),

    #[error("queue error: {0}")]
    Queue(#[from] mill_queue::QueueError),

    #[error("workspace io error: {0}")]
    Io(#[from] std::io::Error),

    /// Site generator exited non-zero or timed out.
    #[error("site build failed: {0}")]
    Build(String),

    /// The generated output was rejected before touching the live site.
    #[error("output validation failed: {0}")]
    Validation(String),

    /// Cooperative shutdown interrupted a long operation.
    #[error("cancelled during {0}")]
    Cancelled(&'static str),
}
