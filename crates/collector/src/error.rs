//! Collector error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    /// One source failed; other sources continue.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The collection audit blob could not be written. Fatal for the run:
    /// no fanout happens without a persisted audit row.
    #[error("storage write failed: {0}")]
    StorageWriteFailed(#[from] mill_storage::StorageError),

    /// A fanout send failed after bounded retries. Partial: the run
    /// continues with the remaining items.
    #[error("queue send failed: {0}")]
    QueueSendFailed(#[from] mill_queue::QueueError),

    #[error("source config error: {0}")]
    Config(String),
}
