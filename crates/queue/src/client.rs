//! Queue client trait and types.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// A raw message received from a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique message identifier from the queue provider.
    pub id: String,
    /// Raw message body (JSON envelope).
    pub body: String,
    /// Provider-specific handle for delete (e.g., SQS receipt handle).
    pub receipt_handle: String,
    /// When the message was sent to the queue.
    pub timestamp: DateTime<Utc>,
    /// Number of times this message has been received (for retry tracking).
    pub dequeue_count: u32,
}

/// Health status of a queue connection.
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    /// Whether the queue is reachable.
    pub connected: bool,
    /// Approximate number of messages waiting in the queue.
    pub approximate_message_count: Option<u64>,
    /// Queue provider name (e.g., "sqs", "memory").
    pub provider: String,
}

impl fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueueHealth {{ connected: {}, messages: {:?}, provider: {} }}",
            self.connected, self.approximate_message_count, self.provider
        )
    }
}

/// Trait for queue backends.
///
/// One client instance is bound to one queue. Implementations handle the
/// specifics of sending, polling, and deleting messages for a particular
/// provider.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Send one message body.
    async fn send(&self, body: String) -> Result<(), QueueError>;

    /// Receive up to `max_messages`, hiding them from other consumers for
    /// `visibility_timeout_secs`. Returns an empty vec if none are available.
    async fn receive(
        &self,
        max_messages: u32,
        visibility_timeout_secs: u32,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Delete a message after successful processing. A message that is not
    /// deleted becomes visible again when its visibility timeout lapses.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Approximate number of visible messages.
    async fn peek_depth(&self) -> Result<u64, QueueError>;

    /// Check queue connectivity and return health status.
    async fn health_check(&self) -> Result<QueueHealth, QueueError>;
}
