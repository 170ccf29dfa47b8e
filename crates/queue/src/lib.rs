pub mod client;
pub mod error;
pub mod memory;
pub mod parser;
pub mod sqs;

use std::sync::Arc;

use mill_core::config::{AwsConfig, QueuesConfig};

pub use client::{QueueClient, QueueHealth, QueueMessage};
pub use error::QueueError;
pub use memory::InMemoryQueue;
pub use parser::{parse_batch, parse_envelope};
pub use sqs::SqsQueue;

/// Build a queue client for the configured provider.
pub async fn connect(
    queues: &QueuesConfig,
    aws: &AwsConfig,
    queue_url: &str,
) -> Result<Arc<dyn QueueClient>, QueueError> {
    match queues.provider.as_str() {
        "sqs" => Ok(Arc::new(SqsQueue::new(aws, queue_url).await?)),
        "memory" => Ok(Arc::new(InMemoryQueue::new())),
        other => Err(QueueError::Provider(format!(
            "unknown QUEUE_PROVIDER '{other}'"
        ))),
    }
}
