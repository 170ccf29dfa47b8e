//! In-memory queue with SQS-like visibility semantics.
//!
//! Used for tests and single-node local development. Messages received but
//! not deleted become visible again once their visibility timeout lapses,
//! with an incremented dequeue count — the same redelivery behavior the
//! pipeline sees against SQS.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::client::{QueueClient, QueueHealth, QueueMessage};
use crate::error::QueueError;

struct Entry {
    id: String,
    body: String,
    enqueued_at: chrono::DateTime<chrono::Utc>,
    dequeue_count: u32,
    invisible_until: Option<Instant>,
    /// Receipt of the latest delivery; only it can delete the entry.
    receipt: Option<String>,
}

/// In-memory single-process queue.
#[derive(Default)]
pub struct InMemoryQueue {
    entries: Mutex<VecDeque<Entry>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible + in-flight count, for test assertions.
    pub fn total_len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn send(&self, body: String) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().unwrap();
        entries.push_back(Entry {
            id: Uuid::new_v4().to_string(),
            body,
            enqueued_at: Utc::now(),
            dequeue_count: 0,
            invisible_until: None,
            receipt: None,
        });
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: u32,
        visibility_timeout_secs: u32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let mut received = Vec::new();

        for entry in entries.iter_mut() {
            if received.len() >= max_messages as usize {
                break;
            }
            let visible = entry
                .invisible_until
                .map(|until| until <= now)
                .unwrap_or(true);
            if !visible {
                continue;
            }

            entry.dequeue_count += 1;
            entry.invisible_until =
                Some(now + Duration::from_secs(visibility_timeout_secs as u64));
            let receipt = Uuid::new_v4().to_string();
            entry.receipt = Some(receipt.clone());

            received.push(QueueMessage {
                id: entry.id.clone(),
                body: entry.body.clone(),
                receipt_handle: receipt,
                timestamp: entry.enqueued_at,
                dequeue_count: entry.dequeue_count,
            });
        }

        Ok(received)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().unwrap();
        // Idempotent: deleting with an unknown or stale receipt is a no-op.
        entries.retain(|e| e.receipt.as_deref() != Some(receipt_handle));
        Ok(())
    }

    async fn peek_depth(&self) -> Result<u64, QueueError> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.invisible_until.map(|until| until <= now).unwrap_or(true))
            .count() as u64)
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        Ok(QueueHealth {
            connected: true,
            approximate_message_count: Some(self.peek_depth().await?),
            provider: "memory".to_string(),
        })
    }
}
