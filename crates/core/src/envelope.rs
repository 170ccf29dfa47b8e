//! Common message envelope shared by every queue.
//!
//! The `correlation_id` is minted when the originating item or batch enters
//! the pipeline and survives every stage; logs and blob writes key on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::Engagement;

/// Operation requested by a message. Forward compatibility is explicit:
/// anything unrecognized deserializes to `Unknown` and the consumer deletes
/// it after logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Collect,
    ProcessTopic,
    RenderMarkdown,
    PublishSite,
    #[serde(other)]
    Unknown,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Collect => "collect",
            Operation::ProcessTopic => "process_topic",
            Operation::RenderMarkdown => "render_markdown",
            Operation::PublishSite => "publish_site",
            Operation::Unknown => "unknown",
        }
    }
}

/// Envelope wrapping every queue message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Producer service name.
    pub service_name: String,
    pub operation: Operation,
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    /// New envelope with a fresh correlation id.
    pub fn new<P: Serialize>(
        service_name: &str,
        operation: Operation,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            correlation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            service_name: service_name.to_string(),
            operation,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// New envelope continuing an existing correlation chain.
    pub fn continuing<P: Serialize>(
        correlation_id: Uuid,
        service_name: &str,
        operation: Operation,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            correlation_id,
            timestamp: Utc::now(),
            service_name: service_name.to_string(),
            operation,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Deserialize the payload into its operation-specific type.
    pub fn payload_as<P: for<'de> Deserialize<'de>>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

// ── Operation payloads ────────────────────────────────────────

/// Manual or scheduled collection trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectPayload {
    pub reason: String,
}

/// One unit of work for the processor: a single accepted item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicPayload {
    pub topic_id: String,
    pub title: String,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub engagement: Engagement,
    pub collected_at: DateTime<Utc>,
    /// Normalized engagement in [0, 1].
    pub priority_score: f64,
    pub collection_id: String,
    /// Blob path of the collection audit record this item belongs to.
    pub collection_blob: String,
}

/// One unit of work for the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPayload {
    pub processed_blob_path: String,
}

/// Coalesced site-rebuild request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPayload {
    pub batch_id: Uuid,
    pub markdown_count: u64,
    /// "queue_drained", "manual", or "reconciler".
    pub trigger: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let payload = RenderPayload {
            processed_blob_path: "articles/2026/07/some-post.json".to_string(),
        };
        let env = MessageEnvelope::new("processor", Operation::RenderMarkdown, &payload).unwrap();
        let body = env.to_body().unwrap();
        let back = MessageEnvelope::from_body(&body).unwrap();

        assert_eq!(back.correlation_id, env.correlation_id);
        assert_eq!(back.operation, Operation::RenderMarkdown);
        let p: RenderPayload = back.payload_as().unwrap();
        assert_eq!(p.processed_blob_path, payload.processed_blob_path);
    }

    #[test]
    fn continuing_preserves_correlation() {
        let first = MessageEnvelope::new(
            "collector",
            Operation::ProcessTopic,
            &serde_json::json!({"topic_id": "t"}),
        )
        .unwrap();
        let next = MessageEnvelope::continuing(
            first.correlation_id,
            "processor",
            Operation::RenderMarkdown,
            &serde_json::json!({}),
        )
        .unwrap();
        assert_eq!(next.correlation_id, first.correlation_id);
        assert_eq!(next.service_name, "processor");
    }

    #[test]
    fn unknown_operation_deserializes() {
        let body = r#"{
            "correlation_id": "550e8400-e29b-41d4-a716-446655440000",
            "timestamp": "2026-07-01T12:00:00Z",
            "service_name": "future-service",
            "operation": "transcode_audio",
            "payload": {}
        }"#;
        let env = MessageEnvelope::from_body(body).unwrap();
        assert_eq!(env.operation, Operation::Unknown);
    }

    #[test]
    fn operation_serializes_snake_case() {
        let s = serde_json::to_string(&Operation::ProcessTopic).unwrap();
        assert_eq!(s, "\"process_topic\"");
    }
}
