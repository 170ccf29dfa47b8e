//! Parse queue message bodies into [`MessageEnvelope`]s.

use tracing::warn;

use mill_core::envelope::MessageEnvelope;

use crate::client::QueueMessage;
use crate::error::QueueError;

/// Parse a single queue message body into an envelope.
///
/// The body must be a JSON object carrying the common envelope fields
/// (`correlation_id`, `timestamp`, `service_name`, `operation`, `payload`).
/// Unrecognized operations parse successfully as `Operation::Unknown`; the
/// consumer decides what to do with them.
pub fn parse_envelope(msg: &QueueMessage) -> Result<MessageEnvelope, QueueError> {
    MessageEnvelope::from_body(&msg.body)
        .map_err(|e| QueueError::Parse(format!("invalid envelope in message {}: {e}", msg.id)))
}

/// Parse a batch of messages, separating successes from failures.
///
/// Returns `(envelopes, errors)` where each envelope is paired with its
/// source message. Good messages are never blocked by bad ones.
pub fn parse_batch(
    messages: Vec<QueueMessage>,
) -> (Vec<(QueueMessage, MessageEnvelope)>, Vec<(QueueMessage, QueueError)>) {
    let mut parsed = Vec::with_capacity(messages.len());
    let mut errors = Vec::new();

    for msg in messages {
        match parse_envelope(&msg) {
            Ok(env) => parsed.push((msg, env)),
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "failed to parse queue message");
                errors.push((msg, e));
            }
        }
    }

    (parsed, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mill_core::envelope::{MessageEnvelope, Operation, RenderPayload};

    fn make_msg(id: &str, body: &str) -> QueueMessage {
        QueueMessage {
            id: id.to_string(),
            body: body.to_string(),
            receipt_handle: "handle-test".to_string(),
            timestamp: Utc::now(),
            dequeue_count: 1,
        }
    }

    #[test]
    fn parse_render_message() {
        let env = MessageEnvelope::new(
            "processor",
            Operation::RenderMarkdown,
            &RenderPayload {
                processed_blob_path: "articles/2026/07/x.json".to_string(),
            },
        )
        .unwrap();
        let msg = make_msg("msg-1", &env.to_body().unwrap());

        let parsed = parse_envelope(&msg).unwrap();
        assert_eq!(parsed.operation, Operation::RenderMarkdown);
        assert_eq!(parsed.correlation_id, env.correlation_id);
    }

    #[test]
    fn parse_invalid_json() {
        let msg = make_msg("msg-bad", "not json at all");
        let err = parse_envelope(&msg).unwrap_err();
        assert!(matches!(err, QueueError::Parse(_)));
        assert!(err.to_string().contains("msg-bad"));
    }

    #[test]
    fn parse_batch_partial_success() {
        let good = MessageEnvelope::new(
            "collector",
            Operation::ProcessTopic,
            &serde_json::json!({"topic_id": "t1"}),
        )
        .unwrap();
        let messages = vec![
            make_msg("good-1", &good.to_body().unwrap()),
            make_msg("bad-1", "invalid json"),
            make_msg("bad-2", r#"{"no_envelope":true}"#),
        ];

        let (parsed, errors) = parse_batch(messages);
        assert_eq!(parsed.len(), 1);
        assert_eq!(errors.len(), 2);
        assert_eq!(parsed[0].0.id, "good-1");
        assert_eq!(errors[0].0.id, "bad-1");
    }

    #[test]
    fn unknown_operation_still_parses() {
        let body = r#"{
            "correlation_id": "550e8400-e29b-41d4-a716-446655440000",
            "timestamp": "2026-07-01T12:00:00Z",
            "service_name": "future",
            "operation": "sing_opera",
            "payload": {}
        }"#;
        let msg = make_msg("msg-future", body);
        let parsed = parse_envelope(&msg).unwrap();
        assert_eq!(parsed.operation, Operation::Unknown);
    }
}
