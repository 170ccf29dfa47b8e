//! Cross-stage error classification.
//!
//! Each crate keeps its own error enum; at the message-handler boundary the
//! concrete error is mapped onto an [`ErrorKind`], which fixes the queue
//! disposition (delete vs. leave for redelivery).

use serde::{Deserialize, Serialize};

/// Abstract failure classes shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed message or missing required field. Delete, never retry.
    BadInput,
    /// Network flap, 5xx, 429 after backoff, timeout. Leave for redelivery.
    TransientDependency,
    /// Auth failure or non-429 4xx. Delete, record for operators.
    PermanentDependency,
    /// Another holder owns the lease. Leave; visibility timeout backs off.
    LeaseContention,
    /// Storage write failed after expensive work. Leave after bounded
    /// in-process retries.
    StorageWrite,
    /// Site generator failed or its output was rejected.
    BuildFailure,
    /// Cooperative shutdown interrupted the work. Leave.
    Cancelled,
}

impl ErrorKind {
    /// Whether the message should stay on the queue for redelivery.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransientDependency
                | ErrorKind::LeaseContention
                | ErrorKind::StorageWrite
                | ErrorKind::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadInput => "bad_input",
            ErrorKind::TransientDependency => "transient_dependency",
            ErrorKind::PermanentDependency => "permanent_dependency",
            ErrorKind::LeaseContention => "lease_contention",
            ErrorKind::StorageWrite => "storage_write",
            ErrorKind::BuildFailure => "build_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(ErrorKind::TransientDependency.retryable());
        assert!(ErrorKind::LeaseContention.retryable());
        assert!(ErrorKind::StorageWrite.retryable());
        assert!(ErrorKind::Cancelled.retryable());
        assert!(!ErrorKind::BadInput.retryable());
        assert!(!ErrorKind::PermanentDependency.retryable());
        assert!(!ErrorKind::BuildFailure.retryable());
    }
}
