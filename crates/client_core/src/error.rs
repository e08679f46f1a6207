use shared::domain::OperationKind;
use thiserror::Error;

use crate::progress::OperationStatus;

/// Failures surfaced to callers of the transport API. Socket-level failures
/// are never represented here; those only ever appear as status transitions
/// on [`crate::ConnectionManager`]'s status stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid gateway url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{kind} cannot be retried while {status:?}; retry is only valid after a failure or cancellation")]
    RetryNotAllowed {
        kind: OperationKind,
        status: OperationStatus,
    },
    #[error("{kind} has never been started; nothing to retry")]
    NothingToRetry { kind: OperationKind },
}
