//! Error types for page-context capture.

use flowrec_protocol::DeliveryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Delivery failed and was not recovered by the retry policy.
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// The coordinator answered with a message of the wrong type.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Handshake refused.
    #[error("coordinator rejected connection: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed")]
    ChannelClosed,
}

pub type CaptureResult<T> = Result<T, CaptureError>;
