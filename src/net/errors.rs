//! Network error types.

use thiserror::Error;

/// Errors surfaced by transports and the framing codec.
#[derive(Debug, Error)]
pub enum NetError {
    /// A frame announced a length above the protocol cap.
    #[error("frame of {actual} bytes exceeds maximum {max}")]
    FrameTooLarge { actual: usize, max: usize },

    /// Failed to encode or decode an envelope.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Underlying socket failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has not been started yet.
    #[error("transport not started")]
    NotStarted,

    /// The transport's inbound queue was already taken.
    #[error("transport inbox already taken")]
    InboxTaken,
}
