//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding or validating messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not valid JSON or does not match any message shape.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// A room code that is not six ASCII letters or digits.
    #[error("invalid room code {0:?}")]
    InvalidRoomCode(String),

    /// A decoded message whose field violates the bounds in [`Limits`](crate::Limits).
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    /// The message is well formed but not acceptable, e.g. an unsupported mode.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    pub(crate) fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
