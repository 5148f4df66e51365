//! Codec trait and the JSON implementation.
//!
//! WebSocket clients speak JSON text frames, so codecs produce and consume
//! `String`s rather than byte buffers.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts wire values to and from text frames.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into one text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Parses one text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or does not
    /// match `T`.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use votechaos_protocol::{ClientMessage, Codec, Envelope, JsonCodec};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::new(1, 5000, ClientMessage::Heartbeat { client_time: 5000 });
///
/// let text = codec.encode(&envelope).unwrap();
/// let decoded: Envelope<ClientMessage> = codec.decode(&text).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientMessage, Envelope};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<Envelope<ClientMessage>, _> = JsonCodec.decode("not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_missing_payload_returns_decode_error() {
        let result: Result<Envelope<ClientMessage>, _> = JsonCodec.decode(r#"{"seq":1}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_produces_single_line_json() {
        let text = JsonCodec
            .encode(&Envelope::new(1, 2, ClientMessage::Heartbeat { client_time: 3 }))
            .unwrap();
        assert!(!text.contains('\n'));
        assert!(text.contains(r#""type":"heartbeat""#));
    }
}
