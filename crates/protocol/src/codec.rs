//! JSON text frame codec.

use serde::de::DeserializeOwned;
use serde::Serialize;
use strand_core::{Error, Result};

/// Encodes a message as one text frame.
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string(message).map_err(|e| Error::internal(format!("frame encoding failed: {e}")))
}

/// Decodes one text frame. Malformed input is a protocol violation.
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<T> {
    serde_json::from_str(frame).map_err(|e| Error::protocol_violation(format!("malformed frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ClientMessage, ServerMessage};
    use strand_core::SubscriptionId;

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode::<ClientMessage>("{not json").unwrap_err();
        assert!(err.is_protocol_violation());

        let err = decode::<ClientMessage>(r#"{"msg":"launch"}"#).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_encode_then_decode_server_frame() {
        let ready = ServerMessage::Ready {
            sub: SubscriptionId::new("s9"),
        };
        let frame = encode(&ready).unwrap();
        assert_eq!(frame, r#"{"msg":"ready","sub":"s9"}"#);
        assert_eq!(decode::<ServerMessage>(&frame).unwrap(), ready);
    }
}
