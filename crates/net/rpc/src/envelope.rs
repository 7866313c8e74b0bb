//! Wire envelope framing one RPC message per edge packet.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;
use crate::payload::Payload;

/// Kind of an RPC message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Request,
    Response,
    Notification,
}

/// The wire form of one RPC message.
///
/// Requests and responses carry an id pairing them up; notifications do
/// not. The payload is the caller's string-keyed map, method name included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub payload: Payload,
}

impl Envelope {
    pub fn request(id: u64, payload: Payload) -> Self {
        Self {
            kind: EnvelopeKind::Request,
            id: Some(id),
            payload,
        }
    }

    pub fn response(id: u64, payload: Payload) -> Self {
        Self {
            kind: EnvelopeKind::Response,
            id: Some(id),
            payload,
        }
    }

    pub fn notification(payload: Payload) -> Self {
        Self {
            kind: EnvelopeKind::Notification,
            id: None,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Bytes, RpcError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(RpcError::Encode)
    }

    pub fn decode(data: &[u8]) -> Result<Self, RpcError> {
        serde_json::from_slice(data).map_err(RpcError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;

    #[test]
    fn test_request_roundtrip() {
        let env = Envelope::request(7, payload::for_method("CM::Inquire"));
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded.kind, EnvelopeKind::Request);
        assert_eq!(decoded.id, Some(7));
        assert_eq!(payload::method(&decoded.payload), Some("CM::Inquire"));
    }

    #[test]
    fn test_notification_omits_id() {
        let env = Envelope::notification(payload::for_method("CM::Close"));
        let bytes = env.encode().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(!text.contains("\"id\""));

        let decoded = Envelope::decode(&bytes).unwrap();
        assert_eq!(decoded.kind, EnvelopeKind::Notification);
        assert_eq!(decoded.id, None);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            Envelope::decode(b"not json"),
            Err(RpcError::Decode(_))
        ));
    }
}
