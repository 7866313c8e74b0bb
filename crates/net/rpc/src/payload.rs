//! String-keyed message payloads.

use serde_json::{Map, Value};
use trellis_primitives::PeerId;

/// The string-keyed map carried by every RPC message.
pub type Payload = Map<String, Value>;

/// Payload key naming the RPC method.
pub const METHOD_KEY: &str = "method";

/// Payload key carrying a hex-encoded peer id.
pub const PEER_ID_KEY: &str = "peer_id";

/// Build a payload carrying only the method name.
pub fn for_method(method: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert(METHOD_KEY.to_string(), Value::String(method.to_string()));
    payload
}

pub fn method(payload: &Payload) -> Option<&str> {
    payload.get(METHOD_KEY).and_then(Value::as_str)
}

/// Extract the peer id. A missing, empty, or undecodable value yields
/// `None`; the caller treats that as a soft error.
pub fn peer_id(payload: &Payload) -> Option<PeerId> {
    let hex = payload.get(PEER_ID_KEY).and_then(Value::as_str)?;
    let id = PeerId::from_hex(hex).ok()?;
    (!id.is_empty()).then_some(id)
}

pub fn set_peer_id(payload: &mut Payload, id: &PeerId) {
    payload.insert(PEER_ID_KEY.to_string(), Value::String(id.to_hex()));
}
