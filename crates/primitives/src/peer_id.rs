//! Opaque peer identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque byte identity of a node in the overlay.
///
/// Ids are compared by value and assumed globally unique per node; the
/// connection layer only ever checks them for equality, so any byte string
/// (key digest, random nonce) works. Authentication of the id is a concern
/// of the layer that mints it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse an id from its hex encoding.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shortened hex form for log output.
    pub fn short(&self) -> String {
        let mut full = self.to_hex();
        full.truncate(8);
        full
    }
}

impl From<&[u8]> for PeerId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for PeerId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// Debug prints the hex form rather than the raw byte vector.
impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let id = PeerId::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(id.to_hex(), "deadbeef");
        assert_eq!(PeerId::from_hex("deadbeef").unwrap(), id);
    }

    #[test]
    fn test_invalid_hex() {
        assert!(PeerId::from_hex("zz").is_err());
    }

    #[test]
    fn test_equality_by_value() {
        let a = PeerId::from_bytes(b"node-a".to_vec());
        let b = PeerId::from_bytes(b"node-a".to_vec());
        let c = PeerId::from_bytes(b"node-c".to_vec());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_short_form() {
        let id = PeerId::from_bytes(vec![0xab; 16]);
        assert_eq!(id.short(), "abababab");

        let tiny = PeerId::from_bytes(vec![0x01, 0x02]);
        assert_eq!(tiny.short(), "0102");
    }

    #[test]
    fn test_empty() {
        assert!(PeerId::from_bytes(Vec::new()).is_empty());
        assert!(!PeerId::from_bytes(vec![0]).is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = PeerId::from_bytes(b"serde".to_vec());
        let json = serde_json::to_string(&id).unwrap();
        let back: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
