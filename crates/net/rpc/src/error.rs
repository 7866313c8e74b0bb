//! Error types for the RPC layer.

use trellis_net_edge::EdgeError;

/// Errors raised while encoding, decoding, or sending RPC messages.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// Inbound packet was not a valid envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// The underlying sender refused the packet.
    #[error(transparent)]
    Edge(#[from] EdgeError),
}
