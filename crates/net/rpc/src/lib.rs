//! Request/response messaging over transport edges.
//!
//! Every message is a string-keyed [`Payload`] map wrapped in a wire
//! [`Envelope`] (one envelope per edge packet, JSON-encoded). The
//! [`RpcHandler`] is the single [`PacketSink`](trellis_net_edge::PacketSink)
//! installed on every adopted edge: it routes requests and notifications to
//! registered method handlers and pairs responses with their outstanding
//! requests by id.
//!
//! Inbound deliveries carry a tagged [`RpcSender`]: the raw edge, or, once
//! the connection layer has bound a promoted connection over that edge,
//! the connection's sender handle.

pub mod envelope;
pub mod error;
pub mod handler;
pub mod payload;
pub mod sender;

pub use envelope::{Envelope, EnvelopeKind};
pub use error::RpcError;
pub use handler::{MethodHandler, RpcHandler, RpcRequest, DEFAULT_MAX_PACKET_SIZE};
pub use payload::{Payload, METHOD_KEY, PEER_ID_KEY};
pub use sender::{ConnectionHandle, RpcSender};
