//! Transport abstractions for the trellis overlay.
//!
//! Transports produce [`Edge`]s: raw bidirectional packet channels between
//! two nodes. The connection manager adopts edges, wires their inbound
//! packets into a [`PacketSink`] (the RPC dispatcher), and observes their
//! closure through [`EdgeObserver`]. [`EdgeListener`] is the transport-side
//! factory that dials addresses of one scheme and reports outcomes through
//! [`TransportEvents`].
//!
//! The [`memory`] module ships a complete in-process transport used by
//! tests and demos.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::EdgeError;
pub use memory::{MemoryEdge, MemoryListener, MemoryTransport, MEMORY_SCHEME};
pub use traits::{Edge, EdgeId, EdgeListener, EdgeObserver, PacketSink, Sender, TransportEvents};
