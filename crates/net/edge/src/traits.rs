//! Transport seams consumed by the connection manager.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use trellis_primitives::Address;

use crate::error::EdgeError;

/// Process-unique identity of an edge.
///
/// Tables key their edge bookkeeping by this id rather than by pointer, so
/// an edge can be looked up long after the caller dropped its `Arc`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u64);

impl EdgeId {
    /// Allocate the next id from a process-wide counter.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

/// Outgoing packet-sender half, consumed by the RPC layer.
pub trait Sender: Send + Sync {
    /// Deliver one packet to the remote end.
    fn send(&self, data: Bytes) -> Result<(), EdgeError>;

    /// Human-readable label for log output.
    fn label(&self) -> String;
}

/// The single consumer of an edge's inbound packets.
pub trait PacketSink: Send + Sync {
    fn handle_packet(&self, data: Bytes, from: Arc<dyn Edge>);
}

/// Observer of edge closure, installed by the adopter.
pub trait EdgeObserver: Send + Sync {
    fn on_edge_closed(&self, edge: &Arc<dyn Edge>, reason: &str);
}

/// A raw bidirectional packet channel produced by a transport.
///
/// Once adopted, an edge is owned by the connection manager: the manager
/// installs the sink and the close observer, and the edge stays in exactly
/// one connection table until it closes.
pub trait Edge: Sender + fmt::Debug {
    fn id(&self) -> EdgeId;

    /// True when the local node dialed this edge, false when the remote did.
    fn outbound(&self) -> bool;

    fn remote_address(&self) -> &Address;

    /// Monotonic: once true, stays true.
    fn is_closed(&self) -> bool;

    /// Install the inbound-packet consumer.
    ///
    /// Set exactly once, at adoption. Installing a second sink is a
    /// programming error; implementations keep the first and warn.
    fn set_sink(&self, sink: Arc<dyn PacketSink>);

    /// Install the closure observer. The observer is held weakly; the
    /// adopter owns the subscription lifetime.
    fn set_close_observer(&self, observer: Weak<dyn EdgeObserver>);

    /// Close the edge. Idempotent; returns false when already closed.
    fn close(&self, reason: &str) -> bool;
}

/// Events a transport reports upward to its adopter.
pub trait TransportEvents: Send + Sync {
    /// A new edge exists. Ownership transfers to the receiver.
    fn on_new_edge(&self, edge: Arc<dyn Edge>);

    /// A dial initiated through [`EdgeListener::create_edge_to`] failed.
    fn on_edge_creation_failure(&self, addr: &Address, reason: &str);
}

/// Transport-side factory producing edges for one address scheme.
pub trait EdgeListener: Send + Sync {
    /// True when this listener can dial the address.
    fn handles(&self, addr: &Address) -> bool;

    /// Subscribe the adopter for [`TransportEvents`]. Must be called before
    /// the listener produces its first event.
    fn attach(&self, events: Weak<dyn TransportEvents>);

    /// Dial the address. The outcome arrives through [`TransportEvents`].
    fn create_edge_to(&self, addr: &Address);

    /// Cease producing new edges. Idempotent.
    fn stop(&self);
}
