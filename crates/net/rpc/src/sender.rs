//! Tagged senders attached to inbound deliveries.

use std::fmt;
use std::sync::Arc;

use trellis_net_edge::{Edge, EdgeId, Sender};

/// Handle to a promoted connection, implemented by the connection layer.
///
/// The RPC layer never sees the concrete connection type; it needs only the
/// sender half and the identity of the underlying edge.
pub trait ConnectionHandle: Sender {
    fn edge_id(&self) -> EdgeId;
}

/// Sender kind attached to an inbound RPC delivery.
///
/// Messages always physically arrive on an edge. Once the connection layer
/// binds a promoted connection over that edge (`RpcHandler::bind_connection`)
/// deliveries carry the `Connection` variant instead, so handlers match on
/// the kind rather than downcast.
#[derive(Clone)]
pub enum RpcSender {
    Edge(Arc<dyn Edge>),
    Connection(Arc<dyn ConnectionHandle>),
}

impl RpcSender {
    /// Identity of the edge the message arrived on.
    pub fn edge_id(&self) -> EdgeId {
        match self {
            Self::Edge(edge) => edge.id(),
            Self::Connection(handle) => handle.edge_id(),
        }
    }

    pub fn as_sender(&self) -> &dyn Sender {
        match self {
            Self::Edge(edge) => &**edge,
            Self::Connection(handle) => &**handle,
        }
    }

    pub fn label(&self) -> String {
        self.as_sender().label()
    }
}

impl fmt::Debug for RpcSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edge(edge) => write!(f, "Edge({})", edge.label()),
            Self::Connection(handle) => write!(f, "Connection({})", handle.label()),
        }
    }
}
