//! A promoted edge bound to an identified remote peer.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::warn;
use trellis_net_edge::{Edge, EdgeError, EdgeId, Sender};
use trellis_net_rpc::ConnectionHandle;
use trellis_primitives::PeerId;

/// Lifecycle state of a connection (stored as u8 for atomic access).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Live = 0,
    DisconnectRequested = 1,
    Disconnected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Live,
            1 => Self::DisconnectRequested,
            _ => Self::Disconnected,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

/// Observer of user-initiated disconnect requests, implemented by the
/// connection manager.
pub trait ConnectionObserver: Send + Sync {
    fn on_called_disconnect(&self, connection: &Arc<Connection>);
}

/// A promoted edge bound to an identified remote peer.
///
/// Created by the handshake after a successful exchange; the connection
/// owns its edge for the rest of the edge's life. Sending through a
/// connection sends over that edge, which is why a connection doubles as
/// the RPC sender for connection-scoped notifications.
pub struct Connection {
    edge: Arc<dyn Edge>,
    local_id: PeerId,
    remote_id: PeerId,
    state: AtomicU8,
    observer: RwLock<Option<Weak<dyn ConnectionObserver>>>,
}

impl Connection {
    pub(crate) fn new(edge: Arc<dyn Edge>, local_id: PeerId, remote_id: PeerId) -> Arc<Self> {
        Arc::new(Self {
            edge,
            local_id,
            remote_id,
            state: AtomicU8::new(ConnectionState::Live as u8),
            observer: RwLock::new(None),
        })
    }

    pub fn edge(&self) -> &Arc<dyn Edge> {
        &self.edge
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn remote_id(&self) -> &PeerId {
        &self.remote_id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_observer(&self, observer: Weak<dyn ConnectionObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// Move Live → DisconnectRequested. The first transition wins.
    pub(crate) fn request_disconnect(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Live as u8,
                ConnectionState::DisconnectRequested as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Terminal transition, entered when the underlying edge closes.
    pub(crate) fn mark_disconnected(&self) {
        self.state
            .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);
    }

    /// User-initiated teardown.
    ///
    /// Routes through the manager: the connection leaves its table's peer
    /// map, the remote is told with a `CM::Disconnect` notification, and
    /// the edge closes. Calling this on a connection that is already
    /// tearing down is a no-op.
    pub fn disconnect(self: &Arc<Self>) {
        if !self.request_disconnect() {
            return;
        }
        let observer = self.observer.read().clone();
        match observer.and_then(|o| o.upgrade()) {
            Some(observer) => observer.on_called_disconnect(self),
            None => warn!(connection = %self, "disconnect with no manager attached"),
        }
    }
}

impl Sender for Connection {
    fn send(&self, data: Bytes) -> Result<(), EdgeError> {
        self.edge.send(data)
    }

    fn label(&self) -> String {
        format!("connection({self})")
    }
}

impl ConnectionHandle for Connection {
    fn edge_id(&self) -> EdgeId {
        self.edge.id()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.local_id.short(), self.remote_id.short())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("edge", &self.edge.id())
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
