//! Per-direction bookkeeping of edges and their promoted connections.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;
use trellis_net_edge::{Edge, EdgeId};
use trellis_primitives::PeerId;

use crate::connection::Connection;

/// Indexed bookkeeping for one direction of the overlay.
///
/// Invariant: a connection appears in the peer map iff its edge is in the
/// edge set and its state is live. A disconnecting connection leaves the
/// peer map immediately but stays reachable through its edge until the
/// edge closes, so late teardown events still find it.
#[derive(Default)]
pub struct ConnectionTable {
    edges: HashMap<EdgeId, Arc<dyn Edge>>,
    by_peer: HashMap<PeerId, Arc<Connection>>,
    by_edge: HashMap<EdgeId, Arc<Connection>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, edge: Arc<dyn Edge>) {
        let id = edge.id();
        if self.edges.insert(id, edge).is_some() {
            warn!(edge = %id, "edge re-added to connection table");
        }
    }

    /// False when the edge was not present.
    pub fn remove_edge(&mut self, id: EdgeId) -> bool {
        self.edges.remove(&id).is_some()
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<Arc<dyn Edge>> {
        self.edges.get(&id).cloned()
    }

    pub fn edges(&self) -> Vec<Arc<dyn Edge>> {
        self.edges.values().cloned().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Register a freshly promoted connection.
    ///
    /// False (with a warning) when the peer already has a live connection
    /// here, the edge already carries one, or the edge is not recorded.
    pub fn add_connection(&mut self, connection: Arc<Connection>) -> bool {
        let edge_id = connection.edge().id();
        if !self.edges.contains_key(&edge_id) {
            warn!(%connection, edge = %edge_id, "connection for an unrecorded edge rejected");
            return false;
        }
        if self.by_peer.contains_key(connection.remote_id()) {
            warn!(%connection, "peer already has a connection in this table");
            return false;
        }
        if self.by_edge.contains_key(&edge_id) {
            warn!(%connection, edge = %edge_id, "edge already carries a connection");
            return false;
        }
        self.by_peer
            .insert(connection.remote_id().clone(), connection.clone());
        self.by_edge.insert(edge_id, connection);
        true
    }

    pub fn remove_connection(&mut self, connection: &Arc<Connection>) {
        self.by_edge.remove(&connection.edge().id());
        let still_mapped = self
            .by_peer
            .get(connection.remote_id())
            .is_some_and(|current| Arc::ptr_eq(current, connection));
        if still_mapped {
            self.by_peer.remove(connection.remote_id());
        }
    }

    /// Live connection to `peer`, if any.
    pub fn get_connection(&self, peer: &PeerId) -> Option<Arc<Connection>> {
        self.by_peer.get(peer).cloned()
    }

    /// Connection carried by `edge`, live or disconnecting.
    pub fn get_connection_for_edge(&self, edge: EdgeId) -> Option<Arc<Connection>> {
        self.by_edge.get(&edge).cloned()
    }

    /// Mark `connection` disconnecting: it leaves the peer map but stays
    /// addressable through its edge until the edge closes.
    pub fn disconnect(&mut self, connection: &Arc<Connection>) {
        connection.request_disconnect();
        let still_mapped = self
            .by_peer
            .get(connection.remote_id())
            .is_some_and(|current| Arc::ptr_eq(current, connection));
        if still_mapped {
            self.by_peer.remove(connection.remote_id());
        }
    }

    pub fn contains(&self, connection: &Arc<Connection>) -> bool {
        self.by_edge
            .get(&connection.edge().id())
            .is_some_and(|current| Arc::ptr_eq(current, connection))
    }

    /// The live connections (the ones still in the peer map).
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.by_peer.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use trellis_net_edge::MemoryEdge;
    use trellis_primitives::Address;

    use super::*;
    use crate::connection::ConnectionState;

    fn edge() -> Arc<dyn Edge> {
        let (out, _far) = MemoryEdge::pair(
            "mem://far".parse::<Address>().unwrap(),
            "mem://near".parse::<Address>().unwrap(),
        );
        out
    }

    fn peer(tag: &str) -> PeerId {
        PeerId::from_bytes(tag.as_bytes().to_vec())
    }

    fn connection(edge: Arc<dyn Edge>, remote: &str) -> Arc<Connection> {
        Connection::new(edge, peer("local"), peer(remote))
    }

    #[test]
    fn test_edge_bookkeeping() {
        let mut table = ConnectionTable::new();
        let e = edge();
        let id = e.id();

        table.add_edge(e.clone());
        assert_eq!(table.edge_count(), 1);
        assert!(table.get_edge(id).is_some());

        assert!(table.remove_edge(id));
        assert!(!table.remove_edge(id));
        assert_eq!(table.edge_count(), 0);
    }

    #[test]
    fn test_connection_requires_recorded_edge() {
        let mut table = ConnectionTable::new();
        let con = connection(edge(), "b");
        assert!(!table.add_connection(con));
    }

    #[test]
    fn test_connection_lookup() {
        let mut table = ConnectionTable::new();
        let e = edge();
        table.add_edge(e.clone());
        let con = connection(e.clone(), "b");

        assert!(table.add_connection(con.clone()));
        assert!(table.contains(&con));
        assert!(table.get_connection(&peer("b")).is_some());
        assert!(table.get_connection_for_edge(e.id()).is_some());

        table.remove_connection(&con);
        assert!(!table.contains(&con));
        assert!(table.get_connection(&peer("b")).is_none());
        assert!(table.get_connection_for_edge(e.id()).is_none());
        // The edge outlives its connection until it closes.
        assert_eq!(table.edge_count(), 1);
    }

    #[test]
    fn test_duplicate_peer_rejected() {
        let mut table = ConnectionTable::new();
        let e1 = edge();
        let e2 = edge();
        table.add_edge(e1.clone());
        table.add_edge(e2.clone());

        assert!(table.add_connection(connection(e1, "b")));
        assert!(!table.add_connection(connection(e2, "b")));
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut table = ConnectionTable::new();
        let e = edge();
        table.add_edge(e.clone());

        assert!(table.add_connection(connection(e.clone(), "b")));
        assert!(!table.add_connection(connection(e, "c")));
    }

    #[test]
    fn test_disconnect_keeps_edge_mapping() {
        let mut table = ConnectionTable::new();
        let e = edge();
        table.add_edge(e.clone());
        let con = connection(e.clone(), "b");
        table.add_connection(con.clone());

        table.disconnect(&con);

        assert_eq!(con.state(), ConnectionState::DisconnectRequested);
        // Out of the peer map, still reachable through the edge.
        assert!(table.get_connection(&peer("b")).is_none());
        assert!(table.get_connection_for_edge(e.id()).is_some());
        assert!(table.contains(&con));

        // A replacement for the same peer is admissible again.
        let e2 = edge();
        table.add_edge(e2.clone());
        assert!(table.add_connection(connection(e2, "b")));
    }

    #[test]
    fn test_connections_lists_live_only() {
        let mut table = ConnectionTable::new();
        let e1 = edge();
        let e2 = edge();
        table.add_edge(e1.clone());
        table.add_edge(e2.clone());
        let con1 = connection(e1, "b");
        let con2 = connection(e2, "c");
        table.add_connection(con1.clone());
        table.add_connection(con2);

        table.disconnect(&con1);
        let live = table.connections();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].remote_id(), &peer("c"));
    }
}
