//! The connection manager: edge adoption, handshake, teardown, shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use trellis_net_edge::{Edge, EdgeListener, EdgeObserver, TransportEvents};
use trellis_net_rpc::{payload, RpcHandler, RpcRequest, RpcSender};
use trellis_primitives::{Address, PeerId};

use crate::connection::{Connection, ConnectionObserver};
use crate::events::{ConnectionEvent, EventEmitter};
use crate::factory::EdgeFactory;
use crate::table::ConnectionTable;

/// RPC method names registered by the manager.
pub mod methods {
    pub const INQUIRE: &str = "CM::Inquire";
    pub const CLOSE: &str = "CM::Close";
    pub const CONNECT: &str = "CM::Connect";
    pub const DISCONNECT: &str = "CM::Disconnect";
}

/// Reason strings used on the teardown paths.
mod reasons {
    pub const SELF_CONNECT: &str = "Attempting to connect to ourself";
    pub const DUPLICATE: &str = "Duplicate connection";
    pub const NO_LISTENER: &str = "No EdgeListener to handle request";
    pub const REMOTE_CLOSE: &str = "Closed from remote peer";
    pub const LOCAL_DISCONNECT: &str = "Local disconnect request";
    pub const REMOTE_DISCONNECT: &str = "Remote disconnect";
    pub const SHUTDOWN: &str = "Disconnecting";
}

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    /// Broadcast channel capacity for manager events.
    pub event_channel_capacity: usize,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 256,
        }
    }
}

/// Turns raw transport edges into identified, deduplicated, mutually
/// acknowledged connections.
///
/// Outbound and inbound lifecycles live in separate tables, chosen by the
/// edge's `outbound` flag at adoption and never revisited. Two nodes
/// dialing each other simultaneously may therefore end up with two
/// connections to the same peer, one per table, and higher layers pick
/// which to keep. Within a single table the peer map stays injective.
///
/// All handlers run synchronously on the caller delivering the event;
/// table mutations are serialized through per-table locks, no lock is held
/// across a send or close, and observers receive events over a broadcast
/// channel.
pub struct ConnectionManager {
    local_id: PeerId,
    rpc: Arc<RpcHandler>,
    out_table: RwLock<ConnectionTable>,
    in_table: RwLock<ConnectionTable>,
    factory: EdgeFactory,
    closed: AtomicBool,
    disconnected_emitted: AtomicBool,
    events: EventEmitter,
    weak_self: Weak<ConnectionManager>,
}

impl ConnectionManager {
    pub fn new(local_id: PeerId, rpc: Arc<RpcHandler>) -> Arc<Self> {
        Self::with_config(local_id, rpc, ConnectionManagerConfig::default())
    }

    pub fn with_config(
        local_id: PeerId,
        rpc: Arc<RpcHandler>,
        config: ConnectionManagerConfig,
    ) -> Arc<Self> {
        let manager = Arc::new_cyclic(|weak| Self {
            local_id,
            rpc: rpc.clone(),
            out_table: RwLock::new(ConnectionTable::new()),
            in_table: RwLock::new(ConnectionTable::new()),
            factory: EdgeFactory::new(),
            closed: AtomicBool::new(false),
            disconnected_emitted: AtomicBool::new(false),
            events: EventEmitter::new(config.event_channel_capacity),
            weak_self: weak.clone(),
        });

        let handlers: [(&str, fn(&Self, RpcRequest)); 4] = [
            (methods::INQUIRE, Self::handle_inquire),
            (methods::CLOSE, Self::handle_close),
            (methods::CONNECT, Self::handle_connect),
            (methods::DISCONNECT, Self::handle_disconnect),
        ];
        for (method, handler) in handlers {
            let weak = Arc::downgrade(&manager);
            rpc.register(
                method,
                Arc::new(move |request| {
                    if let Some(manager) = weak.upgrade() {
                        handler(&manager, request);
                    }
                }),
            );
        }
        manager
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Subscribe to manager events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Register a transport. Ignored (with a warning) after `disconnect`.
    pub fn add_listener(&self, listener: Arc<dyn EdgeListener>) {
        if self.is_closed() {
            warn!("attempting to add an edge listener after disconnect");
            return;
        }
        listener.attach(self.weak_self.clone() as Weak<dyn TransportEvents>);
        self.factory.add_listener(listener);
    }

    /// Dial `addr`. All failures surface as `ConnectionAttemptFailure`
    /// events, never as return values.
    pub fn connect_to(&self, addr: &Address) {
        if self.is_closed() {
            warn!(%addr, "attempting to connect to a remote node after disconnect");
            return;
        }
        if !self.factory.create_edge_to(addr) {
            self.events.attempt_failure(addr.clone(), reasons::NO_LISTENER);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Live connection to `peer`, preferring the outbound table.
    pub fn connection_to(&self, peer: &PeerId) -> Option<Arc<Connection>> {
        let outbound = self.out_table.read().get_connection(peer);
        outbound.or_else(|| self.in_table.read().get_connection(peer))
    }

    /// Adopted edges across both tables.
    pub fn edge_count(&self) -> usize {
        self.out_table.read().edge_count() + self.in_table.read().edge_count()
    }

    /// Tear down every connection and edge, stop the transports, and emit
    /// a final `Disconnected` once both tables have drained. Idempotent.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!("disconnect called twice on the connection manager");
            return;
        }
        info!(local = %self.local_id.short(), "disconnecting connection manager");

        // Whether the final event can fire before this call returns.
        let immediate = self.edge_count() == 0;

        let mut connections = self.out_table.read().connections();
        connections.extend(self.in_table.read().connections());
        for connection in connections {
            connection.disconnect();
        }

        let mut edges = self.out_table.read().edges();
        edges.extend(self.in_table.read().edges());
        for edge in edges {
            if !edge.is_closed() {
                edge.close(reasons::SHUTDOWN);
            }
        }

        self.factory.stop();

        if immediate {
            self.emit_disconnected();
        }
    }

    fn table(&self, outbound: bool) -> &RwLock<ConnectionTable> {
        if outbound {
            &self.out_table
        } else {
            &self.in_table
        }
    }

    fn emit_disconnected(&self) {
        if !self.disconnected_emitted.swap(true, Ordering::SeqCst) {
            self.events.disconnected();
        }
    }

    /// CM::Inquire: a fresh outbound edge on the remote side asks who we
    /// are. Answer with our id and stay parked.
    fn handle_inquire(&self, request: RpcRequest) {
        let mut response = payload::Payload::new();
        payload::set_peer_id(&mut response, &self.local_id);
        request.respond(response);
    }

    /// The response to our Inquire on an outbound edge: decide between
    /// promotion, self-connect, and duplicate.
    fn handle_inquired(&self, response: RpcRequest) {
        let RpcSender::Edge(edge) = response.from().clone() else {
            warn!(from = ?response.from(), "inquired response not from an edge");
            return;
        };
        if !edge.outbound() {
            warn!(edge = %edge.id(), "inquire response arrived on an inbound edge");
            return;
        }
        let Some(remote_id) = payload::peer_id(response.message()) else {
            warn!(edge = %edge.id(), "inquire response without a peer id");
            return;
        };

        if remote_id == self.local_id {
            debug!(edge = %edge.id(), "attempting to connect to ourself");
            self.reject_edge(&edge, reasons::SELF_CONNECT);
            return;
        }

        let duplicate = self.out_table.read().get_connection(&remote_id).is_some();
        if duplicate {
            warn!(peer = %remote_id.short(), edge = %edge.id(), "already connected to peer, closing edge");
            self.reject_edge(&edge, reasons::DUPLICATE);
            return;
        }

        let recorded = self.out_table.read().get_edge(edge.id()).is_some();
        if !recorded {
            error!(edge = %edge.id(), "edge finished a handshake but is not in the outbound table");
            return;
        }

        let mut notification = payload::for_method(methods::CONNECT);
        payload::set_peer_id(&mut notification, &self.local_id);
        self.rpc.send_notification(notification, &*edge);

        debug!(local = %self.local_id.short(), peer = %remote_id.short(), "creating new connection");
        self.promote(edge, remote_id, true);
    }

    /// CM::Connect: the dialer promoted its side of the edge; promote
    /// ours. An existing inbound connection to the same peer gives way.
    fn handle_connect(&self, notification: RpcRequest) {
        let RpcSender::Edge(edge) = notification.from().clone() else {
            warn!(from = ?notification.from(), "connect notification not from an edge");
            return;
        };
        let Some(remote_id) = payload::peer_id(notification.message()) else {
            warn!(edge = %edge.id(), "connect notification without a peer id");
            return;
        };

        let stale = self.in_table.read().get_connection(&remote_id);
        if let Some(stale) = stale {
            debug!(peer = %remote_id.short(), "replacing stale inbound connection");
            stale.disconnect();
        }

        let recorded = self.in_table.read().get_edge(edge.id()).is_some();
        if !recorded {
            error!(edge = %edge.id(), "edge attempted to create a connection but is not in the inbound table");
            return;
        }

        debug!(local = %self.local_id.short(), peer = %remote_id.short(), "handling new connection from remote");
        self.promote(edge, remote_id, false);
    }

    /// CM::Close: the remote refuses this edge; close it unpromoted.
    fn handle_close(&self, notification: RpcRequest) {
        match notification.from() {
            RpcSender::Edge(edge) => {
                edge.close(reasons::REMOTE_CLOSE);
            }
            from => warn!(?from, "close notification not from an edge"),
        }
    }

    /// CM::Disconnect: remote-initiated teardown of a promoted
    /// connection.
    fn handle_disconnect(&self, notification: RpcRequest) {
        let RpcSender::Connection(handle) = notification.from() else {
            warn!(from = ?notification.from(), "disconnect notification from a non-connection sender");
            return;
        };
        let edge_id = handle.edge_id();

        let connection = {
            let inbound = self.in_table.read().get_connection_for_edge(edge_id);
            inbound.or_else(|| self.out_table.read().get_connection_for_edge(edge_id))
        };
        let Some(connection) = connection else {
            warn!(edge = %edge_id, "disconnect notification for an unknown connection");
            return;
        };

        debug!(%connection, "received disconnect for connection");
        self.table(connection.edge().outbound())
            .write()
            .disconnect(&connection);
        connection.edge().close(reasons::REMOTE_DISCONNECT);
    }

    /// Refuse an outbound edge: tell the remote, close, surface the
    /// failure.
    fn reject_edge(&self, edge: &Arc<dyn Edge>, reason: &str) {
        self.rpc
            .send_notification(payload::for_method(methods::CLOSE), &**edge);
        let address = edge.remote_address().clone();
        edge.close(reason);
        self.events.attempt_failure(address, reason);
    }

    /// Insert a freshly promoted connection into its direction's table and
    /// announce it. The event fires strictly after the insertion.
    fn promote(&self, edge: Arc<dyn Edge>, remote_id: PeerId, locally_initiated: bool) {
        let connection = Connection::new(edge.clone(), self.local_id.clone(), remote_id);
        connection.set_observer(self.weak_self.clone() as Weak<dyn ConnectionObserver>);

        let added = self
            .table(edge.outbound())
            .write()
            .add_connection(connection.clone());
        if !added {
            // The table already logged why.
            return;
        }
        self.rpc.bind_connection(edge.id(), connection.clone());
        self.events.new_connection(connection, locally_initiated);
    }
}

impl TransportEvents for ConnectionManager {
    fn on_new_edge(&self, edge: Arc<dyn Edge>) {
        debug!(edge = %edge.id(), outbound = edge.outbound(), addr = %edge.remote_address(), "adopting edge");
        edge.set_sink(self.rpc.clone());
        edge.set_close_observer(self.weak_self.clone() as Weak<dyn EdgeObserver>);

        if !edge.outbound() {
            // Parked until the dialer's Connect (or Close) arrives.
            self.in_table.write().add_edge(edge);
            return;
        }

        self.out_table.write().add_edge(edge.clone());

        let mut request = payload::for_method(methods::INQUIRE);
        payload::set_peer_id(&mut request, &self.local_id);
        let weak = self.weak_self.clone();
        self.rpc.send_request(request, &*edge, move |response| {
            if let Some(manager) = weak.upgrade() {
                manager.handle_inquired(response);
            }
        });
    }

    fn on_edge_creation_failure(&self, addr: &Address, reason: &str) {
        self.events.attempt_failure(addr.clone(), reason);
    }
}

impl EdgeObserver for ConnectionManager {
    fn on_edge_closed(&self, edge: &Arc<dyn Edge>, reason: &str) {
        debug!(edge = %edge.id(), reason, "edge closed");

        let (removed, connection) = {
            let mut table = self.table(edge.outbound()).write();
            let connection = table.get_connection_for_edge(edge.id());
            if let Some(connection) = &connection {
                table.remove_connection(connection);
            }
            (table.remove_edge(edge.id()), connection)
        };

        if let Some(connection) = connection {
            connection.mark_disconnected();
            self.rpc.unbind_connection(edge.id());
            debug!(%connection, reason, "removing connection for closed edge");
        }

        if !removed {
            warn!(edge = %edge.id(), "closed edge was not recorded in a connection table");
        }

        if !self.is_closed() {
            return;
        }
        if self.edge_count() == 0 {
            self.emit_disconnected();
        }
    }
}

impl ConnectionObserver for ConnectionManager {
    fn on_called_disconnect(&self, connection: &Arc<Connection>) {
        debug!(%connection, "handling disconnect request");
        self.table(connection.edge().outbound())
            .write()
            .disconnect(connection);
        self.rpc
            .send_notification(payload::for_method(methods::DISCONNECT), &**connection);
        connection.edge().close(reasons::LOCAL_DISCONNECT);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.rpc.unregister(methods::INQUIRE);
        self.rpc.unregister(methods::CLOSE);
        self.rpc.unregister(methods::CONNECT);
        self.rpc.unregister(methods::DISCONNECT);
    }
}
