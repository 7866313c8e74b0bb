//! Shared test helpers for connection manager integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;
use trellis_net_connections::{ConnectionEvent, ConnectionManager};
use trellis_net_edge::{Edge, EdgeListener, MemoryListener, MemoryTransport, TransportEvents};
use trellis_net_rpc::{payload, Payload, RpcHandler, RpcRequest};
use trellis_primitives::{Address, PeerId};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn peer(tag: &str) -> PeerId {
    PeerId::from_bytes(tag.as_bytes().to_vec())
}

pub fn addr(s: &str) -> Address {
    s.parse().expect("test address")
}

/// Drain every queued event from a subscription.
pub fn drain(rx: &mut Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    events
}

/// Spin up a manager with one memory listener bound at `location`.
pub fn node(
    transport: &Arc<MemoryTransport>,
    tag: &str,
    location: &str,
) -> (Arc<ConnectionManager>, Receiver<ConnectionEvent>) {
    let manager = ConnectionManager::new(peer(tag), RpcHandler::new());
    let events = manager.subscribe();
    manager.add_listener(transport.bind(location));
    (manager, events)
}

/// Adopts far-side edges for [`RemotePeer`]: installs the RPC sink and
/// keeps the edge around for the test to script.
pub struct EdgeBucket {
    rpc: Arc<RpcHandler>,
    pub edges: Mutex<Vec<Arc<dyn Edge>>>,
}

impl TransportEvents for EdgeBucket {
    fn on_new_edge(&self, edge: Arc<dyn Edge>) {
        edge.set_sink(self.rpc.clone());
        self.edges.lock().push(edge);
    }

    fn on_edge_creation_failure(&self, _addr: &Address, _reason: &str) {}
}

/// The far side of a handshake, scripted by hand.
///
/// Runs a real RPC handler over its own memory endpoint but no connection
/// manager, so tests control exactly which messages cross the wire and can
/// record everything the manager under test sends.
pub struct RemotePeer {
    pub rpc: Arc<RpcHandler>,
    pub listener: Arc<MemoryListener>,
    pub bucket: Arc<EdgeBucket>,
    /// Every CM message seen, in arrival order: (method, payload).
    pub messages: Arc<Mutex<Vec<(String, Payload)>>>,
}

impl RemotePeer {
    pub fn bind(transport: &Arc<MemoryTransport>, location: &str) -> Self {
        let rpc = RpcHandler::new();
        let listener = transport.bind(location);
        let bucket = Arc::new(EdgeBucket {
            rpc: rpc.clone(),
            edges: Mutex::new(Vec::new()),
        });
        listener.attach(Arc::downgrade(&bucket) as Weak<dyn TransportEvents>);

        let remote = Self {
            rpc,
            listener,
            bucket,
            messages: Arc::new(Mutex::new(Vec::new())),
        };
        for method in ["CM::Close", "CM::Connect", "CM::Disconnect"] {
            remote.record_notifications(method);
        }
        remote
    }

    fn record_notifications(&self, method: &'static str) {
        let log = self.messages.clone();
        self.rpc.register(
            method,
            Arc::new(move |request: RpcRequest| {
                log.lock().push((method.to_string(), request.message().clone()));
            }),
        );
    }

    /// Script the answer to the manager's `CM::Inquire`.
    pub fn answer_inquire_with(&self, id: PeerId) {
        let log = self.messages.clone();
        self.rpc.register(
            "CM::Inquire",
            Arc::new(move |request: RpcRequest| {
                log.lock()
                    .push(("CM::Inquire".to_string(), request.message().clone()));
                let mut response = Payload::new();
                payload::set_peer_id(&mut response, &id);
                request.respond(response);
            }),
        );
    }

    /// Script an `CM::Inquire` answer with no peer id at all.
    pub fn answer_inquire_empty(&self) {
        self.rpc.register(
            "CM::Inquire",
            Arc::new(|request: RpcRequest| request.respond(Payload::new())),
        );
    }

    pub fn dial(&self, to: &Address) {
        self.listener.create_edge_to(to);
    }

    pub fn edge(&self, index: usize) -> Arc<dyn Edge> {
        self.bucket.edges.lock()[index].clone()
    }

    pub fn edge_count(&self) -> usize {
        self.bucket.edges.lock().len()
    }

    /// Send a request on an adopted edge; returns the slot the response
    /// lands in (synchronously, with the memory transport).
    pub fn send_request_on(&self, index: usize, payload: Payload) -> Arc<Mutex<Option<Payload>>> {
        let edge = self.edge(index);
        let slot = Arc::new(Mutex::new(None));
        let filled = slot.clone();
        self.rpc.send_request(payload, &*edge, move |response| {
            *filled.lock() = Some(response.message().clone());
        });
        slot
    }

    pub fn send_notification_on(&self, index: usize, payload: Payload) {
        let edge = self.edge(index);
        self.rpc.send_notification(payload, &*edge);
    }

    pub fn seen_methods(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    /// Payloads recorded for one method.
    pub fn payloads_for(&self, method: &str) -> Vec<Payload> {
        self.messages
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }
}
