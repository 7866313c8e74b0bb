//! Method registry and request/response dispatch over edges.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::warn;
use trellis_net_edge::{Edge, EdgeId, PacketSink, Sender};

use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::RpcError;
use crate::payload::{self, Payload};
use crate::sender::{ConnectionHandle, RpcSender};

/// Handler invoked for a registered method.
pub type MethodHandler = Arc<dyn Fn(RpcRequest) + Send + Sync>;

type ResponseHandler = Box<dyn FnOnce(RpcRequest) + Send>;

/// Largest packet the dispatcher will attempt to decode.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 64 * 1024;

/// Dispatches RPC messages between registered method handlers and the edges
/// they arrive on.
///
/// One instance serves every edge of a node: it is installed as each edge's
/// packet sink at adoption. Outstanding requests are paired with their
/// responses through monotonically increasing ids.
pub struct RpcHandler {
    methods: RwLock<HashMap<String, MethodHandler>>,
    pending: Mutex<HashMap<u64, ResponseHandler>>,
    bindings: RwLock<HashMap<EdgeId, Arc<dyn ConnectionHandle>>>,
    next_id: AtomicU64,
    max_packet_size: usize,
}

impl RpcHandler {
    pub fn new() -> Arc<Self> {
        Self::with_max_packet_size(DEFAULT_MAX_PACKET_SIZE)
    }

    pub fn with_max_packet_size(max_packet_size: usize) -> Arc<Self> {
        Arc::new(Self {
            methods: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            bindings: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_packet_size,
        })
    }

    /// Register `handler` for `method`, replacing (with a warning) any
    /// previous registration.
    pub fn register(&self, method: impl Into<String>, handler: MethodHandler) {
        let method = method.into();
        if self.methods.write().insert(method.clone(), handler).is_some() {
            warn!(method, "replaced existing RPC method handler");
        }
    }

    pub fn unregister(&self, method: &str) {
        self.methods.write().remove(method);
    }

    /// Send a request over `sender`; `on_response` fires when the matching
    /// response arrives. Returns the request id.
    pub fn send_request(
        &self,
        payload: Payload,
        sender: &dyn Sender,
        on_response: impl FnOnce(RpcRequest) + Send + 'static,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().insert(id, Box::new(on_response));
        if let Err(err) = self.dispatch(Envelope::request(id, payload), sender) {
            warn!(id, to = %sender.label(), %err, "request not sent");
            self.pending.lock().remove(&id);
        }
        id
    }

    pub fn send_notification(&self, payload: Payload, sender: &dyn Sender) {
        if let Err(err) = self.dispatch(Envelope::notification(payload), sender) {
            warn!(to = %sender.label(), %err, "notification not sent");
        }
    }

    fn dispatch(&self, envelope: Envelope, sender: &dyn Sender) -> Result<(), RpcError> {
        sender.send(envelope.encode()?)?;
        Ok(())
    }

    /// Tag future deliveries on `edge` with the promoted connection.
    pub fn bind_connection(&self, edge: EdgeId, handle: Arc<dyn ConnectionHandle>) {
        self.bindings.write().insert(edge, handle);
    }

    pub fn unbind_connection(&self, edge: EdgeId) {
        self.bindings.write().remove(&edge);
    }

    fn resolve_sender(&self, edge: Arc<dyn Edge>) -> RpcSender {
        let bound = self.bindings.read().get(&edge.id()).cloned();
        match bound {
            Some(handle) => RpcSender::Connection(handle),
            None => RpcSender::Edge(edge),
        }
    }
}

impl PacketSink for RpcHandler {
    fn handle_packet(&self, data: Bytes, from: Arc<dyn Edge>) {
        if data.len() > self.max_packet_size {
            warn!(edge = %from.id(), len = data.len(), "oversized packet dropped");
            return;
        }
        let envelope = match Envelope::decode(&data) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(edge = %from.id(), %err, "undecodable packet dropped");
                return;
            }
        };
        let sender = self.resolve_sender(from);

        match envelope.kind {
            EnvelopeKind::Request | EnvelopeKind::Notification => {
                let respond_to = match (envelope.kind, envelope.id) {
                    (EnvelopeKind::Request, Some(id)) => Some(id),
                    (EnvelopeKind::Request, None) => {
                        warn!(from = %sender.label(), "request without an id dropped");
                        return;
                    }
                    _ => None,
                };
                let Some(method) = payload::method(&envelope.payload).map(str::to_owned) else {
                    warn!(from = %sender.label(), "message without a method dropped");
                    return;
                };
                // Clone the handler out so it runs without the registry lock.
                let handler = self.methods.read().get(&method).cloned();
                let Some(handler) = handler else {
                    warn!(method, from = %sender.label(), "no handler registered, message dropped");
                    return;
                };
                handler(RpcRequest {
                    message: envelope.payload,
                    from: sender,
                    respond_to,
                });
            }
            EnvelopeKind::Response => {
                let Some(id) = envelope.id else {
                    warn!(from = %sender.label(), "response without an id dropped");
                    return;
                };
                let handler = self.pending.lock().remove(&id);
                let Some(handler) = handler else {
                    warn!(id, from = %sender.label(), "response with unknown id dropped");
                    return;
                };
                handler(RpcRequest {
                    message: envelope.payload,
                    from: sender,
                    respond_to: None,
                });
            }
        }
    }
}

/// An inbound RPC message delivered to a handler or response callback.
#[derive(Debug)]
pub struct RpcRequest {
    message: Payload,
    from: RpcSender,
    respond_to: Option<u64>,
}

impl RpcRequest {
    pub fn message(&self) -> &Payload {
        &self.message
    }

    pub fn from(&self) -> &RpcSender {
        &self.from
    }

    /// Send `payload` back as the response.
    ///
    /// Valid only for requests; responding to a notification or a response
    /// is warned and dropped.
    pub fn respond(self, payload: Payload) {
        let Some(id) = self.respond_to else {
            warn!(from = %self.from.label(), "respond() on a message that is not a request");
            return;
        };
        match Envelope::response(id, payload).encode() {
            Ok(data) => {
                if let Err(err) = self.from.as_sender().send(data) {
                    warn!(id, %err, "response not sent");
                }
            }
            Err(err) => warn!(id, %err, "response not encoded"),
        }
    }
}
