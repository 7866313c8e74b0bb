//! In-process transport: cross-linked edge pairs with synchronous delivery.
//!
//! A [`MemoryTransport`] is a registry of bound locations. Dialing
//! `mem://X` through a [`MemoryListener`] creates a [`MemoryEdge`] pair
//! (the outbound half for the dialer, the inbound half for the listener
//! bound at `X`) and hands each half to its side's adopter. Every `send`
//! lands synchronously in the peer half's sink, so a whole multi-node
//! exchange runs to completion within a single call stack.
//!
//! Closure is local, datagram-style: closing one half does not close the
//! other, and packets sent toward a closed half are silently dropped.
//! Orderly teardown of both halves is the job of the protocol running on
//! top.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, warn};
use trellis_primitives::Address;

use crate::error::EdgeError;
use crate::traits::{
    Edge, EdgeId, EdgeListener, EdgeObserver, PacketSink, Sender, TransportEvents,
};

/// Address scheme served by the memory transport.
pub const MEMORY_SCHEME: &str = "mem";

/// Registry of in-process listeners, keyed by bound location.
pub struct MemoryTransport {
    hosts: RwLock<HashMap<String, Weak<MemoryListener>>>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            hosts: RwLock::new(HashMap::new()),
        })
    }

    /// Bind a listener at `location`, dialable as `mem://location`.
    ///
    /// Rebinding a location replaces the previous listener.
    pub fn bind(self: &Arc<Self>, location: &str) -> Arc<MemoryListener> {
        let listener = Arc::new(MemoryListener {
            transport: Arc::downgrade(self),
            address: Address::new(MEMORY_SCHEME, location),
            events: RwLock::new(None),
            stopped: AtomicBool::new(false),
        });
        self.hosts
            .write()
            .insert(location.to_string(), Arc::downgrade(&listener));
        listener
    }

    fn lookup(&self, location: &str) -> Option<Arc<MemoryListener>> {
        self.hosts.read().get(location).and_then(Weak::upgrade)
    }
}

/// One bound endpoint of a [`MemoryTransport`].
pub struct MemoryListener {
    transport: Weak<MemoryTransport>,
    address: Address,
    events: RwLock<Option<Weak<dyn TransportEvents>>>,
    stopped: AtomicBool,
}

impl MemoryListener {
    /// The address this listener is bound at.
    pub fn address(&self) -> &Address {
        &self.address
    }

    fn events(&self) -> Option<Arc<dyn TransportEvents>> {
        self.events.read().as_ref().and_then(Weak::upgrade)
    }
}

impl EdgeListener for MemoryListener {
    fn handles(&self, addr: &Address) -> bool {
        addr.scheme() == MEMORY_SCHEME
    }

    fn attach(&self, events: Weak<dyn TransportEvents>) {
        *self.events.write() = Some(events);
    }

    fn create_edge_to(&self, addr: &Address) {
        let Some(events) = self.events() else {
            warn!(%addr, "memory listener dialing without an adopter");
            return;
        };

        if self.stopped.load(Ordering::SeqCst) {
            events.on_edge_creation_failure(addr, "listener stopped");
            return;
        }

        let target = self
            .transport
            .upgrade()
            .and_then(|t| t.lookup(addr.location()));
        let Some(target) = target else {
            events.on_edge_creation_failure(addr, "no such memory host");
            return;
        };
        if target.stopped.load(Ordering::SeqCst) {
            events.on_edge_creation_failure(addr, "remote listener stopped");
            return;
        }
        let Some(remote_events) = target.events() else {
            events.on_edge_creation_failure(addr, "remote listener has no adopter");
            return;
        };

        let (outbound, inbound) = MemoryEdge::pair(addr.clone(), self.address.clone());
        debug!(%addr, dialer = %outbound.id(), acceptor = %inbound.id(), "memory edge pair created");

        // The accepting side adopts first so its sink exists by the time
        // the dialer starts talking.
        remote_events.on_new_edge(inbound);
        events.on_new_edge(outbound);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// One half of an in-process edge pair.
pub struct MemoryEdge {
    id: EdgeId,
    outbound: bool,
    remote_address: Address,
    closed: AtomicBool,
    sink: RwLock<Option<Arc<dyn PacketSink>>>,
    observer: RwLock<Option<Weak<dyn EdgeObserver>>>,
    peer: RwLock<Option<Weak<MemoryEdge>>>,
    weak_self: Weak<MemoryEdge>,
}

impl MemoryEdge {
    /// Create a cross-linked pair: the dialer's outbound half (remote
    /// address `dialed`) and the target's inbound half (remote address
    /// `dialer`).
    pub fn pair(dialed: Address, dialer: Address) -> (Arc<Self>, Arc<Self>) {
        let out = Arc::new_cyclic(|weak| Self::half(true, dialed, weak.clone()));
        let inb = Arc::new_cyclic(|weak| Self::half(false, dialer, weak.clone()));
        *out.peer.write() = Some(Arc::downgrade(&inb));
        *inb.peer.write() = Some(Arc::downgrade(&out));
        (out, inb)
    }

    fn half(outbound: bool, remote_address: Address, weak_self: Weak<MemoryEdge>) -> Self {
        Self {
            id: EdgeId::next(),
            outbound,
            remote_address,
            closed: AtomicBool::new(false),
            sink: RwLock::new(None),
            observer: RwLock::new(None),
            peer: RwLock::new(None),
            weak_self,
        }
    }

    fn peer(&self) -> Option<Arc<MemoryEdge>> {
        self.peer.read().as_ref().and_then(Weak::upgrade)
    }

    /// Deliver a packet arriving from the peer half into the local sink.
    fn deliver(&self, data: Bytes) {
        if self.is_closed() {
            return;
        }
        let sink = self.sink.read().clone();
        let this = self.weak_self.upgrade();
        match (sink, this) {
            (Some(sink), Some(this)) => sink.handle_packet(data, this),
            _ => warn!(edge = %self.id, "inbound packet dropped before adoption"),
        }
    }
}

impl Sender for MemoryEdge {
    fn send(&self, data: Bytes) -> Result<(), EdgeError> {
        if self.is_closed() {
            return Err(EdgeError::Closed);
        }
        let peer = self.peer().ok_or(EdgeError::Detached)?;
        peer.deliver(data);
        Ok(())
    }

    fn label(&self) -> String {
        format!("memory-edge-{}({})", self.id, self.remote_address)
    }
}

impl Edge for MemoryEdge {
    fn id(&self) -> EdgeId {
        self.id
    }

    fn outbound(&self) -> bool {
        self.outbound
    }

    fn remote_address(&self) -> &Address {
        &self.remote_address
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn set_sink(&self, sink: Arc<dyn PacketSink>) {
        let mut slot = self.sink.write();
        if slot.is_some() {
            warn!(edge = %self.id, "sink already installed, ignoring");
            return;
        }
        *slot = Some(sink);
    }

    fn set_close_observer(&self, observer: Weak<dyn EdgeObserver>) {
        *self.observer.write() = Some(observer);
    }

    fn close(&self, reason: &str) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        debug!(edge = %self.id, reason, "memory edge closed");

        let observer = self.observer.read().clone();
        if let Some(observer) = observer.and_then(|o| o.upgrade()) {
            if let Some(this) = self.weak_self.upgrade() {
                let this: Arc<dyn Edge> = this;
                observer.on_edge_closed(&this, reason);
            }
        }
        true
    }
}

impl fmt::Debug for MemoryEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEdge")
            .field("id", &self.id)
            .field("outbound", &self.outbound)
            .field("remote_address", &self.remote_address)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
