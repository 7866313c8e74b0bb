//! Transport aggregation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use trellis_net_edge::EdgeListener;
use trellis_primitives::Address;

/// Aggregates edge listeners and routes each dial to the first listener
/// that claims the address.
#[derive(Default)]
pub struct EdgeFactory {
    listeners: RwLock<Vec<Arc<dyn EdgeListener>>>,
    stopped: AtomicBool,
}

impl EdgeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn EdgeListener>) {
        self.listeners.write().push(listener);
    }

    /// True when some listener claims the address. The dial outcome itself
    /// arrives later through the listener's transport events. A stopped
    /// factory claims nothing.
    pub fn create_edge_to(&self, addr: &Address) -> bool {
        if self.is_stopped() {
            return false;
        }
        let listener = self
            .listeners
            .read()
            .iter()
            .find(|l| l.handles(addr))
            .cloned();
        match listener {
            Some(listener) => {
                listener.create_edge_to(addr);
                true
            }
            None => false,
        }
    }

    /// Instruct every listener to cease producing new edges. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("stopping edge factory");
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
