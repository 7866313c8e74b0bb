//! Connection manager events and their non-blocking broadcast emitter.

use std::sync::Arc;

use tokio::sync::broadcast;
use trellis_primitives::Address;

use crate::connection::Connection;

/// Events emitted by the connection manager.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A connection was promoted and inserted into its table.
    NewConnection {
        connection: Arc<Connection>,
        /// True when the local node dialed the underlying edge.
        locally_initiated: bool,
    },
    /// A dial could not produce a connection.
    ConnectionAttemptFailure { address: Address, reason: String },
    /// Shutdown has drained every edge. At most once per manager lifetime.
    Disconnected,
}

impl ConnectionEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ConnectionAttemptFailure { .. })
    }
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Non-blocking broadcast emitter. Slow subscribers drop events
/// independently.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<ConnectionEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn new_connection(&self, connection: Arc<Connection>, locally_initiated: bool) {
        self.emit(ConnectionEvent::NewConnection {
            connection,
            locally_initiated,
        });
    }

    pub fn attempt_failure(&self, address: Address, reason: impl Into<String>) {
        self.emit(ConnectionEvent::ConnectionAttemptFailure {
            address,
            reason: reason.into(),
        });
    }

    pub fn disconnected(&self) {
        self.emit(ConnectionEvent::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emitter_basic() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();

        emitter.attempt_failure("mem://b".parse().unwrap(), "nope");

        match rx.recv().await.unwrap() {
            ConnectionEvent::ConnectionAttemptFailure { address, reason } => {
                assert_eq!(address.to_string(), "mem://b");
                assert_eq!(reason, "nope");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_emitter_multiple_subscribers() {
        let emitter = EventEmitter::default();
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.disconnected();

        assert!(matches!(rx1.recv().await, Ok(ConnectionEvent::Disconnected)));
        assert!(matches!(rx2.recv().await, Ok(ConnectionEvent::Disconnected)));
    }

    #[test]
    fn test_emitter_no_subscribers() {
        let emitter = EventEmitter::default();
        // Emitting into the void must not panic.
        emitter.disconnected();
        assert_eq!(emitter.subscriber_count(), 0);
    }
}
