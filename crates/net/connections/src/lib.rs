//! Connection lifecycle management for the trellis overlay.
//!
//! The [`ConnectionManager`] turns raw transport edges into identified,
//! deduplicated, mutually acknowledged [`Connection`]s between nodes named
//! by opaque peer ids. It owns the `Inquire`/`Inquired`/`Connect` handshake,
//! the duplicate and self-connect policy, the `Close`/`Disconnect` teardown
//! protocol, and the two-table bookkeeping that keeps outbound and inbound
//! lifecycles separable.

pub mod connection;
pub mod events;
pub mod factory;
pub mod manager;
pub mod table;

pub use connection::{Connection, ConnectionObserver, ConnectionState};
pub use events::{ConnectionEvent, EventEmitter};
pub use factory::EdgeFactory;
pub use manager::{methods, ConnectionManager, ConnectionManagerConfig};
pub use table::ConnectionTable;
