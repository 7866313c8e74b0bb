//! Commonly used types in the trellis overlay.
//!
//! This crate contains the identity and addressing primitives shared by the
//! transport, RPC, and connection-management layers.

pub mod address;
pub mod peer_id;

pub use address::{Address, AddressParseError};
pub use peer_id::PeerId;
