//! Error types for the transport layer.

/// Errors surfaced by edge send operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EdgeError {
    /// The edge has been closed.
    #[error("edge is closed")]
    Closed,

    /// The remote half of an in-process pair is gone.
    #[error("edge has no remote endpoint")]
    Detached,
}
