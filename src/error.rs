//! Error types for ether.

use thiserror::Error;

/// Main error type for all ether operations.
///
/// Only the local caller ever sees these values. A remote peer observes
/// nothing beyond an OK or ERROR response carrying the handle.
#[derive(Debug, Error)]
pub enum EtherError {
    /// Bad input shape (zero-size allocation, oversized request, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying reservation failed or the memory limit was reached.
    #[error("Out of memory: could not reserve {requested} bytes")]
    OutOfMemory { requested: usize },

    /// The target region was never handed out by this allocator.
    #[error("Memory corruption detected")]
    Corrupt,

    /// The target region was already released.
    #[error("Double free detected")]
    DoubleFree,

    /// Requested length exceeds the block size.
    #[error("Buffer overflow: {len} bytes requested, block holds {size}")]
    Overflow { len: usize, size: usize },

    /// Handle or token is unknown.
    #[error("Handle not found: {0:#x}")]
    NotFound(u64),

    /// Handle table or client cache reached its configured ceiling.
    #[error("Handle table full")]
    TableFull,

    /// I/O error on the transport.
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization error (control plane only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Header failed validation or an unexpected message arrived.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Peer closed the connection mid-exchange.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server answered a request with ERROR.
    #[error("Server rejected {command} for handle {handle:#x}")]
    Rejected { command: &'static str, handle: u64 },
}

/// Result type alias using EtherError.
pub type Result<T> = std::result::Result<T, EtherError>;
