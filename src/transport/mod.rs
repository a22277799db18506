//! Transport module - TCP listener and connector.
//!
//! The protocol itself is transport-agnostic: everything above this module
//! works on any `AsyncRead + AsyncWrite` stream, which is how the tests
//! drive the server over in-memory duplex pipes.

mod tcp;

pub use tcp::{connect, Listener};
