//! Control plane - lifecycle notifications on stdout.
//!
//! The daemon announces itself with one JSON-RPC notification per line:
//!
//! 1. `$ready` once the listener is bound (address and limits)
//! 2. `$stats` after shutdown (final allocator counters)
//!
//! Logs go to stderr so stdout stays machine-readable.
//!
//! # Example
//!
//! ```ignore
//! use ether::control::{build_ready_message, write_stdout_line};
//!
//! let msg = build_ready_message(server.local_addr()?, server.config())?;
//! write_stdout_line(&msg)?;
//! ```

mod notify;
mod stdio;

pub use notify::{build_ready_message, build_stats_message, READY_METHOD, STATS_METHOD};
pub use stdio::{write_line, write_stdout_line};
