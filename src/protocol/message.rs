//! Message struct with typed accessors.
//!
//! A message is one header plus its payload. Messages are built per
//! request/response and never persisted.
//!
//! # Example
//!
//! ```
//! use ether::protocol::{Command, Message};
//! use bytes::Bytes;
//!
//! let msg = Message::with_payload(Command::Write, 7, Bytes::from_static(b"hello")).unwrap();
//! assert_eq!(msg.handle(), 7);
//! assert_eq!(msg.header.size, 5);
//! assert_eq!(msg.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{Command, Header, HEADER_SIZE};
use crate::error::{EtherError, Result};

/// A complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes, empty when the header carries none.
    pub payload: Bytes,
}

impl Message {
    /// Create a message from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// A message without payload whose `size` field is a parameter
    /// (ALLOC, READ) or zero.
    pub fn request(command: Command, handle: u64, size: u32) -> Self {
        Self::new(Header::new(command, handle, size), Bytes::new())
    }

    /// A message carrying `payload`, with `size` set to its length.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the payload does not fit the 32-bit
    /// size field.
    pub fn with_payload(command: Command, handle: u64, payload: Bytes) -> Result<Self> {
        let size = u32::try_from(payload.len()).map_err(|_| {
            EtherError::InvalidArgument(format!("payload of {} bytes", payload.len()))
        })?;
        Ok(Self::new(Header::new(command, handle, size), payload))
    }

    /// PONG response.
    pub fn pong() -> Self {
        Self::request(Command::Pong, 0, 0)
    }

    /// OK response without payload.
    pub fn ok(handle: u64) -> Self {
        Self::request(Command::Ok, handle, 0)
    }

    /// ERROR response. Carries nothing but the handle.
    pub fn error(handle: u64) -> Self {
        Self::request(Command::Error, handle, 0)
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the handle field.
    #[inline]
    pub fn handle(&self) -> u64 {
        self.header.handle
    }

    /// Known command, `None` for an unrecognized byte.
    #[inline]
    pub fn command(&self) -> Option<Command> {
        self.header.command()
    }

    /// Check if this is an OK response.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.header.is_ok()
    }

    /// Check if this is an ERROR response.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.header.is_error()
    }

    /// Total bytes on the wire.
    #[inline]
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Build a complete message as a single byte vector.
///
/// # Example
///
/// ```
/// use ether::protocol::{build_frame, Command, Message, HEADER_SIZE};
///
/// let msg = Message::request(Command::Ping, 0, 0);
/// assert_eq!(build_frame(&msg).len(), HEADER_SIZE);
/// ```
pub fn build_frame(message: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(message.wire_len());
    buf.extend_from_slice(&message.header.encode());
    buf.extend_from_slice(&message.payload);
    buf
}
