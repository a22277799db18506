//! Protocol module - wire format, messages and stream framing.
//!
//! This module implements the binary protocol:
//! - 24-byte header encoding/decoding and validation
//! - Message struct with typed accessors
//! - Read-exactly / write-all helpers over any async byte stream

mod message;
mod stream;
mod wire_format;

pub use message::{build_frame, Message};
pub use stream::{read_header, read_message, read_payload, write_message};
pub use wire_format::{
    decode_header, encode_header, validate_header, Command, Header, DEFAULT_PORT, HEADER_SIZE,
    MAGIC, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION,
};
