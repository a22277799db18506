//! Wire format encoding and decoding.
//!
//! Implements the 24-byte header format:
//! ```text
//! ┌──────────┬─────────┬─────────┬─────────┬──────────┬──────────┬──────────┐
//! │ Magic    │ Version │ Command │ Flags   │ Handle   │ Size     │ Reserved │
//! │ 4 bytes  │ 1 byte  │ 1 byte  │ 2 bytes │ 8 bytes  │ 4 bytes  │ 4 bytes  │
//! │ uint32 BE│         │         │ u16 BE  │ u64 BE   │ u32 BE   │ u32 BE   │
//! └──────────┴─────────┴─────────┴─────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The payload, when there is one,
//! follows the header immediately with no padding.

use std::fmt;

use crate::error::{EtherError, Result};

/// Header size in bytes (fixed, exactly 24).
pub const HEADER_SIZE: usize = 24;

/// Sentinel at the start of every header.
pub const MAGIC: u32 = 0xE7E7_E7E7;

/// The only protocol version spoken.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Default daemon port.
pub const DEFAULT_PORT: u16 = 9999;

/// Command vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Health check request.
    Ping = 0x01,
    /// Health check response.
    Pong = 0x02,
    /// Allocate `size` bytes.
    Alloc = 0x10,
    /// Release the block behind `handle`.
    Free = 0x11,
    /// Reserved; the server answers ERROR.
    Realloc = 0x12,
    /// Write the payload to the start of the block.
    Write = 0x20,
    /// Read up to `size` bytes from the start of the block.
    Read = 0x21,
    /// Success response.
    Ok = 0xF0,
    /// Failure response.
    Error = 0xFF,
}

impl Command {
    /// Wire code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Upper-case command name.
    pub fn name(self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Pong => "PONG",
            Command::Alloc => "ALLOC",
            Command::Free => "FREE",
            Command::Realloc => "REALLOC",
            Command::Write => "WRITE",
            Command::Read => "READ",
            Command::Ok => "OK",
            Command::Error => "ERROR",
        }
    }

    /// Whether the `size` field is the payload length.
    ///
    /// ALLOC, READ and REALLOC use `size` as the requested byte count and
    /// are never followed by a payload.
    ///
    /// The reader relies on this to find the next header. When a header
    /// fails validation its payload, if any, is not consumed, so the
    /// stream may lose alignment; no resynchronization is attempted.
    #[inline]
    pub fn size_is_payload(self) -> bool {
        !matches!(self, Command::Alloc | Command::Read | Command::Realloc)
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, u8> {
        Ok(match code {
            0x01 => Command::Ping,
            0x02 => Command::Pong,
            0x10 => Command::Alloc,
            0x11 => Command::Free,
            0x12 => Command::Realloc,
            0x20 => Command::Write,
            0x21 => Command::Read,
            0xF0 => Command::Ok,
            0xFF => Command::Error,
            other => return Err(other),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded header from wire format.
///
/// `command` is kept as the raw byte so unknown commands survive a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Must equal [`MAGIC`].
    pub magic: u32,
    /// Must equal [`PROTOCOL_VERSION`].
    pub version: u8,
    /// Raw command byte (see [`Command`]).
    pub command: u8,
    /// Reserved, zero.
    pub flags: u16,
    /// Block handle, 0 when none applies.
    pub handle: u64,
    /// Payload length, or the requested byte count for ALLOC/READ.
    pub size: u32,
    /// Reserved, zero.
    pub reserved: u32,
}

impl Header {
    /// Create a header with the current magic and version.
    pub fn new(command: Command, handle: u64, size: u32) -> Self {
        Self {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            command: command.code(),
            flags: 0,
            handle,
            size,
            reserved: 0,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use ether::protocol::{Command, Header, HEADER_SIZE};
    ///
    /// let header = Header::new(Command::Alloc, 0, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(&bytes[..4], &[0xE7, 0xE7, 0xE7, 0xE7]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (24 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4] = self.version;
        buf[5] = self.command;
        buf[6..8].copy_from_slice(&self.flags.to_be_bytes());
        buf[8..16].copy_from_slice(&self.handle.to_be_bytes());
        buf[16..20].copy_from_slice(&self.size.to_be_bytes());
        buf[20..24].copy_from_slice(&self.reserved.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short. No validation is applied.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let bytes: &[u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }

    /// Decode an exactly-sized header.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut handle = [0u8; 8];
        handle.copy_from_slice(&buf[8..16]);
        Self {
            magic: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            version: buf[4],
            command: buf[5],
            flags: u16::from_be_bytes([buf[6], buf[7]]),
            handle: u64::from_be_bytes(handle),
            size: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
            reserved: u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]),
        }
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Magic equals the sentinel
    /// - Version is supported
    /// - Size doesn't exceed max
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.magic != MAGIC {
            return Err(EtherError::Protocol(format!(
                "Bad magic {:#010x}",
                self.magic
            )));
        }

        if self.version != PROTOCOL_VERSION {
            return Err(EtherError::Protocol(format!(
                "Unsupported version {}",
                self.version
            )));
        }

        if self.size > max_payload_size {
            return Err(EtherError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.size, max_payload_size
            )));
        }

        Ok(())
    }

    /// Known command, `None` for an unrecognized byte.
    #[inline]
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.command).ok()
    }

    /// Number of payload bytes following this header on the wire.
    ///
    /// Unknown commands are assumed to carry `size` bytes.
    #[inline]
    pub fn payload_len(&self) -> usize {
        match self.command() {
            Some(command) if !command.size_is_payload() => 0,
            _ => self.size as usize,
        }
    }

    /// Check if this is an OK response.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.command == Command::Ok.code()
    }

    /// Check if this is an ERROR response.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.command == Command::Error.code()
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command() {
            Some(command) => write!(f, "{}", command)?,
            None => write!(f, "UNKNOWN({:#04x})", self.command)?,
        }
        write!(
            f,
            " handle={:#x} size={} flags={:#06x}",
            self.handle, self.size, self.flags
        )?;
        if self.magic != MAGIC {
            write!(f, " magic={:#010x}(INVALID)", self.magic)?;
        }
        Ok(())
    }
}

/// Encode a header to bytes (standalone function).
#[inline]
pub fn encode_header(header: &Header) -> [u8; HEADER_SIZE] {
    header.encode()
}

/// Decode a header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8]) -> Option<Header> {
    Header::decode(buf)
}

/// Validate a header for protocol compliance (standalone function).
#[inline]
pub fn validate_header(header: &Header, max_payload_size: u32) -> Result<()> {
    header.validate(max_payload_size)
}
