//! Client for a remote memory daemon.
//!
//! The [`Client`] turns each call into one request, waits for the matching
//! response and keeps a [`HandleCache`] of the blocks it owns. The
//! application only ever sees [`LocalToken`]s; the remote handles stay
//! inside the cache.
//!
//! Cache bookkeeping follows the server's answers:
//! - a successful ALLOC creates an entry
//! - a successful WRITE copies the sent bytes into the entry's mirror
//! - FREE removes the entry whatever the server answers
//!
//! # Example
//!
//! ```ignore
//! use ether::Client;
//!
//! let mut client = Client::connect("127.0.0.1:9999").await?;
//! client.ping().await?;
//!
//! let token = client.alloc(100).await?;
//! client.write(token, b"hello\0").await?;
//! let data = client.read(token, 6).await?;
//! assert_eq!(&data[..], b"hello\0");
//! client.free(token).await?;
//! ```

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::{EtherError, Result};
use crate::handle::{Handle, HandleCache, LocalToken, DEFAULT_MAX_CACHE_ENTRIES};
use crate::protocol::{read_message, write_message, Command, Message, MAX_PAYLOAD_SIZE};
use crate::transport;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Ceiling on blocks tracked locally.
    pub max_cache_entries: usize,
    /// Bound on the header `size` of requests sent and responses accepted.
    pub max_payload_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_cache_entries: DEFAULT_MAX_CACHE_ENTRIES,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

/// A connection to the daemon plus the local handle cache.
pub struct Client<S = TcpStream> {
    stream: S,
    cache: HandleCache,
    config: ClientConfig,
}

impl Client<TcpStream> {
    /// Connect over TCP with default configuration.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    /// Connect over TCP.
    pub async fn connect_with_config(
        addr: impl ToSocketAddrs,
        config: ClientConfig,
    ) -> Result<Self> {
        let stream = transport::connect(addr).await?;
        Ok(Self::with_stream(stream, config))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Use an already-connected stream.
    pub fn with_stream(stream: S, config: ClientConfig) -> Self {
        Self {
            stream,
            cache: HandleCache::with_capacity_limit(config.max_cache_entries),
            config,
        }
    }

    /// Send one request and wait for its response.
    async fn roundtrip(&mut self, request: &Message) -> Result<Message> {
        write_message(&mut self.stream, request).await?;
        let response = read_message(&mut self.stream, self.config.max_payload_size).await?;
        tracing::debug!(request = %request.header, response = %response.header, "roundtrip");
        Ok(response)
    }

    /// Liveness probe.
    pub async fn ping(&mut self) -> Result<()> {
        let response = self.roundtrip(&Message::request(Command::Ping, 0, 0)).await?;
        match response.command() {
            Some(Command::Pong) => Ok(()),
            _ => Err(EtherError::Protocol(format!(
                "expected PONG, got {}",
                response.header
            ))),
        }
    }

    /// Allocate a remote block of `size` bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `size` is 0 or above the payload bound; such a
    ///   request is never sent, since the server drops it without replying
    /// - `Rejected` if the server refused
    /// - `TableFull` if the local cache is full; the granted block is
    ///   freed on the server before returning
    pub async fn alloc(&mut self, size: usize) -> Result<LocalToken> {
        if size == 0 {
            return Err(EtherError::InvalidArgument(
                "allocation size must be greater than zero".to_string(),
            ));
        }
        let max = self.config.max_payload_size;
        let wire_size = u32::try_from(size)
            .ok()
            .filter(|&n| n <= max)
            .ok_or_else(|| {
                EtherError::InvalidArgument(format!(
                    "allocation of {} bytes exceeds maximum {}",
                    size, max
                ))
            })?;

        let response = self
            .roundtrip(&Message::request(Command::Alloc, 0, wire_size))
            .await?;
        if !response.is_ok() {
            return Err(EtherError::Rejected {
                command: Command::Alloc.name(),
                handle: response.handle(),
            });
        }

        let handle = Handle::new(response.handle())
            .ok_or_else(|| EtherError::Protocol("ALLOC answered OK without a handle".to_string()))?;

        match self.cache.store(handle, size) {
            Some(token) => {
                tracing::debug!(%token, %handle, size, "allocated");
                Ok(token)
            }
            None => {
                tracing::warn!(%handle, "local cache full, returning block to server");
                let release = self
                    .roundtrip(&Message::request(Command::Free, handle.get(), 0))
                    .await?;
                if !release.is_ok() {
                    tracing::warn!(%handle, "server refused to free unrecorded block");
                }
                Err(EtherError::TableFull)
            }
        }
    }

    /// Free a block. The token is invalid afterwards even if the server
    /// answers ERROR.
    pub async fn free(&mut self, token: LocalToken) -> Result<()> {
        let entry = self
            .cache
            .remove(token)
            .ok_or(EtherError::NotFound(token.get()))?;
        let handle = entry.remote_handle.get();

        let response = self
            .roundtrip(&Message::request(Command::Free, handle, 0))
            .await?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(EtherError::Rejected {
                command: Command::Free.name(),
                handle,
            })
        }
    }

    /// Write `data` at offset 0 of the block.
    ///
    /// Oversized writes are refused locally with `Overflow` and never reach
    /// the server.
    pub async fn write(&mut self, token: LocalToken, data: &[u8]) -> Result<()> {
        let (handle, size) = self
            .cache
            .lookup(token)
            .ok_or(EtherError::NotFound(token.get()))?;
        if data.len() > size {
            return Err(EtherError::Overflow {
                len: data.len(),
                size,
            });
        }

        let request = Message::with_payload(Command::Write, handle.get(), Bytes::copy_from_slice(data))?;
        let response = self.roundtrip(&request).await?;
        if !response.is_ok() {
            return Err(EtherError::Rejected {
                command: Command::Write.name(),
                handle: handle.get(),
            });
        }

        self.cache.update_mirror(token, data);
        Ok(())
    }

    /// Read up to `len` bytes from offset 0 of the block.
    ///
    /// The length is capped to the block size; the data always comes from
    /// the server, never from the mirror.
    pub async fn read(&mut self, token: LocalToken, len: usize) -> Result<Bytes> {
        let (handle, size) = self
            .cache
            .lookup(token)
            .ok_or(EtherError::NotFound(token.get()))?;
        let len = len.min(size);
        let wire_len = u32::try_from(len)
            .map_err(|_| EtherError::InvalidArgument(format!("read of {} bytes", len)))?;

        let response = self
            .roundtrip(&Message::request(Command::Read, handle.get(), wire_len))
            .await?;
        if !response.is_ok() {
            return Err(EtherError::Rejected {
                command: Command::Read.name(),
                handle: handle.get(),
            });
        }
        Ok(response.payload)
    }

    /// Size of the block behind `token`.
    pub fn size(&self, token: LocalToken) -> Option<usize> {
        self.cache.lookup(token).map(|(_, size)| size)
    }

    /// Bytes last written through this client.
    pub fn mirror(&self, token: LocalToken) -> Option<&[u8]> {
        self.cache.entry(token).map(|entry| entry.mirror.as_slice())
    }

    /// The local cache.
    pub fn cache(&self) -> &HandleCache {
        &self.cache
    }

    /// Effective configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}
