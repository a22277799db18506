//! # ether
//!
//! Memory as a network resource.
//!
//! A daemon owns a pool of memory blocks and lets remote clients allocate,
//! write, read and free them through opaque handles. Callers never see an
//! address: the server maps each handle to an allocator region that
//! carries validated metadata, and the client maps its own local tokens to
//! those handles.
//!
//! ## Architecture
//!
//! - **Allocator** ([`allocator`]): blocks with size, capacity and a
//!   live/freed tag, plus usage statistics
//! - **Handles** ([`handle`]): server-side handle table and client-side cache
//! - **Data plane** ([`protocol`]): 24-byte big-endian header, optional
//!   payload, one response per request
//! - **Control plane** ([`control`]): `$ready` / `$stats` JSON lines on the
//!   daemon's stdout
//!
//! ## Example
//!
//! ```ignore
//! use ether::{Client, Server};
//!
//! let mut server = Server::builder().bind("127.0.0.1:0").build().await?;
//! let addr = server.local_addr()?;
//! tokio::spawn(async move { server.run_until(std::future::pending()).await });
//!
//! let mut client = Client::connect(addr).await?;
//! let token = client.alloc(64).await?;
//! client.write(token, b"hello").await?;
//! assert_eq!(&client.read(token, 5).await?[..], b"hello");
//! client.free(token).await?;
//! ```

pub mod allocator;
pub mod control;
pub mod error;
pub mod handle;
pub mod protocol;
pub mod server;
pub mod transport;

mod client;

pub use allocator::{AllocStats, AllocatorConfig, BlockAllocator};
pub use client::{Client, ClientConfig};
pub use error::{EtherError, Result};
pub use handle::{Handle, LocalToken};
pub use server::{Server, ServerBuilder, ServerConfig};
