//! Server builder and accept loop.
//!
//! The [`ServerBuilder`] collects configuration and binds the listener.
//! The [`Server`] then runs the lifecycle:
//! 1. Accept one connection
//! 2. Serve it until the peer disconnects
//! 3. Go back to accepting
//!
//! Connections are handled strictly one after another; a second client
//! waits in the accept backlog until the first one leaves. All of them
//! share one [`ServerState`], so handles survive reconnects.
//!
//! # Example
//!
//! ```ignore
//! use ether::Server;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> ether::Result<()> {
//!     let mut server = Server::builder()
//!         .bind("127.0.0.1:9999")
//!         .max_handles(512)
//!         .build()
//!         .await?;
//!
//!     server.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//!     let stats = server.shutdown();
//!     println!("{}", stats.peak_usage);
//!     Ok(())
//! }
//! ```

mod connection;
mod state;

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

pub use connection::Connection;
pub use state::ServerState;

use crate::allocator::{AllocStats, AllocatorConfig};
use crate::error::Result;
use crate::handle::DEFAULT_MAX_HANDLES;
use crate::protocol::{DEFAULT_PORT, MAX_PAYLOAD_SIZE};
use crate::transport::Listener;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Ceiling on simultaneously mapped handles.
    pub max_handles: usize,
    /// Largest accepted header `size` field.
    pub max_payload_size: u32,
    /// Allocator settings.
    pub allocator: AllocatorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_handles: DEFAULT_MAX_HANDLES,
            max_payload_size: MAX_PAYLOAD_SIZE,
            allocator: AllocatorConfig::default(),
        }
    }
}

/// Builder for configuring and binding a server.
pub struct ServerBuilder {
    addr: String,
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder listening on `127.0.0.1:9999`.
    pub fn new() -> Self {
        Self {
            addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            config: ServerConfig::default(),
        }
    }

    /// Set the listen address (`host:port`). Port 0 picks a free port.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the handle table ceiling.
    ///
    /// Default: 1024
    pub fn max_handles(mut self, limit: usize) -> Self {
        self.config.max_handles = limit;
        self
    }

    /// Set the maximum payload accepted in a single message.
    ///
    /// Default: 16 MiB
    pub fn max_payload_size(mut self, limit: u32) -> Self {
        self.config.max_payload_size = limit;
        self
    }

    /// Cap the total bytes outstanding in the allocator.
    pub fn memory_limit(mut self, limit: Option<usize>) -> Self {
        self.config.allocator.memory_limit = limit;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind the listener and create empty server state.
    pub async fn build(self) -> Result<Server> {
        let listener = Listener::bind(self.addr.as_str()).await?;
        let state = ServerState::new(&self.config);
        tracing::info!(
            addr = %listener.local_addr()?,
            max_handles = self.config.max_handles,
            max_payload_size = self.config.max_payload_size,
            "server listening"
        );
        Ok(Server {
            listener,
            state,
            config: self.config,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

enum Outcome {
    Finished(Result<()>),
    Shutdown,
}

/// A bound server.
pub struct Server {
    listener: Listener,
    state: ServerState,
    config: ServerConfig,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Effective configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared allocator and handle table.
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Serve one already-connected stream to completion.
    ///
    /// Returns the number of requests answered.
    pub async fn serve_connection<S>(&mut self, stream: S) -> Result<u64>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut conn = Connection::new(stream, self.config.max_payload_size);
        conn.run(&mut self.state).await?;
        Ok(conn.served())
    }

    /// Accept and serve connections until `shutdown` completes.
    ///
    /// Shutdown is honored both while waiting for a client and while
    /// serving one; in the latter case the connection is dropped at the
    /// next await point.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            tracing::info!(%peer, "client connected");

            let mut conn = Connection::new(stream, self.config.max_payload_size);
            let outcome = tokio::select! {
                _ = &mut shutdown => Outcome::Shutdown,
                result = conn.run(&mut self.state) => Outcome::Finished(result),
            };

            match outcome {
                Outcome::Shutdown => {
                    tracing::info!(%peer, served = conn.served(), "shutdown requested, dropping client");
                    return Ok(());
                }
                Outcome::Finished(Ok(())) => {
                    tracing::info!(%peer, served = conn.served(), "client disconnected");
                }
                Outcome::Finished(Err(e)) => {
                    tracing::warn!(%peer, served = conn.served(), error = %e, "connection failed");
                }
            }
        }
    }

    /// Tear down: log allocator state, release every mapped block and
    /// return the final counters.
    pub fn shutdown(mut self) -> AllocStats {
        self.state.allocator().dump_state();
        let released = self.state.release_all();
        let stats = self.state.statistics();
        tracing::info!(
            released,
            peak_usage = stats.peak_usage,
            num_allocs = stats.num_allocs,
            num_frees = stats.num_frees,
            "server stopped"
        );
        stats
    }
}
