//! Per-connection request loop.
//!
//! A connection walks through explicit phases:
//!
//! ```text
//! AwaitingHeader -> AwaitingPayload -> Dispatching -> Responding -> AwaitingHeader
//!        |                 |
//!        +-----------------+--> Closed
//! ```
//!
//! A header that fails validation is logged and skipped; no response is
//! sent and the loop waits for the next header. This can desynchronize the
//! stream if the peer actually sent a payload behind the bad header.

use tokio::io::{AsyncRead, AsyncWrite};

use super::state::ServerState;
use crate::error::{EtherError, Result};
use crate::protocol::{read_header, read_payload, write_message, Header, Message};

enum Phase {
    AwaitingHeader,
    AwaitingPayload(Header),
    Dispatching(Message),
    Responding(Message),
    Closed,
}

/// One client connection, processed strictly request-then-response.
pub struct Connection<S> {
    stream: S,
    max_payload_size: u32,
    served: u64,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an accepted stream.
    pub fn new(stream: S, max_payload_size: u32) -> Self {
        Self {
            stream,
            max_payload_size,
            served: 0,
        }
    }

    /// Number of requests answered so far.
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Serve requests until the peer disconnects.
    ///
    /// Returns `Ok(())` on orderly or mid-message disconnect. Errors are
    /// transport failures other than end-of-stream.
    pub async fn run(&mut self, state: &mut ServerState) -> Result<()> {
        let mut phase = Phase::AwaitingHeader;

        loop {
            phase = match phase {
                Phase::AwaitingHeader => match read_header(&mut self.stream).await? {
                    None => Phase::Closed,
                    Some(header) => match header.validate(self.max_payload_size) {
                        Ok(()) => Phase::AwaitingPayload(header),
                        Err(e) => {
                            tracing::warn!(%header, error = %e, "dropping invalid header");
                            Phase::AwaitingHeader
                        }
                    },
                },
                Phase::AwaitingPayload(header) => {
                    match read_payload(&mut self.stream, header.payload_len()).await {
                        Ok(payload) => Phase::Dispatching(Message::new(header, payload)),
                        Err(EtherError::ConnectionClosed) => {
                            tracing::debug!(%header, "peer closed before payload completed");
                            Phase::Closed
                        }
                        Err(e) => return Err(e),
                    }
                }
                Phase::Dispatching(request) => {
                    tracing::debug!(header = %request.header, "request");
                    Phase::Responding(state.dispatch(&request))
                }
                Phase::Responding(response) => {
                    write_message(&mut self.stream, &response).await?;
                    self.served += 1;
                    Phase::AwaitingHeader
                }
                Phase::Closed => return Ok(()),
            };
        }
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}
