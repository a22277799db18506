//! Server state and command dispatch.
//!
//! [`ServerState`] owns the allocator and the handle table for the whole
//! daemon. It is created at startup and handed to each connection in turn;
//! since connections are served one at a time no locking is involved. Any
//! move to concurrent connections has to put the state behind a single
//! mutex (one critical section per dispatch) or an actor.

use bytes::Bytes;

use super::ServerConfig;
use crate::allocator::{AllocStats, BlockAllocator};
use crate::error::EtherError;
use crate::handle::HandleTable;
use crate::protocol::{Command, Message};

/// Allocator plus handle table, shared by every connection.
#[derive(Debug)]
pub struct ServerState {
    allocator: BlockAllocator,
    handles: HandleTable,
}

impl ServerState {
    /// Create empty state sized by `config`.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            allocator: BlockAllocator::with_config(config.allocator.clone()),
            handles: HandleTable::with_capacity_limit(config.max_handles),
        }
    }

    /// The allocator.
    pub fn allocator(&self) -> &BlockAllocator {
        &self.allocator
    }

    /// The handle table.
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Allocator counters.
    pub fn statistics(&self) -> AllocStats {
        self.allocator.statistics()
    }

    /// Answer one validated request.
    ///
    /// Every failure becomes an ERROR response carrying the request's
    /// handle (0 where none applies); no detail reaches the wire.
    pub fn dispatch(&mut self, request: &Message) -> Message {
        let header = &request.header;
        match header.command() {
            Some(Command::Ping) => {
                tracing::debug!("PING received");
                Message::pong()
            }
            Some(Command::Alloc) => self.alloc(header.size as usize),
            Some(Command::Free) => self.free(header.handle),
            Some(Command::Write) => self.write(header.handle, &request.payload),
            Some(Command::Read) => self.read(header.handle, header.size as usize),
            _ => {
                tracing::warn!(command = header.command, "unsupported command");
                Message::error(0)
            }
        }
    }

    fn alloc(&mut self, size: usize) -> Message {
        let region = match self.allocator.allocate(size) {
            Ok(region) => region,
            Err(e) => {
                tracing::debug!(size, error = %e, "ALLOC failed");
                return Message::error(0);
            }
        };

        match self.handles.store(region, size) {
            Some(handle) => {
                tracing::debug!(%handle, size, "ALLOC OK");
                Message::ok(handle.get())
            }
            None => {
                let _ = self.allocator.release(region);
                Message::error(0)
            }
        }
    }

    fn free(&mut self, handle: u64) -> Message {
        let Some(entry) = self.handles.lookup(handle) else {
            tracing::debug!(handle, "FREE failed: handle not found");
            return Message::error(handle);
        };

        // Release before unmapping; release failures are logged by the
        // allocator and do not change the reply.
        let _ = self.allocator.release(entry.region);
        self.handles.remove(handle);
        tracing::debug!(handle, "FREE OK");
        Message::ok(handle)
    }

    fn write(&mut self, handle: u64, payload: &[u8]) -> Message {
        let Some(entry) = self.handles.lookup(handle) else {
            return Message::error(handle);
        };

        if payload.len() > entry.size {
            tracing::debug!(handle, len = payload.len(), size = entry.size, "WRITE failed: overflow");
            return Message::error(handle);
        }

        match self.allocator.write(entry.region, payload) {
            Ok(()) => Message::ok(handle),
            Err(e) => {
                tracing::debug!(handle, error = %e, "WRITE failed");
                Message::error(handle)
            }
        }
    }

    fn read(&mut self, handle: u64, len: usize) -> Message {
        let Some(entry) = self.handles.lookup(handle) else {
            return Message::error(handle);
        };

        // Over-long reads return what exists.
        let len = len.min(entry.size);
        let mut buf = vec![0u8; len];
        if let Err(e) = self.allocator.read(entry.region, &mut buf) {
            tracing::debug!(handle, error = %e, "READ failed");
            return Message::error(handle);
        }

        Message::with_payload(Command::Ok, handle, Bytes::from(buf))
            .unwrap_or_else(|_: EtherError| Message::error(handle))
    }

    /// Release every block still mapped. Returns how many were reclaimed.
    pub fn release_all(&mut self) -> usize {
        let live: Vec<(u64, _)> = self
            .handles
            .iter()
            .map(|(handle, entry)| (handle.get(), entry.region))
            .collect();

        for (handle, region) in &live {
            let _ = self.allocator.release(*region);
            self.handles.remove(*handle);
        }
        live.len()
    }
}
