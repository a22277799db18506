//! Handle tables - the indirection between callers and memory.
//!
//! - [`HandleTable`] lives on the server and maps issued handles to live
//!   allocator regions
//! - [`HandleCache`] lives in the client and maps the tokens given to the
//!   application to the remote handles they stand for
//!
//! Both are hash maps with a configurable entry ceiling; reaching it is
//! reported to the caller instead of growing further.

mod client;
mod server;

use std::fmt;
use std::num::NonZeroU64;

pub use client::{CacheEntry, HandleCache, LocalToken, DEFAULT_MAX_CACHE_ENTRIES};
pub use server::{HandleEntry, HandleTable, DEFAULT_MAX_HANDLES};

/// Opaque server-issued identifier for a block. Never 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroU64);

impl Handle {
    /// Wrap a raw value, `None` for the reserved value 0.
    #[inline]
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Raw wire value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.get())
    }
}

impl From<Handle> for u64 {
    fn from(handle: Handle) -> u64 {
        handle.get()
    }
}
