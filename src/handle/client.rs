//! Client-side handle cache with write-through mirrors.

use std::collections::HashMap;
use std::fmt;

use super::Handle;

/// Default ceiling on cached blocks per client.
pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 4096;

/// Token handed to the application in place of a remote block.
///
/// Tokens are only meaningful to the cache that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalToken(u64);

impl LocalToken {
    /// Raw token value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token#{}", self.0)
    }
}

/// One remote block as seen by the client.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Handle known to the server.
    pub remote_handle: Handle,
    /// Block size.
    pub size: usize,
    /// Last bytes written through this client. Not authoritative.
    pub mirror: Vec<u8>,
}

/// Maps local tokens to remote handles.
#[derive(Debug)]
pub struct HandleCache {
    entries: HashMap<LocalToken, CacheEntry>,
    next_token: u64,
    max_entries: usize,
}

impl HandleCache {
    /// Create a cache holding at most [`DEFAULT_MAX_CACHE_ENTRIES`] entries.
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_MAX_CACHE_ENTRIES)
    }

    /// Create a cache holding at most `max_entries` entries.
    pub fn with_capacity_limit(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            next_token: 1,
            max_entries,
        }
    }

    /// Record a new remote block and issue a token for it.
    ///
    /// The mirror starts zeroed, matching the server's fresh block.
    /// Returns `None` when the cache is full.
    pub fn store(&mut self, remote_handle: Handle, size: usize) -> Option<LocalToken> {
        if self.entries.len() >= self.max_entries {
            return None;
        }

        let token = LocalToken(self.next_token);
        self.next_token = self.next_token.checked_add(1)?;
        self.entries.insert(
            token,
            CacheEntry {
                remote_handle,
                size,
                mirror: vec![0; size],
            },
        );
        Some(token)
    }

    /// Remote handle and size for a token.
    pub fn lookup(&self, token: LocalToken) -> Option<(Handle, usize)> {
        self.entries
            .get(&token)
            .map(|entry| (entry.remote_handle, entry.size))
    }

    /// Full entry for a token.
    pub fn entry(&self, token: LocalToken) -> Option<&CacheEntry> {
        self.entries.get(&token)
    }

    /// Overwrite the start of the mirror with bytes just written remotely.
    ///
    /// Returns `false` if the token is unknown or `data` is longer than the
    /// block.
    pub fn update_mirror(&mut self, token: LocalToken, data: &[u8]) -> bool {
        match self.entries.get_mut(&token) {
            Some(entry) if data.len() <= entry.size => {
                entry.mirror[..data.len()].copy_from_slice(data);
                true
            }
            _ => false,
        }
    }

    /// Forget a token. It is invalid for every later operation.
    pub fn remove(&mut self, token: LocalToken) -> Option<CacheEntry> {
        self.entries.remove(&token)
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HandleCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(raw: u64) -> Handle {
        Handle::new(raw).unwrap()
    }

    #[test]
    fn test_store_lookup_remove() {
        let mut cache = HandleCache::new();
        let token = cache.store(handle(9), 16).unwrap();

        assert_eq!(cache.lookup(token), Some((handle(9), 16)));
        assert_eq!(cache.entry(token).unwrap().mirror, vec![0; 16]);

        let removed = cache.remove(token).unwrap();
        assert_eq!(removed.remote_handle, handle(9));
        assert!(cache.lookup(token).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tokens_are_distinct() {
        let mut cache = HandleCache::new();
        let a = cache.store(handle(1), 1).unwrap();
        let b = cache.store(handle(1), 1).unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_update_mirror() {
        let mut cache = HandleCache::new();
        let token = cache.store(handle(3), 8).unwrap();

        assert!(cache.update_mirror(token, b"hi"));
        assert_eq!(&cache.entry(token).unwrap().mirror[..], b"hi\0\0\0\0\0\0");

        assert!(!cache.update_mirror(token, b"way too long"));
        assert_eq!(&cache.entry(token).unwrap().mirror[..2], b"hi");
    }

    #[test]
    fn test_update_mirror_unknown_token() {
        let mut cache = HandleCache::new();
        let token = cache.store(handle(3), 8).unwrap();
        cache.remove(token);
        assert!(!cache.update_mirror(token, b"x"));
    }

    #[test]
    fn test_capacity_limit() {
        let mut cache = HandleCache::with_capacity_limit(1);
        cache.store(handle(1), 1).unwrap();
        assert!(cache.store(handle(2), 1).is_none());
    }
}
