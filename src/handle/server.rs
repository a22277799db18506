//! Server-side handle table.

use std::collections::HashMap;

use super::Handle;
use crate::allocator::Region;

/// Default ceiling on live handles.
pub const DEFAULT_MAX_HANDLES: usize = 1024;

/// One live mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleEntry {
    /// Block the handle stands for.
    pub region: Region,
    /// Block size cached for bounds checks.
    pub size: usize,
}

/// Maps issued handles to allocator regions.
///
/// Handles are assigned from a counter that only increases, so a removed
/// handle never comes back naming a different block. Removing an entry does
/// not release the block; the caller releases first, then removes.
#[derive(Debug)]
pub struct HandleTable {
    entries: HashMap<Handle, HandleEntry>,
    next_handle: u64,
    max_entries: usize,
}

impl HandleTable {
    /// Create a table holding at most [`DEFAULT_MAX_HANDLES`] entries.
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_MAX_HANDLES)
    }

    /// Create a table holding at most `max_entries` entries.
    pub fn with_capacity_limit(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            next_handle: 1,
            max_entries,
        }
    }

    /// Assign the next handle to `region`.
    ///
    /// Returns `None` when the table is full or the counter is exhausted.
    pub fn store(&mut self, region: Region, size: usize) -> Option<Handle> {
        if self.entries.len() >= self.max_entries {
            tracing::warn!(max = self.max_entries, "handle table full");
            return None;
        }

        let handle = Handle::new(self.next_handle)?;
        self.next_handle = self.next_handle.checked_add(1)?;
        self.entries.insert(handle, HandleEntry { region, size });
        Some(handle)
    }

    /// Look up a raw handle value. 0 is never found.
    pub fn lookup(&self, raw: u64) -> Option<HandleEntry> {
        let handle = Handle::new(raw)?;
        self.entries.get(&handle).copied()
    }

    /// Drop a mapping. Returns `false` if the handle was not live.
    pub fn remove(&mut self, raw: u64) -> bool {
        Handle::new(raw).is_some_and(|handle| self.entries.remove(&handle).is_some())
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no handle is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured entry ceiling.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Live mappings, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &HandleEntry)> {
        self.entries.iter().map(|(h, e)| (*h, e))
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::BlockAllocator;

    #[test]
    fn test_handles_start_at_one_and_increase() {
        let mut alloc = BlockAllocator::new();
        let mut table = HandleTable::new();

        let h1 = table.store(alloc.allocate(1).unwrap(), 1).unwrap();
        let h2 = table.store(alloc.allocate(2).unwrap(), 2).unwrap();
        assert_eq!(h1.get(), 1);
        assert_eq!(h2.get(), 2);
    }

    #[test]
    fn test_lookup_and_remove() {
        let mut alloc = BlockAllocator::new();
        let mut table = HandleTable::new();
        let region = alloc.allocate(10).unwrap();
        let handle = table.store(region, 10).unwrap();

        assert_eq!(
            table.lookup(handle.get()),
            Some(HandleEntry { region, size: 10 })
        );
        assert!(table.remove(handle.get()));
        assert!(table.lookup(handle.get()).is_none());
        assert!(!table.remove(handle.get()));

        // Removing the mapping does not release the block.
        assert!(alloc.is_valid(region));
    }

    #[test]
    fn test_zero_never_found() {
        let table = HandleTable::new();
        assert!(table.lookup(0).is_none());
    }

    #[test]
    fn test_removed_handle_not_reassigned() {
        let mut alloc = BlockAllocator::new();
        let mut table = HandleTable::with_capacity_limit(1);

        let first = table.store(alloc.allocate(1).unwrap(), 1).unwrap();
        table.remove(first.get());
        let second = table.store(alloc.allocate(1).unwrap(), 1).unwrap();

        assert_ne!(first, second);
        assert!(table.lookup(first.get()).is_none());
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut alloc = BlockAllocator::new();
        let mut table = HandleTable::with_capacity_limit(2);

        table.store(alloc.allocate(1).unwrap(), 1).unwrap();
        let h = table.store(alloc.allocate(1).unwrap(), 1).unwrap();
        assert!(table.store(alloc.allocate(1).unwrap(), 1).is_none());
        assert_eq!(table.len(), 2);

        table.remove(h.get());
        assert!(table.store(alloc.allocate(1).unwrap(), 1).is_some());
    }
}
