//! Block allocator with validated per-block metadata.
//!
//! Every allocation lives in an arena slot together with its
//! [`BlockHeader`]. Callers hold a [`Region`] and never an address, so a
//! region can only be checked, never dereferenced blindly:
//!
//! - a region from another allocator, or one that was never issued, fails
//!   with [`EtherError::Corrupt`]
//! - releasing a region twice fails with [`EtherError::DoubleFree`] and
//!   leaves the counters untouched
//! - reads and writes always start at offset 0 and are bounded by the
//!   block's requested size
//!
//! Slots are reused under a new generation. A region kept across 2^32
//! reuses of the same slot validates again; detection is not exhaustive.
//!
//! # Example
//!
//! ```
//! use ether::allocator::BlockAllocator;
//!
//! let mut alloc = BlockAllocator::new();
//! let region = alloc.allocate(16).unwrap();
//! alloc.write(region, b"hello").unwrap();
//!
//! let mut buf = [0u8; 5];
//! alloc.read(region, &mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//!
//! alloc.release(region).unwrap();
//! assert_eq!(alloc.statistics().current_usage, 0);
//! ```

mod block;
mod stats;

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

pub use block::{BlockHeader, Region, ValidityTag};
pub use stats::AllocStats;

use block::{Block, Slot};

use crate::error::{EtherError, Result};

static NEXT_ALLOCATOR_ID: AtomicU32 = AtomicU32::new(1);

/// Allocator configuration.
#[derive(Debug, Clone, Default)]
pub struct AllocatorConfig {
    /// Ceiling on outstanding bytes. `None` leaves only the system limit.
    pub memory_limit: Option<usize>,
}

/// Owns every block it hands out and the statistics about them.
#[derive(Debug)]
pub struct BlockAllocator {
    id: u32,
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    stats: AllocStats,
    // Bytes held by live blocks. Unlike `stats`, never reset.
    outstanding: usize,
    config: AllocatorConfig,
}

impl BlockAllocator {
    /// Create an allocator with no memory limit.
    pub fn new() -> Self {
        Self::with_config(AllocatorConfig::default())
    }

    /// Create an allocator with the given configuration.
    pub fn with_config(config: AllocatorConfig) -> Self {
        Self {
            id: NEXT_ALLOCATOR_ID.fetch_add(1, AtomicOrdering::Relaxed),
            slots: Vec::new(),
            free_slots: Vec::new(),
            stats: AllocStats::default(),
            outstanding: 0,
            config,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocate a zero-initialized block of `size` bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `size` is 0
    /// - `OutOfMemory` if the reservation fails or would exceed the
    ///   configured memory limit
    pub fn allocate(&mut self, size: usize) -> Result<Region> {
        if size == 0 {
            return Err(EtherError::InvalidArgument(
                "allocation size must be greater than zero".to_string(),
            ));
        }

        if let Some(limit) = self.config.memory_limit {
            if self.outstanding.saturating_add(size) > limit {
                tracing::debug!(size, limit, "alloc FAILED: memory limit reached");
                return Err(EtherError::OutOfMemory { requested: size });
            }
        }

        let mut data = Vec::new();
        if data.try_reserve_exact(size).is_err() {
            tracing::debug!(size, "alloc FAILED: reservation refused");
            return Err(EtherError::OutOfMemory { requested: size });
        }
        data.resize(size, 0);

        let block = Block::Live {
            header: BlockHeader {
                requested_size: size,
                capacity: size,
            },
            data,
        };

        let region = match self.free_slots.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.block = block;
                Region {
                    owner: self.id,
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| EtherError::OutOfMemory { requested: size })?;
                self.slots.push(Slot {
                    generation: 0,
                    block,
                });
                Region {
                    owner: self.id,
                    index,
                    generation: 0,
                }
            }
        };

        self.stats.record_alloc(size);
        self.outstanding += size;
        tracing::debug!(index = region.index, size, "alloc OK");
        Ok(region)
    }

    /// Release a block, wiping its bytes first.
    ///
    /// Passing `None` is a no-op. Failures are logged and returned; in both
    /// failure cases the block and the counters are left untouched.
    ///
    /// # Errors
    ///
    /// - `Corrupt` if the region was never issued by this allocator
    /// - `DoubleFree` if the region was already released
    pub fn release(&mut self, region: impl Into<Option<Region>>) -> Result<()> {
        let Some(region) = region.into() else {
            return Ok(());
        };

        match self.tag_of(region) {
            None => {
                tracing::error!(?region, "invalid free: region not managed by this allocator");
                return Err(EtherError::Corrupt);
            }
            Some(ValidityTag::Freed) => {
                tracing::error!(?region, "double free");
                return Err(EtherError::DoubleFree);
            }
            Some(ValidityTag::Live) => {}
        }

        let slot = &mut self.slots[region.index as usize];
        if let Block::Live { header, mut data } = std::mem::replace(&mut slot.block, Block::Freed)
        {
            data.fill(0);
            self.stats.record_free(header.capacity);
            self.outstanding -= header.capacity;
            self.free_slots.push(region.index);
            tracing::debug!(index = region.index, size = header.requested_size, "free OK");
        }
        Ok(())
    }

    /// Change the size of a block.
    ///
    /// - `resize(None, n)` allocates `n` bytes
    /// - `resize(Some(r), 0)` releases `r` and yields `None`
    /// - a new size within the block's capacity keeps the same region and
    ///   zeroes any newly exposed bytes
    /// - otherwise the contents move to a new block and the old one is
    ///   released; if the new allocation fails the original is unchanged
    pub fn resize(&mut self, region: Option<Region>, new_size: usize) -> Result<Option<Region>> {
        let Some(region) = region else {
            return self.allocate(new_size).map(Some);
        };

        if new_size == 0 {
            self.release(region)?;
            return Ok(None);
        }

        let (header, data) = self.live_mut(region)?;
        let old_size = header.requested_size;

        if new_size <= header.capacity {
            if new_size > old_size {
                data[old_size..new_size].fill(0);
            }
            header.requested_size = new_size;
            tracing::debug!(index = region.index, old_size, new_size, "realloc in place");
            return Ok(Some(region));
        }

        let new_region = self.allocate(new_size)?;
        let preserved = self.view(region)?[..old_size.min(new_size)].to_vec();
        self.write(new_region, &preserved)?;
        self.release(region)?;

        tracing::debug!(
            old = region.index,
            new = new_region.index,
            old_size,
            new_size,
            "realloc OK"
        );
        Ok(Some(new_region))
    }

    /// Copy `data` into the start of the block.
    ///
    /// # Errors
    ///
    /// - `Corrupt` if the region is not live
    /// - `Overflow` if `data` is longer than the block; nothing is written
    pub fn write(&mut self, region: Region, data: &[u8]) -> Result<()> {
        let (header, buf) = self.live_mut(region)?;
        if data.len() > header.requested_size {
            return Err(EtherError::Overflow {
                len: data.len(),
                size: header.requested_size,
            });
        }

        buf[..data.len()].copy_from_slice(data);
        tracing::debug!(index = region.index, len = data.len(), "write OK");
        Ok(())
    }

    /// Fill `buf` from the start of the block.
    ///
    /// # Errors
    ///
    /// - `Corrupt` if the region is not live
    /// - `Overflow` if `buf` is longer than the block
    pub fn read(&self, region: Region, buf: &mut [u8]) -> Result<()> {
        let (header, data) = self.live(region)?;
        if buf.len() > header.requested_size {
            return Err(EtherError::Overflow {
                len: buf.len(),
                size: header.requested_size,
            });
        }

        buf.copy_from_slice(&data[..buf.len()]);
        tracing::debug!(index = region.index, len = buf.len(), "read OK");
        Ok(())
    }

    /// Read-only view over the block's requested bytes.
    pub fn view(&self, region: Region) -> Result<&[u8]> {
        let (header, data) = self.live(region)?;
        Ok(&data[..header.requested_size])
    }

    /// Requested size of the block, 0 if the region is not live.
    pub fn size_of(&self, region: Region) -> usize {
        self.header(region).map_or(0, |h| h.requested_size)
    }

    /// Header of a live block.
    pub fn header(&self, region: Region) -> Option<BlockHeader> {
        self.live(region).ok().map(|(header, _)| *header)
    }

    /// Validity tag for a region, `None` if it was never issued here.
    pub fn tag_of(&self, region: Region) -> Option<ValidityTag> {
        if region.owner != self.id {
            return None;
        }
        let slot = self.slots.get(region.index as usize)?;
        match region.generation.cmp(&slot.generation) {
            Ordering::Equal => Some(slot.block.tag()),
            Ordering::Less => Some(ValidityTag::Freed),
            Ordering::Greater => None,
        }
    }

    /// Check if the region names a live block of this allocator.
    #[inline]
    pub fn is_valid(&self, region: Region) -> bool {
        self.tag_of(region) == Some(ValidityTag::Live)
    }

    /// Number of live blocks.
    pub fn live_blocks(&self) -> usize {
        self.slots.len() - self.free_slots.len()
    }

    /// Snapshot of the counters.
    pub fn statistics(&self) -> AllocStats {
        self.stats
    }

    /// Zero every counter. Live blocks, and the bytes they count against
    /// the memory limit, are not affected.
    pub fn reset_statistics(&mut self) {
        self.stats = AllocStats::default();
    }

    /// Log the counters at info level.
    pub fn dump_state(&self) {
        let s = &self.stats;
        tracing::info!(
            total_allocated = s.total_allocated,
            total_freed = s.total_freed,
            current_usage = s.current_usage,
            peak_usage = s.peak_usage,
            num_allocs = s.num_allocs,
            num_frees = s.num_frees,
            live_blocks = self.live_blocks(),
            "allocator state"
        );
    }

    fn live(&self, region: Region) -> Result<(&BlockHeader, &Vec<u8>)> {
        if !self.is_valid(region) {
            return Err(EtherError::Corrupt);
        }
        match &self.slots[region.index as usize].block {
            Block::Live { header, data } => Ok((header, data)),
            Block::Freed => Err(EtherError::Corrupt),
        }
    }

    fn live_mut(&mut self, region: Region) -> Result<(&mut BlockHeader, &mut Vec<u8>)> {
        if !self.is_valid(region) {
            return Err(EtherError::Corrupt);
        }
        match &mut self.slots[region.index as usize].block {
            Block::Live { header, data } => Ok((header, data)),
            Block::Freed => Err(EtherError::Corrupt),
        }
    }
}

impl Default for BlockAllocator {
    fn default() -> Self {
        Self::new()
    }
}
