//! Block storage: metadata and payload held together as one value.
//!
//! A block never exposes an address. Callers get a [`Region`], which names
//! an arena slot plus the generation the slot had when the block was
//! created. Releasing a block leaves a [`Block::Freed`] tombstone in its slot
//! until the slot is reused under a new generation.

/// Opaque reference to an allocator-managed block.
///
/// Only a [`BlockAllocator`](super::BlockAllocator) can produce one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub(crate) owner: u32,
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Distinguishes an allocated block from one already released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityTag {
    Live,
    Freed,
}

/// Metadata attached to every live block.
///
/// `requested_size <= capacity` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Bytes the caller asked for; reads and writes are checked against it.
    pub requested_size: usize,
    /// Bytes physically reserved.
    pub capacity: usize,
}

#[derive(Debug)]
pub(crate) enum Block {
    /// `data.len() == header.capacity`.
    Live { header: BlockHeader, data: Vec<u8> },
    Freed,
}

impl Block {
    pub(crate) fn tag(&self) -> ValidityTag {
        match self {
            Block::Live { .. } => ValidityTag::Live,
            Block::Freed => ValidityTag::Freed,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) block: Block,
}
