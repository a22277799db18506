//! Aggregate allocator statistics.

use serde::Serialize;

/// Counters maintained by [`BlockAllocator`](super::BlockAllocator).
///
/// Byte counters are kept in terms of block capacity, so resizing a block
/// in place never moves them and releasing a block always returns exactly
/// what its allocation added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocStats {
    /// Total bytes ever allocated.
    pub total_allocated: usize,
    /// Total bytes ever freed.
    pub total_freed: usize,
    /// Bytes currently outstanding.
    pub current_usage: usize,
    /// Highest value `current_usage` has reached.
    pub peak_usage: usize,
    /// Number of successful allocations.
    pub num_allocs: usize,
    /// Number of successful releases.
    pub num_frees: usize,
}

impl AllocStats {
    pub(crate) fn record_alloc(&mut self, bytes: usize) {
        self.total_allocated += bytes;
        self.current_usage += bytes;
        self.num_allocs += 1;
        if self.current_usage > self.peak_usage {
            self.peak_usage = self.current_usage;
        }
    }

    // Saturating: counters may have been reset while blocks were live.
    pub(crate) fn record_free(&mut self, bytes: usize) {
        self.total_freed += bytes;
        self.current_usage = self.current_usage.saturating_sub(bytes);
        self.num_frees += 1;
    }
}
