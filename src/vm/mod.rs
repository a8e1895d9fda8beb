//! The interfaces the heuristics consume from the rest of the collector.
//!
//! The heuristics never own heap state. They read it through [`Heap`] and, for partial
//! cycles, through a [`ConnectionMatrix`] maintained by the barriers.
//! All the reads may race with allocating threads: a stale value only delays a decision
//! to the next poll.

use crate::policy::region::RegionSnapshot;

/// The heap, as seen by the heuristics.
pub trait Heap {
    /// The maximum heap size in bytes.
    fn capacity(&self) -> usize;
    /// Bytes currently in use.
    fn used(&self) -> usize;
    /// Bytes in use when the last cycle ended.
    fn used_at_last_cycle(&self) -> usize;
    /// Bytes allocated by mutators since the last cycle ended.
    fn bytes_allocated_since_last_cycle(&self) -> usize;
    /// Bytes the free set can still hand out.
    fn free_available(&self) -> usize;
    fn num_regions(&self) -> usize;
    fn region_size(&self) -> usize;
    /// A snapshot of region `index`. Only meaningful at a safepoint.
    fn region(&self, index: usize) -> RegionSnapshot;
    /// A previous cycle left forwarded objects behind and has not finished updating references.
    fn has_forwarded_objects(&self) -> bool;
    /// The allocation sequence number current when the last cycle ended.
    fn alloc_seq_at_last_cycle_end(&self) -> u64 {
        0
    }
}

/// Records which regions hold references into which other regions.
pub trait ConnectionMatrix {
    /// The number of regions that reference region `to`.
    fn count_connected_to(&self, to: usize, num_regions: usize) -> usize;

    /// Write the regions that reference region `to` into `from_idxs`. Gives up and returns
    /// `None` if there are more than `threshold` of them. Otherwise returns how many were written.
    fn enumerate_connected_to(
        &self,
        to: usize,
        num_regions: usize,
        from_idxs: &mut [usize],
        threshold: usize,
    ) -> Option<usize>;
}
