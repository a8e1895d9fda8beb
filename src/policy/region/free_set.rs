//! The free set: regions that still have room for allocation, tracked as a bitmap with
//! tight leftmost/rightmost bounds.
//!
//! Mutators allocate from the low end of the heap, the collector allocates from the high end.
//! Humongous objects take the first run of empty regions from the low end.
//! A region that fails to satisfy a request is retired from the set immediately, so no
//! allocation rescans regions that are almost full.
//!
//! All the mutating operations take `&mut self`. The heap keeps the free set behind its heap
//! lock, so exclusive access is the lock.

use super::region_table::RegionTable;
use crate::util::conversions::*;
use enum_map::Enum;
use fixedbitset::FixedBitSet;

/// Who asks for memory, and how.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum)]
pub enum AllocType {
    /// A single object for a mutator, outside of any TLAB.
    Shared,
    /// A thread-local allocation buffer for a mutator.
    Tlab,
    /// A single object for the collector.
    SharedGc,
    /// A collector-local allocation buffer.
    Gclab,
}

impl AllocType {
    pub fn is_mutator_alloc(&self) -> bool {
        matches!(self, AllocType::Shared | AllocType::Tlab)
    }

    pub fn is_lab_alloc(&self) -> bool {
        matches!(self, AllocType::Tlab | AllocType::Gclab)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocRequest {
    pub size: usize,
    pub alloc_type: AllocType,
}

impl AllocRequest {
    pub fn new(size: usize, alloc_type: AllocType) -> Self {
        debug_assert!(size > 0);
        AllocRequest { size, alloc_type }
    }

    pub fn for_tlab(size: usize) -> Self {
        Self::new(size, AllocType::Tlab)
    }

    pub fn for_gclab(size: usize) -> Self {
        Self::new(size, AllocType::Gclab)
    }

    pub fn for_shared(size: usize) -> Self {
        Self::new(size, AllocType::Shared)
    }

    pub fn for_shared_gc(size: usize) -> Self {
        Self::new(size, AllocType::SharedGc)
    }
}

/// A successful allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// The region the allocation starts in. For humongous allocations, the start region.
    pub region: usize,
    /// Offset from the start of the heap.
    pub offset: usize,
    pub size: usize,
    /// The allocation went into a region that was empty before.
    pub in_new_region: bool,
}

/// The free set cannot satisfy the request. Recycling `regions` trash regions may help.
/// `regions` is 0 when recycling cannot help.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NeedsRecycle {
    pub regions: usize,
}

/// Reclaims trash regions on demand so that a failed allocation can be retried.
pub trait RecycleAssist {
    /// Recycle up to `count` regions into `free_set`. Returns the number of regions recycled.
    fn recycle_regions(
        &mut self,
        table: &mut RegionTable,
        free_set: &mut FreeSet,
        count: usize,
    ) -> usize;
}

/// Recycles trash regions in address order and puts them back into the free set.
#[derive(Default, Debug)]
pub struct TrashRecycler {
    pub recycled_regions: usize,
    /// Bytes that were in use in the recycled regions.
    pub reclaimed_bytes: usize,
}

impl RecycleAssist for TrashRecycler {
    fn recycle_regions(
        &mut self,
        table: &mut RegionTable,
        free_set: &mut FreeSet,
        count: usize,
    ) -> usize {
        let mut recycled = 0;
        for idx in 0..table.len() {
            if recycled == count {
                break;
            }
            if table[idx].state().is_trash() {
                self.reclaimed_bytes += table[idx].used();
                table[idx].recycle();
                free_set.add_region(table, idx);
                recycled += 1;
            }
        }
        self.recycled_regions += recycled;
        trace!("Recycled {} of {} requested trash regions", recycled, count);
        recycled
    }
}

/// Fragmentation figures for logging.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FreeSetStatus {
    pub free_regions: usize,
    pub available: usize,
    /// The largest number of contiguous empty free regions, in bytes.
    pub max_contiguous: usize,
    /// The largest free space in a single region.
    pub max_free_in_region: usize,
    /// 100 - the share of empty free regions that are in the largest contiguous run.
    pub external_fragmentation_percent: usize,
}

pub struct FreeSet {
    free: FixedBitSet,
    max: usize,
    /// The lowest free region, or `max` if the set is empty.
    leftmost: usize,
    /// The highest free region, or 0 if the set is empty.
    rightmost: usize,
    /// The free bytes of all the regions added since the last clear.
    capacity: usize,
    /// Bytes allocated (or retired) out of `capacity`.
    used: usize,
    /// Credit mutator allocations as live. Set while marking is in progress.
    implicit_live: bool,
}

impl FreeSet {
    pub fn new(max_regions: usize) -> Self {
        FreeSet {
            free: FixedBitSet::with_capacity(max_regions),
            max: max_regions,
            leftmost: max_regions,
            rightmost: 0,
            capacity: 0,
            used: 0,
            implicit_live: false,
        }
    }

    pub fn clear(&mut self) {
        self.free.clear();
        self.leftmost = self.max;
        self.rightmost = 0;
        self.capacity = 0;
        self.used = 0;
    }

    /// Add region `idx` with all its remaining free bytes.
    pub fn add_region(&mut self, table: &RegionTable, idx: usize) {
        debug_assert!(!self.is_free(idx), "Region {} is already free", idx);
        let region = &table[idx];
        debug_assert!(
            region.is_alloc_allowed(),
            "Region {} is {:?}",
            idx,
            region.state()
        );
        debug_assert!(region.free() > 0, "Region {} is full", idx);
        self.free.insert(idx);
        self.capacity += region.free();
        if self.is_empty() {
            self.leftmost = idx;
            self.rightmost = idx;
        } else {
            self.leftmost = self.leftmost.min(idx);
            self.rightmost = self.rightmost.max(idx);
        }
        self.assert_bounds();
    }

    /// Rebuild the set from every region that can still take allocations.
    pub fn rebuild(&mut self, table: &RegionTable) {
        self.clear();
        for idx in 0..table.len() {
            let region = &table[idx];
            if region.is_alloc_allowed() && region.free() > 0 {
                self.add_region(table, idx);
            }
        }
        debug!(
            "Rebuilt free set: {} regions, {} available",
            self.count(),
            bytes_to_formatted_string(self.available())
        );
    }

    pub fn set_implicit_live(&mut self, enabled: bool) {
        self.implicit_live = enabled;
    }

    pub fn is_free(&self, idx: usize) -> bool {
        debug_assert!(idx < self.max);
        self.free.contains(idx)
    }

    pub fn is_empty(&self) -> bool {
        self.leftmost == self.max
    }

    pub fn count(&self) -> usize {
        self.free.count_ones(..)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn available(&self) -> usize {
        debug_assert!(self.used <= self.capacity);
        self.capacity - self.used
    }

    pub fn leftmost(&self) -> usize {
        self.leftmost
    }

    pub fn rightmost(&self) -> usize {
        self.rightmost
    }

    /// Free bytes in the lowest free region with at least `min_size` free, or 0.
    /// Used to size TLABs. Nothing is reserved.
    pub fn peek_free(&self, table: &RegionTable, min_size: usize) -> usize {
        if self.is_empty() {
            return 0;
        }
        (self.leftmost..=self.rightmost)
            .filter(|&idx| self.is_free(idx))
            .map(|idx| table[idx].free())
            .find(|&free| free >= min_size)
            .unwrap_or(0)
    }

    /// Allocate for `req`. Requests at or above the humongous threshold get a contiguous span.
    pub fn allocate(
        &mut self,
        table: &mut RegionTable,
        req: &AllocRequest,
    ) -> Result<Allocation, NeedsRecycle> {
        debug_assert_eq!(table.len(), self.max);
        if req.size >= table.humongous_threshold() {
            match req.alloc_type {
                AllocType::Shared | AllocType::SharedGc => self.allocate_contiguous(table, req),
                AllocType::Tlab | AllocType::Gclab => {
                    warn!(
                        "Trying to allocate a {:?} of {} above the humongous threshold {}",
                        req.alloc_type,
                        req.size,
                        table.humongous_threshold()
                    );
                    Err(NeedsRecycle { regions: 0 })
                }
            }
        } else {
            self.allocate_single(table, req)
        }
    }

    /// Allocate for `req`, recycling trash through `assist` when the free set runs dry.
    /// Small requests recycle one region and retry once. Humongous requests first recycle
    /// as many regions as they span, then everything, retrying after each step.
    pub fn allocate_with_recycle<R: RecycleAssist>(
        &mut self,
        table: &mut RegionTable,
        req: &AllocRequest,
        assist: &mut R,
    ) -> Result<Allocation, NeedsRecycle> {
        let mut result = self.allocate(table, req);
        let escalation = match result {
            Err(NeedsRecycle { regions: 0 }) | Ok(_) => return result,
            Err(NeedsRecycle { regions: 1 }) => [1, 0],
            Err(NeedsRecycle { regions }) => [regions, table.len()],
        };
        for count in escalation {
            if count == 0 {
                break;
            }
            if assist.recycle_regions(table, self, count) == 0 {
                continue;
            }
            result = self.allocate(table, req);
            if result.is_ok() {
                break;
            }
        }
        result
    }

    fn allocate_single(
        &mut self,
        table: &mut RegionTable,
        req: &AllocRequest,
    ) -> Result<Allocation, NeedsRecycle> {
        if req.alloc_type.is_mutator_alloc() {
            // Mutators fill the heap from the bottom.
            let mut idx = self.leftmost;
            while idx <= self.rightmost && idx < self.max {
                if self.is_free(idx) {
                    if let Some(result) = self.try_allocate_in(table, req, idx) {
                        return Ok(result);
                    }
                }
                idx += 1;
            }
        } else {
            // The collector fills the heap from the top.
            let mut idx = self.rightmost;
            while !self.is_empty() && idx >= self.leftmost {
                if self.is_free(idx) {
                    if let Some(result) = self.try_allocate_in(table, req, idx) {
                        return Ok(result);
                    }
                }
                if idx == 0 {
                    break;
                }
                idx -= 1;
            }
        }
        Err(NeedsRecycle { regions: 1 })
    }

    fn try_allocate_in(
        &mut self,
        table: &mut RegionTable,
        req: &AllocRequest,
        idx: usize,
    ) -> Option<Allocation> {
        let region = &mut table[idx];
        let in_new_region = region.is_empty();
        let Some(offset) = region.allocate(req.size, req.alloc_type) else {
            // Not enough room for this request. Retire the region rather than rescanning it later.
            trace!(
                "Retiring region {} with {} free for a request of {}",
                idx,
                region.free(),
                req.size
            );
            self.retire(table, idx);
            return None;
        };
        if self.implicit_live && req.alloc_type.is_mutator_alloc() {
            region.increase_live_data(req.size);
        }
        let full = region.free() == 0;
        if req.alloc_type.is_mutator_alloc() {
            table.stamp_allocation(idx);
        }
        self.used += req.size;
        if full {
            self.retire(table, idx);
        } else {
            self.assert_bounds();
        }
        Some(Allocation {
            region: idx,
            offset: idx * table.region_size() + offset,
            size: req.size,
            in_new_region,
        })
    }

    /// Take region `idx` out of the set. Its remaining free bytes count as used.
    fn retire(&mut self, table: &RegionTable, idx: usize) {
        self.used += table[idx].free();
        self.free.set(idx, false);
        self.adjust_bounds();
    }

    fn allocate_contiguous(
        &mut self,
        table: &mut RegionTable,
        req: &AllocRequest,
    ) -> Result<Allocation, NeedsRecycle> {
        let region_size = table.region_size();
        let num = bytes_to_regions_up(req.size, region_size);
        let fail = Err(NeedsRecycle { regions: num });
        if num > self.max || self.is_empty() {
            return fail;
        }

        // Find the first run of `num` free and empty regions.
        let mut beg = self.leftmost;
        let mut end = beg;
        loop {
            if end > self.rightmost {
                return fail;
            }
            if !self.is_free(end) || !table[end].is_empty() {
                end += 1;
                beg = end;
                continue;
            }
            if end - beg + 1 == num {
                break;
            }
            end += 1;
        }

        let remainder = req.size % region_size;
        for idx in beg..=end {
            let used = if idx == end && remainder != 0 {
                remainder
            } else {
                region_size
            };
            if idx == beg {
                table[idx].make_humongous_start(used);
            } else {
                table[idx].make_humongous_cont(used);
            }
            if self.implicit_live && req.alloc_type.is_mutator_alloc() {
                table[idx].increase_live_data(used);
            }
            self.free.set(idx, false);
        }
        if req.alloc_type.is_mutator_alloc() {
            table.stamp_allocation(beg);
        }
        // The whole span is used, even the tail of the last region.
        self.used += region_size * num;
        self.adjust_bounds();

        debug!(
            "Humongous allocation of {} in regions [{}, {}]",
            bytes_to_formatted_string(req.size),
            beg,
            end
        );
        Ok(Allocation {
            region: beg,
            offset: beg * region_size,
            size: req.size,
            in_new_region: true,
        })
    }

    fn adjust_bounds(&mut self) {
        while self.leftmost < self.max && !self.free.contains(self.leftmost) {
            self.leftmost += 1;
        }
        if self.leftmost == self.max {
            self.rightmost = 0;
        } else {
            while self.rightmost > self.leftmost && !self.free.contains(self.rightmost) {
                self.rightmost -= 1;
            }
        }
        self.assert_bounds();
    }

    /// Check the bounds are tight and the accounting is sane. Debug builds only.
    pub fn assert_bounds(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        assert!(
            self.used <= self.capacity,
            "used {} > capacity {}",
            self.used,
            self.capacity
        );
        if self.is_empty() {
            assert_eq!(self.rightmost, 0);
            assert_eq!(self.count(), 0, "No free bits expected in an empty free set");
            return;
        }
        assert!(self.leftmost <= self.rightmost && self.rightmost < self.max);
        assert!(self.is_free(self.leftmost), "leftmost {} is not free", self.leftmost);
        assert!(self.is_free(self.rightmost), "rightmost {} is not free", self.rightmost);
        if let Some(first) = self.free.ones().next() {
            assert_eq!(first, self.leftmost, "leftmost is not tight");
        }
        if let Some(last) = self.free.ones().last() {
            assert_eq!(last, self.rightmost, "rightmost is not tight");
        }
    }

    pub fn status(&self, table: &RegionTable) -> FreeSetStatus {
        let mut free_regions = 0;
        let mut empty_regions = 0;
        let mut max_contiguous = 0;
        let mut run = 0;
        let mut max_free_in_region = 0;
        for idx in self.free.ones() {
            let region = &table[idx];
            free_regions += 1;
            max_free_in_region = max_free_in_region.max(region.free());
            if region.is_empty() {
                empty_regions += 1;
                if idx > 0 && self.free.contains(idx - 1) && table[idx - 1].is_empty() {
                    run += 1;
                } else {
                    run = 1;
                }
                max_contiguous = max_contiguous.max(run);
            }
        }
        let external_fragmentation_percent = if empty_regions > 0 {
            100 - max_contiguous * 100 / empty_regions
        } else {
            0
        };
        FreeSetStatus {
            free_regions,
            available: self.available(),
            max_contiguous: max_contiguous * table.region_size(),
            max_free_in_region,
            external_fragmentation_percent,
        }
    }

    pub fn log_status(&self, table: &RegionTable) {
        let status = self.status(table);
        info!(
            "Free: {} in {} regions, max regular: {}, max humongous: {}, external frag: {}%",
            bytes_to_formatted_string(status.available),
            status.free_regions,
            bytes_to_formatted_string(status.max_free_in_region),
            bytes_to_formatted_string(status.max_contiguous),
            status.external_fragmentation_percent
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const REGION: usize = 1024;

    fn setup(num: usize) -> (RegionTable, FreeSet) {
        let table = RegionTable::new(num, REGION, REGION);
        let mut free_set = FreeSet::new(num);
        free_set.rebuild(&table);
        (table, free_set)
    }

    #[test]
    fn empty_free_set_uses_sentinel_bounds() {
        let mut table = RegionTable::new(4, REGION, REGION);
        let mut free_set = FreeSet::new(4);
        assert!(free_set.is_empty());
        assert_eq!(free_set.leftmost(), 4);
        assert_eq!(free_set.rightmost(), 0);
        assert_eq!(
            free_set.allocate(&mut table, &AllocRequest::for_tlab(8)),
            Err(NeedsRecycle { regions: 1 })
        );
        assert_eq!(
            free_set.allocate(&mut table, &AllocRequest::for_gclab(8)),
            Err(NeedsRecycle { regions: 1 })
        );
    }

    #[test]
    fn rebuild_adds_all_empty_regions() {
        let (_, free_set) = setup(8);
        assert_eq!(free_set.count(), 8);
        assert_eq!(free_set.capacity(), 8 * REGION);
        assert_eq!(free_set.available(), 8 * REGION);
        assert_eq!((free_set.leftmost(), free_set.rightmost()), (0, 7));
    }

    #[test]
    fn mutator_allocates_from_the_left() {
        let (mut table, mut free_set) = setup(4);
        let a = free_set
            .allocate(&mut table, &AllocRequest::for_tlab(100))
            .unwrap();
        assert_eq!(a.region, 0);
        assert_eq!(a.offset, 0);
        assert!(a.in_new_region);
        let b = free_set
            .allocate(&mut table, &AllocRequest::for_shared(100))
            .unwrap();
        assert_eq!(b.region, 0);
        assert_eq!(b.offset, 100);
        assert!(!b.in_new_region);
        assert_eq!(free_set.used(), 200);
        assert_eq!(table[0].last_alloc_seq(), 2);
    }

    #[test]
    fn collector_allocates_from_the_right() {
        let (mut table, mut free_set) = setup(4);
        let a = free_set
            .allocate(&mut table, &AllocRequest::for_gclab(100))
            .unwrap();
        assert_eq!(a.region, 3);
        assert_eq!(a.offset, 3 * REGION);
        // collector allocations are not mutator recency
        assert_eq!(table[3].last_alloc_seq(), 0);
        assert_eq!(table[3].alloc_bytes(AllocType::Gclab), 100);
    }

    #[test]
    fn failed_request_retires_region() {
        let (mut table, mut free_set) = setup(3);
        free_set
            .allocate(&mut table, &AllocRequest::for_tlab(REGION - 10))
            .unwrap();
        // Does not fit in region 0 anymore: region 0 is retired, region 1 serves it.
        let a = free_set
            .allocate(&mut table, &AllocRequest::for_tlab(20))
            .unwrap();
        assert_eq!(a.region, 1);
        assert!(!free_set.is_free(0));
        assert_eq!(free_set.leftmost(), 1);
        // The stranded 10 bytes count as used.
        assert_eq!(free_set.used(), REGION - 10 + 10 + 20);
    }

    #[test]
    fn full_region_is_retired() {
        let (mut table, mut free_set) = setup(2);
        free_set
            .allocate(&mut table, &AllocRequest::for_gclab(REGION / 2))
            .unwrap();
        free_set
            .allocate(&mut table, &AllocRequest::for_gclab(REGION / 2))
            .unwrap();
        assert!(!free_set.is_free(1));
        assert_eq!(free_set.rightmost(), 0);
        assert_eq!(free_set.count(), 1);
    }

    #[test]
    fn exhausting_the_set_restores_sentinel() {
        let (mut table, mut free_set) = setup(2);
        for _ in 0..2 {
            free_set
                .allocate(&mut table, &AllocRequest::for_tlab(REGION - 1))
                .unwrap();
        }
        assert_eq!(
            free_set.allocate(&mut table, &AllocRequest::for_tlab(8)),
            Err(NeedsRecycle { regions: 1 })
        );
        assert!(free_set.is_empty());
        assert_eq!(free_set.leftmost(), 2);
        assert_eq!(free_set.rightmost(), 0);
        assert_eq!(free_set.used(), free_set.capacity());
    }

    #[test]
    fn contiguous_spans_regions() {
        let (mut table, mut free_set) = setup(5);
        let size = 2 * REGION + 100;
        let a = free_set
            .allocate(&mut table, &AllocRequest::for_shared(size))
            .unwrap();
        assert_eq!(a.region, 0);
        assert!(table[0].state().is_humongous_start());
        assert!(table[1].state().is_humongous_continuation());
        assert!(table[2].state().is_humongous_continuation());
        assert_eq!(table[1].used(), REGION);
        assert_eq!(table[2].used(), 100);
        assert_eq!(free_set.used(), 3 * REGION);
        assert_eq!(free_set.leftmost(), 3);
        assert_eq!(table[0].last_alloc_seq(), 1);
    }

    #[test]
    fn contiguous_skips_non_empty_regions() {
        let (mut table, mut free_set) = setup(5);
        // Region 1 is partially used but still free.
        table[1].allocate(8, AllocType::Shared);
        let a = free_set
            .allocate(&mut table, &AllocRequest::for_shared(2 * REGION))
            .unwrap();
        assert_eq!(a.region, 2);
        assert!(free_set.is_free(0));
        assert!(free_set.is_free(1));
        assert!(!free_set.is_free(2) && !free_set.is_free(3));
    }

    #[test]
    fn contiguous_failure_is_repeatable() {
        let (mut table, mut free_set) = setup(3);
        let req = AllocRequest::for_shared(4 * REGION);
        let first = free_set.allocate(&mut table, &req);
        let second = free_set.allocate(&mut table, &req);
        assert_eq!(first, Err(NeedsRecycle { regions: 4 }));
        assert_eq!(first, second);
        assert_eq!(free_set.count(), 3);
    }

    #[test]
    fn lab_above_humongous_threshold_is_refused() {
        let mut table = RegionTable::new(4, REGION, REGION / 2);
        let mut free_set = FreeSet::new(4);
        free_set.rebuild(&table);
        assert_eq!(
            free_set.allocate(&mut table, &AllocRequest::for_tlab(REGION / 2)),
            Err(NeedsRecycle { regions: 0 })
        );
        assert!(free_set
            .allocate(&mut table, &AllocRequest::for_shared_gc(REGION / 2))
            .is_ok());
    }

    #[test]
    fn implicit_live_during_marking() {
        let (mut table, mut free_set) = setup(2);
        free_set.set_implicit_live(true);
        free_set
            .allocate(&mut table, &AllocRequest::for_tlab(64))
            .unwrap();
        free_set.set_implicit_live(false);
        free_set
            .allocate(&mut table, &AllocRequest::for_tlab(64))
            .unwrap();
        assert_eq!(table[0].live(), 64);
        assert_eq!(table[0].used(), 128);
    }

    #[test]
    fn peek_free_finds_first_fit() {
        let (mut table, mut free_set) = setup(3);
        free_set
            .allocate(&mut table, &AllocRequest::for_tlab(REGION - 16))
            .unwrap();
        assert_eq!(free_set.peek_free(&table, 8), 16);
        assert_eq!(free_set.peek_free(&table, 32), REGION);
    }

    fn trash(table: &mut RegionTable, idx: usize) {
        table[idx].allocate(REGION, AllocType::Shared);
        table[idx].make_trash();
    }

    #[test]
    fn recycle_then_retry_single() {
        let mut table = RegionTable::new(3, REGION, REGION);
        for idx in 0..3 {
            trash(&mut table, idx);
        }
        let mut free_set = FreeSet::new(3);
        free_set.rebuild(&table);
        assert!(free_set.is_empty());

        let mut recycler = TrashRecycler::default();
        let a = free_set
            .allocate_with_recycle(&mut table, &AllocRequest::for_tlab(64), &mut recycler)
            .unwrap();
        assert_eq!(a.region, 0);
        assert_eq!(recycler.recycled_regions, 1);
        assert_eq!(recycler.reclaimed_bytes, REGION);
        assert!(table[1].state().is_trash());
    }

    #[test]
    fn recycle_escalates_for_humongous() {
        let mut table = RegionTable::new(4, REGION, REGION);
        for idx in 0..4 {
            trash(&mut table, idx);
        }
        let mut free_set = FreeSet::new(4);
        free_set.rebuild(&table);

        // Two regions are needed. Recycling regions 0 and 1 is enough.
        let mut recycler = TrashRecycler::default();
        let a = free_set
            .allocate_with_recycle(&mut table, &AllocRequest::for_shared(2 * REGION), &mut recycler)
            .unwrap();
        assert_eq!(a.region, 0);
        assert_eq!(recycler.recycled_regions, 2);
    }

    #[test]
    fn recycle_everything_when_span_is_fragmented() {
        let mut table = RegionTable::new(4, REGION, REGION);
        // 0 and 2 are trash, 1 is live, 3 is trash. A 2-region span needs 2 and 3.
        trash(&mut table, 0);
        table[1].allocate(8, AllocType::Shared);
        trash(&mut table, 2);
        trash(&mut table, 3);
        let mut free_set = FreeSet::new(4);
        free_set.rebuild(&table);
        free_set
            .allocate(&mut table, &AllocRequest::for_tlab(REGION - 8))
            .unwrap();

        let mut recycler = TrashRecycler::default();
        let a = free_set
            .allocate_with_recycle(&mut table, &AllocRequest::for_shared(2 * REGION), &mut recycler)
            .unwrap();
        assert_eq!(a.region, 2);
        assert_eq!(recycler.recycled_regions, 3);
    }

    #[test]
    fn recycle_gives_up_without_trash() {
        let (mut table, mut free_set) = setup(2);
        let mut recycler = TrashRecycler::default();
        let req = AllocRequest::for_shared(3 * REGION);
        assert_eq!(
            free_set.allocate_with_recycle(&mut table, &req, &mut recycler),
            Err(NeedsRecycle { regions: 3 })
        );
        assert_eq!(recycler.recycled_regions, 0);
    }

    #[test]
    fn status_reports_fragmentation() {
        let (mut table, mut free_set) = setup(6);
        // Break the empty run at region 2.
        free_set
            .allocate(&mut table, &AllocRequest::for_tlab(8))
            .unwrap();
        free_set
            .allocate(&mut table, &AllocRequest::for_shared(REGION))
            .unwrap();
        // regions: 0 regular, 1 humongous, 2..6 empty and contiguous
        let status = free_set.status(&table);
        assert_eq!(status.free_regions, 5);
        assert_eq!(status.max_contiguous, 4 * REGION);
        assert_eq!(status.max_free_in_region, REGION);
        assert_eq!(status.external_fragmentation_percent, 0);
    }

    #[test]
    fn random_allocations_keep_invariants() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        let (mut table, mut free_set) = setup(64);
        let mut recycler = TrashRecycler::default();
        for _ in 0..2000 {
            let size = match rng.random_range(0..10) {
                0 => rng.random_range(REGION..3 * REGION),
                _ => rng.random_range(8..REGION / 2),
            };
            let alloc_type = match rng.random_range(0..4) {
                0 => AllocType::Tlab,
                1 => AllocType::Gclab,
                2 => AllocType::SharedGc,
                _ => AllocType::Shared,
            };
            if alloc_type.is_lab_alloc() && size >= table.humongous_threshold() {
                continue;
            }
            let req = AllocRequest::new(size, alloc_type);
            if free_set
                .allocate_with_recycle(&mut table, &req, &mut recycler)
                .is_err()
            {
                // Trash a random active region to make room.
                let idx = rng.random_range(0..64);
                if table[idx].state().is_active() && !free_set.is_free(idx) {
                    table[idx].make_trash();
                }
            }
            free_set.assert_bounds();
            assert!(free_set.used() <= free_set.capacity());
            for idx in free_set.free.ones() {
                assert!(idx >= free_set.leftmost() && idx <= free_set.rightmost());
            }
        }
    }
}
