use crate::plan::config::CollectorConfig;
use crate::policy::region::free_set::FreeSetStatus;
use crate::policy::region::*;
use crate::util::conversions::bytes_to_formatted_string;
use crate::util::heap::HeapAccounting;
use crate::vm::Heap;
use spin::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// The regions and the free set, guarded together by the heap lock.
pub struct RegionSpaceInner {
    pub table: RegionTable,
    pub free_set: FreeSet,
}

/// A heap of equally sized regions. Allocating threads share it through the heap lock. The
/// counters the heuristics poll are atomics that can be read without taking the lock.
pub struct RegionSpace {
    sizes: RegionSizes,
    inner: Mutex<RegionSpaceInner>,
    accounting: HeapAccounting,
    /// What the free set can still hand out. Published after every change under the lock.
    available: AtomicUsize,
    has_forwarded_objects: AtomicBool,
    alloc_seq_at_last_cycle_end: AtomicU64,
}

impl RegionSpace {
    pub fn new(sizes: RegionSizes) -> Self {
        let table = RegionTable::from_sizes(&sizes);
        let mut free_set = FreeSet::new(table.len());
        free_set.rebuild(&table);
        let space = RegionSpace {
            sizes,
            accounting: HeapAccounting::new(table.capacity()),
            available: AtomicUsize::new(free_set.available()),
            inner: Mutex::new(RegionSpaceInner { table, free_set }),
            has_forwarded_objects: AtomicBool::new(false),
            alloc_seq_at_last_cycle_end: AtomicU64::new(0),
        };
        info!(
            "Created region space: {} regions of {}, humongous threshold {}",
            sizes.region_count,
            bytes_to_formatted_string(sizes.region_size),
            bytes_to_formatted_string(sizes.humongous_threshold)
        );
        space
    }

    pub fn from_config(config: &CollectorConfig) -> Self {
        Self::new(config.region_sizes)
    }

    pub fn sizes(&self) -> &RegionSizes {
        &self.sizes
    }

    pub fn accounting(&self) -> &HeapAccounting {
        &self.accounting
    }

    /// Run `f` while holding the heap lock. The available bytes are published afterwards.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut RegionSpaceInner) -> R) -> R {
        let mut inner = self.inner.lock();
        let result = f(&mut inner);
        self.publish_available(&inner.free_set);
        result
    }

    fn publish_available(&self, free_set: &FreeSet) {
        self.available
            .store(free_set.available(), Ordering::Relaxed);
    }

    /// Allocate for `req`. Trash regions are recycled when the free set cannot serve it.
    pub fn allocate(&self, req: AllocRequest) -> Result<Allocation, NeedsRecycle> {
        let mut recycler = TrashRecycler::default();
        let result = self.with_lock(|inner| {
            inner
                .free_set
                .allocate_with_recycle(&mut inner.table, &req, &mut recycler)
        });
        if recycler.reclaimed_bytes > 0 {
            self.accounting.decrease_used(recycler.reclaimed_bytes);
        }
        match result {
            Ok(allocation) => {
                if req.alloc_type.is_mutator_alloc() {
                    self.accounting.record_mutator_allocation(allocation.size);
                } else {
                    self.accounting.increase_used(allocation.size);
                }
            }
            Err(needs) => {
                debug!(
                    "Out of memory for {:?} of {} (recycling {} regions would be needed)",
                    req.alloc_type,
                    bytes_to_formatted_string(req.size),
                    needs.regions
                );
            }
        }
        result
    }

    pub fn snapshot(&self, index: usize) -> RegionSnapshot {
        self.inner.lock().table.snapshot(index)
    }

    /// Forget the live data of every region and credit new allocations as live until
    /// marking finishes.
    pub fn start_marking(&self) {
        self.with_lock(|inner| {
            for region in inner.table.iter_mut() {
                region.clear_live_data();
            }
            inner.free_set.set_implicit_live(true);
        });
    }

    pub fn set_live_data(&self, index: usize, bytes: usize) {
        self.inner.lock().table[index].set_live_data(bytes);
    }

    pub fn finish_marking(&self) {
        self.with_lock(|inner| inner.free_set.set_implicit_live(false));
    }

    /// Write the selection to the regions, and rebuild the free set without them.
    pub fn apply_collection_set(&self, cset: &CollectionSet) {
        self.with_lock(|inner| {
            cset.finalize(&mut inner.table);
            inner.free_set.rebuild(&inner.table);
        });
    }

    /// Evacuation is done: the collection set regions hold no more live objects.
    /// Returns the number of regions trashed.
    pub fn trash_collection_set(&self) -> usize {
        self.with_lock(|inner| {
            let mut count = 0;
            for region in inner.table.iter_mut() {
                if region.state().is_cset() {
                    region.make_trash();
                    count += 1;
                }
            }
            count
        })
    }

    /// Recycle every trash region into the free set. Returns the number of regions recycled.
    pub fn recycle_trash(&self) -> usize {
        let mut recycler = TrashRecycler::default();
        let recycled = self.with_lock(|inner| {
            let count = inner.table.len();
            recycler.recycle_regions(&mut inner.table, &mut inner.free_set, count)
        });
        if recycler.reclaimed_bytes > 0 {
            self.accounting.decrease_used(recycler.reclaimed_bytes);
        }
        debug!(
            "Recycled {} trash regions, reclaimed {}",
            recycled,
            bytes_to_formatted_string(recycler.reclaimed_bytes)
        );
        recycled
    }

    /// Remember the usage and the allocation sequence as the reference point for the next cycle.
    pub fn record_cycle_end(&self) {
        let seq = self.inner.lock().table.current_alloc_seq();
        self.alloc_seq_at_last_cycle_end
            .store(seq, Ordering::Relaxed);
        self.accounting.record_cycle_end();
    }

    pub fn set_has_forwarded_objects(&self, forwarded: bool) {
        self.has_forwarded_objects
            .store(forwarded, Ordering::Relaxed);
    }

    /// Uncommit the regions that stayed empty for longer than `delay`. They stay in the free set
    /// and are committed again by their next allocation. Returns the number of regions uncommitted.
    pub fn uncommit_empty_regions(&self, delay: Duration) -> usize {
        let count = self.with_lock(|inner| {
            let mut count = 0;
            for region in inner.table.iter_mut() {
                if region.state() == RegionState::EmptyCommitted
                    && region.empty_time().elapsed() >= delay
                {
                    region.make_uncommitted();
                    count += 1;
                }
            }
            count
        });
        if count > 0 {
            info!("Uncommitted {} empty regions", count);
        }
        count
    }

    pub fn free_set_status(&self) -> FreeSetStatus {
        let inner = self.inner.lock();
        inner.free_set.status(&inner.table)
    }

    pub fn log_status(&self) {
        let inner = self.inner.lock();
        inner.free_set.log_status(&inner.table);
    }
}

impl Heap for RegionSpace {
    fn capacity(&self) -> usize {
        self.accounting.get_capacity()
    }

    fn used(&self) -> usize {
        self.accounting.get_used()
    }

    fn used_at_last_cycle(&self) -> usize {
        self.accounting.get_used_at_last_cycle()
    }

    fn bytes_allocated_since_last_cycle(&self) -> usize {
        self.accounting.get_allocated_since_last_cycle()
    }

    fn free_available(&self) -> usize {
        self.available.load(Ordering::Relaxed)
    }

    fn num_regions(&self) -> usize {
        self.sizes.region_count
    }

    fn region_size(&self) -> usize {
        self.sizes.region_size
    }

    fn region(&self, index: usize) -> RegionSnapshot {
        self.snapshot(index)
    }

    fn has_forwarded_objects(&self) -> bool {
        self.has_forwarded_objects.load(Ordering::Relaxed)
    }

    fn alloc_seq_at_last_cycle_end(&self) -> u64 {
        self.alloc_seq_at_last_cycle_end.load(Ordering::Relaxed)
    }
}
