use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Byte counters of the heap, read by the control thread while allocating threads update them.
/// All the loads are relaxed: a stale read only delays a decision until the next poll.
pub struct HeapAccounting {
    /// The maximum heap size in bytes.
    capacity: AtomicUsize,
    /// The bytes currently in use, including evacuation copies and humongous spans.
    used: AtomicUsize,
    /// The used bytes when the last cycle ended.
    used_at_last_cycle: AtomicUsize,
    /// The bytes allocated by mutators since the last cycle ended.
    allocated_since_last_cycle: AtomicUsize,
}

impl HeapAccounting {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: AtomicUsize::new(capacity),
            used: AtomicUsize::new(0),
            used_at_last_cycle: AtomicUsize::new(0),
            allocated_since_last_cycle: AtomicUsize::new(0),
        }
    }

    /// Inform of a mutator allocation. It counts both as used and as allocated since the last cycle.
    pub fn record_mutator_allocation(&self, bytes: usize) {
        self.increase_used(bytes);
        self.allocated_since_last_cycle
            .fetch_add(bytes, Ordering::Relaxed);
    }

    /// Inform of bytes becoming used without being a mutator allocation (e.g. evacuation copies).
    pub fn increase_used(&self, bytes: usize) {
        let _prev = self.used.fetch_add(bytes, Ordering::Relaxed);
        debug_assert!(_prev + bytes <= self.get_capacity());
    }

    /// Inform of bytes being reclaimed.
    pub fn decrease_used(&self, bytes: usize) {
        let _prev = self.used.fetch_sub(bytes, Ordering::Relaxed);
        debug_assert!(_prev >= bytes);
    }

    /// Remember the current usage as the reference point for the next cycle.
    pub fn record_cycle_end(&self) {
        self.used_at_last_cycle
            .store(self.get_used(), Ordering::Relaxed);
        self.allocated_since_last_cycle.store(0, Ordering::Relaxed);
    }

    pub fn get_capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    pub fn get_used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn get_used_at_last_cycle(&self) -> usize {
        self.used_at_last_cycle.load(Ordering::Relaxed)
    }

    pub fn get_allocated_since_last_cycle(&self) -> usize {
        self.allocated_since_last_cycle.load(Ordering::Relaxed)
    }
}
