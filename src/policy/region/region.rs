use super::free_set::AllocType;
use crate::util::constants::*;
use crate::util::conversions::*;
use enum_map::EnumMap;
use std::time::Instant;

/*
 Region state is described by a state machine. Transitions are guarded by the heap lock,
 which allows changing the state of several regions atomically.

   EmptyUncommitted <--- EmptyCommitted <------------------------------\
          |                    |                                       |
          \---------v----------/                                       |
                    |  first allocation                                |
          /---------+-----------------\                                |
          v                           v                                |
       Regular ----> CSet       HumongousStart / HumongousCont         |
          |           |                |                               |
          \-----------+----------------/                               |
                      |  reclamation                                   |
                      v                                                |
                    Trash -------------------- recycle ----------------/

 a) No region goes Empty unless it was reclaimed and recycled.
 b) Only Regular regions go CSet.
 c) Humongous regions never take regular allocations and never go CSet.
 d) Empty regions never go Trash.
*/
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum RegionState {
    EmptyUncommitted,
    EmptyCommitted,
    Regular,
    HumongousStart,
    HumongousCont,
    CSet,
    Trash,
}

impl RegionState {
    pub fn is_empty(&self) -> bool {
        matches!(
            self,
            RegionState::EmptyUncommitted | RegionState::EmptyCommitted
        )
    }

    pub fn is_regular(&self) -> bool {
        *self == RegionState::Regular
    }

    pub fn is_humongous(&self) -> bool {
        matches!(
            self,
            RegionState::HumongousStart | RegionState::HumongousCont
        )
    }

    pub fn is_humongous_start(&self) -> bool {
        *self == RegionState::HumongousStart
    }

    pub fn is_humongous_continuation(&self) -> bool {
        *self == RegionState::HumongousCont
    }

    pub fn is_cset(&self) -> bool {
        *self == RegionState::CSet
    }

    pub fn is_trash(&self) -> bool {
        *self == RegionState::Trash
    }

    /// Regions that hold objects.
    pub fn is_active(&self) -> bool {
        !self.is_empty() && !self.is_trash()
    }

    /// Regions that may take small allocations.
    pub fn is_alloc_allowed(&self) -> bool {
        self.is_empty() || self.is_regular()
    }
}

/// Read-only view of one region, taken at a safepoint for selection.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RegionSnapshot {
    pub index: usize,
    pub state: RegionState,
    pub used_bytes: usize,
    pub live_bytes: usize,
    pub garbage_bytes: usize,
    /// The allocation sequence number of the last mutator allocation into the region. 0 if none.
    pub last_alloc_seq: u64,
}

impl RegionSnapshot {
    /// A regular region with the given usage. Mostly useful to feed selection directly.
    pub fn regular(index: usize, used_bytes: usize, live_bytes: usize) -> Self {
        debug_assert!(live_bytes <= used_bytes);
        RegionSnapshot {
            index,
            state: RegionState::Regular,
            used_bytes,
            live_bytes,
            garbage_bytes: used_bytes - live_bytes,
            last_alloc_seq: 0,
        }
    }

    pub fn with_alloc_seq(mut self, seq: u64) -> Self {
        self.last_alloc_seq = seq;
        self
    }
}

/// One region of the heap, as tracked by the heap under its lock.
#[derive(Debug)]
pub struct HeapRegion {
    index: usize,
    region_size: usize,
    state: RegionState,
    used: usize,
    live: usize,
    first_alloc_seq: u64,
    last_alloc_seq: u64,
    alloc_bytes: EnumMap<AllocType, usize>,
    empty_time: Instant,
}

impl HeapRegion {
    pub fn new(index: usize, region_size: usize) -> Self {
        HeapRegion {
            index,
            region_size,
            state: RegionState::EmptyCommitted,
            used: 0,
            live: 0,
            first_alloc_seq: 0,
            last_alloc_seq: 0,
            alloc_bytes: EnumMap::default(),
            empty_time: Instant::now(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn free(&self) -> usize {
        self.region_size - self.used
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn garbage(&self) -> usize {
        debug_assert!(
            self.live <= self.used,
            "Region {}: live {} exceeds used {}",
            self.index,
            self.live,
            self.used
        );
        self.used - self.live
    }

    pub fn first_alloc_seq(&self) -> u64 {
        self.first_alloc_seq
    }

    pub fn last_alloc_seq(&self) -> u64 {
        self.last_alloc_seq
    }

    pub fn alloc_bytes(&self, kind: AllocType) -> usize {
        self.alloc_bytes[kind]
    }

    pub fn empty_time(&self) -> Instant {
        self.empty_time
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn is_alloc_allowed(&self) -> bool {
        self.state.is_alloc_allowed()
    }

    pub fn snapshot(&self) -> RegionSnapshot {
        RegionSnapshot {
            index: self.index,
            state: self.state,
            used_bytes: self.used,
            live_bytes: self.live,
            garbage_bytes: self.garbage(),
            last_alloc_seq: self.last_alloc_seq,
        }
    }

    /// Bump-allocate `size` bytes. Returns the offset of the new bytes from the region start,
    /// or `None` if the region cannot fit them.
    pub fn allocate(&mut self, size: usize, kind: AllocType) -> Option<usize> {
        debug_assert!(self.is_alloc_allowed(), "Region {} is {:?}", self.index, self.state);
        if self.free() < size {
            return None;
        }
        self.make_regular_allocation();
        let offset = self.used;
        self.used += size;
        self.alloc_bytes[kind] += size;
        Some(offset)
    }

    pub fn stamp_alloc_seq(&mut self, seq: u64) {
        debug_assert!(seq > self.last_alloc_seq);
        if self.first_alloc_seq == 0 {
            self.first_alloc_seq = seq;
        }
        self.last_alloc_seq = seq;
    }

    pub fn increase_live_data(&mut self, bytes: usize) {
        self.live += bytes;
        debug_assert!(self.live <= self.used);
    }

    pub fn set_live_data(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.used);
        self.live = bytes;
    }

    pub fn clear_live_data(&mut self) {
        self.live = 0;
    }

    fn report_illegal_transition(&self, method: &str) {
        let msg = format!(
            "Illegal region state transition for region {}: {} from {:?}",
            self.index, method, self.state
        );
        if cfg!(debug_assertions) {
            panic!("{}", msg);
        }
        error!("{}", msg);
    }

    pub fn make_regular_allocation(&mut self) {
        match self.state {
            RegionState::EmptyUncommitted | RegionState::EmptyCommitted => {
                self.state = RegionState::Regular
            }
            RegionState::Regular => {}
            _ => self.report_illegal_transition("regular allocation"),
        }
    }

    /// Turn an empty region into the first region of a humongous span holding `used` bytes.
    pub fn make_humongous_start(&mut self, used: usize) {
        if !self.state.is_empty() {
            self.report_illegal_transition("humongous start allocation");
        }
        self.state = RegionState::HumongousStart;
        self.set_humongous_used(used);
    }

    pub fn make_humongous_cont(&mut self, used: usize) {
        if !self.state.is_empty() {
            self.report_illegal_transition("humongous continuation allocation");
        }
        self.state = RegionState::HumongousCont;
        self.set_humongous_used(used);
    }

    fn set_humongous_used(&mut self, used: usize) {
        debug_assert!(used <= self.region_size);
        self.used = used;
        self.alloc_bytes[AllocType::Shared] += used;
    }

    pub fn make_cset(&mut self) {
        match self.state {
            RegionState::Regular => self.state = RegionState::CSet,
            _ => self.report_illegal_transition("cset"),
        }
    }

    pub fn make_trash(&mut self) {
        match self.state {
            RegionState::Regular
            | RegionState::CSet
            | RegionState::HumongousStart
            | RegionState::HumongousCont => self.state = RegionState::Trash,
            _ => self.report_illegal_transition("trashing"),
        }
    }

    /// Clean a trash region so it can take allocations again.
    pub fn recycle(&mut self) {
        if !self.state.is_trash() {
            self.report_illegal_transition("recycle");
        }
        self.used = 0;
        self.live = 0;
        self.first_alloc_seq = 0;
        self.last_alloc_seq = 0;
        self.alloc_bytes = EnumMap::default();
        self.state = RegionState::EmptyCommitted;
        self.empty_time = Instant::now();
    }

    pub fn make_uncommitted(&mut self) {
        match self.state {
            RegionState::EmptyCommitted => self.state = RegionState::EmptyUncommitted,
            _ => self.report_illegal_transition("uncommiting"),
        }
    }
}

/// The region geometry derived from the heap size.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RegionSizes {
    pub region_size: usize,
    pub region_size_shift: usize,
    pub region_count: usize,
    pub humongous_threshold: usize,
    pub max_tlab_size: usize,
    pub max_heap_size: usize,
}

impl std::fmt::Debug for RegionSizes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionSizes")
            .field("region_size", &bytes_to_formatted_string(self.region_size))
            .field("region_count", &self.region_count)
            .field(
                "humongous_threshold",
                &bytes_to_formatted_string(self.humongous_threshold),
            )
            .field("max_tlab_size", &bytes_to_formatted_string(self.max_tlab_size))
            .field("max_heap_size", &bytes_to_formatted_string(self.max_heap_size))
            .finish()
    }
}

impl RegionSizes {
    /// Pick a power-of-two region size for the heap. `region_size` of 0 means automatic:
    /// aim for `target_num_regions` regions within `[MIN_REGION_SIZE, MAX_REGION_SIZE]`.
    pub fn setup(
        max_heap_size: usize,
        region_size: usize,
        target_num_regions: usize,
        humongous_threshold_percent: usize,
    ) -> Result<RegionSizes, String> {
        if MIN_REGION_SIZE > max_heap_size / MIN_NUM_REGIONS {
            return Err(format!(
                "Max heap size ({}) is too low to afford the minimum number of regions ({}) of minimum region size ({})",
                bytes_to_formatted_string(max_heap_size),
                MIN_NUM_REGIONS,
                bytes_to_formatted_string(MIN_REGION_SIZE)
            ));
        }
        if humongous_threshold_percent == 0 || humongous_threshold_percent > 100 {
            return Err(format!(
                "Invalid humongous threshold: {}%",
                humongous_threshold_percent
            ));
        }

        let region_size = if region_size == 0 {
            (max_heap_size / target_num_regions.max(1)).clamp(MIN_REGION_SIZE, MAX_REGION_SIZE)
        } else if (MIN_REGION_SIZE..=MAX_REGION_SIZE).contains(&region_size) {
            if max_heap_size / region_size < MIN_NUM_REGIONS {
                return Err(format!(
                    "Region size ({}) leaves fewer than {} regions in a heap of {}",
                    bytes_to_formatted_string(region_size),
                    MIN_NUM_REGIONS,
                    bytes_to_formatted_string(max_heap_size)
                ));
            }
            region_size
        } else {
            return Err(format!(
                "Region size ({}) is outside of [{}, {}]",
                bytes_to_formatted_string(region_size),
                bytes_to_formatted_string(MIN_REGION_SIZE),
                bytes_to_formatted_string(MAX_REGION_SIZE)
            ));
        };
        let region_size = round_down_power_of_two(region_size);
        let region_size_shift = region_size.trailing_zeros() as usize;
        let max_heap_size = raw_align_up(max_heap_size, region_size);
        let humongous_threshold = raw_align_down(
            percent_of(region_size, humongous_threshold_percent),
            BYTES_IN_WORD,
        );
        let max_tlab_size = raw_align_down((region_size / 8).min(humongous_threshold), BYTES_IN_WORD);

        let sizes = RegionSizes {
            region_size,
            region_size_shift,
            region_count: max_heap_size >> region_size_shift,
            humongous_threshold,
            max_tlab_size,
            max_heap_size,
        };
        debug!("{:?}", sizes);
        Ok(sizes)
    }
}
