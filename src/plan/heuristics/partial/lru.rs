use super::{regular_regions, PartialPolicy};
use crate::policy::region::RegionSnapshot;
use crate::util::conversions::{bytes_to_formatted_string, percent_of};
use crate::util::options::Options;
use crate::vm::{ConnectionMatrix, Heap};

/// Evacuates the regions mutators allocated into least recently, where old data sits.
/// Does not start while the heap is mostly empty.
pub struct LruPolicy;

impl PartialPolicy for LruPolicy {
    fn name(&self) -> &'static str {
        "LRU"
    }

    fn should_start(&self, heap: &dyn Heap, options: &Options, allocated: usize) -> bool {
        let capacity = heap.capacity();
        let used = heap.used();
        let min_occupancy = percent_of(capacity, options.lru_min_occupancy_percentage);
        if used < min_occupancy {
            trace!(
                "No partial cycle: used ({}) is below minimum occupancy ({})",
                bytes_to_formatted_string(used),
                bytes_to_formatted_string(min_occupancy)
            );
            return false;
        }
        let threshold = percent_of(capacity, options.lru_old_gen_percentage);
        if allocated > threshold {
            info!(
                "Trigger: Allocated since last cycle ({}) is larger than old gen threshold ({})",
                bytes_to_formatted_string(allocated),
                bytes_to_formatted_string(threshold)
            );
            return true;
        }
        false
    }

    fn collect_candidates(
        &self,
        heap: &dyn Heap,
        _matrix: &dyn ConnectionMatrix,
        _options: &Options,
        candidates: &mut Vec<(u64, RegionSnapshot)>,
    ) {
        candidates.extend(
            regular_regions(heap)
                .filter(|r| r.last_alloc_seq > 0)
                .map(|r| (r.last_alloc_seq, r)),
        );
    }
}
