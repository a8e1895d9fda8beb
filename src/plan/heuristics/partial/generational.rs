use super::{regular_regions, PartialPolicy};
use crate::policy::region::RegionSnapshot;
use crate::util::conversions::{bytes_to_formatted_string, percent_of};
use crate::util::options::Options;
use crate::vm::{ConnectionMatrix, Heap};

/// Evacuates the regions mutators allocated into most recently, like a young generation.
/// Regions last allocated into before the previous cycle ended are not candidates.
pub struct GenerationalPolicy;

impl PartialPolicy for GenerationalPolicy {
    fn name(&self) -> &'static str {
        "generational"
    }

    fn should_start(&self, heap: &dyn Heap, options: &Options, allocated: usize) -> bool {
        let threshold = percent_of(heap.capacity(), options.young_gen_percentage);
        if allocated > threshold {
            info!(
                "Trigger: Allocated since last cycle ({}) is larger than young gen threshold ({})",
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
        let last_cycle_end = heap.alloc_seq_at_last_cycle_end();
        // Most recent first.
        candidates.extend(
            regular_regions(heap)
                .filter(|r| r.last_alloc_seq > last_cycle_end)
                .map(|r| (u64::MAX - r.last_alloc_seq, r)),
        );
    }
}
