use super::{regular_regions, PartialPolicy};
use crate::policy::region::RegionSnapshot;
use crate::util::conversions::{bytes_to_formatted_string, percent_of};
use crate::util::options::Options;
use crate::vm::{ConnectionMatrix, Heap};

/// Evacuates the regions with the fewest inbound connections: they are the cheapest to
/// isolate, as few root regions have to be scanned.
pub struct ConnectedPolicy;

impl PartialPolicy for ConnectedPolicy {
    fn name(&self) -> &'static str {
        "connected"
    }

    fn should_start(&self, heap: &dyn Heap, options: &Options, allocated: usize) -> bool {
        let threshold = percent_of(heap.capacity(), options.connectedness_percentage);
        if allocated > threshold {
            info!(
                "Trigger: Allocated since last cycle ({}) is larger than connectedness threshold ({})",
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
        matrix: &dyn ConnectionMatrix,
        options: &Options,
        candidates: &mut Vec<(u64, RegionSnapshot)>,
    ) {
        let num_regions = heap.num_regions();
        let threshold = options.inbound_connection_threshold;
        candidates.extend(
            regular_regions(heap)
                .map(|r| (matrix.count_connected_to(r.index, num_regions), r))
                .filter(|(count, _)| *count < threshold)
                .map(|(count, r)| (count as u64, r)),
        );
    }
}
