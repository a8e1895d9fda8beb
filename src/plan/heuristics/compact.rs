use super::base::BaseHeuristics;
use super::static_threshold::threshold_filter_selection;
use super::Heuristics;
use crate::plan::config::CollectorConfig;
use crate::policy::region::{CollectionSet, RegionSnapshot};
use crate::util::conversions::{bytes_to_formatted_string, evacuation_reserve, percent_of};
use crate::vm::Heap;
use std::sync::Arc;

/// Keeps the footprint small: starts a cycle as soon as either free memory is low or enough
/// was allocated, and evacuates regions with little garbage. Its ergonomics also turn on
/// uncommitting empty regions.
pub struct CompactHeuristics {
    base: BaseHeuristics,
}

impl CompactHeuristics {
    pub fn new(config: Arc<CollectorConfig>) -> Self {
        CompactHeuristics {
            base: BaseHeuristics::new(config),
        }
    }
}

impl Heuristics for CompactHeuristics {
    fn base(&self) -> &BaseHeuristics {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseHeuristics {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "compact"
    }

    fn should_start_normal_cycle(&self, heap: &dyn Heap) -> bool {
        let capacity = heap.capacity();
        let available = heap.free_available();
        let allocated = heap.bytes_allocated_since_last_cycle();
        let threshold = percent_of(capacity, self.base.options().allocation_threshold_percent);

        if available < threshold {
            info!(
                "Trigger: Free ({}) is below allocation threshold ({})",
                bytes_to_formatted_string(available),
                bytes_to_formatted_string(threshold)
            );
            return true;
        }
        if allocated > threshold {
            info!(
                "Trigger: Allocated since last cycle ({}) is larger than allocation threshold ({})",
                bytes_to_formatted_string(allocated),
                bytes_to_formatted_string(threshold)
            );
            return true;
        }
        self.base.should_start_periodic_cycle()
    }

    fn choose_from_region_data(
        &mut self,
        cset: &mut CollectionSet,
        data: &mut [RegionSnapshot],
        actual_free: usize,
        heap: &dyn Heap,
    ) {
        let threshold = percent_of(
            heap.region_size(),
            self.base.options().garbage_threshold_percent,
        );
        threshold_filter_selection(cset, data, evacuation_reserve(actual_free), threshold);
    }
}
