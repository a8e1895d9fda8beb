use super::base::BaseHeuristics;
use super::Heuristics;
use crate::plan::config::CollectorConfig;
use crate::policy::region::{CollectionSet, RegionSnapshot};
use crate::util::conversions::{evacuation_reserve, percent_of};
use crate::vm::Heap;
use std::sync::Arc;

/// The occupancy trigger with a fixed free threshold. Never adapts.
pub struct StaticHeuristics {
    base: BaseHeuristics,
}

impl StaticHeuristics {
    pub fn new(config: Arc<CollectorConfig>) -> Self {
        StaticHeuristics {
            base: BaseHeuristics::new(config),
        }
    }
}

impl Heuristics for StaticHeuristics {
    fn base(&self) -> &BaseHeuristics {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseHeuristics {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "static"
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

/// Take every region with at least `garbage_threshold` bytes of garbage, most garbage first.
/// Regions that would take the used bytes of the set above `max_cset` are skipped.
pub fn threshold_filter_selection(
    cset: &mut CollectionSet,
    data: &mut [RegionSnapshot],
    max_cset: usize,
    garbage_threshold: usize,
) {
    data.sort_unstable_by(|a, b| b.garbage_bytes.cmp(&a.garbage_bytes));
    for region in data.iter() {
        if region.garbage_bytes == 0 || region.garbage_bytes < garbage_threshold {
            continue;
        }
        if cset.used() + region.used_bytes > max_cset {
            trace!(
                "Skip region {}: collection set would exceed {} bytes",
                region.index,
                max_cset
            );
            continue;
        }
        cset.add_region(region);
    }
}
