use super::base::BaseHeuristics;
use super::static_threshold::threshold_filter_selection;
use super::Heuristics;
use crate::plan::config::CollectorConfig;
use crate::policy::region::{CollectionSet, RegionSnapshot};
use crate::util::conversions::{evacuation_reserve, percent_of};
use crate::vm::Heap;
use std::sync::Arc;

/// Never starts a concurrent cycle. Collections only happen when an allocation fails, and
/// run stop-the-world.
pub struct PassiveHeuristics {
    base: BaseHeuristics,
}

impl PassiveHeuristics {
    pub fn new(config: Arc<CollectorConfig>) -> Self {
        PassiveHeuristics {
            base: BaseHeuristics::new(config),
        }
    }
}

impl Heuristics for PassiveHeuristics {
    fn base(&self) -> &BaseHeuristics {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseHeuristics {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "passive"
    }

    fn should_start_normal_cycle(&self, _heap: &dyn Heap) -> bool {
        false
    }

    // Every collection is stop-the-world, so doing the extra work costs no concurrency.
    fn should_process_references(&self) -> bool {
        self.base.options().ref_proc_frequency != 0
    }

    fn should_unload_classes(&self) -> bool {
        self.base.options().unload_classes_frequency != 0
    }

    fn should_degenerate_cycle(&self) -> bool {
        self.base.options().degenerated_gc
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
