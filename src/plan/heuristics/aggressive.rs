use super::base::BaseHeuristics;
use super::Heuristics;
use crate::plan::config::CollectorConfig;
use crate::policy::region::{CollectionSet, RegionSnapshot};
use crate::util::conversions::evacuation_reserve;
use crate::vm::Heap;
use std::sync::Arc;

/// Runs cycles back to back and evacuates every region with any garbage.
/// Stresses the collector; never meant for production.
pub struct AggressiveHeuristics {
    base: BaseHeuristics,
}

impl AggressiveHeuristics {
    pub fn new(config: Arc<CollectorConfig>) -> Self {
        AggressiveHeuristics {
            base: BaseHeuristics::new(config),
        }
    }
}

impl Heuristics for AggressiveHeuristics {
    fn base(&self) -> &BaseHeuristics {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseHeuristics {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "aggressive"
    }

    fn is_diagnostic(&self) -> bool {
        true
    }

    fn should_start_normal_cycle(&self, _heap: &dyn Heap) -> bool {
        info!("Trigger: Start next cycle immediately");
        true
    }

    fn should_process_references(&self) -> bool {
        self.base.options().ref_proc_frequency != 0
    }

    // Alternate, so that cycles with and without class unloading both get exercised.
    fn should_unload_classes(&self) -> bool {
        self.base.options().unload_classes_frequency != 0 && self.base.cycle_counter() % 2 == 1
    }

    fn choose_from_region_data(
        &mut self,
        cset: &mut CollectionSet,
        data: &mut [RegionSnapshot],
        actual_free: usize,
        _heap: &dyn Heap,
    ) {
        let max_cset = evacuation_reserve(actual_free);
        for region in data.iter() {
            if region.garbage_bytes > 0 && cset.used() + region.used_bytes <= max_cset {
                cset.add_region(region);
            }
        }
    }
}
