//! Heuristics decide when a concurrent cycle starts and which regions it evacuates.
//!
//! One instance is created at startup from the configured [`HeuristicsSelector`] and driven by
//! the control thread for the rest of the process:
//!
//! 1. poll [`Heuristics::should_start_cycle`] until it returns a mode other than `None`,
//! 2. [`Heuristics::record_cycle_start`],
//! 3. at the safepoint after marking, [`Heuristics::choose_collection_set`],
//! 4. report phase timings and finally the outcome with [`Heuristics::record_success`].

mod adaptive;
mod aggressive;
mod base;
mod compact;
mod passive;
mod static_threshold;

pub mod partial;

pub use self::adaptive::{garbage_first_selection, AdaptiveHeuristics};
pub use self::aggressive::AggressiveHeuristics;
pub use self::base::{BaseHeuristics, HeuristicsStats};
pub use self::compact::CompactHeuristics;
pub use self::partial::{
    ConnectedPolicy, GenerationalPolicy, LruPolicy, PartialHeuristics, PartialPolicy,
};
pub use self::passive::PassiveHeuristics;
pub use self::static_threshold::{threshold_filter_selection, StaticHeuristics};

use crate::plan::config::CollectorConfig;
use crate::policy::region::{CollectionSet, RegionSnapshot};
use crate::util::options::HeuristicsSelector;
use crate::vm::{ConnectionMatrix, Heap};
use std::sync::Arc;

/// What kind of cycle to run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CycleMode {
    /// No cycle now.
    None,
    /// A concurrent cycle over the whole heap.
    Full,
    /// A concurrent cycle over a subset of the regions.
    Partial,
}

/// How a cycle ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Completed concurrently.
    Concurrent,
    /// Was cancelled and finished stop-the-world.
    Degenerated,
    /// Needed a stop-the-world full collection because an allocation failed.
    Full,
}

/// Concurrent phases whose durations the heuristics keep track of.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    ConcurrentMark,
    ConcurrentUpdateRefs,
}

pub trait Heuristics: Send {
    fn base(&self) -> &BaseHeuristics;
    fn base_mut(&mut self) -> &mut BaseHeuristics;

    fn name(&self) -> &'static str;

    /// Only meant for testing the collector, never for production.
    fn is_diagnostic(&self) -> bool {
        false
    }

    fn is_experimental(&self) -> bool {
        false
    }

    /// Called repeatedly by the control thread, outside of any pause.
    fn should_start_cycle(&mut self, heap: &dyn Heap) -> CycleMode {
        if self.can_do_partial_cycle() && self.should_start_partial_cycle(heap) {
            CycleMode::Partial
        } else if self.should_start_normal_cycle(heap) {
            CycleMode::Full
        } else {
            CycleMode::None
        }
    }

    /// Should a full-heap concurrent cycle start now?
    fn should_start_normal_cycle(&self, heap: &dyn Heap) -> bool {
        self.base().should_start_normal_cycle(heap)
    }

    fn can_do_partial_cycle(&self) -> bool {
        false
    }

    fn should_start_partial_cycle(&self, _heap: &dyn Heap) -> bool {
        false
    }

    /// Should update-references run as its own phase right after evacuation?
    fn should_start_update_refs(&mut self) -> bool {
        self.base().update_refs_early()
    }

    fn should_degenerate_cycle(&self) -> bool {
        self.base().should_degenerate_cycle()
    }

    fn should_process_references(&self) -> bool {
        self.base().should_process_references()
    }

    fn should_unload_classes(&self) -> bool {
        self.base().should_unload_classes()
    }

    fn record_cycle_start(&mut self, mode: CycleMode) {
        self.base_mut().record_cycle_start(mode);
    }

    fn record_cycle_end(&mut self) {
        self.base_mut().record_cycle_end();
    }

    fn record_phase_time(&mut self, _phase: Phase, _secs: f64) {}

    /// Keep track of the highest heap usage seen since the last adjustment.
    fn record_peak_occupancy(&mut self, heap: &dyn Heap) {
        self.base_mut().record_peak_occupancy(heap.used());
    }

    /// Report how the cycle ended.
    fn record_success(&mut self, outcome: CycleOutcome, _heap: &dyn Heap) {
        self.base_mut().record_success(outcome);
    }

    fn record_allocation_failure_gc(&mut self) {
        self.base_mut().record_allocation_failure_gc();
    }

    fn record_explicit_request(&mut self) {
        self.base_mut().record_explicit_request();
    }

    /// Select the regions to evacuate. Regions without live data are recorded as immediate
    /// trash first. If they make up most of the garbage, nothing else is selected.
    fn choose_collection_set(
        &mut self,
        cset: &mut CollectionSet,
        heap: &dyn Heap,
        _matrix: Option<&dyn ConnectionMatrix>,
    ) {
        choose_from_all_regions(self, cset, heap);
    }

    /// The policy-specific part of the selection. `data` holds every regular region with live
    /// data, in no particular order. `actual_free` is the free region bytes plus the immediate garbage.
    fn choose_from_region_data(
        &mut self,
        cset: &mut CollectionSet,
        data: &mut [RegionSnapshot],
        actual_free: usize,
        heap: &dyn Heap,
    );

    fn free_threshold_percent(&self) -> usize {
        self.base().free_threshold()
    }
}

/// Record the immediate trash, then let the policy choose among the remaining regular regions.
fn choose_from_all_regions<H: Heuristics + ?Sized>(
    heuristics: &mut H,
    cset: &mut CollectionSet,
    heap: &dyn Heap,
) {
    let mut data = std::mem::take(heuristics.base_mut().region_data_mut());
    let summary = base::collect_region_data(cset, heap, &mut data);
    let immediate_threshold = heuristics.base().options().immediate_threshold_percent;
    if summary.immediate_percent() <= immediate_threshold {
        heuristics.choose_from_region_data(cset, &mut data, summary.actual_free(), heap);
    } else {
        debug!(
            "Immediate garbage is {}% of all garbage, skip evacuation",
            summary.immediate_percent()
        );
    }
    summary.log_summary(cset);
    *heuristics.base_mut().region_data_mut() = data;
}

/// Create the heuristics selected in the config.
pub fn create_heuristics(config: Arc<CollectorConfig>) -> Box<dyn Heuristics> {
    let heuristics: Box<dyn Heuristics> = match config.selector() {
        HeuristicsSelector::Adaptive => Box::new(AdaptiveHeuristics::new(config)),
        HeuristicsSelector::Static => Box::new(StaticHeuristics::new(config)),
        HeuristicsSelector::Compact => Box::new(CompactHeuristics::new(config)),
        HeuristicsSelector::Passive => Box::new(PassiveHeuristics::new(config)),
        HeuristicsSelector::Aggressive => Box::new(AggressiveHeuristics::new(config)),
        HeuristicsSelector::Connected => {
            Box::new(PartialHeuristics::new(config, ConnectedPolicy))
        }
        HeuristicsSelector::Generational => {
            Box::new(PartialHeuristics::new(config, GenerationalPolicy))
        }
        HeuristicsSelector::Lru => Box::new(PartialHeuristics::new(config, LruPolicy)),
    };
    if heuristics.is_diagnostic() {
        warn!(
            "Heuristics \"{}\" is diagnostic, and must not be used in production",
            heuristics.name()
        );
    }
    if heuristics.is_experimental() {
        warn!(
            "Heuristics \"{}\" is experimental, and may be unstable",
            heuristics.name()
        );
    }
    info!("Using heuristics: {}", heuristics.name());
    heuristics
}

#[cfg(test)]
pub(crate) mod test_heap {
    use crate::plan::config::CollectorConfig;
    use crate::policy::region::{RegionSnapshot, RegionState};
    use crate::util::options::Options;
    use crate::vm::{ConnectionMatrix, Heap};
    use fixedbitset::FixedBitSet;
    use std::sync::Arc;

    /// A config from the built-in defaults plus `options` (`name=value` pairs).
    pub fn config_with(options: &str) -> Arc<CollectorConfig> {
        let mut opts = Options::builtin_defaults();
        assert!(opts.process_bulk(options));
        Arc::new(CollectorConfig::new(opts).unwrap())
    }

    /// A heap made of plain numbers, for driving heuristics directly.
    pub struct TestHeap {
        pub capacity: usize,
        pub used: usize,
        pub used_at_last_cycle: usize,
        pub allocated: usize,
        pub available: usize,
        pub region_size: usize,
        pub regions: Vec<RegionSnapshot>,
        pub forwarded: bool,
        pub alloc_seq_at_last_cycle_end: u64,
    }

    impl TestHeap {
        pub fn new(capacity: usize, region_size: usize) -> Self {
            let num = capacity / region_size;
            TestHeap {
                capacity,
                used: 0,
                used_at_last_cycle: 0,
                allocated: 0,
                available: capacity,
                region_size,
                regions: (0..num)
                    .map(|i| RegionSnapshot {
                        index: i,
                        state: RegionState::EmptyCommitted,
                        used_bytes: 0,
                        live_bytes: 0,
                        garbage_bytes: 0,
                        last_alloc_seq: 0,
                    })
                    .collect(),
                forwarded: false,
                alloc_seq_at_last_cycle_end: 0,
            }
        }

        /// Fill region `i` with `used` bytes, `live` of them live.
        pub fn fill(&mut self, i: usize, used: usize, live: usize) {
            self.regions[i] = RegionSnapshot::regular(i, used, live);
        }
    }

    impl Heap for TestHeap {
        fn capacity(&self) -> usize {
            self.capacity
        }
        fn used(&self) -> usize {
            self.used
        }
        fn used_at_last_cycle(&self) -> usize {
            self.used_at_last_cycle
        }
        fn bytes_allocated_since_last_cycle(&self) -> usize {
            self.allocated
        }
        fn free_available(&self) -> usize {
            self.available
        }
        fn num_regions(&self) -> usize {
            self.regions.len()
        }
        fn region_size(&self) -> usize {
            self.region_size
        }
        fn region(&self, index: usize) -> RegionSnapshot {
            self.regions[index]
        }
        fn has_forwarded_objects(&self) -> bool {
            self.forwarded
        }
        fn alloc_seq_at_last_cycle_end(&self) -> u64 {
            self.alloc_seq_at_last_cycle_end
        }
    }

    /// A connection matrix with one bit per (from, to) pair.
    pub struct TestMatrix {
        n: usize,
        bits: FixedBitSet,
    }

    impl TestMatrix {
        pub fn new(n: usize) -> Self {
            TestMatrix {
                n,
                bits: FixedBitSet::with_capacity(n * n),
            }
        }

        pub fn connect(&mut self, from: usize, to: usize) {
            self.bits.insert(from * self.n + to);
        }
    }

    impl ConnectionMatrix for TestMatrix {
        fn count_connected_to(&self, to: usize, num_regions: usize) -> usize {
            (0..num_regions)
                .filter(|from| self.bits.contains(from * self.n + to))
                .count()
        }

        fn enumerate_connected_to(
            &self,
            to: usize,
            num_regions: usize,
            from_idxs: &mut [usize],
            threshold: usize,
        ) -> Option<usize> {
            let mut count = 0;
            for from in 0..num_regions {
                if self.bits.contains(from * self.n + to) {
                    if count == threshold {
                        return None;
                    }
                    from_idxs[count] = from;
                    count += 1;
                }
            }
            Some(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_heap::config_with;
    use super::*;

    fn config_for(policy: &str) -> Arc<CollectorConfig> {
        config_with(&format!("policyName={} unlockExperimental=true", policy))
    }

    #[test]
    fn create_every_heuristics() {
        for (policy, name) in [
            ("adaptive", "adaptive"),
            ("garbage_first", "adaptive"),
            ("static", "static"),
            ("compact", "compact"),
            ("passive", "passive"),
            ("aggressive", "aggressive"),
            ("connected", "connected"),
            ("generational", "generational"),
            ("lru", "LRU"),
        ] {
            let heuristics = create_heuristics(config_for(policy));
            assert_eq!(heuristics.name(), name);
        }
    }

    #[test]
    fn only_partial_heuristics_do_partial_cycles() {
        assert!(!create_heuristics(config_for("adaptive")).can_do_partial_cycle());
        assert!(create_heuristics(config_for("lru")).can_do_partial_cycle());
        assert!(create_heuristics(config_for("lru")).is_experimental());
        assert!(create_heuristics(config_for("aggressive")).is_diagnostic());
    }
}
