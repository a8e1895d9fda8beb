use super::{CycleMode, CycleOutcome};
use crate::plan::config::CollectorConfig;
use crate::policy::region::{CollectionSet, RegionSnapshot, RegionState};
use crate::util::conversions::{bytes_to_formatted_string, percent_of};
use crate::util::options::{Options, UpdateRefsMode};
use crate::vm::Heap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters of what happened over the life of the heuristics. Only for reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeuristicsStats {
    pub cycles_started: usize,
    pub partial_cycles_started: usize,
    pub concurrent_successes: usize,
    pub degenerated_successes: usize,
    pub full_successes: usize,
    pub allocation_failures: usize,
    pub explicit_requests: usize,
}

/// The state every heuristics shares: the free threshold, the feedback counters and the
/// cycle timestamps. A policy embeds one and exposes it through `Heuristics::base()`.
pub struct BaseHeuristics {
    config: Arc<CollectorConfig>,
    /// Start a cycle when less than this percent of the heap is free.
    free_threshold: usize,
    /// The highest used bytes seen since the last threshold adjustment.
    peak_occupancy: usize,
    cycle_counter: usize,
    successful_cycles_in_a_row: usize,
    degenerated_cycles_in_a_row: usize,
    cycle_start: Instant,
    last_cycle_end: Instant,
    mode: CycleMode,
    update_refs_early: bool,
    /// Reused by every collection set selection.
    region_data: Vec<RegionSnapshot>,
    stats: HeuristicsStats,
}

impl BaseHeuristics {
    pub fn new(config: Arc<CollectorConfig>) -> Self {
        let free_threshold = config.options.free_threshold_percent;
        let update_refs_early = match config.options.update_refs_early {
            UpdateRefsMode::On => true,
            UpdateRefsMode::Off | UpdateRefsMode::Adaptive => false,
        };
        let region_data = Vec::with_capacity(config.region_sizes.region_count);
        let now = Instant::now();
        BaseHeuristics {
            config,
            free_threshold,
            peak_occupancy: 0,
            cycle_counter: 0,
            successful_cycles_in_a_row: 0,
            degenerated_cycles_in_a_row: 0,
            cycle_start: now,
            last_cycle_end: now,
            mode: CycleMode::None,
            update_refs_early,
            region_data,
            stats: HeuristicsStats::default(),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn options(&self) -> &Options {
        &self.config.options
    }

    pub fn free_threshold(&self) -> usize {
        self.free_threshold
    }

    pub fn peak_occupancy(&self) -> usize {
        self.peak_occupancy
    }

    pub fn reset_peak_occupancy(&mut self) {
        self.peak_occupancy = 0;
    }

    /// The number of cycles started so far, including the current one.
    pub fn cycle_counter(&self) -> usize {
        self.cycle_counter
    }

    pub fn successful_cycles_in_a_row(&self) -> usize {
        self.successful_cycles_in_a_row
    }

    pub fn reset_successful_cycles_in_a_row(&mut self) {
        self.successful_cycles_in_a_row = 0;
    }

    pub fn degenerated_cycles_in_a_row(&self) -> usize {
        self.degenerated_cycles_in_a_row
    }

    pub fn current_mode(&self) -> CycleMode {
        self.mode
    }

    pub fn cycle_start(&self) -> Instant {
        self.cycle_start
    }

    pub fn last_cycle_end(&self) -> Instant {
        self.last_cycle_end
    }

    pub fn update_refs_early(&self) -> bool {
        self.update_refs_early
    }

    pub fn set_update_refs_early(&mut self, early: bool) {
        if early != self.update_refs_early {
            debug!(
                "Update references {}",
                if early {
                    "runs early"
                } else {
                    "is folded into marking"
                }
            );
        }
        self.update_refs_early = early;
    }

    pub fn stats(&self) -> HeuristicsStats {
        self.stats
    }

    pub(crate) fn region_data_mut(&mut self) -> &mut Vec<RegionSnapshot> {
        &mut self.region_data
    }

    /// The occupancy trigger: free memory is low, and enough was allocated since the last
    /// cycle for a new cycle to be worth it. Falls back to the periodic trigger.
    pub fn should_start_normal_cycle(&self, heap: &dyn Heap) -> bool {
        let capacity = heap.capacity();
        let available = heap.free_available();
        let allocated = heap.bytes_allocated_since_last_cycle();
        let threshold_available = percent_of(capacity, self.free_threshold);
        let threshold_allocated =
            percent_of(capacity, self.options().allocation_threshold_percent);

        if available < threshold_available && allocated > threshold_allocated {
            info!(
                "Trigger: Free ({}) is below free threshold ({}), and allocated since last cycle ({}) is above allocation threshold ({})",
                bytes_to_formatted_string(available),
                bytes_to_formatted_string(threshold_available),
                bytes_to_formatted_string(allocated),
                bytes_to_formatted_string(threshold_allocated)
            );
            return true;
        }
        self.should_start_periodic_cycle()
    }

    /// Fires when no cycle ended for longer than the guaranteed interval.
    pub fn should_start_periodic_cycle(&self) -> bool {
        let interval = self.options().guaranteed_interval_ms;
        if interval == 0 {
            return false;
        }
        let since_last = self.last_cycle_end.elapsed();
        if since_last > Duration::from_millis(interval) {
            info!(
                "Trigger: Time since last cycle ({} ms) is larger than guaranteed interval ({} ms)",
                since_last.as_millis(),
                interval
            );
            return true;
        }
        false
    }

    /// Move the free threshold by `step` percent, within `[min_free_threshold, max_free_threshold]`.
    pub fn adjust_free_threshold(&mut self, step: isize) {
        let min = self.config.options.min_free_threshold;
        let max = self.config.options.max_free_threshold;
        let old = self.free_threshold;
        let stepped = (old as isize).saturating_add(step).max(0) as usize;
        let new = stepped.clamp(min, max);
        if new != old {
            info!(
                "Adjusting free threshold from {}% to {}% (step {})",
                old, new, step
            );
        }
        self.free_threshold = new;
    }

    pub fn record_cycle_start(&mut self, mode: CycleMode) {
        debug_assert_ne!(mode, CycleMode::None);
        self.cycle_counter += 1;
        self.cycle_start = Instant::now();
        self.mode = mode;
        self.stats.cycles_started += 1;
        if mode == CycleMode::Partial {
            self.stats.partial_cycles_started += 1;
        }
        debug!("Cycle {} starts ({:?})", self.cycle_counter, mode);
    }

    pub fn record_cycle_end(&mut self) {
        self.last_cycle_end = Instant::now();
        debug!(
            "Cycle {} ends after {} ms",
            self.cycle_counter,
            self.last_cycle_end
                .saturating_duration_since(self.cycle_start)
                .as_millis()
        );
        self.mode = CycleMode::None;
    }

    pub fn record_peak_occupancy(&mut self, used: usize) {
        self.peak_occupancy = self.peak_occupancy.max(used);
    }

    pub fn record_success(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Concurrent => {
                self.successful_cycles_in_a_row += 1;
                self.degenerated_cycles_in_a_row = 0;
                self.stats.concurrent_successes += 1;
            }
            CycleOutcome::Degenerated => {
                self.successful_cycles_in_a_row = 0;
                self.degenerated_cycles_in_a_row += 1;
                self.stats.degenerated_successes += 1;
            }
            CycleOutcome::Full => {
                self.successful_cycles_in_a_row = 0;
                self.degenerated_cycles_in_a_row = 0;
                self.stats.full_successes += 1;
            }
        }
    }

    pub fn record_allocation_failure_gc(&mut self) {
        self.successful_cycles_in_a_row = 0;
        self.stats.allocation_failures += 1;
    }

    pub fn record_explicit_request(&mut self) {
        self.stats.explicit_requests += 1;
    }

    /// A cancelled cycle may continue stop-the-world, until too many did so in a row.
    pub fn should_degenerate_cycle(&self) -> bool {
        self.options().degenerated_gc
            && self.degenerated_cycles_in_a_row <= self.options().full_gc_threshold
    }

    pub fn should_process_references(&self) -> bool {
        is_nth_cycle(self.cycle_counter, self.options().ref_proc_frequency)
    }

    pub fn should_unload_classes(&self) -> bool {
        is_nth_cycle(self.cycle_counter, self.options().unload_classes_frequency)
    }
}

fn is_nth_cycle(cycle: usize, frequency: usize) -> bool {
    frequency != 0 && cycle % frequency == 0
}

/// What the first pass over the regions found.
pub(super) struct RegionDataSummary {
    free: usize,
    immediate_garbage: usize,
    immediate_regions: usize,
    total_garbage: usize,
}

impl RegionDataSummary {
    /// Immediate garbage as a percentage of all garbage.
    pub fn immediate_percent(&self) -> usize {
        if self.total_garbage == 0 {
            0
        } else {
            self.immediate_garbage * 100 / self.total_garbage
        }
    }

    /// Free region bytes plus the bytes reclaimed without evacuation.
    pub fn actual_free(&self) -> usize {
        self.free + self.immediate_garbage
    }

    pub fn log_summary(&self, cset: &CollectionSet) {
        info!(
            "Total garbage: {}, immediate: {} in {} regions ({}%), collection set: {} regions, {} garbage, {} live",
            bytes_to_formatted_string(self.total_garbage),
            bytes_to_formatted_string(self.immediate_garbage),
            self.immediate_regions,
            self.immediate_percent(),
            cset.count(),
            bytes_to_formatted_string(cset.garbage()),
            bytes_to_formatted_string(cset.live())
        );
    }
}

/// Walk every region: record the ones without live data as immediate trash, and collect
/// the regular regions with live data into `data` for the policy to choose from.
pub(super) fn collect_region_data(
    cset: &mut CollectionSet,
    heap: &dyn Heap,
    data: &mut Vec<RegionSnapshot>,
) -> RegionDataSummary {
    debug_assert!(cset.is_empty(), "Collection set is reused without clearing");
    data.clear();

    let num_regions = heap.num_regions();
    let region_size = heap.region_size();
    let mut summary = RegionDataSummary {
        free: 0,
        immediate_garbage: 0,
        immediate_regions: 0,
        total_garbage: 0,
    };

    for i in 0..num_regions {
        let region = heap.region(i);
        debug_assert!(
            !region.state.is_cset(),
            "Region {} is still in a collection set",
            i
        );
        match region.state {
            RegionState::EmptyUncommitted | RegionState::EmptyCommitted => {
                summary.free += region_size;
            }
            RegionState::Regular => {
                if region.live_bytes == 0 {
                    cset.add_immediate_trash(i, region.garbage_bytes);
                    summary.immediate_garbage += region.garbage_bytes;
                    summary.immediate_regions += 1;
                } else {
                    data.push(region);
                }
                summary.total_garbage += region.garbage_bytes;
            }
            RegionState::HumongousStart => {
                if region.live_bytes == 0 {
                    // The object is dead: reclaim the whole span.
                    let mut span_garbage = region.used_bytes;
                    cset.add_immediate_trash(i, region.used_bytes);
                    let mut j = i + 1;
                    while j < num_regions {
                        let cont = heap.region(j);
                        if !cont.state.is_humongous_continuation() {
                            break;
                        }
                        cset.add_immediate_trash(j, cont.used_bytes);
                        span_garbage += cont.used_bytes;
                        j += 1;
                    }
                    trace!(
                        "Humongous object at region {} is dead, spanning {} regions",
                        i,
                        j - i
                    );
                    summary.immediate_garbage += span_garbage;
                    summary.immediate_regions += j - i;
                    summary.total_garbage += span_garbage;
                }
            }
            RegionState::HumongousCont => {
                // Handled together with its start region.
            }
            RegionState::Trash => {
                cset.add_immediate_garbage(region_size);
                summary.immediate_garbage += region_size;
                summary.total_garbage += region_size;
            }
            RegionState::CSet => {}
        }
    }
    summary
}
