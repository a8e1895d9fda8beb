use super::base::BaseHeuristics;
use super::{CycleMode, CycleOutcome, Heuristics, Phase};
use crate::plan::config::CollectorConfig;
use crate::policy::region::{CollectionSet, RegionSnapshot};
use crate::util::constants::CYCLE_HISTORY_WINDOW;
use crate::util::conversions::{bytes_to_formatted_string, evacuation_reserve, percent_of};
use crate::util::options::UpdateRefsMode;
use crate::util::BoundedSeq;
use crate::vm::Heap;
use std::sync::Arc;

/// Garbage-first selection with a free threshold that adapts to how the previous cycles went.
///
/// After a concurrent cycle, the free percentage at the peak of the cycle is compared with
/// `min_free_threshold`. Running with more margin than the minimum raises the threshold by at
/// most `max_normal_step`. Running with less lowers it, but only after more than
/// `happy_cycles_threshold` successful cycles in a row. Degenerated cycles, full collections
/// and explicit requests raise it by their own fixed steps.
pub struct AdaptiveHeuristics {
    base: BaseHeuristics,
    pub(crate) cycle_gap_history: BoundedSeq,
    pub(crate) conc_mark_duration_history: BoundedSeq,
    pub(crate) conc_uprefs_duration_history: BoundedSeq,
}

impl AdaptiveHeuristics {
    pub fn new(config: Arc<CollectorConfig>) -> Self {
        AdaptiveHeuristics {
            base: BaseHeuristics::new(config),
            cycle_gap_history: BoundedSeq::new(CYCLE_HISTORY_WINDOW),
            conc_mark_duration_history: BoundedSeq::new(CYCLE_HISTORY_WINDOW),
            conc_uprefs_duration_history: BoundedSeq::new(CYCLE_HISTORY_WINDOW),
        }
    }

    pub fn cycle_gap_history(&self) -> &BoundedSeq {
        &self.cycle_gap_history
    }

    pub fn conc_mark_duration_history(&self) -> &BoundedSeq {
        &self.conc_mark_duration_history
    }

    pub fn conc_uprefs_duration_history(&self) -> &BoundedSeq {
        &self.conc_uprefs_duration_history
    }

    /// Tune the free threshold after a concurrent cycle, from the peak occupancy it saw.
    fn adapt_to_concurrent_success(&mut self, capacity: usize) {
        if capacity == 0 {
            return;
        }
        let options = self.base.options();
        let min_free = options.min_free_threshold as isize;
        let max_step = options.max_normal_step as isize;
        let happy_cycles = options.happy_cycles_threshold;

        let peak = self.base.peak_occupancy();
        let current = (capacity.saturating_sub(peak) as u128 * 100 / capacity as u128) as isize;
        let step = (current - min_free).clamp(-max_step, max_step);
        trace!(
            "Free at peak occupancy: {}%, min free: {}%, step: {}",
            current,
            min_free,
            step
        );

        if step > 0 {
            self.base.adjust_free_threshold(step);
        } else if step < 0
            && self.base.successful_cycles_in_a_row() > happy_cycles
            && self.base.free_threshold() > 0
        {
            self.base.adjust_free_threshold(step);
            self.base.reset_successful_cycles_in_a_row();
        }
        self.base.reset_peak_occupancy();
    }
}

impl Heuristics for AdaptiveHeuristics {
    fn base(&self) -> &BaseHeuristics {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseHeuristics {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn should_start_update_refs(&mut self) -> bool {
        let options = self.base.options();
        if options.update_refs_early != UpdateRefsMode::Adaptive || self.cycle_gap_history.is_empty()
        {
            return self.base.update_refs_early();
        }
        let cycle = self.conc_mark_duration_history.avg() + self.conc_uprefs_duration_history.avg();
        let gap = self.cycle_gap_history.avg();
        let fold_below = gap * options.merge_update_refs_min_gap as f64 / 100.0;
        let early_above = gap * options.merge_update_refs_max_gap as f64 / 100.0;

        if self.base.update_refs_early() {
            if cycle < fold_below {
                self.base.set_update_refs_early(false);
            }
        } else if cycle > early_above {
            self.base.set_update_refs_early(true);
        }
        self.base.update_refs_early()
    }

    fn record_cycle_start(&mut self, mode: CycleMode) {
        self.base.record_cycle_start(mode);
        let gap = self
            .base
            .cycle_start()
            .saturating_duration_since(self.base.last_cycle_end());
        self.cycle_gap_history.add(gap.as_secs_f64());
    }

    fn record_phase_time(&mut self, phase: Phase, secs: f64) {
        match phase {
            Phase::ConcurrentMark => self.conc_mark_duration_history.add(secs),
            Phase::ConcurrentUpdateRefs => self.conc_uprefs_duration_history.add(secs),
        }
    }

    fn record_success(&mut self, outcome: CycleOutcome, heap: &dyn Heap) {
        self.base.record_success(outcome);
        match outcome {
            CycleOutcome::Concurrent => self.adapt_to_concurrent_success(heap.capacity()),
            CycleOutcome::Degenerated => {
                let step = self.base.options().degenerated_step as isize;
                self.base.adjust_free_threshold(step);
            }
            CycleOutcome::Full => {
                let step = self.base.options().alloc_failure_step as isize;
                self.base.adjust_free_threshold(step);
            }
        }
    }

    fn record_explicit_request(&mut self) {
        self.base.record_explicit_request();
        let step = self.base.options().explicit_request_step as isize;
        self.base.adjust_free_threshold(step);
    }

    fn choose_from_region_data(
        &mut self,
        cset: &mut CollectionSet,
        data: &mut [RegionSnapshot],
        actual_free: usize,
        heap: &dyn Heap,
    ) {
        let options = self.base.options();
        let capacity = heap.capacity();
        let free_target = percent_of(
            capacity,
            (self.base.free_threshold() + options.max_normal_step).min(100),
        );
        let min_garbage = free_target.saturating_sub(actual_free);
        let max_cset = evacuation_reserve(actual_free);
        let garbage_threshold = percent_of(heap.region_size(), options.garbage_threshold_percent);

        info!(
            "Adaptive collection set selection. Target free: {}, actual free: {}, max collection set: {}, min garbage: {}",
            bytes_to_formatted_string(free_target),
            bytes_to_formatted_string(actual_free),
            bytes_to_formatted_string(max_cset),
            bytes_to_formatted_string(min_garbage)
        );
        garbage_first_selection(cset, data, min_garbage, max_cset, garbage_threshold);
    }
}

/// Walk the regions from the most garbage to the least, and take a region while garbage is
/// still short of `min_garbage`, or when its own garbage is at least `garbage_threshold`.
/// The walk ends at the first region that would take the used bytes of the set above `max_cset`.
pub fn garbage_first_selection(
    cset: &mut CollectionSet,
    data: &mut [RegionSnapshot],
    min_garbage: usize,
    max_cset: usize,
    garbage_threshold: usize,
) {
    data.sort_unstable_by(|a, b| b.garbage_bytes.cmp(&a.garbage_bytes));

    let mut cur_garbage = 0;
    for region in data.iter() {
        if cset.used() + region.used_bytes > max_cset {
            break;
        }
        if (cur_garbage < min_garbage || region.garbage_bytes >= garbage_threshold)
            && cset.add_region(region)
        {
            cur_garbage += region.garbage_bytes;
        }
    }
}
