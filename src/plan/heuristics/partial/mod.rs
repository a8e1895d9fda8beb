//! Partial cycles evacuate a few regions chosen without marking the whole heap.
//!
//! The regions referencing a target are found through the connection matrix and become root
//! regions of the cycle. A target is only taken if it has fewer inbound connections than
//! `inbound_connection_threshold`, so the number of roots to scan stays small. How the
//! candidates are picked and ordered, and when a partial cycle starts, is up to a
//! [`PartialPolicy`]. Everything else behaves like the adaptive heuristics.

mod connected;
mod generational;
mod lru;

pub use self::connected::ConnectedPolicy;
pub use self::generational::GenerationalPolicy;
pub use self::lru::LruPolicy;

use super::adaptive::AdaptiveHeuristics;
use super::base::BaseHeuristics;
use super::{choose_from_all_regions, CycleMode, CycleOutcome, Heuristics, Phase};
use crate::plan::config::CollectorConfig;
use crate::policy::region::{CollectionSet, RegionSnapshot};
use crate::util::conversions::{bytes_to_formatted_string, bytes_to_regions_up, evacuation_reserve};
use crate::util::options::Options;
use crate::vm::{ConnectionMatrix, Heap};
use delegate::delegate;
use std::sync::Arc;

/// Decides when a partial cycle starts, and which regions it should try to evacuate.
pub trait PartialPolicy: Send {
    fn name(&self) -> &'static str;

    /// Should a partial cycle start? `allocated` is the growth of the used bytes since the
    /// last cycle ended.
    fn should_start(&self, heap: &dyn Heap, options: &Options, allocated: usize) -> bool;

    /// Push the candidate regions into `candidates`, each with its sort key. Candidates are
    /// tried in ascending key order, ties in region index order.
    fn collect_candidates(
        &self,
        heap: &dyn Heap,
        matrix: &dyn ConnectionMatrix,
        options: &Options,
        candidates: &mut Vec<(u64, RegionSnapshot)>,
    );
}

fn sort_candidates(candidates: &mut [(u64, RegionSnapshot)]) {
    candidates.sort_unstable_by_key(|(key, r)| (*key, r.index));
}

/// The region indices `policy` would try, in order.
#[cfg(test)]
fn candidate_order(
    policy: &dyn PartialPolicy,
    heap: &dyn Heap,
    matrix: &dyn ConnectionMatrix,
    options: &Options,
) -> Vec<usize> {
    let mut candidates = vec![];
    policy.collect_candidates(heap, matrix, options, &mut candidates);
    sort_candidates(&mut candidates);
    candidates.iter().map(|(_, r)| r.index).collect()
}

/// The regular regions of the heap, in index order.
fn regular_regions(heap: &dyn Heap) -> impl Iterator<Item = RegionSnapshot> + '_ {
    (0..heap.num_regions())
        .map(move |i| heap.region(i))
        .filter(|r| r.state.is_regular())
}

pub struct PartialHeuristics<P: PartialPolicy> {
    adaptive: AdaptiveHeuristics,
    policy: P,
    /// Scratch buffer for the regions referencing a candidate. One slot per region.
    from_idxs: Vec<usize>,
    candidates: Vec<(u64, RegionSnapshot)>,
}

impl<P: PartialPolicy> PartialHeuristics<P> {
    pub fn new(config: Arc<CollectorConfig>, policy: P) -> Self {
        let num_regions = config.region_sizes.region_count;
        PartialHeuristics {
            adaptive: AdaptiveHeuristics::new(config),
            policy,
            from_idxs: vec![0; num_regions],
            candidates: Vec::with_capacity(num_regions),
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    fn choose_partial_collection_set(
        &mut self,
        cset: &mut CollectionSet,
        heap: &dyn Heap,
        matrix: &dyn ConnectionMatrix,
    ) {
        let num_regions = heap.num_regions();
        if self.from_idxs.len() < num_regions {
            self.from_idxs.resize(num_regions, 0);
        }
        let options = self.adaptive.base().options();
        let inbound_threshold = options.inbound_connection_threshold;

        self.candidates.clear();
        self.policy
            .collect_candidates(heap, matrix, options, &mut self.candidates);
        sort_candidates(&mut self.candidates);

        let allocated = heap.bytes_allocated_since_last_cycle();
        let target = bytes_to_regions_up(allocated, heap.region_size())
            .min(num_regions)
            .min(self.candidates.len());
        let max_cset = evacuation_reserve(heap.free_available());

        let mut added = 0;
        for (_, region) in self.candidates.iter() {
            if added == target {
                break;
            }
            if cset.used() + region.used_bytes > max_cset {
                trace!(
                    "Skip region {}: collection set would exceed {}",
                    region.index,
                    bytes_to_formatted_string(max_cset)
                );
                continue;
            }
            match matrix.enumerate_connected_to(
                region.index,
                num_regions,
                &mut self.from_idxs,
                inbound_threshold,
            ) {
                Some(count) => {
                    if cset.add_region(region) {
                        for &from in &self.from_idxs[..count] {
                            cset.add_root(from);
                        }
                        added += 1;
                    }
                }
                None => trace!(
                    "Skip region {}: more than {} regions reference it",
                    region.index,
                    inbound_threshold
                ),
            }
        }
        // A region can reference another target. It is evacuated, not scanned as a root.
        cset.filter_roots();

        info!(
            "Partial collection set ({}): {} regions of {} candidates (target {}), {} root regions",
            self.policy.name(),
            cset.count(),
            self.candidates.len(),
            target,
            cset.root_count()
        );
    }
}

impl<P: PartialPolicy> Heuristics for PartialHeuristics<P> {
    delegate! {
        to self.adaptive {
            fn base(&self) -> &BaseHeuristics;
            fn base_mut(&mut self) -> &mut BaseHeuristics;
            fn should_start_normal_cycle(&self, heap: &dyn Heap) -> bool;
            fn record_cycle_start(&mut self, mode: CycleMode);
            fn record_phase_time(&mut self, phase: Phase, secs: f64);
            fn record_success(&mut self, outcome: CycleOutcome, heap: &dyn Heap);
            fn record_explicit_request(&mut self);
            fn choose_from_region_data(
                &mut self,
                cset: &mut CollectionSet,
                data: &mut [RegionSnapshot],
                actual_free: usize,
                heap: &dyn Heap,
            );
        }
    }

    fn name(&self) -> &'static str {
        self.policy.name()
    }

    fn is_experimental(&self) -> bool {
        true
    }

    fn can_do_partial_cycle(&self) -> bool {
        true
    }

    fn should_start_partial_cycle(&self, heap: &dyn Heap) -> bool {
        if heap.has_forwarded_objects() {
            trace!("No partial cycle: references of the last cycle are not updated yet");
            return false;
        }
        let used = heap.used();
        let prev_used = heap.used_at_last_cycle();
        if used < prev_used {
            // A collection we were not told about freed memory. Try again on the next poll.
            trace!(
                "No partial cycle: used ({}) is below used at last cycle ({})",
                used,
                prev_used
            );
            return false;
        }
        self.policy
            .should_start(heap, self.adaptive.base().options(), used - prev_used)
    }

    // Partial cycles leave forwarded objects in the root regions, which must be updated
    // before the next partial cycle can start.
    fn should_start_update_refs(&mut self) -> bool {
        true
    }

    fn choose_collection_set(
        &mut self,
        cset: &mut CollectionSet,
        heap: &dyn Heap,
        matrix: Option<&dyn ConnectionMatrix>,
    ) {
        match (self.base().current_mode(), matrix) {
            (CycleMode::Partial, Some(matrix)) => {
                self.choose_partial_collection_set(cset, heap, matrix)
            }
            (CycleMode::Partial, None) => {
                warn!(
                    "No connection matrix for a partial cycle of {}. Choosing from all regions.",
                    self.policy.name()
                );
                choose_from_all_regions(self, cset, heap);
            }
            _ => choose_from_all_regions(self, cset, heap),
        }
    }
}
