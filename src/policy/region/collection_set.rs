use super::region::RegionSnapshot;
use super::region_table::RegionTable;
use crate::util::conversions::bytes_to_formatted_string;
use fixedbitset::FixedBitSet;

/// The regions chosen for evacuation in the current cycle.
///
/// Besides the evacuation targets, it records the immediate trash (regions with no live data
/// that are reclaimed without copying) and, for partial cycles, the root regions: regions that
/// hold references into the targets and must be scanned, but are not evacuated.
pub struct CollectionSet {
    members: FixedBitSet,
    roots: FixedBitSet,
    /// Targets in selection order.
    regions: Vec<usize>,
    trash: Vec<usize>,
    used: usize,
    live: usize,
    garbage: usize,
    immediate_trash_bytes: usize,
}

impl CollectionSet {
    pub fn new(num_regions: usize) -> Self {
        CollectionSet {
            members: FixedBitSet::with_capacity(num_regions),
            roots: FixedBitSet::with_capacity(num_regions),
            regions: Vec::with_capacity(num_regions),
            trash: vec![],
            used: 0,
            live: 0,
            garbage: 0,
            immediate_trash_bytes: 0,
        }
    }

    /// Add a region as an evacuation target. Trash regions and regions already in a
    /// collection set are refused. Returns whether the region was added.
    pub fn add_region(&mut self, region: &RegionSnapshot) -> bool {
        if region.state.is_trash() || region.state.is_cset() {
            return false;
        }
        debug_assert!(
            region.state.is_regular(),
            "Only regular regions can be evacuated: region {} is {:?}",
            region.index,
            region.state
        );
        debug_assert!(
            !self.is_in(region.index),
            "Region {} is already in the collection set",
            region.index
        );
        debug_assert_eq!(
            region.garbage_bytes + region.live_bytes,
            region.used_bytes
        );
        self.members.insert(region.index);
        self.regions.push(region.index);
        self.used += region.used_bytes;
        self.live += region.live_bytes;
        self.garbage += region.garbage_bytes;
        trace!(
            "Add region {} to the collection set: used {}, live {}, garbage {}",
            region.index,
            region.used_bytes,
            region.live_bytes,
            region.garbage_bytes
        );
        true
    }

    /// Record a region with no live data. It is reclaimed without evacuation.
    pub fn add_immediate_trash(&mut self, index: usize, garbage: usize) {
        debug_assert!(!self.is_in(index));
        self.trash.push(index);
        self.immediate_trash_bytes += garbage;
    }

    /// Count garbage that is reclaimed without a region to trash, e.g. regions that already are trash.
    pub fn add_immediate_garbage(&mut self, garbage: usize) {
        self.immediate_trash_bytes += garbage;
    }

    pub fn add_root(&mut self, index: usize) {
        self.roots.insert(index);
    }

    /// Regions that were picked as evacuation targets cannot be roots at the same time.
    pub fn filter_roots(&mut self) {
        self.roots.difference_with(&self.members);
    }

    pub fn is_in(&self, index: usize) -> bool {
        self.members.contains(index)
    }

    pub fn is_root(&self, index: usize) -> bool {
        self.roots.contains(index)
    }

    pub fn regions(&self) -> &[usize] {
        &self.regions
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.roots.ones()
    }

    pub fn root_count(&self) -> usize {
        self.roots.count_ones(..)
    }

    pub fn immediate_trash_regions(&self) -> &[usize] {
        &self.trash
    }

    pub fn count(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn garbage(&self) -> usize {
        self.garbage
    }

    pub fn immediate_trash(&self) -> usize {
        self.immediate_trash_bytes
    }

    /// Write the selection back to the heap: targets become CSet, immediate trash becomes Trash.
    pub fn finalize(&self, table: &mut RegionTable) {
        for &idx in &self.regions {
            table[idx].make_cset();
        }
        for &idx in &self.trash {
            table[idx].make_trash();
        }
        info!(
            "Collection set: {} regions ({} used, {} live, {} garbage), {} roots, {} immediate trash in {} regions",
            self.regions.len(),
            bytes_to_formatted_string(self.used),
            bytes_to_formatted_string(self.live),
            bytes_to_formatted_string(self.garbage),
            self.root_count(),
            bytes_to_formatted_string(self.immediate_trash_bytes),
            self.trash.len()
        );
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.roots.clear();
        self.regions.clear();
        self.trash.clear();
        self.used = 0;
        self.live = 0;
        self.garbage = 0;
        self.immediate_trash_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::region::free_set::AllocType;
    use crate::policy::region::RegionState;

    #[test]
    fn add_and_count() {
        let mut cset = CollectionSet::new(8);
        assert!(cset.add_region(&RegionSnapshot::regular(2, 100, 30)));
        assert!(cset.add_region(&RegionSnapshot::regular(5, 80, 0)));
        assert_eq!(cset.regions(), &[2, 5]);
        assert_eq!(cset.used(), 180);
        assert_eq!(cset.live(), 30);
        assert_eq!(cset.garbage(), 150);
        assert!(cset.is_in(5) && !cset.is_in(3));
    }

    #[test]
    fn refuses_trash_and_cset_regions() {
        let mut cset = CollectionSet::new(4);
        let mut r = RegionSnapshot::regular(1, 100, 10);
        r.state = RegionState::Trash;
        assert!(!cset.add_region(&r));
        r.state = RegionState::CSet;
        assert!(!cset.add_region(&r));
        assert!(cset.is_empty());
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn double_add_is_a_bug() {
        let mut cset = CollectionSet::new(4);
        let r = RegionSnapshot::regular(1, 100, 10);
        cset.add_region(&r);
        cset.add_region(&r);
    }

    #[test]
    fn roots_do_not_overlap_targets() {
        let mut cset = CollectionSet::new(8);
        cset.add_region(&RegionSnapshot::regular(1, 100, 10));
        cset.add_root(1);
        cset.add_root(4);
        cset.add_root(6);
        cset.filter_roots();
        assert_eq!(cset.roots().collect::<Vec<_>>(), vec![4, 6]);
        assert!(!cset.is_root(1));
    }

    #[test]
    fn finalize_marks_regions() {
        let mut table = RegionTable::new(4, 1024, 1024);
        table[0].allocate(512, AllocType::Shared);
        table[1].allocate(512, AllocType::Shared);
        table[1].set_live_data(100);

        let mut cset = CollectionSet::new(4);
        cset.add_immediate_trash(0, 512);
        cset.add_region(&table.snapshot(1));
        cset.finalize(&mut table);
        assert!(table[0].state().is_trash());
        assert!(table[1].state().is_cset());
        assert_eq!(cset.immediate_trash(), 512);

        cset.clear();
        assert!(cset.is_empty());
        assert_eq!(cset.immediate_trash(), 0);
        assert!(cset.immediate_trash_regions().is_empty());
    }
}
