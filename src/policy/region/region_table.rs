use super::region::{HeapRegion, RegionSizes, RegionSnapshot};
use std::ops::{Index, IndexMut};

/// All the regions of the heap, indexed by region number.
/// The table is owned by the heap and only touched under the heap lock.
pub struct RegionTable {
    regions: Vec<HeapRegion>,
    region_size: usize,
    humongous_threshold: usize,
    /// Incremented on every mutator allocation. 0 means "never allocated".
    alloc_seq: u64,
}

impl RegionTable {
    pub fn new(num_regions: usize, region_size: usize, humongous_threshold: usize) -> Self {
        debug_assert!(region_size > 0);
        debug_assert!(humongous_threshold <= region_size);
        RegionTable {
            regions: (0..num_regions)
                .map(|i| HeapRegion::new(i, region_size))
                .collect(),
            region_size,
            humongous_threshold,
            alloc_seq: 0,
        }
    }

    pub fn from_sizes(sizes: &RegionSizes) -> Self {
        Self::new(
            sizes.region_count,
            sizes.region_size,
            sizes.humongous_threshold,
        )
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn region_size(&self) -> usize {
        self.region_size
    }

    pub fn humongous_threshold(&self) -> usize {
        self.humongous_threshold
    }

    pub fn capacity(&self) -> usize {
        self.regions.len() * self.region_size
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeapRegion> {
        self.regions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut HeapRegion> {
        self.regions.iter_mut()
    }

    pub fn snapshot(&self, index: usize) -> RegionSnapshot {
        self.regions[index].snapshot()
    }

    /// The sequence number of the latest mutator allocation.
    pub fn current_alloc_seq(&self) -> u64 {
        self.alloc_seq
    }

    /// Record a mutator allocation into the region, stamping it with a fresh sequence number.
    pub fn stamp_allocation(&mut self, index: usize) -> u64 {
        self.alloc_seq += 1;
        let seq = self.alloc_seq;
        self.regions[index].stamp_alloc_seq(seq);
        seq
    }

    pub fn used(&self) -> usize {
        self.regions.iter().map(|r| r.used()).sum()
    }
}

impl Index<usize> for RegionTable {
    type Output = HeapRegion;

    fn index(&self, index: usize) -> &HeapRegion {
        &self.regions[index]
    }
}

impl IndexMut<usize> for RegionTable {
    fn index_mut(&mut self, index: usize) -> &mut HeapRegion {
        &mut self.regions[index]
    }
}
