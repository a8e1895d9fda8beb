use regc::policy::region::*;
use regc::vm::{ConnectionMatrix, Heap};
use regc::{create_heuristics, CollectorConfig, CycleMode, Options, RegionSpace};
use std::collections::HashSet;
use std::sync::Arc;

const REGION: usize = 1024;

fn table_with_full_region(num_regions: usize, full: usize) -> (RegionTable, FreeSet) {
    let mut table = RegionTable::new(num_regions, REGION, REGION);
    table[full].allocate(REGION, AllocType::Shared).unwrap();
    let mut free_set = FreeSet::new(num_regions);
    free_set.rebuild(&table);
    (table, free_set)
}

#[test]
fn humongous_takes_first_contiguous_run() {
    let (mut table, mut free_set) = table_with_full_region(4, 2);
    assert_eq!(free_set.count(), 3);

    let a = free_set
        .allocate(&mut table, &AllocRequest::for_shared(2 * REGION))
        .unwrap();
    assert_eq!(a.region, 0);
    assert!(table[0].state().is_humongous_start());
    assert!(table[1].state().is_humongous_continuation());
    assert!(!free_set.is_free(0));
    assert!(!free_set.is_free(1));
    assert!(free_set.is_free(3));
    assert_eq!(free_set.leftmost(), 3);
    assert_eq!(free_set.rightmost(), 3);
    assert_eq!(free_set.available(), REGION);
}

#[test]
fn humongous_skips_gaps() {
    let (mut table, mut free_set) = table_with_full_region(6, 1);
    let a = free_set
        .allocate(&mut table, &AllocRequest::for_shared(3 * REGION))
        .unwrap();
    assert_eq!(a.region, 2);
    assert!(free_set.is_free(0));
    assert!(free_set.is_free(5));

    // Only regions 0 and 5 are left, and they are not contiguous.
    let failed = free_set.allocate(&mut table, &AllocRequest::for_shared(2 * REGION));
    assert_eq!(failed, Err(NeedsRecycle { regions: 2 }));
}

#[test]
fn failed_allocation_leaves_free_set_unchanged() {
    let (mut table, mut free_set) = table_with_full_region(4, 2);
    free_set
        .allocate(&mut table, &AllocRequest::for_shared(2 * REGION))
        .unwrap();
    let before = (free_set.count(), free_set.available(), free_set.leftmost());

    let mut recycler = TrashRecycler::default();
    for _ in 0..3 {
        let req = AllocRequest::for_shared(2 * REGION);
        assert!(free_set
            .allocate_with_recycle(&mut table, &req, &mut recycler)
            .is_err());
        assert_eq!(
            (free_set.count(), free_set.available(), free_set.leftmost()),
            before
        );
    }
    assert_eq!(recycler.recycled_regions, 0);
}

#[test]
fn humongous_recycles_trash_span() {
    let (mut table, mut free_set) = table_with_full_region(4, 2);
    for _ in 0..6 {
        free_set
            .allocate(&mut table, &AllocRequest::for_tlab(REGION / 2))
            .unwrap();
    }
    assert!(free_set.is_empty());
    table[0].make_trash();
    table[1].make_trash();

    let mut recycler = TrashRecycler::default();
    let a = free_set
        .allocate_with_recycle(&mut table, &AllocRequest::for_shared(2 * REGION), &mut recycler)
        .unwrap();
    assert_eq!(a.region, 0);
    assert_eq!(recycler.recycled_regions, 2);
    assert_eq!(recycler.reclaimed_bytes, 2 * REGION);
}

#[test]
fn concurrent_allocations_do_not_overlap() {
    const SPACE_REGION: usize = 256 * 1024;
    let mut options = Options::builtin_defaults();
    assert!(options.process_bulk(&format!(
        "heapSize={} regionSize={}",
        32 * SPACE_REGION,
        SPACE_REGION
    )));
    let config = CollectorConfig::new(options).unwrap();
    let space = Arc::new(RegionSpace::from_config(&config));
    let size = SPACE_REGION / 16;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let space = space.clone();
            std::thread::spawn(move || {
                (0..64)
                    .map(|_| space.allocate(AllocRequest::for_tlab(size)).unwrap().offset)
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let offsets: HashSet<usize> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(offsets.len(), 4 * 64);
    assert!(offsets.iter().all(|o| o % size == 0));
    assert_eq!(space.used(), 4 * 64 * size);
    assert_eq!(space.bytes_allocated_since_last_cycle(), 4 * 64 * size);
    assert_eq!(space.free_available(), 16 * SPACE_REGION);
}

/// Every region pair, as a dense bit matrix.
struct DenseMatrix {
    n: usize,
    bits: Vec<bool>,
}

impl DenseMatrix {
    fn new(n: usize) -> Self {
        DenseMatrix {
            n,
            bits: vec![false; n * n],
        }
    }

    fn connect(&mut self, from: usize, to: usize) {
        self.bits[from * self.n + to] = true;
    }
}

impl ConnectionMatrix for DenseMatrix {
    fn count_connected_to(&self, to: usize, num_regions: usize) -> usize {
        (0..num_regions)
            .filter(|&from| self.bits[from * self.n + to])
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
            if self.bits[from * self.n + to] {
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

#[test]
fn partial_cycle_over_region_space() {
    const SPACE_REGION: usize = 256 * 1024;
    let mut options = Options::builtin_defaults();
    assert!(options.process_bulk(&format!(
        "policyName=connected unlockExperimental=true inboundConnectionThreshold=2 heapSize={} regionSize={} guaranteedIntervalMs=0",
        16 * SPACE_REGION,
        SPACE_REGION
    )));
    let config = Arc::new(CollectorConfig::new(options).unwrap());
    assert!(config.flags.use_connection_matrix);
    let space = RegionSpace::from_config(&config);
    let mut heuristics = create_heuristics(config.clone());
    assert_eq!(heuristics.name(), "connected");

    for _ in 0..16 {
        space
            .allocate(AllocRequest::for_tlab(SPACE_REGION / 2))
            .unwrap();
    }
    for i in 0..8 {
        space.set_live_data(i, SPACE_REGION / 4);
    }

    let mut matrix = DenseMatrix::new(16);
    for to in 0..6 {
        for from in 10..13 {
            matrix.connect(from, to);
        }
    }
    matrix.connect(0, 6);

    assert_eq!(heuristics.should_start_cycle(&space), CycleMode::Partial);
    heuristics.record_cycle_start(CycleMode::Partial);
    let mut cset = CollectionSet::new(space.num_regions());
    heuristics.choose_collection_set(&mut cset, &space, Some(&matrix));

    // Least connected first. Regions 0 to 5 have too many referrers.
    assert_eq!(cset.regions(), &[7, 6]);
    assert_eq!(cset.roots().collect::<Vec<_>>(), vec![0]);
    assert_eq!(cset.used(), 2 * SPACE_REGION);

    space.apply_collection_set(&cset);
    assert!(space.snapshot(6).state.is_cset());
    assert!(space.snapshot(0).state.is_regular());
}
