//! Heap regions and the region-level data structures: the region table, the free set that
//! allocation draws from, and the collection set chosen by the heuristics.

pub mod collection_set;
pub mod free_set;
#[allow(clippy::module_inception)]
pub mod region;
pub mod region_table;

pub use self::collection_set::CollectionSet;
pub use self::free_set::{
    AllocRequest, AllocType, Allocation, FreeSet, NeedsRecycle, RecycleAssist, TrashRecycler,
};
pub use self::region::{HeapRegion, RegionSizes, RegionSnapshot, RegionState};
pub use self::region_table::RegionTable;
