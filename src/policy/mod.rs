//! Heap regions and the structures built over them.

pub mod region;
pub mod regionspace;

pub use self::regionspace::RegionSpace;
