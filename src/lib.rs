//! regc decides when a region-based, mostly-concurrent garbage collector should run a cycle,
//! and which regions that cycle should evacuate.
//!
//! The crate does not trace or copy objects. It owns the pieces of a collector that are pure
//! policy and bookkeeping:
//! * [`util::options`]: the runtime options, from defaults, `REGC_*` environment variables and
//!   bulk strings.
//! * [`plan::config`]: the ergonomics of the selected heuristics applied on top of the options.
//! * [`plan::heuristics`]: the cycle triggers, the collection set selection and the adaptive
//!   free threshold, for each heuristics family.
//! * [`policy::region`]: the region table, the free set allocation draws from, and the collection set.
//! * [`policy::regionspace`]: a heap of regions behind a heap lock, which implements [`vm::Heap`].
//!
//! A collector polls [`plan::heuristics::Heuristics::should_start_cycle`] from its control thread,
//! and asks the heuristics for a collection set once marking is done.

#[cfg(test)]
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod plan;
pub mod policy;
pub mod util;
pub mod vm;

pub use crate::plan::config::{CollectorConfig, CollectorFlags};
pub use crate::plan::heuristics::{create_heuristics, CycleMode, CycleOutcome, Heuristics, Phase};
pub use crate::policy::regionspace::RegionSpace;
pub use crate::util::options::Options;
