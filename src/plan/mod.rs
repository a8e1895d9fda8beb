//! The collector configuration and the heuristics that drive the cycles.
//!
//! [`CollectorConfig`] is built once from the [`Options`](crate::util::options::Options) and
//! shared by everything else. [`create_heuristics`](heuristics::create_heuristics) picks the
//! heuristics named by the `policy_name` option.

pub mod config;
pub mod heuristics;

pub use self::config::{CollectorConfig, CollectorFlags};
pub use self::heuristics::Heuristics;
