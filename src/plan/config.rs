use crate::policy::region::RegionSizes;
use crate::util::options::{HeuristicsSelector, Options};

/// Collector-wide switches that depend on the selected heuristics, e.g. which barriers the
/// compiler must emit. Fixed once the collector config is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectorFlags {
    /// Maintain the region connection matrix in the write barrier.
    pub use_connection_matrix: bool,
    /// Snapshot-at-the-beginning marking barrier.
    pub satb_barrier: bool,
    /// SATB barrier that is only active while marking. Used by partial cycles.
    pub conditional_satb_barrier: bool,
    /// Barrier on reference stores that evacuates the stored value.
    pub store_val_write_barrier: bool,
    /// Barrier on reference stores that resolves the stored value.
    pub store_val_read_barrier: bool,
    /// Stall allocating threads in proportion to the collector's progress.
    pub pacing: bool,
    /// Give memory of empty regions back to the OS.
    pub uncommit: bool,
    /// An explicit request (e.g. `System.gc()`) runs a concurrent cycle instead of a full one.
    pub explicit_gc_invokes_concurrent: bool,
    /// An implicit request (e.g. a metadata threshold) runs a concurrent cycle instead of a full one.
    pub implicit_gc_invokes_concurrent: bool,
}

impl CollectorFlags {
    pub const DEFAULT: Self = CollectorFlags {
        use_connection_matrix: false,
        satb_barrier: true,
        conditional_satb_barrier: false,
        store_val_write_barrier: false,
        store_val_read_barrier: true,
        pacing: true,
        uncommit: false,
        explicit_gc_invokes_concurrent: false,
        implicit_gc_invokes_concurrent: false,
    };
}

impl Default for CollectorFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Override the default of an option, unless the user set it explicitly.
macro_rules! ergo_override_default {
    ($options: expr, $name: ident, $value: expr) => {
        if !$options.is_set_by_user(stringify!($name)) {
            let value = $value;
            debug!(
                "Ergonomically setting {}={:?} (was {:?})",
                stringify!($name),
                value,
                $options.$name
            );
            $options.$name = value;
        }
    };
}

/// Everything the heuristics need to know about the configuration. Built once at startup
/// and shared read-only afterwards.
#[derive(Debug)]
pub struct CollectorConfig {
    pub options: Options,
    pub flags: CollectorFlags,
    pub region_sizes: RegionSizes,
}

impl CollectorConfig {
    /// Apply the ergonomics of the selected heuristics to `options`, and validate the result.
    pub fn new(mut options: Options) -> Result<Self, String> {
        let selector = options.policy_name;
        if selector.is_experimental() && !options.unlock_experimental {
            return Err(format!(
                "Heuristics \"{}\" is experimental, and must be enabled with unlock_experimental",
                selector.name()
            ));
        }

        let mut flags = CollectorFlags::default();
        apply_ergonomics(selector, &mut options, &mut flags);
        validate(&options)?;

        let region_sizes = RegionSizes::setup(
            options.heap_size,
            options.region_size,
            options.target_num_regions,
            options.humongous_threshold_percent,
        )?;

        info!(
            "Heuristics: {}, {} regions of {} bytes",
            selector.name(),
            region_sizes.region_count,
            region_sizes.region_size
        );
        Ok(CollectorConfig {
            options,
            flags,
            region_sizes,
        })
    }

    pub fn selector(&self) -> HeuristicsSelector {
        self.options.policy_name
    }
}

fn apply_ergonomics(selector: HeuristicsSelector, options: &mut Options, flags: &mut CollectorFlags) {
    match selector {
        HeuristicsSelector::Adaptive | HeuristicsSelector::Static => {
            flags.explicit_gc_invokes_concurrent = true;
            flags.implicit_gc_invokes_concurrent = true;
        }
        HeuristicsSelector::Compact => {
            flags.uncommit = true;
            ergo_override_default!(options, allocation_threshold_percent, 10);
            ergo_override_default!(options, immediate_threshold_percent, 100);
            ergo_override_default!(options, uncommit_delay_ms, 5000);
            ergo_override_default!(options, guaranteed_interval_ms, 30000);
            ergo_override_default!(options, garbage_threshold_percent, 20);
        }
        HeuristicsSelector::Passive => {
            // Passive never runs concurrent phases, so no barrier is needed.
            flags.satb_barrier = false;
            flags.conditional_satb_barrier = false;
            flags.store_val_write_barrier = false;
            flags.store_val_read_barrier = false;
            flags.pacing = false;
            flags.explicit_gc_invokes_concurrent = false;
        }
        HeuristicsSelector::Aggressive => {
            ergo_override_default!(options, immediate_threshold_percent, 100);
            flags.pacing = false;
            flags.explicit_gc_invokes_concurrent = true;
            flags.implicit_gc_invokes_concurrent = true;
        }
        HeuristicsSelector::Connected
        | HeuristicsSelector::Generational
        | HeuristicsSelector::Lru => {
            flags.use_connection_matrix = true;
            flags.conditional_satb_barrier = true;
            flags.satb_barrier = false;
            flags.store_val_write_barrier = true;
            flags.store_val_read_barrier = false;
            ergo_override_default!(options, ref_proc_frequency, 1);
        }
    }
}

fn validate(options: &Options) -> Result<(), String> {
    if options.min_free_threshold > options.max_free_threshold {
        return Err(format!(
            "min_free_threshold ({}) is larger than max_free_threshold ({})",
            options.min_free_threshold, options.max_free_threshold
        ));
    }
    if options.free_threshold_percent < options.min_free_threshold
        || options.free_threshold_percent > options.max_free_threshold
    {
        return Err(format!(
            "free_threshold_percent ({}) is outside of [{}, {}]",
            options.free_threshold_percent, options.min_free_threshold, options.max_free_threshold
        ));
    }
    if options.merge_update_refs_min_gap > options.merge_update_refs_max_gap {
        return Err(format!(
            "merge_update_refs_min_gap ({}) is larger than merge_update_refs_max_gap ({})",
            options.merge_update_refs_min_gap, options.merge_update_refs_max_gap
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_for(policy: &str) -> Options {
        let mut options = Options::builtin_defaults();
        assert!(options.process("policyName", policy));
        options
    }

    #[test]
    fn compact_overrides_defaults() {
        let config = CollectorConfig::new(options_for("compact")).unwrap();
        assert_eq!(config.options.allocation_threshold_percent, 10);
        assert_eq!(config.options.garbage_threshold_percent, 20);
        assert_eq!(config.options.guaranteed_interval_ms, 30000);
        assert!(config.flags.uncommit);
    }

    #[test]
    fn user_settings_win_over_ergonomics() {
        let mut options = options_for("compact");
        assert!(options.process("garbageThresholdPercent", "45"));
        let config = CollectorConfig::new(options).unwrap();
        assert_eq!(config.options.garbage_threshold_percent, 45);
        assert_eq!(config.options.allocation_threshold_percent, 10);
    }

    #[test]
    fn passive_disables_barriers() {
        let config = CollectorConfig::new(options_for("passive")).unwrap();
        assert!(!config.flags.satb_barrier);
        assert!(!config.flags.store_val_read_barrier);
        assert!(!config.flags.pacing);
    }

    #[test]
    fn partial_requires_unlock() {
        let err = CollectorConfig::new(options_for("connected")).unwrap_err();
        assert!(err.contains("experimental"));

        let mut options = options_for("connected");
        assert!(options.process("unlockExperimental", "true"));
        let config = CollectorConfig::new(options).unwrap();
        assert!(config.flags.use_connection_matrix);
        assert!(config.flags.conditional_satb_barrier);
        assert!(!config.flags.satb_barrier);
        assert_eq!(config.options.ref_proc_frequency, 1);
    }

    #[test]
    fn adaptive_keeps_defaults() {
        let config = CollectorConfig::new(Options::builtin_defaults()).unwrap();
        assert_eq!(config.selector(), HeuristicsSelector::Adaptive);
        assert_eq!(config.options.garbage_threshold_percent, 60);
        assert!(config.flags.satb_barrier);
        assert!(config.flags.explicit_gc_invokes_concurrent);
        assert!(!config.flags.use_connection_matrix);
    }

    #[test]
    fn rejects_inverted_free_thresholds() {
        let mut options = Options::builtin_defaults();
        assert!(options.process_bulk("minFreeThreshold=50 maxFreeThreshold=20"));
        assert!(CollectorConfig::new(options).is_err());
    }

    #[test]
    fn rejects_free_threshold_out_of_bounds() {
        let mut options = Options::builtin_defaults();
        assert!(options.process_bulk("freeThresholdPercent=90 maxFreeThreshold=70"));
        assert!(CollectorConfig::new(options).unwrap_err().contains("free_threshold_percent"));

        let mut options = Options::builtin_defaults();
        assert!(options.process_bulk("freeThresholdPercent=1 minFreeThreshold=3"));
        assert!(CollectorConfig::new(options).is_err());

        // Both ends are inclusive.
        let mut options = Options::builtin_defaults();
        assert!(options.process_bulk("freeThresholdPercent=40 minFreeThreshold=40 maxFreeThreshold=40"));
        let config = CollectorConfig::new(options).unwrap();
        assert_eq!(config.options.free_threshold_percent, 40);
    }

    #[test]
    fn rejects_heap_too_small_for_regions() {
        let mut options = Options::builtin_defaults();
        assert!(options.process("heapSize", "1048576"));
        assert!(CollectorConfig::new(options).is_err());
    }
}
