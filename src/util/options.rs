use crate::util::constants::{BYTES_IN_MBYTE, DEFAULT_TARGET_NUM_REGIONS};
use std::collections::HashSet;
use std::default::Default;
use strum_macros::{EnumString, IntoStaticStr};

/// Which heuristics drive the collector. Selected once at startup.
#[derive(Copy, Clone, EnumString, IntoStaticStr, Debug, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum HeuristicsSelector {
    /// Garbage-first selection with an adaptive free threshold.
    #[strum(to_string = "adaptive", serialize = "garbage_first")]
    Adaptive,
    /// Fixed free threshold, single-pass threshold filter.
    #[strum(serialize = "static")]
    Static,
    /// Triggers early and often to keep the footprint small.
    #[strum(serialize = "compact")]
    Compact,
    /// Never triggers concurrent cycles on its own.
    #[strum(serialize = "passive")]
    Passive,
    /// Always triggers and evacuates everything with garbage. For stress testing.
    #[strum(serialize = "aggressive")]
    Aggressive,
    /// Partial cycles over the least-connected regions.
    #[strum(serialize = "connected")]
    Connected,
    /// Partial cycles over the most recently allocated regions.
    #[strum(serialize = "generational")]
    Generational,
    /// Partial cycles over the least recently allocated regions.
    #[strum(serialize = "lru")]
    Lru,
}

impl HeuristicsSelector {
    /// Partial-cycle policies rely on the connection matrix.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            HeuristicsSelector::Connected | HeuristicsSelector::Generational | HeuristicsSelector::Lru
        )
    }

    /// Policies that must be unlocked with `unlock_experimental`.
    pub fn is_experimental(&self) -> bool {
        self.is_partial()
    }

    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Whether update-references runs as its own phase right after evacuation.
#[derive(Copy, Clone, EnumString, Debug, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum UpdateRefsMode {
    #[strum(serialize = "on")]
    On,
    #[strum(serialize = "off")]
    Off,
    #[strum(serialize = "adaptive")]
    Adaptive,
}

/// The default heap size when nothing else is specified.
pub const DEFAULT_HEAP_SIZE: usize = 64 * BYTES_IN_MBYTE;

fn always_valid<T>(_: &T) -> bool {
    true
}

fn is_percentage(v: &usize) -> bool {
    *v <= 100
}

macro_rules! options {
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($name: $type[$validator] = $default),*);
    ];
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        #[derive(Clone, Debug)]
        pub struct Options {
            $(pub $name: $type,)*
            /// Names of the options given explicitly (by env vars or by calling `process()`).
            set_by_user: HashSet<&'static str>,
        }
        impl Options {
            /// Set an option from its snake_case name. Returns whether the value was accepted.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling process()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                            self.set_by_user.insert(stringify!($name));
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("Unknown option {}={:?}. Ignored.", s, val);
                        false
                    }
                }
            }

            /// Was the option given explicitly rather than left at its default?
            pub fn is_set_by_user(&self, s: &str) -> bool {
                self.set_by_user.contains(s)
            }

            /// Options with their defaults only, ignoring the environment.
            pub fn builtin_defaults() -> Self {
                Options {
                    $($name: $default,)*
                    set_by_user: HashSet::new(),
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Self::builtin_defaults();

                // If we have env vars that start with REGC_ and match any option (such as REGC_FREE_THRESHOLD_PERCENT),
                // we set the option to its value (if it is a valid value). Otherwise, use the default value.
                const PREFIX: &str = "REGC_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    // The heuristics to use. Read once when the collector config is built.
    policy_name:                    HeuristicsSelector [always_valid] = HeuristicsSelector::Adaptive,
    // Start a cycle when less than this percent of the heap is free. The adaptive policy tunes this.
    free_threshold_percent:         usize   [is_percentage] = 10,
    // Regions with at least this percent of garbage are worth evacuating.
    garbage_threshold_percent:      usize   [is_percentage] = 60,
    // Do not start a cycle until this percent of the heap was allocated since the last one.
    allocation_threshold_percent:   usize   [is_percentage] = 0,
    // Start a cycle if none ran for this long, regardless of occupancy. 0 disables it.
    guaranteed_interval_ms:         u64     [always_valid] = 5 * 60 * 1000,
    // Lower bound of the adaptive free threshold.
    min_free_threshold:             usize   [is_percentage] = 3,
    // Upper bound of the adaptive free threshold.
    max_free_threshold:             usize   [is_percentage] = 70,
    // Successful cycles in a row needed before the free threshold is lowered.
    happy_cycles_threshold:         usize   [always_valid] = 3,
    // Partial cycles only evacuate regions with fewer inbound connections than this.
    inbound_connection_threshold:   usize   [|v: &usize| *v > 0] = 10,
    // Skip algorithmic selection when immediate garbage exceeds this percent of all garbage.
    immediate_threshold_percent:    usize   [is_percentage] = 90,
    // Largest threshold step taken after a successful concurrent cycle.
    max_normal_step:                usize   [is_percentage] = 5,
    // Threshold step taken after a degenerated cycle.
    degenerated_step:               usize   [is_percentage] = 10,
    // Threshold step taken after a full collection caused by allocation failure.
    alloc_failure_step:             usize   [is_percentage] = 20,
    // Threshold step taken after an explicitly requested cycle.
    explicit_request_step:          usize   [is_percentage] = 0,
    // Run update-references as its own phase right after evacuation, instead of folding it into
    // the next marking: on, off, or adaptive.
    update_refs_early:              UpdateRefsMode [always_valid] = UpdateRefsMode::Adaptive,
    // Adaptive update-refs folds into marking again once mark + update-refs is below this percent of the cycle gap.
    merge_update_refs_min_gap:      usize   [always_valid] = 100,
    // Adaptive update-refs runs early once mark + update-refs is above this percent of the cycle gap.
    merge_update_refs_max_gap:      usize   [always_valid] = 200,
    // Partial connected cycles start after this percent of the heap was allocated.
    connectedness_percentage:       usize   [is_percentage] = 5,
    // Partial generational cycles start after this percent of the heap was allocated.
    young_gen_percentage:           usize   [is_percentage] = 20,
    // Partial LRU cycles start after this percent of the heap was allocated.
    lru_old_gen_percentage:         usize   [is_percentage] = 20,
    // Partial LRU cycles do not start below this heap occupancy percent.
    lru_min_occupancy_percentage:   usize   [is_percentage] = 40,
    // Process references every N-th cycle. 0 means never.
    ref_proc_frequency:             usize   [always_valid] = 5,
    // Unload classes every N-th cycle. 0 means never.
    unload_classes_frequency:       usize   [always_valid] = 5,
    // Upgrade to a full collection after this many degenerated cycles in a row.
    full_gc_threshold:              usize   [always_valid] = 3,
    // Allow a cancelled concurrent cycle to continue stop-the-world.
    degenerated_gc:                 bool    [always_valid] = true,
    // Uncommit empty regions after they stayed empty this long.
    uncommit_delay_ms:              u64     [always_valid] = 5 * 60 * 1000,
    // Allow experimental heuristics.
    unlock_experimental:            bool    [always_valid] = false,
    // The maximum heap size in bytes.
    heap_size:                      usize   [|v: &usize| *v > 0] = DEFAULT_HEAP_SIZE,
    // The region size in bytes. 0 lets the collector pick one.
    region_size:                    usize   [always_valid] = 0,
    // The number of regions the automatic region sizing aims for.
    target_num_regions:             usize   [|v: &usize| *v > 0] = DEFAULT_TARGET_NUM_REGIONS,
    // Objects at least this percent of a region are allocated as humongous.
    humongous_threshold_percent:    usize   [|v: &usize| *v > 0 && *v <= 100] = 100,
}

impl Options {
    /// Set an option by its camelCase (`freeThresholdPercent`) or snake_case name.
    pub fn process(&mut self, name: &str, value: &str) -> bool {
        self.set_from_camelcase_str(name, value)
    }

    /// Set a list of `name=value` pairs, separated by whitespace. Returns false if any of them fails.
    pub fn process_bulk(&mut self, options: &str) -> bool {
        let mut all_accepted = true;
        for opt in options.split_ascii_whitespace() {
            let kv: Vec<&str> = opt.split('=').collect();
            if kv.len() != 2 {
                warn!("Malformed option {:?}. Expected name=value.", opt);
                all_accepted = false;
                continue;
            }
            all_accepted &= self.process(kv[0], kv[1]);
        }
        all_accepted
    }

    fn set_from_camelcase_str(&mut self, s: &str, val: &str) -> bool {
        trace!("Trying to process option pair: ({}, {})", s, val);

        let mut sr = String::with_capacity(s.len());
        for c in s.chars() {
            if c.is_uppercase() {
                sr.push('_');
                for c in c.to_lowercase() {
                    sr.push(c);
                }
            } else {
                sr.push(c)
            }
        }

        let result = self.set_from_str(sr.as_str(), val);

        trace!("Trying to process option pair: ({})", sr);

        if result {
            trace!("Validation passed");
        } else {
            trace!("Validation failed")
        }
        result
    }
}
