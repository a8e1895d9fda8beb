/// log2 of the number of bytes in a gigabyte
pub const LOG_BYTES_IN_GBYTE: u8 = 30;
/// The number of bytes in a gigabyte
pub const BYTES_IN_GBYTE: usize = 1 << LOG_BYTES_IN_GBYTE;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

#[cfg(target_pointer_width = "32")]
/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = 2;
#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = 3;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;

/****************************************************************************
 *
 * Region sizing
 */

/// The smallest region we are willing to manage.
pub const MIN_REGION_SIZE: usize = 256 * BYTES_IN_KBYTE;
/// The largest region we are willing to manage.
pub const MAX_REGION_SIZE: usize = 32 * BYTES_IN_MBYTE;
/// A heap must be split into at least this many regions.
pub const MIN_NUM_REGIONS: usize = 10;
/// The default number of regions the sizing logic aims for.
pub const DEFAULT_TARGET_NUM_REGIONS: usize = 2048;

/// Evacuation never reserves more than this fraction (num/denom) of the currently free bytes.
pub const EVAC_RESERVE_NUMERATOR: usize = 3;
pub const EVAC_RESERVE_DENOMINATOR: usize = 4;

/// Number of samples kept by the cycle-timing histories.
pub const CYCLE_HISTORY_WINDOW: usize = 5;

static_assertions::const_assert!(MIN_REGION_SIZE.is_power_of_two());
static_assertions::const_assert!(MAX_REGION_SIZE.is_power_of_two());
static_assertions::const_assert!(MIN_REGION_SIZE <= MAX_REGION_SIZE);
static_assertions::const_assert!(EVAC_RESERVE_NUMERATOR < EVAC_RESERVE_DENOMINATOR);
