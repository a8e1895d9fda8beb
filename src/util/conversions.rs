use crate::util::constants::{EVAC_RESERVE_DENOMINATOR, EVAC_RESERVE_NUMERATOR};

pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/e620d0f337d0643c757bab791fc7d88d63217704/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

pub const fn raw_align_down(val: usize, align: usize) -> usize {
    val & !align.wrapping_sub(1)
}

pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

/// The number of regions needed to hold `bytes`, rounding up.
pub const fn bytes_to_regions_up(bytes: usize, region_size: usize) -> usize {
    bytes.div_ceil(region_size)
}

/// `percent`% of `total`, computed without overflowing for realistic heap sizes.
pub const fn percent_of(total: usize, percent: usize) -> usize {
    total / 100 * percent + total % 100 * percent / 100
}

/// The most bytes an evacuation may copy while `free` bytes are available.
pub const fn evacuation_reserve(free: usize) -> usize {
    free / EVAC_RESERVE_DENOMINATOR * EVAC_RESERVE_NUMERATOR
        + free % EVAC_RESERVE_DENOMINATOR * EVAC_RESERVE_NUMERATOR / EVAC_RESERVE_DENOMINATOR
}

/// Round `val` down to a power of two. Returns 0 for 0.
pub const fn round_down_power_of_two(val: usize) -> usize {
    if val == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - val.leading_zeros())
    }
}

pub fn bytes_to_formatted_string(bytes: usize) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut i = 0;
    let mut num = bytes;
    while i < UNITS.len() - 1 {
        let new_num = num >> 10;
        if new_num == 0 {
            return format!("{}{}", num, UNITS[i]);
        }
        num = new_num;
        i += 1;
    }
    format!("{}{}", num, UNITS[UNITS.len() - 1])
}
