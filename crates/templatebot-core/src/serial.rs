//! Serial number allocation for document series.
//!
//! Document handles such as `SQR-002` are permanent public identifiers, so
//! the allocator always proposes the lowest unused positive integer: gaps
//! left by retired numbers are filled before the series is extended.

use crate::paths::serial_in_series;

/// Propose the next serial number given the numbers already in use.
pub fn propose(existing: &[u32]) -> u32 {
    let mut numbers: Vec<u32> = existing.iter().copied().filter(|n| *n > 0).collect();
    numbers.sort_unstable();
    numbers.dedup();

    let Some(&first) = numbers.first() else {
        return 1;
    };
    if first > 1 {
        return 1;
    }
    for pair in numbers.windows(2) {
        if pair[1] != pair[0] + 1 {
            return pair[0] + 1;
        }
    }
    // `numbers` is non-empty here.
    numbers[numbers.len() - 1] + 1
}

/// Collect the serial numbers used by repositories named `{series}-NNN`.
pub fn numbers_in_series<'a, I>(repo_names: I, series: &str) -> Vec<u32>
where
    I: IntoIterator<Item = &'a str>,
{
    repo_names
        .into_iter()
        .filter_map(|name| serial_in_series(name, series))
        .collect()
}

/// Zero-padded serial as used in repository names, e.g. `002`.
pub fn format_serial(n: u32) -> String {
    format!("{n:03}")
}
