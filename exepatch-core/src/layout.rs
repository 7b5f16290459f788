//! Layout rules checked after parsing and again before serializing.
//!
//! Rules are expressed over [`ByteRange`]s taken from a model. A failed rule
//! is an `InvariantViolation` naming the structure and its offset.

pub mod elf;
pub mod pe;

use crate::bytes::ByteRange;
use crate::error::{Error, Result};

/// A named range taking part in a disjointness check.
#[derive(Debug, Clone)]
pub(crate) struct Region {
    pub name: String,
    pub range: ByteRange,
}

impl Region {
    pub(crate) fn new(name: impl Into<String>, range: ByteRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }
}

pub(crate) fn is_power_of_two_or_zero(value: u64) -> bool {
    value == 0 || value.is_power_of_two()
}

pub(crate) fn check_in_bounds(region: &Region, file_len: u64) -> Result<()> {
    if region.range.fits_in(file_len) {
        return Ok(());
    }
    Err(Error::violation(
        &region.name,
        region.range.offset,
        format!("{} exceeds file length {file_len:#x}", region.range),
    ))
}

/// Fail on the first pair of overlapping regions that `allowed` does not excuse.
pub(crate) fn check_disjoint(
    what: &str,
    mut regions: Vec<Region>,
    allowed: impl Fn(&Region, &Region) -> bool,
) -> Result<()> {
    regions.retain(|r| !r.range.is_empty());
    regions.sort_by_key(|r| r.range.offset);
    for (i, a) in regions.iter().enumerate() {
        let end = a.range.end().unwrap_or(u64::MAX);
        for b in regions[i + 1..].iter().take_while(|b| b.range.offset < end) {
            if !allowed(a, b) {
                return Err(Error::violation(
                    &b.name,
                    b.range.offset,
                    format!("{what} {} overlaps {} {}", b.range, a.name, a.range),
                ));
            }
        }
    }
    Ok(())
}

/// Log a rejection on its way out.
pub(crate) fn reported(result: Result<()>) -> Result<()> {
    if let Err(err) = &result {
        log::warn!("layout rejected: {err}");
    }
    result
}
