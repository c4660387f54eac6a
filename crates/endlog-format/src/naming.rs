use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

use crate::error::FormatError;

/// Per-day file budget: at most this many files coexist for one date.
pub const DAILY_BUDGET: u8 = 5;

/// Build the filename for slot `n` on `date`: `YYYY-MM-DD-N.log`.
#[must_use]
pub fn file_name(date: NaiveDate, n: u8) -> String {
    format!("{}-{n}.log", date.format("%Y-%m-%d"))
}

fn file_path(dir: &Path, date: NaiveDate, n: u8) -> PathBuf {
    dir.join(file_name(date, n))
}

/// Parse a log filename, returning its date if the name matches
/// `^\d{4}-\d{2}-\d{2}-.*\.log$` strictly, with the year in `[2000, 2100]`.
#[must_use]
pub fn parse_date(name: &str) -> Option<NaiveDate> {
    let rest = name.strip_suffix(".log")?;
    // rest is "YYYY-MM-DD-<slot>"; the date prefix is always 10 bytes.
    if rest.len() < 11 {
        return None;
    }
    let (date_part, tail) = rest.split_at(10);
    if !tail.starts_with('-') {
        return None;
    }
    let bytes = date_part.as_bytes();
    let is_digit_at = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);
    let digits_ok = (0..4).all(is_digit_at)
        && bytes[4] == b'-'
        && (5..7).all(is_digit_at)
        && bytes[7] == b'-'
        && (8..10).all(is_digit_at);
    if !digits_ok {
        return None;
    }

    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    let year = date.format("%Y").to_string().parse::<i32>().ok()?;
    if !(2000..=2100).contains(&year) {
        return None;
    }
    Some(date)
}

/// Probe slots `0..DAILY_BUDGET` for `date` via existence checks (a fixed
/// bounded scan, not a directory enumeration) and return the largest slot
/// that exists, or `-1` if none do.
#[must_use]
pub fn find_latest(dir: &Path, date: NaiveDate) -> i32 {
    let mut latest = -1i32;
    for n in 0..DAILY_BUDGET {
        if file_path(dir, date, n).exists() {
            latest = i32::from(n);
        }
    }
    latest
}

/// Compute the slot to create next for `today`, recycling slot 0 when the
/// per-day budget is exhausted.
///
/// If the latest existing slot `k` is `< DAILY_BUDGET - 1`, the next slot is
/// `k + 1`. If `k == DAILY_BUDGET - 1`, slot 0 is unlinked and reused,
/// preserving the per-day budget under sustained load.
pub fn next_slot(dir: &Path, today: NaiveDate) -> Result<u8, FormatError> {
    let latest = find_latest(dir, today);
    if latest < i32::from(DAILY_BUDGET) - 1 {
        return Ok((latest + 1) as u8);
    }

    let recycled = file_path(dir, today, 0);
    if recycled.exists() {
        fs::remove_file(&recycled).map_err(|source| FormatError::DirAccess {
            path: recycled.clone(),
            source,
        })?;
        debug!(path = %recycled.display(), "recycled oldest slot of the day");
    }
    Ok(0)
}
