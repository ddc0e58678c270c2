//! DTSTART/DTEND normalization.
//!
//! Every form a feed can use (UTC, floating, TZID-qualified, date-only) is
//! reduced to one UTC timestamp so downstream comparisons never need to know
//! about zones again.

use chrono::{Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::clock::TimeSource;
use crate::error::DateTimeError;

/// A timestamp plus whether it came from a date-only value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedTime {
    pub timestamp: i64,
    pub all_day: bool,
}

/// Normalize a raw date or date-time value.
///
/// - `...Z` is UTC, whatever the TZID says.
/// - With a TZID the wall clock is read in that zone (local zone when unknown).
/// - Without either it is floating and read in the local zone.
/// - Date-only values become 00:00:00 UTC with `all_day` set.
pub fn normalize(
    raw: &str,
    tzid: Option<&str>,
    is_date: bool,
    clock: &dyn TimeSource,
) -> Result<NormalizedTime, DateTimeError> {
    let value = raw.trim();

    if is_date || is_date_only(value) {
        let date = parse_date(value.get(..8).unwrap_or(value))?;
        return Ok(NormalizedTime {
            timestamp: date_to_timestamp(date),
            all_day: true,
        });
    }

    if let Some(utc) = value.strip_suffix(['Z', 'z']) {
        let naive = parse_date_time(utc)?;
        return Ok(NormalizedTime {
            timestamp: naive.and_utc().timestamp(),
            all_day: false,
        });
    }

    let naive = parse_date_time(value)?;
    let zone = match tzid {
        Some(tzid) if !tzid.is_empty() => clock.zone(tzid),
        _ => clock.local_zone(),
    };

    let timestamp =
        to_utc(naive, zone).ok_or_else(|| DateTimeError::new(value, "a local date-time"))?;

    Ok(NormalizedTime {
        timestamp,
        all_day: false,
    })
}

fn is_date_only(value: &str) -> bool {
    value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit())
}

pub fn parse_date(value: &str) -> Result<NaiveDate, DateTimeError> {
    NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|_| DateTimeError::new(value, "YYYYMMDD"))
}

/// Parse `YYYYMMDDTHHMMSS`, tolerating a missing seconds field.
pub fn parse_date_time(value: &str) -> Result<NaiveDateTime, DateTimeError> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M"))
        .map_err(|_| DateTimeError::new(value, "YYYYMMDDTHHMMSS"))
}

pub fn date_to_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Map a wall-clock time in `zone` to a UTC timestamp.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap move forward to the first wall-clock minute that exists.
pub fn to_utc(naive: NaiveDateTime, zone: Tz) -> Option<i64> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.timestamp()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp()),
        LocalResult::None => (1..=180)
            .map(|minutes| naive + Duration::minutes(minutes))
            .find_map(|shifted| zone.from_local_datetime(&shifted).earliest())
            .map(|dt| dt.timestamp()),
    }
}
