//! Query windows and the overlap test shared by single events and the
//! recurrence expander.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::event::CalendarEvent;

/// Whether `[start, end_or_start]` of the occurrence intersects
/// `[window_start, window_end]`. Both intervals are closed.
pub fn is_in_range(event: &CalendarEvent, window_start: i64, window_end: i64) -> bool {
    event.start_time <= window_end && event.effective_end() >= window_start
}

/// A closed query window in seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: i64,
    pub end: i64,
}

impl DateRange {
    pub fn new(start: i64, end: i64) -> Self {
        DateRange { start, end }
    }

    /// Whole local days `[from 00:00:00, to 23:59:59]` in `zone`.
    pub fn days(from: NaiveDate, to: NaiveDate, zone: Tz) -> Self {
        DateRange::new(day_start(from, zone), day_end(to, zone))
    }

    /// Today plus the following `days - 1` days in `zone`.
    pub fn upcoming(now: DateTime<Utc>, days: u32, zone: Tz) -> Self {
        let today = now.with_timezone(&zone).date_naive();
        let last = today + Duration::days(i64::from(days.max(1)) - 1);
        DateRange::days(today, last, zone)
    }

    /// Build a window from optional `YYYY-MM-DD` strings.
    /// - `from` defaults to today
    /// - `to` defaults to `from + lookahead_days - 1`
    pub fn from_args(
        from: Option<&str>,
        to: Option<&str>,
        now: DateTime<Utc>,
        lookahead_days: u32,
        zone: Tz,
    ) -> Result<Self, String> {
        let from_date = match from {
            Some(s) => parse_day(s)?,
            None => now.with_timezone(&zone).date_naive(),
        };
        let to_date = match to {
            Some(s) => parse_day(s)?,
            None => from_date + Duration::days(i64::from(lookahead_days.max(1)) - 1),
        };

        if to_date < from_date {
            return Err(format!("'{}' is before '{}'", to_date, from_date));
        }

        Ok(DateRange::days(from_date, to_date, zone))
    }

    /// A window is usable when it is ordered and not before the epoch.
    pub fn is_valid(&self) -> bool {
        self.start >= 0 && self.end >= 0 && self.start <= self.end
    }

    pub fn contains_event(&self, event: &CalendarEvent) -> bool {
        is_in_range(event, self.start, self.end)
    }
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
}

fn day_start(date: NaiveDate, zone: Tz) -> i64 {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    crate::ics::time::to_utc(midnight, zone).unwrap_or_else(|| midnight.and_utc().timestamp())
}

fn day_end(date: NaiveDate, zone: Tz) -> i64 {
    let last_second = date.and_hms_opt(23, 59, 59).unwrap_or_default();
    match zone.from_local_datetime(&last_second).latest() {
        Some(dt) => dt.timestamp(),
        None => last_second.and_utc().timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start: i64, end: i64) -> CalendarEvent {
        CalendarEvent {
            start_time: start,
            end_time: end,
            ..Default::default()
        }
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let e = event(100, 200);
        assert!(is_in_range(&e, 200, 300));
        assert!(is_in_range(&e, 0, 100));
        assert!(!is_in_range(&e, 201, 300));
        assert!(!is_in_range(&e, 0, 99));
    }

    #[test]
    fn test_multi_day_overlapping_one_boundary() {
        let e = event(100, 1_000);
        assert!(is_in_range(&e, 500, 2_000));
        assert!(is_in_range(&e, 0, 150));
        assert!(is_in_range(&e, 300, 400));
    }

    #[test]
    fn test_unspecified_end_is_a_point() {
        let e = event(100, 0);
        assert!(is_in_range(&e, 100, 100));
        assert!(!is_in_range(&e, 101, 500));
    }

    #[test]
    fn test_shrinking_window_never_adds_matches() {
        let e = event(1_000, 2_000);
        let windows = [(0, 5_000), (500, 3_000), (1_500, 1_600), (2_100, 3_000), (0, 900)];
        for (ws, we) in windows {
            let outer = is_in_range(&e, ws, we);
            for shrink in [0, 50, 400] {
                if ws + shrink <= we - shrink && is_in_range(&e, ws + shrink, we - shrink) {
                    assert!(outer, "window ({ws}, {we}) shrunk by {shrink} gained a match");
                }
            }
            assert_eq!(outer, ws <= 2_000 && we >= 1_000);
        }
    }

    #[test]
    fn test_from_args_defaults_to_lookahead() {
        let now = Utc.with_ymd_and_hms(2025, 12, 1, 15, 0, 0).unwrap();
        let range = DateRange::from_args(None, None, now, 7, Tz::UTC).unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap().timestamp());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2025, 12, 7, 23, 59, 59).unwrap().timestamp());

        let range =
            DateRange::from_args(Some("2025-12-01"), Some("2025-12-31"), now, 7, Tz::UTC).unwrap();
        assert_eq!(range.end, Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap().timestamp());
        assert!(range.is_valid());

        assert!(DateRange::from_args(Some("12/01/2025"), None, now, 7, Tz::UTC).is_err());
        assert!(DateRange::from_args(Some("2025-12-05"), Some("2025-12-01"), now, 7, Tz::UTC).is_err());
    }

    #[test]
    fn test_upcoming_uses_local_day() {
        // 23:30 UTC on Nov 30 is already Dec 1 in Berlin
        let now = Utc.with_ymd_and_hms(2025, 11, 30, 23, 30, 0).unwrap();
        let range = DateRange::upcoming(now, 1, Tz::Europe__Berlin);
        assert_eq!(range.start, Utc.with_ymd_and_hms(2025, 11, 30, 23, 0, 0).unwrap().timestamp());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2025, 12, 1, 22, 59, 59).unwrap().timestamp());
    }
}
