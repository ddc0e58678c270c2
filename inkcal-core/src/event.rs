//! The calendar event value type.
//!
//! A `CalendarEvent` is a plain record. The parser fills one in per VEVENT,
//! the expander clones it per occurrence, and the cache rebuilds it from a
//! fixed-width record. Nothing holds a reference back to where it came from.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// A single calendar event, or one occurrence of a recurring series.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// UID as found in the source. May be empty and is not guaranteed unique.
    pub uid: String,
    pub summary: String,
    pub location: String,
    pub description: String,

    /// Seconds since the Unix epoch (UTC).
    pub start_time: i64,
    /// Seconds since the Unix epoch (UTC). `0` means unspecified.
    pub end_time: i64,
    pub all_day: bool,

    // Derived from start_time, kept for grid display
    pub day_of_month: u8,
    /// Display date `YYYY-MM-DD`
    pub date: String,

    /// Raw RRULE value, empty for single events
    pub rrule: String,
    /// TZID as written in the source (display only)
    pub tzid: Option<String>,
    pub status: EventStatus,

    // Set by the caller after parsing
    pub calendar_name: String,
    pub calendar_color: String,
    pub is_holiday: bool,

    // Relative to "now" at query time; see `refresh_day_flags`
    pub is_today: bool,
    pub is_tomorrow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    pub fn from_ics_str(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "TENTATIVE" => EventStatus::Tentative,
            "CANCELLED" => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        }
    }
}

/// Convert a Unix timestamp to a UTC datetime.
pub fn datetime(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

impl CalendarEvent {
    pub fn is_recurring(&self) -> bool {
        !self.rrule.is_empty()
    }

    /// End time for range comparisons: an unspecified end collapses to the start.
    pub fn effective_end(&self) -> i64 {
        if self.end_time == 0 {
            self.start_time
        } else {
            self.end_time
        }
    }

    /// Length of the event in seconds (0 when the end is unspecified).
    pub fn duration(&self) -> i64 {
        (self.effective_end() - self.start_time).max(0)
    }

    pub fn is_multi_day(&self) -> bool {
        if self.all_day {
            self.duration() > SECONDS_PER_DAY
        } else {
            self.duration() >= SECONDS_PER_DAY
        }
    }

    /// Set both timestamps and recompute the derived display fields.
    ///
    /// All-day events are dated in UTC (they sit on UTC midnight); timed
    /// events are dated in `zone`.
    pub fn set_times(&mut self, start_time: i64, end_time: i64, zone: Tz) {
        self.start_time = start_time;
        self.end_time = end_time;

        if let Some(date) = self.local_date(start_time, zone) {
            self.day_of_month = date.day() as u8;
            self.date = date.format("%Y-%m-%d").to_string();
        }
    }

    /// Recompute `is_today`/`is_tomorrow` for the given "now".
    pub fn refresh_day_flags(&mut self, now: DateTime<Utc>, zone: Tz) {
        let today = now.with_timezone(&zone).date_naive();
        let tomorrow = today + Duration::days(1);

        let Some(first) = self.local_date(self.start_time, zone) else {
            self.is_today = false;
            self.is_tomorrow = false;
            return;
        };

        // An end on a day boundary is exclusive, for all-day and timed events alike
        let end = self.effective_end();
        let last_ts = if end > self.start_time && self.ends_at_midnight(end, zone) {
            end - 1
        } else {
            end
        };
        let last = self.local_date(last_ts, zone).unwrap_or(first);

        self.is_today = first <= today && today <= last;
        self.is_tomorrow = first <= tomorrow && tomorrow <= last;
    }

    fn ends_at_midnight(&self, end: i64, zone: Tz) -> bool {
        if self.all_day {
            return true;
        }
        datetime(end).is_some_and(|dt| dt.with_timezone(&zone).time() == NaiveTime::MIN)
    }

    fn local_date(&self, ts: i64, zone: Tz) -> Option<NaiveDate> {
        let dt = datetime(ts)?;
        if self.all_day {
            Some(dt.date_naive())
        } else {
            Some(dt.with_timezone(&zone).date_naive())
        }
    }
}

impl fmt::Display for CalendarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.summary.is_empty() {
            write!(f, "(No title)")
        } else {
            write!(f, "{}", self.summary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap().timestamp()
    }

    #[test]
    fn test_unspecified_end_collapses_to_start() {
        let event = CalendarEvent {
            start_time: ts(2025, 3, 1, 9, 0),
            end_time: 0,
            ..Default::default()
        };
        assert_eq!(event.effective_end(), event.start_time);
        assert_eq!(event.duration(), 0);
        assert!(!event.is_multi_day());
    }

    #[test]
    fn test_set_times_uses_zone_for_timed_events() {
        let mut event = CalendarEvent::default();
        // 23:30 UTC is already the next day in Berlin
        event.set_times(ts(2025, 6, 14, 23, 30), 0, Tz::Europe__Berlin);
        assert_eq!(event.day_of_month, 15);
        assert_eq!(event.date, "2025-06-15");
    }

    #[test]
    fn test_set_times_keeps_all_day_in_utc() {
        let mut event = CalendarEvent {
            all_day: true,
            ..Default::default()
        };
        event.set_times(ts(2025, 12, 25, 0, 0), ts(2025, 12, 26, 0, 0), Tz::America__Los_Angeles);
        assert_eq!(event.day_of_month, 25);
        assert_eq!(event.date, "2025-12-25");
    }

    #[test]
    fn test_day_flags_for_multi_day_all_day_event() {
        let mut event = CalendarEvent {
            all_day: true,
            start_time: ts(2025, 3, 10, 0, 0),
            end_time: ts(2025, 3, 13, 0, 0),
            ..Default::default()
        };
        assert!(event.is_multi_day());

        let now = Utc.with_ymd_and_hms(2025, 3, 11, 8, 0, 0).unwrap();
        event.refresh_day_flags(now, Tz::UTC);
        assert!(event.is_today);
        assert!(event.is_tomorrow);

        // Exclusive end: the 13th is not covered
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 8, 0, 0).unwrap();
        event.refresh_day_flags(now, Tz::UTC);
        assert!(event.is_today);
        assert!(!event.is_tomorrow);
    }

    #[test]
    fn test_timed_event_ending_at_local_midnight_stays_on_its_day() {
        // 22:00 to 00:00 Berlin time (CEST, UTC+2)
        let mut event = CalendarEvent {
            start_time: ts(2025, 6, 14, 20, 0),
            end_time: ts(2025, 6, 14, 22, 0),
            ..Default::default()
        };

        let now = Utc.with_ymd_and_hms(2025, 6, 14, 10, 0, 0).unwrap();
        event.refresh_day_flags(now, Tz::Europe__Berlin);
        assert!(event.is_today);
        assert!(!event.is_tomorrow);

        // One second past midnight reaches into the next day
        event.end_time += 1;
        event.refresh_day_flags(now, Tz::Europe__Berlin);
        assert!(event.is_today);
        assert!(event.is_tomorrow);
    }

    #[test]
    fn test_status_from_ics() {
        assert_eq!(EventStatus::from_ics_str("cancelled"), EventStatus::Cancelled);
        assert_eq!(EventStatus::from_ics_str("TENTATIVE"), EventStatus::Tentative);
        assert_eq!(EventStatus::from_ics_str("whatever"), EventStatus::Confirmed);
    }
}
