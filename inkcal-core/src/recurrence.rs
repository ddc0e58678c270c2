//! Bounded RRULE expansion.
//!
//! Expands a recurring base event into the occurrences that overlap a query
//! window. The expander never walks a series from its origin: it computes the
//! period index closest to the window directly from the date fields, then
//! steps forward by `INTERVAL` until it leaves the window.
//!
//! Dates are stepped on the anchor's wall clock, in the event's own zone when
//! its TZID resolves, so a 09:00 meeting stays at 09:00 across DST changes.
//! All-day events are stepped in UTC.
//!
//! MONTHLY/YEARLY periods that land on a date that does not exist (the 31st
//! of a 30-day month, February 29 in a common year) are skipped and do not
//! count towards COUNT.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::clock::lookup_zone;
use crate::date_range::is_in_range;
use crate::error::RecurrenceRuleError;
use crate::event::CalendarEvent;
use crate::ics::time::to_utc;
use crate::rrule::{Frequency, RecurrenceRule};

/// Default cap on occurrences returned for one series.
pub const DEFAULT_OCCURRENCE_LIMIT: usize = 366;

/// Hard cap on periods inspected per call, for rules whose filters never match.
const MAX_PERIODS: u64 = 200_000;

/// Expand `base` in UTC with the default occurrence limit.
pub fn expand(base: &CalendarEvent, window_start: i64, window_end: i64) -> Vec<CalendarEvent> {
    RecurrenceExpander::new(Tz::UTC).expand(base, window_start, window_end)
}

#[derive(Debug, Clone, Copy)]
pub struct RecurrenceExpander {
    /// Zone for floating events and for the occurrences' display dates
    zone: Tz,
    limit: usize,
}

impl RecurrenceExpander {
    pub fn new(zone: Tz) -> Self {
        RecurrenceExpander {
            zone,
            limit: DEFAULT_OCCURRENCE_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Occurrences of `base` overlapping `[window_start, window_end]`, in
    /// chronological order. Returns nothing for invalid input, including a
    /// base event whose RRULE does not parse.
    pub fn expand(
        &self,
        base: &CalendarEvent,
        window_start: i64,
        window_end: i64,
    ) -> Vec<CalendarEvent> {
        match self.rule_of(base) {
            Ok(rule) => self.expand_rule(base, &rule, window_start, window_end),
            Err(error) => {
                debug!(uid = %base.uid, %error, "not expanding event");
                Vec::new()
            }
        }
    }

    /// Parse the RRULE of `base`, reading a floating UNTIL in the series zone.
    pub fn rule_of(&self, base: &CalendarEvent) -> Result<RecurrenceRule, RecurrenceRuleError> {
        RecurrenceRule::parse(&base.rrule, self.series_zone(base))
    }

    /// Same as [`RecurrenceExpander::expand`] with an already parsed rule.
    pub fn expand_rule(
        &self,
        base: &CalendarEvent,
        rule: &RecurrenceRule,
        window_start: i64,
        window_end: i64,
    ) -> Vec<CalendarEvent> {
        if window_start > window_end || window_start < 0 || window_end < 0 {
            return Vec::new();
        }
        if base.start_time < 0 || (base.end_time != 0 && base.end_time < base.start_time) {
            warn!(uid = %base.uid, "rejecting event that ends before it starts");
            return Vec::new();
        }
        if base.start_time > window_end || self.limit == 0 {
            return Vec::new();
        }

        let Some(series) = Series::new(base, rule, self.series_zone(base)) else {
            return Vec::new();
        };

        let duration = base.duration();
        let lower = window_start.saturating_sub(duration).max(base.start_time);
        let count = u64::from(rule.count);

        let mut k = series.first_index(lower);
        let mut seen = if count > 0 {
            series.occurrences_before(k, count)
        } else {
            0
        };
        if count > 0 && seen >= count {
            return Vec::new();
        }

        let mut occurrences = Vec::new();
        let mut last_start = None;

        for _ in 0..MAX_PERIODS {
            match series.period_floor(k) {
                Some(floor) if floor <= window_end => {}
                _ => return occurrences,
            }

            if let Some(start) = series.occurrence(k) {
                if (count > 0 && seen >= count)
                    || rule.until.is_some_and(|until| start > until)
                    || start > window_end
                {
                    return occurrences;
                }
                seen += 1;

                if last_start != Some(start) {
                    let occurrence = self.occurrence_of(base, start);
                    if is_in_range(&occurrence, window_start, window_end) {
                        occurrences.push(occurrence);
                        last_start = Some(start);
                        if occurrences.len() >= self.limit {
                            return occurrences;
                        }
                    }
                }
            }

            let Some(next) = k.checked_add(1) else {
                return occurrences;
            };
            k = next;
        }

        warn!(uid = %base.uid, rrule = %base.rrule, "recurrence expansion hit the period cap");
        occurrences
    }

    fn series_zone(&self, base: &CalendarEvent) -> Tz {
        if base.all_day {
            return Tz::UTC;
        }
        base.tzid
            .as_deref()
            .and_then(lookup_zone)
            .unwrap_or(self.zone)
    }

    /// A copy of `base` moved to `start`, keeping its duration.
    fn occurrence_of(&self, base: &CalendarEvent, start: i64) -> CalendarEvent {
        let end = if base.end_time == 0 {
            0
        } else {
            start + base.duration()
        };
        let mut occurrence = base.clone();
        occurrence.set_times(start, end, self.zone);
        occurrence
    }
}

/// Date arithmetic for one series, indexed by period `k` (the `k`-th
/// `INTERVAL` step from the anchor).
struct Series<'a> {
    rule: &'a RecurrenceRule,
    zone: Tz,
    anchor: NaiveDateTime,
    anchor_ts: i64,
}

impl<'a> Series<'a> {
    fn new(base: &CalendarEvent, rule: &'a RecurrenceRule, zone: Tz) -> Option<Self> {
        let anchor = DateTime::from_timestamp(base.start_time, 0)?
            .with_timezone(&zone)
            .naive_local();

        Some(Series {
            rule,
            zone,
            anchor,
            anchor_ts: base.start_time,
        })
    }

    fn anchor_date(&self) -> NaiveDate {
        self.anchor.date()
    }

    /// First date of period `k`: the day itself for DAILY/WEEKLY, the first
    /// of the month for MONTHLY, January 1st for YEARLY.
    fn period_date(&self, k: u64) -> Option<NaiveDate> {
        let step = k.checked_mul(u64::from(self.rule.interval))?;
        let anchor = self.anchor_date();

        match self.rule.freq {
            Frequency::Daily => anchor.checked_add_days(Days::new(step)),
            Frequency::Weekly => anchor.checked_add_days(Days::new(step.checked_mul(7)?)),
            Frequency::Monthly => {
                let months = month_index(anchor).checked_add(i64::try_from(step).ok()?)?;
                let year = i32::try_from(months.div_euclid(12)).ok()?;
                NaiveDate::from_ymd_opt(year, months.rem_euclid(12) as u32 + 1, 1)
            }
            Frequency::Yearly => {
                let year = i64::from(anchor.year()).checked_add(i64::try_from(step).ok()?)?;
                NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, 1, 1)
            }
        }
    }

    /// Midnight at the start of period `k`. No occurrence of the period can
    /// start earlier.
    fn period_floor(&self, k: u64) -> Option<i64> {
        let date = self.period_date(k)?;
        to_utc(date.and_hms_opt(0, 0, 0)?, self.zone)
    }

    /// The date period `k` lands on after BYMONTH/BYMONTHDAY, or `None` if
    /// the period is filtered out or the date does not exist.
    fn occurrence_date(&self, k: u64) -> Option<NaiveDate> {
        let period = self.period_date(k)?;
        let anchor = self.anchor_date();
        let by_month = self.rule.by_month;
        let by_month_day = self.rule.by_month_day;

        match self.rule.freq {
            Frequency::Daily | Frequency::Weekly => {
                let month_ok = by_month.is_none_or(|m| period.month() == m);
                let day_ok = by_month_day.is_none_or(|d| period.day() == d);
                (month_ok && day_ok).then_some(period)
            }
            Frequency::Monthly => {
                if by_month.is_some_and(|m| period.month() != m) {
                    return None;
                }
                let day = by_month_day.unwrap_or(anchor.day());
                NaiveDate::from_ymd_opt(period.year(), period.month(), day)
            }
            Frequency::Yearly => {
                let month = by_month.unwrap_or(anchor.month());
                let day = by_month_day.unwrap_or(anchor.day());
                NaiveDate::from_ymd_opt(period.year(), month, day)
            }
        }
    }

    /// Start instant of the occurrence in period `k`, if there is one at or
    /// after the anchor.
    fn occurrence(&self, k: u64) -> Option<i64> {
        let date = self.occurrence_date(k)?;
        let start = to_utc(date.and_time(self.anchor.time()), self.zone)?;
        (start >= self.anchor_ts).then_some(start)
    }

    /// A period index at or just before the one containing `lower`.
    fn first_index(&self, lower: i64) -> u64 {
        let Some(target) = DateTime::from_timestamp(lower, 0) else {
            return 0;
        };
        let target = target.with_timezone(&self.zone).date_naive();
        let anchor = self.anchor_date();

        let units = match self.rule.freq {
            Frequency::Daily => (target - anchor).num_days(),
            Frequency::Weekly => (target - anchor).num_days() / 7,
            Frequency::Monthly => month_index(target) - month_index(anchor),
            Frequency::Yearly => i64::from(target.year()) - i64::from(anchor.year()),
        };

        let k = (units / i64::from(self.rule.interval)).max(0) as u64;
        // Step back one period so day/month placement cannot make us overshoot
        k.saturating_sub(1)
    }

    /// Whether every period from 0 on yields exactly one occurrence, so the
    /// occurrence index equals the period index.
    fn is_dense(&self) -> bool {
        if self.occurrence(0).is_none() {
            return false;
        }
        let anchor = self.anchor_date();
        match self.rule.freq {
            Frequency::Daily | Frequency::Weekly => {
                self.rule.by_month.is_none() && self.rule.by_month_day.is_none()
            }
            Frequency::Monthly => {
                self.rule.by_month.is_none() && self.rule.by_month_day.unwrap_or(anchor.day()) <= 28
            }
            Frequency::Yearly => {
                let month = self.rule.by_month.unwrap_or(anchor.month());
                let day = self.rule.by_month_day.unwrap_or(anchor.day());
                day <= min_days_in_month(month)
            }
        }
    }

    /// Number of occurrences in periods `0..k`, saturating at `cap`.
    fn occurrences_before(&self, k: u64, cap: u64) -> u64 {
        if self.is_dense() {
            return k.min(cap);
        }
        if matches!(self.rule.freq, Frequency::Daily | Frequency::Weekly)
            && let Some(seen) = self.day_stepped_before(k, cap)
        {
            return seen;
        }
        self.walk_before(k, cap)
    }

    /// `occurrences_before` for DAILY/WEEKLY, counted one calendar month at
    /// a time instead of one period at a time.
    fn day_stepped_before(&self, k: u64, cap: u64) -> Option<u64> {
        let anchor = self.anchor_date();
        let step = i64::from(self.rule.interval) * if self.rule.freq == Frequency::Weekly { 7 } else { 1 };
        // Last date covered by periods 0..k
        let last = self.period_date(k)?.pred_opt()?;
        if last < anchor {
            return Some(0);
        }

        let offset = |date: NaiveDate| (date - anchor).num_days();
        let mut seen = 0u64;
        let mut month_first = NaiveDate::from_ymd_opt(anchor.year(), anchor.month(), 1)?;

        while month_first <= last {
            let next_first = next_month(month_first)?;

            if self.rule.by_month.is_none_or(|m| month_first.month() == m) {
                let lo = offset(month_first.max(anchor));
                let hi = offset(next_first.pred_opt()?.min(last));

                seen += match self.rule.by_month_day {
                    Some(day) => NaiveDate::from_ymd_opt(month_first.year(), month_first.month(), day)
                        .map(offset)
                        .filter(|o| (lo..=hi).contains(o) && o % step == 0)
                        .map_or(0, |_| 1),
                    // Multiples of `step` in lo..=hi
                    None => (hi.div_euclid(step) - (lo + step - 1).div_euclid(step) + 1).max(0) as u64,
                };
                if seen >= cap {
                    return Some(cap);
                }
            }

            month_first = next_first;
        }

        Some(seen)
    }

    fn walk_before(&self, k: u64, cap: u64) -> u64 {
        let mut seen = 0;
        for i in 0..k {
            if self.occurrence(i).is_some() {
                seen += 1;
                if seen >= cap {
                    break;
                }
            }
        }
        seen
    }
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn next_month(first: NaiveDate) -> Option<NaiveDate> {
    if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
}

fn min_days_in_month(month: u32) -> u32 {
    match month {
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}
