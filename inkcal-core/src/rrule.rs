//! RRULE parsing.
//!
//! Only the parts of RFC 5545 recurrence rules the expander understands are
//! kept: FREQ, INTERVAL, COUNT, UNTIL, BYMONTH and BYMONTHDAY. Anything else
//! (BYDAY, WKST, BYSETPOS, ...) is accepted and dropped.

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use tracing::debug;

use crate::error::RecurrenceRuleError;
use crate::ics::time::{parse_date, parse_date_time, to_utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn from_ics_str(s: &str) -> Result<Self, RecurrenceRuleError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            other => Err(RecurrenceRuleError::UnsupportedFrequency(other.to_string())),
        }
    }

    pub fn as_ics_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    /// Step between occurrences in units of `freq`, at least 1
    pub interval: u32,
    /// Total number of occurrences, 0 when unbounded
    pub count: u32,
    /// Last allowed start instant (inclusive), seconds since the epoch
    pub until: Option<i64>,
    pub by_month: Option<u32>,
    pub by_month_day: Option<u32>,
}

impl RecurrenceRule {
    pub fn new(freq: Frequency) -> Self {
        RecurrenceRule {
            freq,
            interval: 1,
            count: 0,
            until: None,
            by_month: None,
            by_month_day: None,
        }
    }

    /// Parse a rule, reading a floating or date-only UNTIL in `zone`.
    pub fn parse(rule: &str, zone: Tz) -> Result<Self, RecurrenceRuleError> {
        let rule = rule.trim();
        let rule = rule
            .get(..6)
            .filter(|prefix| prefix.eq_ignore_ascii_case("RRULE:"))
            .map(|_| &rule[6..])
            .unwrap_or(rule);

        let mut freq = None;
        let mut parsed = RecurrenceRule::new(Frequency::Daily);

        for part in rule.split(';') {
            let Some((key, value)) = part.split_once('=') else {
                if !part.trim().is_empty() {
                    debug!(part, "ignoring RRULE part without '='");
                }
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => freq = Some(Frequency::from_ics_str(value)?),
                "INTERVAL" => {
                    parsed.interval = parse_number(value, "INTERVAL", 1, u32::MAX)?;
                }
                "COUNT" => parsed.count = parse_number(value, "COUNT", 0, u32::MAX)?,
                "UNTIL" => parsed.until = Some(parse_until(value, zone)?),
                "BYMONTH" => parsed.by_month = Some(parse_first(value, "BYMONTH", 1, 12)?),
                "BYMONTHDAY" => {
                    parsed.by_month_day = Some(parse_first(value, "BYMONTHDAY", 1, 31)?);
                }
                other => debug!(key = other, "ignoring unsupported RRULE part"),
            }
        }

        parsed.freq = freq.ok_or(RecurrenceRuleError::MissingFrequency)?;
        Ok(parsed)
    }

    /// Whether the series ends on its own (COUNT or UNTIL).
    pub fn is_bounded(&self) -> bool {
        self.count > 0 || self.until.is_some()
    }
}

impl FromStr for RecurrenceRule {
    type Err = RecurrenceRuleError;

    /// Parse with floating UNTIL values read as UTC.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecurrenceRule::parse(s, Tz::UTC)
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.freq.as_ics_str())?;
        if self.interval != 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        if self.count > 0 {
            write!(f, ";COUNT={}", self.count)?;
        }
        if let Some(until) = self.until.and_then(crate::event::datetime) {
            write!(f, ";UNTIL={}", until.format("%Y%m%dT%H%M%SZ"))?;
        }
        if let Some(month) = self.by_month {
            write!(f, ";BYMONTH={month}")?;
        }
        if let Some(day) = self.by_month_day {
            write!(f, ";BYMONTHDAY={day}")?;
        }
        Ok(())
    }
}

fn parse_number(
    value: &str,
    key: &'static str,
    min: u32,
    max: u32,
) -> Result<u32, RecurrenceRuleError> {
    value
        .parse::<u32>()
        .ok()
        .filter(|n| (min..=max).contains(n))
        .ok_or_else(|| RecurrenceRuleError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

/// BYMONTH/BYMONTHDAY may be lists; only the first entry is used.
fn parse_first(
    value: &str,
    key: &'static str,
    min: u32,
    max: u32,
) -> Result<u32, RecurrenceRuleError> {
    let mut values = value.split(',');
    let first = values.next().unwrap_or_default().trim();
    if values.next().is_some() {
        debug!(key, value, "only the first value of a list is used");
    }
    parse_number(first, key, min, max)
}

fn parse_until(value: &str, zone: Tz) -> Result<i64, RecurrenceRuleError> {
    let invalid = || RecurrenceRuleError::InvalidValue {
        key: "UNTIL",
        value: value.to_string(),
    };

    if value.len() == 8 {
        // A date-only UNTIL covers the whole day
        let date = parse_date(value).map_err(|_| invalid())?;
        let end_of_day = date.and_hms_opt(23, 59, 59).ok_or_else(invalid)?;
        return to_utc(end_of_day, zone).ok_or_else(invalid);
    }

    if let Some(utc) = value.strip_suffix(['Z', 'z']) {
        let naive = parse_date_time(utc).map_err(|_| invalid())?;
        return Ok(naive.and_utc().timestamp());
    }

    let naive = parse_date_time(value).map_err(|_| invalid())?;
    to_utc(naive, zone).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parse_full_rule() {
        let rule: RecurrenceRule = "FREQ=YEARLY;INTERVAL=2;COUNT=5;BYMONTH=2;BYMONTHDAY=29"
            .parse()
            .unwrap();
        assert_eq!(rule.freq, Frequency::Yearly);
        assert_eq!(rule.interval, 2);
        assert_eq!(rule.count, 5);
        assert_eq!(rule.by_month, Some(2));
        assert_eq!(rule.by_month_day, Some(29));
        assert!(rule.is_bounded());
    }

    #[test]
    fn test_defaults_and_ignored_parts() {
        let rule: RecurrenceRule = "RRULE:freq=weekly;BYDAY=WE;WKST=MO".parse().unwrap();
        assert_eq!(rule, RecurrenceRule::new(Frequency::Weekly));
        assert!(!rule.is_bounded());
    }

    #[test]
    fn test_until_forms() {
        let rule: RecurrenceRule = "FREQ=DAILY;UNTIL=20250310T120000Z".parse().unwrap();
        assert_eq!(
            rule.until,
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap().timestamp())
        );

        let rule: RecurrenceRule = "FREQ=DAILY;UNTIL=20250310".parse().unwrap();
        assert_eq!(
            rule.until,
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 23, 59, 59).unwrap().timestamp())
        );

        let rule = RecurrenceRule::parse("FREQ=DAILY;UNTIL=20250310T120000", Tz::Europe__Berlin)
            .unwrap();
        assert_eq!(
            rule.until,
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 11, 0, 0).unwrap().timestamp())
        );
    }

    #[test]
    fn test_list_values_keep_first() {
        let rule: RecurrenceRule = "FREQ=YEARLY;BYMONTH=3,9".parse().unwrap();
        assert_eq!(rule.by_month, Some(3));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            "INTERVAL=2".parse::<RecurrenceRule>(),
            Err(RecurrenceRuleError::MissingFrequency)
        );
        assert_eq!(
            "FREQ=HOURLY".parse::<RecurrenceRule>(),
            Err(RecurrenceRuleError::UnsupportedFrequency("HOURLY".into()))
        );
        assert!("FREQ=DAILY;INTERVAL=0".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=DAILY;COUNT=many".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=YEARLY;BYMONTH=13".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=MONTHLY;BYMONTHDAY=-1".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=DAILY;UNTIL=soon".parse::<RecurrenceRule>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let text = "FREQ=MONTHLY;INTERVAL=3;COUNT=4;BYMONTHDAY=15";
        let rule: RecurrenceRule = text.parse().unwrap();
        assert_eq!(rule.to_string(), text);
    }
}
