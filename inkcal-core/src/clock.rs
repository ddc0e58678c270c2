//! Current time and timezone lookup.
//!
//! Everything that needs "now" or the device's local zone goes through
//! [`TimeSource`], so tests can pin both.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

pub trait TimeSource {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Zone used for floating times and for "today"/"tomorrow".
    fn local_zone(&self) -> Tz;

    /// Look up a zone by its TZID. Falls back to [`TimeSource::local_zone`]
    /// when the name cannot be resolved.
    fn zone(&self, tzid: &str) -> Tz {
        lookup_zone(tzid).unwrap_or_else(|| {
            debug!(tzid, "unknown TZID, using local zone");
            self.local_zone()
        })
    }
}

/// Resolve a TZID against the IANA database.
///
/// Accepts vendor-prefixed ids such as `/mozilla.org/20050126_1/Europe/Berlin`
/// by trying successively shorter `/`-separated suffixes.
pub fn lookup_zone(tzid: &str) -> Option<Tz> {
    let tzid = tzid.trim().trim_matches('"');
    if tzid.is_empty() {
        return None;
    }
    if let Ok(tz) = tzid.parse::<Tz>() {
        return Some(tz);
    }

    let mut rest = tzid;
    while let Some(idx) = rest.find('/') {
        rest = &rest[idx + 1..];
        if let Ok(tz) = rest.parse::<Tz>() {
            return Some(tz);
        }
    }
    None
}

/// Wall clock of the host, with an optional zone override from the config.
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    zone_override: Option<Tz>,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock::default()
    }

    pub fn with_zone(zone: Tz) -> Self {
        SystemClock {
            zone_override: Some(zone),
        }
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_zone(&self) -> Tz {
        if let Some(tz) = self.zone_override {
            return tz;
        }
        iana_time_zone::get_timezone()
            .ok()
            .and_then(|name| lookup_zone(&name))
            .unwrap_or(Tz::UTC)
    }
}

/// A clock frozen at one instant. Used by tests and by callers replaying a
/// past query.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub now: DateTime<Utc>,
    pub zone: Tz,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, zone: Tz) -> Self {
        FixedClock { now, zone }
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn local_zone(&self) -> Tz {
        self.zone
    }
}
