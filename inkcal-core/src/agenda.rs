//! Agenda queries: from parsed events to the bounded, sorted list a display
//! renders.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::clock::TimeSource;
use crate::date_range::DateRange;
use crate::event::{CalendarEvent, EventStatus};
use crate::recurrence::{DEFAULT_OCCURRENCE_LIMIT, RecurrenceExpander};

pub const DEFAULT_MAX_EVENTS: usize = 50;

#[derive(Debug, Clone)]
pub struct AgendaQuery {
    range: DateRange,
    now: DateTime<Utc>,
    zone: Tz,
    max_events: usize,
    max_occurrences: usize,
    include_cancelled: bool,
}

impl AgendaQuery {
    /// A query over `range`, with "now" and the display zone taken from `clock`.
    pub fn new(range: DateRange, clock: &dyn TimeSource) -> Self {
        AgendaQuery {
            range,
            now: clock.now(),
            zone: clock.local_zone(),
            max_events: DEFAULT_MAX_EVENTS,
            max_occurrences: DEFAULT_OCCURRENCE_LIMIT,
            include_cancelled: false,
        }
    }

    pub fn max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    /// Cap on occurrences taken from any one recurring series.
    pub fn max_occurrences(mut self, max_occurrences: usize) -> Self {
        self.max_occurrences = max_occurrences;
        self
    }

    pub fn include_cancelled(mut self, include: bool) -> Self {
        self.include_cancelled = include;
        self
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    /// Run the query. The result is sorted by start time then summary,
    /// free of duplicate occurrences and at most `max_events` long.
    pub fn run<I>(&self, events: I) -> Vec<CalendarEvent>
    where
        I: IntoIterator<Item = CalendarEvent>,
    {
        let mut agenda: Vec<CalendarEvent> = events
            .into_iter()
            .filter(|event| self.accepts(event))
            .flat_map(|event| self.occurrences(&event))
            .collect();

        for event in &mut agenda {
            event.refresh_day_flags(self.now, self.zone);
        }

        agenda.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.summary.cmp(&b.summary))
                .then_with(|| a.uid.cmp(&b.uid))
        });
        agenda.dedup_by(|a, b| {
            a.start_time == b.start_time && a.summary == b.summary && a.uid == b.uid
        });

        if agenda.len() > self.max_events {
            debug!(
                total = agenda.len(),
                kept = self.max_events,
                "truncating agenda"
            );
            agenda.truncate(self.max_events);
        }

        agenda
    }

    fn accepts(&self, event: &CalendarEvent) -> bool {
        if event.end_time != 0 && event.end_time < event.start_time {
            warn!(uid = %event.uid, summary = %event, "skipping event that ends before it starts");
            return false;
        }
        if event.status == EventStatus::Cancelled && !self.include_cancelled {
            return false;
        }
        true
    }

    /// The occurrences of one event inside the window.
    ///
    /// An RRULE that does not parse degrades to the base event alone.
    pub fn occurrences(&self, event: &CalendarEvent) -> Vec<CalendarEvent> {
        if event.is_recurring() {
            let expander = RecurrenceExpander::new(self.zone).with_limit(self.max_occurrences);
            match expander.rule_of(event) {
                Ok(rule) => {
                    return expander.expand_rule(event, &rule, self.range.start, self.range.end);
                }
                Err(error) => {
                    warn!(uid = %event.uid, %error, "unusable RRULE, showing first occurrence only");
                }
            }
        }

        if self.range.contains_event(event) {
            vec![event.clone()]
        } else {
            Vec::new()
        }
    }
}

/// Stamp calendar metadata on freshly parsed events.
pub fn tag_events(events: &mut [CalendarEvent], calendar_name: &str, calendar_color: &str) {
    for event in events {
        event.calendar_name = calendar_name.to_string();
        event.calendar_color = calendar_color.to_string();
    }
}
