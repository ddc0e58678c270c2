//! Calendar document parsing and VEVENT property extraction.

use std::io::BufRead;

use tracing::{debug, warn};

use crate::clock::TimeSource;
use crate::error::{EventError, InkcalResult, StructureError};
use crate::event::{CalendarEvent, EventStatus, SECONDS_PER_DAY};
use crate::ics::lexer::{ContentLine, Unfolder};
use crate::ics::time::normalize;

/// Calendar-level properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarHeader {
    pub version: String,
    pub prodid: String,
    /// X-WR-CALNAME
    pub name: Option<String>,
    /// X-WR-CALDESC
    pub description: Option<String>,
    /// X-WR-TIMEZONE
    pub timezone: Option<String>,
}

/// A VEVENT block that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEvent {
    /// Position of the block among the document's VEVENTs (0-based)
    pub index: usize,
    pub uid: Option<String>,
    pub error: EventError,
}

/// Result of parsing one document: the header, the events that parsed, and
/// the blocks that did not.
#[derive(Debug, Clone, Default)]
pub struct ParsedCalendar {
    pub header: CalendarHeader,
    pub events: Vec<CalendarEvent>,
    pub dropped: Vec<DroppedEvent>,
}

/// Parse an in-memory ICS document.
pub fn parse_calendar(text: &str, clock: &dyn TimeSource) -> InkcalResult<ParsedCalendar> {
    parse_calendar_reader(text.as_bytes(), clock)
}

/// Parse ICS bytes. Invalid UTF-8 is replaced rather than rejected.
pub fn parse_calendar_bytes(bytes: &[u8], clock: &dyn TimeSource) -> InkcalResult<ParsedCalendar> {
    parse_calendar_reader(bytes, clock)
}

/// Parse an ICS document from any line source without buffering it whole.
pub fn parse_calendar_reader<R: BufRead>(
    reader: R,
    clock: &dyn TimeSource,
) -> InkcalResult<ParsedCalendar> {
    let mut state = DocumentState::default();

    for line in Unfolder::new(reader) {
        state.feed(&line?, clock);
        if state.finished {
            break;
        }
    }

    state.finish()
}

/// An open VEVENT block being collected.
struct EventBlock {
    index: usize,
    lines: Vec<ContentLine>,
    malformed: Option<EventError>,
    /// Depth of components nested inside the VEVENT (VALARM etc.)
    nested: usize,
}

#[derive(Default)]
struct DocumentState {
    started: bool,
    finished: bool,
    version: Option<String>,
    prodid: Option<String>,
    header: CalendarHeader,
    /// Depth inside a calendar-level component we ignore (VTIMEZONE, VTODO, ...)
    skip_depth: usize,
    current: Option<EventBlock>,
    event_count: usize,
    events: Vec<CalendarEvent>,
    dropped: Vec<DroppedEvent>,
}

impl DocumentState {
    fn feed(&mut self, raw: &str, clock: &dyn TimeSource) {
        let Some(line) = ContentLine::parse(raw) else {
            match self.current.as_mut() {
                Some(block) if block.nested == 0 => {
                    block
                        .malformed
                        .get_or_insert_with(|| EventError::MalformedLine(raw.to_string()));
                }
                _ => debug!(line = raw, "ignoring malformed line"),
            }
            return;
        };

        let is_begin = line.name == "BEGIN";
        let is_end = line.name == "END";
        let component = line.value.trim().to_ascii_uppercase();

        if !self.started {
            if is_begin && component == "VCALENDAR" {
                self.started = true;
            }
            return;
        }

        if self.current.is_some() {
            match (is_begin, is_end, component.as_str()) {
                (true, _, "VEVENT") => {
                    self.drop_current(EventError::Unterminated);
                    self.open_event();
                }
                (_, true, "VCALENDAR") => {
                    self.drop_current(EventError::Unterminated);
                    self.finished = true;
                }
                _ => self.feed_event(line, is_begin, is_end, &component, clock),
            }
            return;
        }

        if self.skip_depth > 0 {
            if is_begin {
                self.skip_depth += 1;
            } else if is_end {
                self.skip_depth -= 1;
            }
            return;
        }

        match (is_begin, is_end, component.as_str()) {
            (true, _, "VEVENT") => self.open_event(),
            (true, _, _) => self.skip_depth = 1,
            (_, true, "VCALENDAR") => self.finished = true,
            (_, true, _) => debug!(%component, "unbalanced END"),
            _ => self.header_property(line),
        }
    }

    fn feed_event(
        &mut self,
        line: ContentLine,
        is_begin: bool,
        is_end: bool,
        component: &str,
        clock: &dyn TimeSource,
    ) {
        let Some(block) = self.current.as_mut() else {
            return;
        };

        if is_end && block.nested == 0 && component == "VEVENT" {
            self.close_event(clock);
        } else if is_begin {
            block.nested += 1;
        } else if is_end {
            block.nested = block.nested.saturating_sub(1);
        } else if block.nested == 0 {
            block.lines.push(line);
        }
    }

    fn header_property(&mut self, line: ContentLine) {
        match line.name.as_str() {
            "VERSION" => {
                self.version.get_or_insert(line.value.trim().to_string());
            }
            "PRODID" => {
                self.prodid.get_or_insert(line.text());
            }
            "X-WR-CALNAME" => {
                self.header.name.get_or_insert(line.text());
            }
            "X-WR-CALDESC" => {
                self.header.description.get_or_insert(line.text());
            }
            "X-WR-TIMEZONE" => {
                self.header.timezone.get_or_insert(line.value.trim().to_string());
            }
            _ => {}
        }
    }

    fn open_event(&mut self) {
        self.current = Some(EventBlock {
            index: self.event_count,
            lines: Vec::new(),
            malformed: None,
            nested: 0,
        });
        self.event_count += 1;
    }

    fn close_event(&mut self, clock: &dyn TimeSource) {
        let Some(block) = self.current.take() else {
            return;
        };

        let result = match block.malformed {
            Some(error) => Err(error),
            None => extract_event(&block.lines, clock),
        };

        match result {
            Ok(event) => self.events.push(event),
            Err(error) => self.record_drop(block.index, uid_of(&block.lines), error),
        }
    }

    fn drop_current(&mut self, error: EventError) {
        if let Some(block) = self.current.take() {
            self.record_drop(block.index, uid_of(&block.lines), error);
        }
    }

    fn record_drop(&mut self, index: usize, uid: Option<String>, error: EventError) {
        warn!(index, uid = uid.as_deref().unwrap_or(""), %error, "skipping VEVENT");
        self.dropped.push(DroppedEvent { index, uid, error });
    }

    fn finish(mut self) -> InkcalResult<ParsedCalendar> {
        if !self.started {
            return Err(StructureError::MissingBegin.into());
        }

        // An event still open at EOF never saw its END
        if self.current.is_some() {
            self.drop_current(EventError::Unterminated);
        }

        if !self.finished {
            return Err(StructureError::MissingEnd.into());
        }

        let version = self.version.ok_or(StructureError::MissingVersion)?;
        if version != "2.0" {
            return Err(StructureError::UnsupportedVersion(version).into());
        }
        let prodid = self.prodid.ok_or(StructureError::MissingProdId)?;

        self.header.version = version;
        self.header.prodid = prodid;

        Ok(ParsedCalendar {
            header: self.header,
            events: self.events,
            dropped: self.dropped,
        })
    }
}

fn find<'a>(lines: &'a [ContentLine], name: &str) -> Option<&'a ContentLine> {
    lines.iter().find(|l| l.name == name)
}

fn uid_of(lines: &[ContentLine]) -> Option<String> {
    find(lines, "UID").map(ContentLine::text)
}

/// Build a draft event from the properties of one VEVENT block.
pub fn extract_event(
    lines: &[ContentLine],
    clock: &dyn TimeSource,
) -> Result<CalendarEvent, EventError> {
    let text = |name: &str| find(lines, name).map(ContentLine::text).unwrap_or_default();

    let dtstart = find(lines, "DTSTART").ok_or(EventError::MissingProperty("DTSTART"))?;
    let start = normalize_property(dtstart, "DTSTART", clock)?;

    let mut end_time = match (find(lines, "DTEND"), find(lines, "DURATION")) {
        (Some(dtend), _) => normalize_property(dtend, "DTEND", clock)?.timestamp,
        (None, Some(duration)) => start.timestamp + parse_duration_seconds(&duration.value)?,
        (None, None) => 0,
    };

    // A date-only start pins both ends to day granularity
    if start.all_day && end_time != 0 {
        end_time -= end_time.rem_euclid(SECONDS_PER_DAY);
    }

    let is_holiday = lines
        .iter()
        .filter(|l| l.name == "CATEGORIES")
        .flat_map(|l| l.value.split(','))
        .any(|c| c.trim().eq_ignore_ascii_case("HOLIDAY") || c.trim().eq_ignore_ascii_case("HOLIDAYS"));

    let mut event = CalendarEvent {
        uid: text("UID"),
        summary: text("SUMMARY"),
        location: text("LOCATION"),
        description: text("DESCRIPTION"),
        all_day: start.all_day,
        rrule: find(lines, "RRULE")
            .map(|l| l.value.trim().to_string())
            .unwrap_or_default(),
        tzid: dtstart.param("TZID").map(str::to_string),
        status: find(lines, "STATUS")
            .map(|l| EventStatus::from_ics_str(&l.value))
            .unwrap_or_default(),
        is_holiday,
        ..Default::default()
    };
    event.set_times(start.timestamp, end_time, clock.local_zone());

    Ok(event)
}

fn normalize_property(
    line: &ContentLine,
    property: &'static str,
    clock: &dyn TimeSource,
) -> Result<crate::ics::time::NormalizedTime, EventError> {
    normalize(
        &line.value,
        line.param("TZID"),
        line.has_param_value("VALUE", "DATE"),
        clock,
    )
    .map_err(|source| EventError::DateTime { property, source })
}

/// Parse an RFC 5545 DURATION (`PT1H30M`, `P1D`, `-PT15M`) into seconds.
fn parse_duration_seconds(value: &str) -> Result<i64, EventError> {
    let value = value.trim();
    let (negative, body) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.trim_start_matches('+')),
    };

    let duration = iso8601::duration(body).map_err(|_| EventError::DateTime {
        property: "DURATION",
        source: crate::error::DateTimeError::new(value, "an ISO 8601 duration"),
    })?;
    let std_duration: std::time::Duration = duration.into();
    let seconds = std_duration.as_secs() as i64;

    Ok(if negative { -seconds } else { seconds })
}
