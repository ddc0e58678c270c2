//! ICS document reading.
//!
//! This module turns RFC 5545 text into draft [`CalendarEvent`](crate::event::CalendarEvent)s:
//! the lexer unfolds lines, the parser extracts VEVENT properties, and
//! `time` normalizes every timestamp to UTC.

pub mod lexer;
mod parse;
pub mod time;

pub use lexer::{ContentLine, unfold};
pub use parse::{
    CalendarHeader, DroppedEvent, ParsedCalendar, extract_event, parse_calendar,
    parse_calendar_bytes, parse_calendar_reader,
};
pub use time::{NormalizedTime, normalize};
