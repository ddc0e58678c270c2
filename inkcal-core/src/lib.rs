//! Core of inkcal: ICS feeds in, a bounded agenda out.
//!
//! - `ics` parses calendar documents into `CalendarEvent`s
//! - `rrule` and `recurrence` expand recurring events inside a query window
//! - `agenda` drives a whole query
//! - `cache` persists the last good agenda for offline use

pub mod agenda;
pub mod cache;
pub mod clock;
pub mod config;
pub mod date_range;
pub mod error;
pub mod event;
pub mod fs;
pub mod ics;
pub mod recurrence;
pub mod rrule;

pub use agenda::AgendaQuery;
pub use cache::{CachedEvents, EventCache};
pub use clock::{FixedClock, SystemClock, TimeSource};
pub use config::{CalendarSource, InkcalConfig};
pub use date_range::{DateRange, is_in_range};
pub use error::{InkcalError, InkcalResult};
pub use event::{CalendarEvent, EventStatus};
pub use recurrence::{RecurrenceExpander, expand};
pub use rrule::{Frequency, RecurrenceRule};
