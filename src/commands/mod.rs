pub mod agenda;
pub mod cache;
pub mod config;

use inkcal_core::config::CalendarSource;

/// Identifies the set of feeds an agenda was built from, stored in the
/// cache header.
pub fn source_id(calendars: &[CalendarSource]) -> String {
    calendars
        .iter()
        .map(|c| c.expanded_path().display().to_string())
        .collect::<Vec<_>>()
        .join(";")
}
