//! Terminal rendering of an agenda using owo_colors.

use chrono::NaiveDate;
use chrono_tz::Tz;
use inkcal_core::clock::TimeSource;
use inkcal_core::event::{CalendarEvent, datetime};
use owo_colors::OwoColorize;

pub fn print_agenda(agenda: &[CalendarEvent], clock: &dyn TimeSource) {
    if agenda.is_empty() {
        println!("{}", "No events found".dimmed());
        return;
    }

    let zone = clock.local_zone();
    let today = clock.now().with_timezone(&zone).date_naive();
    let mut current_date: Option<String> = None;

    for event in agenda {
        let date_label = format_date_label(event, today);

        if current_date.as_ref() != Some(&date_label) {
            if current_date.is_some() {
                println!();
            }
            println!("{}", date_label.bold());
            current_date = Some(date_label);
        }

        println!("  {}", render_event(event, zone));
    }
}

fn render_event(event: &CalendarEvent, zone: Tz) -> String {
    let mut line = format!("{} {}", format_time(event, zone), colorize(event));

    if !event.location.is_empty() {
        line.push_str(&format!(" {}", format!("@ {}", event.location).dimmed()));
    }
    if !event.calendar_name.is_empty() {
        line.push_str(&format!(" {}", format!("[{}]", event.calendar_name).dimmed()));
    }
    line
}

/// "Today", "Tomorrow" or e.g. "Wed Feb 25"
fn format_date_label(event: &CalendarEvent, today: NaiveDate) -> String {
    if event.is_today {
        return "Today".to_string();
    }
    if event.is_tomorrow {
        return "Tomorrow".to_string();
    }
    match NaiveDate::parse_from_str(&event.date, "%Y-%m-%d") {
        Ok(date) if date < today => format!("{} (ongoing)", date.format("%a %b %-d")),
        Ok(date) => date.format("%a %b %-d").to_string(),
        Err(_) => event.date.clone(),
    }
}

/// "15:00" or "all-day"
fn format_time(event: &CalendarEvent, zone: Tz) -> String {
    if event.all_day {
        return format!("{:>7}", "all-day");
    }
    match datetime(event.start_time) {
        Some(dt) => format!("{:>7}", dt.with_timezone(&zone).format("%H:%M")),
        None => format!("{:>7}", "?"),
    }
}

/// Summary in the calendar's `#rrggbb` color, if it has one.
fn colorize(event: &CalendarEvent) -> String {
    let text = event.to_string();
    let text = if event.is_holiday {
        text.italic().to_string()
    } else {
        text
    };

    match parse_hex_color(&event.calendar_color) {
        Some((r, g, b)) => text.truecolor(r, g, b).to_string(),
        None => text,
    }
}

fn parse_hex_color(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#d14b3c"), Some((0xd1, 0x4b, 0x3c)));
        assert_eq!(parse_hex_color("d14b3c"), None);
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#zzzzzz"), None);
    }

    #[test]
    fn test_date_labels() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 3).unwrap();
        let mut event = CalendarEvent {
            date: "2025-12-05".into(),
            ..Default::default()
        };
        assert_eq!(format_date_label(&event, today), "Fri Dec 5");

        event.is_tomorrow = true;
        assert_eq!(format_date_label(&event, today), "Tomorrow");

        let ongoing = CalendarEvent {
            date: "2025-12-01".into(),
            ..Default::default()
        };
        assert_eq!(format_date_label(&ongoing, today), "Mon Dec 1 (ongoing)");
    }
}
