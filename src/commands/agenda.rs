use anyhow::{Context, Result};
use inkcal_core::agenda::{AgendaQuery, tag_events};
use inkcal_core::cache::EventCache;
use inkcal_core::clock::TimeSource;
use inkcal_core::config::{CalendarSource, InkcalConfig};
use inkcal_core::date_range::DateRange;
use inkcal_core::event::CalendarEvent;
use inkcal_core::ics::parse_calendar_bytes;
use owo_colors::OwoColorize;
use tracing::{debug, info, warn};

use super::source_id;
use crate::render;

pub fn run(
    config: &InkcalConfig,
    calendars: &[CalendarSource],
    range: DateRange,
    clock: &dyn TimeSource,
    offline: bool,
) -> Result<()> {
    let cache = EventCache::new(config.cache_path());
    let source = source_id(calendars);
    let query = AgendaQuery::new(range, clock)
        .max_events(config.max_events)
        .max_occurrences(config.max_occurrences)
        .include_cancelled(config.include_cancelled);

    if offline {
        let agenda = query.run(cache.load(&source));
        render::print_agenda(&agenda, clock);
        return Ok(());
    }

    let mut events = Vec::new();
    let mut failures = Vec::new();

    for cal in calendars {
        match read_calendar(cal, clock) {
            Ok(parsed) => events.extend(parsed),
            Err(e) => {
                warn!(calendar = %cal.name, error = %e, "could not read calendar");
                failures.push(format!("{}: {:#}", cal.name, e));
            }
        }
    }

    if !failures.is_empty() && cache.is_valid(config.cache_max_age()?, clock.now()) {
        println!(
            "{}",
            format!("Showing cached agenda ({} failed)", failures.len()).yellow()
        );
        let agenda = query.run(cache.load(&source));
        render::print_agenda(&agenda, clock);
        return Ok(());
    }

    if failures.len() == calendars.len() {
        anyhow::bail!("No calendar could be read:\n  {}", failures.join("\n  "));
    }
    for failure in &failures {
        eprintln!("{} {}", "Skipped".red(), failure);
    }

    let agenda = query.run(events);

    if failures.is_empty() && !agenda.is_empty() {
        if let Err(e) = cache.save(&agenda, &source, clock.now()) {
            warn!(error = %e, "could not update event cache");
        } else {
            info!(path = %cache.path().display(), "event cache updated");
        }
    }

    render::print_agenda(&agenda, clock);
    Ok(())
}

fn read_calendar(cal: &CalendarSource, clock: &dyn TimeSource) -> Result<Vec<CalendarEvent>> {
    let path = cal.expanded_path();
    let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let mut parsed = parse_calendar_bytes(&bytes, clock)?;

    for dropped in &parsed.dropped {
        debug!(
            calendar = %cal.name,
            index = dropped.index,
            uid = dropped.uid.as_deref().unwrap_or(""),
            error = %dropped.error,
            "dropped event"
        );
    }

    tag_events(&mut parsed.events, &cal.name, &cal.color);
    Ok(parsed.events)
}
