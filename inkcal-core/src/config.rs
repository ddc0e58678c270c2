//! inkcal configuration at ~/.config/inkcal/config.toml

use std::path::{Path, PathBuf};

use chrono::Duration;
use chrono_tz::Tz;
use config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::clock::{SystemClock, lookup_zone};
use crate::error::{InkcalError, InkcalResult};
use crate::recurrence::DEFAULT_OCCURRENCE_LIMIT;

static DEFAULT_CACHE_PATH: &str = "~/.cache/inkcal/events.bin";
static DEFAULT_CACHE_MAX_AGE: &str = "6h";
const DEFAULT_MAX_EVENTS: usize = 50;
const DEFAULT_LOOKAHEAD_DAYS: u32 = 7;

fn default_cache_path() -> PathBuf {
    // Prefer the platform cache dir, fall back to the literal path
    dirs::cache_dir()
        .map(|dir| dir.join("inkcal").join("events.bin"))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH))
}

fn default_cache_max_age() -> String {
    DEFAULT_CACHE_MAX_AGE.to_string()
}

fn default_max_events() -> usize {
    DEFAULT_MAX_EVENTS
}

fn default_max_occurrences() -> usize {
    DEFAULT_OCCURRENCE_LIMIT
}

fn default_lookahead_days() -> u32 {
    DEFAULT_LOOKAHEAD_DAYS
}

/// One ICS feed shown on the display.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CalendarSource {
    pub name: String,
    /// Path to the .ics file, `~` is expanded
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
}

impl CalendarSource {
    pub fn expanded_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).into_owned())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InkcalConfig {
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// How long a cache stays usable, e.g. "6h" or "1day 12h"
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age: String,

    /// IANA zone name. Unset means the system zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default = "default_max_events")]
    pub max_events: usize,

    #[serde(default = "default_max_occurrences")]
    pub max_occurrences: usize,

    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,

    #[serde(default)]
    pub include_cancelled: bool,

    #[serde(default)]
    pub calendars: Vec<CalendarSource>,
}

impl Default for InkcalConfig {
    fn default() -> Self {
        InkcalConfig {
            cache_path: default_cache_path(),
            cache_max_age: default_cache_max_age(),
            timezone: None,
            max_events: DEFAULT_MAX_EVENTS,
            max_occurrences: DEFAULT_OCCURRENCE_LIMIT,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            include_cancelled: false,
            calendars: Vec::new(),
        }
    }
}

impl InkcalConfig {
    pub fn config_path() -> InkcalResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| InkcalError::Config("Could not determine config directory".into()))?
            .join("inkcal");

        Ok(config_dir.join("config.toml"))
    }

    /// Load ~/.config/inkcal/config.toml, writing the default template first
    /// if it does not exist yet.
    pub fn load() -> InkcalResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Load from a specific file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> InkcalResult<Self> {
        let config: InkcalConfig = Config::builder()
            .add_source(File::from(path).required(false))
            .build()
            .map_err(|e| InkcalError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| InkcalError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> InkcalResult<()> {
        self.cache_max_age()?;
        self.zone()?;
        Ok(())
    }

    /// Save the current config to ~/.config/inkcal/config.toml
    pub fn save(&self) -> InkcalResult<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> InkcalResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| InkcalError::Config(e.to_string()))?;

        write_config_file(path, &content)
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> InkcalResult<()> {
        let contents = format!(
            "\
# inkcal configuration

# Calendars to show, one [[calendars]] table each:
# [[calendars]]
# name = \"family\"
# path = \"~/calendars/family.ics\"
# color = \"#d14b3c\"

# Where the last good agenda is kept for offline use:
# cache_path = \"{DEFAULT_CACHE_PATH}\"

# How long the cache may be used when a feed cannot be read:
# cache_max_age = \"{DEFAULT_CACHE_MAX_AGE}\"

# Display timezone (defaults to the system timezone):
# timezone = \"Europe/Berlin\"

# Agenda limits:
# max_events = {DEFAULT_MAX_EVENTS}
# max_occurrences = {DEFAULT_OCCURRENCE_LIMIT}
# lookahead_days = {DEFAULT_LOOKAHEAD_DAYS}

# Show events whose STATUS is CANCELLED:
# include_cancelled = false
"
        );

        write_config_file(path, &contents)
    }

    /// The cache path with `~` expanded.
    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.cache_path.to_string_lossy()).into_owned())
    }

    pub fn cache_max_age(&self) -> InkcalResult<Duration> {
        let std_duration = humantime::parse_duration(&self.cache_max_age).map_err(|e| {
            InkcalError::Config(format!("Invalid cache_max_age '{}': {e}", self.cache_max_age))
        })?;

        Duration::from_std(std_duration).map_err(|e| {
            InkcalError::Config(format!("Invalid cache_max_age '{}': {e}", self.cache_max_age))
        })
    }

    /// The configured zone, or `None` to use the system zone.
    pub fn zone(&self) -> InkcalResult<Option<Tz>> {
        match &self.timezone {
            None => Ok(None),
            Some(name) => lookup_zone(name)
                .map(Some)
                .ok_or_else(|| InkcalError::Config(format!("Unknown timezone '{name}'"))),
        }
    }

    /// A wall clock honoring the configured zone.
    pub fn clock(&self) -> InkcalResult<SystemClock> {
        Ok(match self.zone()? {
            Some(zone) => SystemClock::with_zone(zone),
            None => SystemClock::new(),
        })
    }

    pub fn calendar(&self, name: &str) -> Option<&CalendarSource> {
        self.calendars.iter().find(|c| c.name == name)
    }

    /// Append a calendar. Names must be unique.
    pub fn add_calendar(&mut self, source: CalendarSource) -> InkcalResult<()> {
        if source.name.trim().is_empty() {
            return Err(InkcalError::Config("Calendar name must not be empty".into()));
        }
        if self.calendar(&source.name).is_some() {
            return Err(InkcalError::Config(format!(
                "Calendar '{}' already exists",
                source.name
            )));
        }
        self.calendars.push(source);
        Ok(())
    }
}

fn write_config_file(path: &Path, contents: &str) -> InkcalResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            InkcalError::Config(format!("Could not create config directory: {e}"))
        })?;
    }

    std::fs::write(path, contents)
        .map_err(|e| InkcalError::Config(format!("Could not write config file: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = InkcalConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, InkcalConfig::default());
        assert_eq!(config.cache_max_age().unwrap(), Duration::hours(6));
        assert_eq!(config.max_occurrences, 366);
    }

    #[test]
    fn test_default_template_parses_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inkcal").join("config.toml");
        InkcalConfig::create_default_config(&path).unwrap();

        let config = InkcalConfig::load_from(&path).unwrap();
        assert_eq!(config, InkcalConfig::default());
    }

    #[test]
    fn test_load_calendars_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r##"
timezone = "Europe/Berlin"
max_events = 20
cache_max_age = "1day 12h"

[[calendars]]
name = "family"
path = "~/cal/family.ics"
color = "#d14b3c"

[[calendars]]
name = "holidays"
path = "/srv/holidays.ics"
"##,
        )
        .unwrap();

        let config = InkcalConfig::load_from(&path).unwrap();
        assert_eq!(config.max_events, 20);
        assert_eq!(config.lookahead_days, 7);
        assert_eq!(config.zone().unwrap(), Some(Tz::Europe__Berlin));
        assert_eq!(config.cache_max_age().unwrap(), Duration::hours(36));
        assert_eq!(config.calendars.len(), 2);
        assert_eq!(config.calendar("holidays").unwrap().color, "");
        assert!(!config.calendar("family").unwrap().expanded_path().starts_with("~"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "timezone = \"Mars/Olympus\"\n").unwrap();
        assert!(matches!(InkcalConfig::load_from(&path), Err(InkcalError::Config(_))));

        std::fs::write(&path, "cache_max_age = \"soonish\"\n").unwrap();
        assert!(matches!(InkcalConfig::load_from(&path), Err(InkcalError::Config(_))));
    }

    #[test]
    fn test_add_calendar_rejects_duplicates() {
        let mut config = InkcalConfig::default();
        let source = CalendarSource {
            name: "family".into(),
            path: "~/cal/family.ics".into(),
            color: String::new(),
        };

        config.add_calendar(source.clone()).unwrap();
        assert!(matches!(config.add_calendar(source), Err(InkcalError::Config(_))));
        assert!(config
            .add_calendar(CalendarSource {
                name: " ".into(),
                path: "/x.ics".into(),
                color: String::new(),
            })
            .is_err());
        assert_eq!(config.calendars.len(), 1);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = InkcalConfig {
            timezone: Some("America/New_York".into()),
            include_cancelled: true,
            calendars: vec![CalendarSource {
                name: "work".into(),
                path: "/srv/work.ics".into(),
                color: "#3366ff".into(),
            }],
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(InkcalConfig::load_from(&path).unwrap(), config);
    }
}
