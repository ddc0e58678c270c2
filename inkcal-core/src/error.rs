//! Error types for the inkcal pipeline.

use thiserror::Error;

/// Errors that can occur in inkcal operations.
#[derive(Error, Debug)]
pub enum InkcalError {
    #[error("Invalid calendar document: {0}")]
    Structure(#[from] StructureError),

    #[error("Invalid event: {0}")]
    Event(#[from] EventError),

    #[error("Invalid date/time: {0}")]
    DateTime(#[from] DateTimeError),

    #[error("Invalid recurrence rule: {0}")]
    Rrule(#[from] RecurrenceRuleError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Document-level problems. Any of these rejects the whole calendar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    #[error("missing BEGIN:VCALENDAR")]
    MissingBegin,

    #[error("missing END:VCALENDAR")]
    MissingEnd,

    #[error("missing VERSION property")]
    MissingVersion,

    #[error("unsupported VERSION '{0}' (expected 2.0)")]
    UnsupportedVersion(String),

    #[error("missing PRODID property")]
    MissingProdId,
}

/// Problems local to one VEVENT block. The block is skipped, the rest of the
/// document is still parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("VEVENT block is not terminated")]
    Unterminated,

    #[error("malformed content line '{0}'")]
    MalformedLine(String),

    #[error("missing required property {0}")]
    MissingProperty(&'static str),

    #[error("{property}: {source}")]
    DateTime {
        property: &'static str,
        #[source]
        source: DateTimeError,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot parse '{value}' as {expected}")]
pub struct DateTimeError {
    pub value: String,
    pub expected: &'static str,
}

impl DateTimeError {
    pub fn new(value: &str, expected: &'static str) -> Self {
        DateTimeError {
            value: value.to_string(),
            expected,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceRuleError {
    #[error("missing FREQ")]
    MissingFrequency,

    #[error("unsupported FREQ '{0}'")]
    UnsupportedFrequency(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Cache format and I/O failures. `load` turns these into an empty result,
/// `save` refuses to write.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("refusing to cache an empty event list")]
    Empty,

    #[error("{count} events exceeds the cache limit of {max}")]
    TooManyEvents { count: usize, max: usize },

    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported cache version {0}")]
    UnsupportedVersion(u32),

    #[error("cache file is truncated ({actual} bytes, expected {expected})")]
    Truncated { actual: usize, expected: usize },

    #[error("checksum mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for inkcal operations.
pub type InkcalResult<T> = Result<T, InkcalError>;

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::time::parse_date;
    use crate::rrule::RecurrenceRule;

    fn rule_and_date(rule: &str, date: &str) -> InkcalResult<()> {
        rule.parse::<RecurrenceRule>()?;
        parse_date(date)?;
        Ok(())
    }

    #[test]
    fn test_component_errors_convert_into_inkcal_error() {
        assert!(rule_and_date("FREQ=DAILY", "20250101").is_ok());

        let err = rule_and_date("FREQ=SECONDLY", "20250101").unwrap_err();
        assert!(matches!(
            err,
            InkcalError::Rrule(RecurrenceRuleError::UnsupportedFrequency(_))
        ));
        assert_eq!(err.to_string(), "Invalid recurrence rule: unsupported FREQ 'SECONDLY'");

        let err = rule_and_date("FREQ=DAILY", "2025-01-01").unwrap_err();
        assert!(matches!(err, InkcalError::DateTime(_)));
        assert_eq!(
            err.to_string(),
            "Invalid date/time: cannot parse '2025-01-01' as YYYYMMDD"
        );
    }
}
