//! Binary event cache.
//!
//! When the network is down the display falls back to the last agenda that
//! was fetched successfully. The cache is a fixed-layout file: a header
//! followed by `event_count` fixed-width records, all little-endian with no
//! padding.
//!
//! ```text
//! header (280 bytes)
//!   magic u32 | version u32 | event_count u32 | timestamp i64
//!   source_url [u8; 256] | checksum u32
//! record (402 bytes)
//!   title [u8; 128] | location [u8; 64] | date [u8; 16]
//!   start_time i64 | end_time i64 | flags u8 | day_of_month u8
//!   calendar_name [u8; 32] | calendar_color [u8; 16] | summary [u8; 128]
//! ```
//!
//! Strings are NUL padded and not NUL terminated when they fill their field.
//! The checksum is CRC32 over all record bytes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::event::CalendarEvent;
use crate::fs::{Filesystem, LocalFs};

pub const CACHE_MAGIC: u32 = 0x4943_4348;
pub const CACHE_VERSION: u32 = 1;
/// Largest number of events a cache file may hold.
pub const MAX_CACHED_EVENTS: usize = 500;

const URL_LEN: usize = 256;
const TITLE_LEN: usize = 128;
const LOCATION_LEN: usize = 64;
const DATE_LEN: usize = 16;
const CALENDAR_NAME_LEN: usize = 32;
const CALENDAR_COLOR_LEN: usize = 16;
const SUMMARY_LEN: usize = 128;

pub const HEADER_SIZE: usize = 4 + 4 + 4 + 8 + URL_LEN + 4;
pub const RECORD_SIZE: usize =
    TITLE_LEN + LOCATION_LEN + DATE_LEN + 8 + 8 + 1 + 1 + CALENDAR_NAME_LEN + CALENDAR_COLOR_LEN + SUMMARY_LEN;

const CHECKSUM_OFFSET: usize = HEADER_SIZE - 4;

const FLAG_ALL_DAY: u8 = 1 << 0;
const FLAG_TODAY: u8 = 1 << 1;
const FLAG_TOMORROW: u8 = 1 << 2;
const FLAG_MULTI_DAY: u8 = 1 << 3;
const FLAG_HOLIDAY: u8 = 1 << 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeader {
    pub magic: u32,
    pub version: u32,
    pub event_count: u32,
    /// Creation time, seconds since the epoch
    pub timestamp: i64,
    pub source_url: String,
    pub checksum: u32,
}

/// A fully validated cache file.
#[derive(Debug, Clone)]
pub struct CachedEvents {
    pub header: CacheHeader,
    pub events: Vec<CalendarEvent>,
}

/// Serialize events into a cache image.
pub fn encode(events: &[CalendarEvent], source_url: &str, timestamp: i64) -> CacheResult<Vec<u8>> {
    if events.is_empty() {
        return Err(CacheError::Empty);
    }
    if events.len() > MAX_CACHED_EVENTS {
        return Err(CacheError::TooManyEvents {
            count: events.len(),
            max: MAX_CACHED_EVENTS,
        });
    }

    let mut records = Vec::with_capacity(events.len() * RECORD_SIZE);
    for event in events {
        encode_record(event, &mut records);
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + records.len());
    out.extend_from_slice(&CACHE_MAGIC.to_le_bytes());
    out.extend_from_slice(&CACHE_VERSION.to_le_bytes());
    out.extend_from_slice(&(events.len() as u32).to_le_bytes());
    out.extend_from_slice(&timestamp.to_le_bytes());
    put_str(&mut out, source_url, URL_LEN);
    out.extend_from_slice(&crc32fast::hash(&records).to_le_bytes());
    out.extend_from_slice(&records);

    Ok(out)
}

/// Parse and fully validate a cache image, checksum included.
pub fn decode(bytes: &[u8]) -> CacheResult<CachedEvents> {
    let header = decode_header(bytes)?;

    let count = header.event_count as usize;
    if count > MAX_CACHED_EVENTS {
        return Err(CacheError::TooManyEvents {
            count,
            max: MAX_CACHED_EVENTS,
        });
    }

    let expected = HEADER_SIZE + count * RECORD_SIZE;
    if bytes.len() != expected {
        return Err(CacheError::Truncated {
            actual: bytes.len(),
            expected,
        });
    }

    let records = &bytes[HEADER_SIZE..];
    let computed = crc32fast::hash(records);
    if computed != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            stored: header.checksum,
            computed,
        });
    }

    let events = records.chunks_exact(RECORD_SIZE).map(decode_record).collect();

    Ok(CachedEvents { header, events })
}

/// Parse the header and check magic and version only.
pub fn decode_header(bytes: &[u8]) -> CacheResult<CacheHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(CacheError::Truncated {
            actual: bytes.len(),
            expected: HEADER_SIZE,
        });
    }

    let mut reader = Reader::new(&bytes[..HEADER_SIZE]);
    let magic = reader.u32();
    if magic != CACHE_MAGIC {
        return Err(CacheError::BadMagic(magic));
    }
    let version = reader.u32();
    if version != CACHE_VERSION {
        return Err(CacheError::UnsupportedVersion(version));
    }

    let header = CacheHeader {
        magic,
        version,
        event_count: reader.u32(),
        timestamp: reader.i64(),
        source_url: reader.str(URL_LEN),
        checksum: reader.u32(),
    };
    debug_assert_eq!(reader.pos, CHECKSUM_OFFSET + 4);

    Ok(header)
}

fn encode_record(event: &CalendarEvent, out: &mut Vec<u8>) {
    let start = out.len();

    put_str(out, &event.summary, TITLE_LEN);
    put_str(out, &event.location, LOCATION_LEN);
    put_str(out, &event.date, DATE_LEN);
    out.extend_from_slice(&event.start_time.to_le_bytes());
    out.extend_from_slice(&event.end_time.to_le_bytes());
    out.push(flags_of(event));
    out.push(event.day_of_month);
    put_str(out, &event.calendar_name, CALENDAR_NAME_LEN);
    put_str(out, &event.calendar_color, CALENDAR_COLOR_LEN);
    put_str(out, &event.description, SUMMARY_LEN);

    debug_assert_eq!(out.len() - start, RECORD_SIZE);
}

fn decode_record(bytes: &[u8]) -> CalendarEvent {
    let mut reader = Reader::new(bytes);

    let summary = reader.str(TITLE_LEN);
    let location = reader.str(LOCATION_LEN);
    let date = reader.str(DATE_LEN);
    let start_time = reader.i64();
    let end_time = reader.i64();
    let flags = reader.u8();
    let day_of_month = reader.u8();
    let calendar_name = reader.str(CALENDAR_NAME_LEN);
    let calendar_color = reader.str(CALENDAR_COLOR_LEN);
    let description = reader.str(SUMMARY_LEN);

    CalendarEvent {
        summary,
        location,
        description,
        start_time,
        end_time,
        all_day: flags & FLAG_ALL_DAY != 0,
        day_of_month,
        date,
        calendar_name,
        calendar_color,
        is_holiday: flags & FLAG_HOLIDAY != 0,
        is_today: flags & FLAG_TODAY != 0,
        is_tomorrow: flags & FLAG_TOMORROW != 0,
        ..Default::default()
    }
}

fn flags_of(event: &CalendarEvent) -> u8 {
    let mut flags = 0;
    if event.all_day {
        flags |= FLAG_ALL_DAY;
    }
    if event.is_today {
        flags |= FLAG_TODAY;
    }
    if event.is_tomorrow {
        flags |= FLAG_TOMORROW;
    }
    if event.is_multi_day() {
        flags |= FLAG_MULTI_DAY;
    }
    if event.is_holiday {
        flags |= FLAG_HOLIDAY;
    }
    flags
}

/// Longest prefix of `s` that fits in `cap` bytes without splitting a
/// UTF-8 sequence.
fn truncate_utf8(s: &str, cap: usize) -> &str {
    if s.len() <= cap {
        return s;
    }
    let mut end = cap;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn put_str(out: &mut Vec<u8>, s: &str, cap: usize) {
    let bytes = truncate_utf8(s, cap).as_bytes();
    out.extend_from_slice(bytes);
    out.resize(out.len() + cap - bytes.len(), 0);
}

/// Cursor over a slice whose length was checked up front.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        buf
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take())
    }

    fn str(&mut self, len: usize) -> String {
        let field = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        let end = field.iter().position(|&b| b == 0).unwrap_or(len);
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}

/// The cache file at one path.
pub struct EventCache<F: Filesystem = LocalFs> {
    path: PathBuf,
    fs: F,
}

impl EventCache<LocalFs> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EventCache::with_fs(path, LocalFs)
    }
}

impl<F: Filesystem> EventCache<F> {
    pub fn with_fs(path: impl Into<PathBuf>, fs: F) -> Self {
        EventCache {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `events` to the cache. Nothing is written for an empty or
    /// oversized list.
    pub fn save(
        &self,
        events: &[CalendarEvent],
        source_url: &str,
        now: DateTime<Utc>,
    ) -> CacheResult<()> {
        let image = encode(events, source_url, now.timestamp())?;
        self.fs.write(&self.path, &image)?;
        debug!(path = %self.path.display(), count = events.len(), "saved event cache");
        Ok(())
    }

    /// Load the cached events, or nothing if the file is missing or fails
    /// any check. A different source URL is only a warning.
    pub fn load(&self, expected_url: &str) -> Vec<CalendarEvent> {
        match self.load_checked(expected_url) {
            Ok(cached) => cached.events,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "ignoring event cache");
                Vec::new()
            }
        }
    }

    /// Like [`EventCache::load`] but reports why the cache was rejected.
    pub fn load_checked(&self, expected_url: &str) -> CacheResult<CachedEvents> {
        let bytes = self.fs.read(&self.path)?;
        let cached = decode(&bytes)?;

        if cached.header.source_url != truncate_utf8(expected_url, URL_LEN) {
            warn!(
                cached = %cached.header.source_url,
                expected = expected_url,
                "event cache was written for a different source"
            );
        }

        Ok(cached)
    }

    /// Cheap check: the file exists, has our magic and version, and its
    /// timestamp is within `max_age` of `now` in either direction. The
    /// checksum is not verified.
    pub fn is_valid(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        if !self.fs.exists(&self.path) {
            return false;
        }

        let header = match self.fs.read(&self.path).map_err(CacheError::from).and_then(|b| decode_header(&b)) {
            Ok(header) => header,
            Err(error) => {
                debug!(path = %self.path.display(), %error, "event cache is not usable");
                return false;
            }
        };

        // A stamp further in the future than max_age is as unusable as an old one
        let max_age = max_age.num_seconds();
        match now.timestamp().checked_sub(header.timestamp) {
            Some(age) => (-max_age..=max_age).contains(&age),
            None => false,
        }
    }

    /// Last modification time reported by the filesystem.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.fs.modified(&self.path).ok().map(DateTime::<Utc>::from)
    }

    /// Delete the cache file if it exists.
    pub fn clear(&self) -> CacheResult<()> {
        if self.fs.exists(&self.path) {
            self.fs.remove(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Tz;

    const URL: &str = "https://calendar.google.com/calendar/ical/family/basic.ics";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 1, 6, 0, 0).unwrap()
    }

    fn sample(summary: &str, day: u32) -> CalendarEvent {
        let start = Utc.with_ymd_and_hms(2025, 12, day, 9, 0, 0).unwrap().timestamp();
        let mut event = CalendarEvent {
            uid: format!("{day}@example.com"),
            summary: summary.to_string(),
            location: "Room 4".into(),
            description: "Bring the slides".into(),
            calendar_name: "Work".into(),
            calendar_color: "#ff8800".into(),
            ..Default::default()
        };
        event.set_times(start, start + 3_600, Tz::UTC);
        event
    }

    /// The fields a cache record carries.
    fn persisted(event: &CalendarEvent) -> CalendarEvent {
        CalendarEvent {
            summary: event.summary.clone(),
            location: event.location.clone(),
            description: event.description.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            all_day: event.all_day,
            day_of_month: event.day_of_month,
            date: event.date.clone(),
            calendar_name: event.calendar_name.clone(),
            calendar_color: event.calendar_color.clone(),
            is_holiday: event.is_holiday,
            is_today: event.is_today,
            is_tomorrow: event.is_tomorrow,
            ..Default::default()
        }
    }

    fn cache_in(dir: &tempfile::TempDir) -> EventCache {
        EventCache::new(dir.path().join("cache").join("events.bin"))
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(HEADER_SIZE, 280);
        assert_eq!(RECORD_SIZE, 402);

        let image = encode(&[sample("a", 1), sample("b", 2)], URL, 0).unwrap();
        assert_eq!(image.len(), HEADER_SIZE + 2 * RECORD_SIZE);
        assert_eq!(&image[..4], &CACHE_MAGIC.to_le_bytes());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);

        let mut holiday = sample("Christmas", 25);
        holiday.all_day = true;
        holiday.is_holiday = true;
        holiday.is_today = true;
        let events = vec![sample("Standup", 1), holiday];

        cache.save(&events, URL, now()).unwrap();
        let loaded = cache.load(URL);

        let expected: Vec<CalendarEvent> = events.iter().map(persisted).collect();
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_overlong_strings_are_truncated_to_a_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);

        let mut event = sample(&"é".repeat(100), 3);
        event.calendar_name = "A calendar name that is far too long for its field".into();
        event.location = "x".repeat(64);
        cache.save(&[event.clone()], URL, now()).unwrap();

        let loaded = cache.load(URL).pop().unwrap();
        assert!(event.summary.starts_with(&loaded.summary));
        assert_eq!(loaded.summary.len(), 128);
        assert!(event.calendar_name.starts_with(&loaded.calendar_name));
        assert_eq!(loaded.calendar_name.len(), 32);
        // Exactly at capacity: no terminator, still intact
        assert_eq!(loaded.location, event.location);
    }

    #[test]
    fn test_save_refuses_empty_and_oversized_lists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);

        assert!(matches!(cache.save(&[], URL, now()), Err(CacheError::Empty)));

        let too_many = vec![sample("x", 1); MAX_CACHED_EVENTS + 1];
        assert!(matches!(
            cache.save(&too_many, URL, now()),
            Err(CacheError::TooManyEvents { .. })
        ));
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_url_mismatch_still_returns_events() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save(&[sample("a", 1)], "https://a.example/cal.ics", now()).unwrap();

        let loaded = cache.load("https://b.example/cal.ics");
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_corrupted_magic_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save(&[sample("a", 1)], URL, now()).unwrap();

        let mut bytes = std::fs::read(cache.path()).unwrap();
        bytes[0] ^= 0xff;
        std::fs::write(cache.path(), &bytes).unwrap();

        assert!(cache.load(URL).is_empty());
        assert!(matches!(cache.load_checked(URL), Err(CacheError::BadMagic(_))));
        assert!(!cache.is_valid(Duration::hours(1), now()));
    }

    #[test]
    fn test_corrupted_record_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save(&[sample("a", 1)], URL, now()).unwrap();

        let mut bytes = std::fs::read(cache.path()).unwrap();
        bytes[HEADER_SIZE + 3] ^= 0x01;
        std::fs::write(cache.path(), &bytes).unwrap();

        assert!(matches!(
            cache.load_checked(URL),
            Err(CacheError::ChecksumMismatch { .. })
        ));
        assert!(cache.load(URL).is_empty());
        // The cheap check does not read records
        assert!(cache.is_valid(Duration::hours(1), now()));
    }

    #[test]
    fn test_truncated_and_wrong_version_files() {
        let image = encode(&[sample("a", 1)], URL, 0).unwrap();

        assert!(matches!(
            decode(&image[..image.len() - 1]),
            Err(CacheError::Truncated { .. })
        ));
        assert!(matches!(decode(&image[..10]), Err(CacheError::Truncated { .. })));

        let mut wrong_version = image.clone();
        wrong_version[4..8].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            decode(&wrong_version),
            Err(CacheError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_is_valid_checks_age() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        assert!(!cache.is_valid(Duration::hours(6), now()));

        cache.save(&[sample("a", 1)], URL, now()).unwrap();
        assert!(cache.is_valid(Duration::hours(6), now() + Duration::hours(5)));
        assert!(!cache.is_valid(Duration::hours(6), now() + Duration::hours(7)));
    }

    #[test]
    fn test_is_valid_rejects_corrupted_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save(&[sample("a", 1)], URL, now()).unwrap();

        let mut bytes = std::fs::read(cache.path()).unwrap();
        bytes[12..20].copy_from_slice(&i64::MIN.to_le_bytes());
        std::fs::write(cache.path(), &bytes).unwrap();
        assert!(!cache.is_valid(Duration::hours(6), now()));

        bytes[12..20].copy_from_slice(&i64::MAX.to_le_bytes());
        std::fs::write(cache.path(), &bytes).unwrap();
        assert!(!cache.is_valid(Duration::hours(6), now()));

        // Slight clock skew is tolerated
        let skewed = (now() + Duration::minutes(10)).timestamp();
        bytes[12..20].copy_from_slice(&skewed.to_le_bytes());
        std::fs::write(cache.path(), &bytes).unwrap();
        assert!(cache.is_valid(Duration::hours(6), now()));
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.clear().unwrap();

        cache.save(&[sample("a", 1)], URL, now()).unwrap();
        assert!(cache.modified().is_some());
        cache.clear().unwrap();
        assert!(!cache.path().exists());
        assert!(cache.load(URL).is_empty());
    }

    #[test]
    fn test_header_metadata() {
        let image = encode(&[sample("a", 1), sample("b", 2)], URL, 1_764_568_800).unwrap();
        let header = decode_header(&image).unwrap();
        assert_eq!(header.event_count, 2);
        assert_eq!(header.timestamp, 1_764_568_800);
        assert_eq!(header.source_url, URL);
    }
}
