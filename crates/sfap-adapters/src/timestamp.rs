//! Timestamp normalization into JST calendar slots.
//!
//! Export tools disagree on how a publish time is written: ISO strings with or
//! without an offset, US-style dates, RFC 2822, or epoch numbers in seconds or
//! milliseconds. Every shape is resolved to one instant and converted once into
//! the target zone, so date, hour and weekday can never disagree.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use sfap_core::PostTime;

/// Epoch magnitudes below this are seconds, anything larger is milliseconds.
pub const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Formats carrying their own offset, tried before the zone-less ones.
const ZONED_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y/%m/%d %H:%M:%S %z",
];

const DATETIME_FORMATS: [&str; 14] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%b %d, %Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%b %d, %Y", "%B %d, %Y"];

const NULL_LIKE: [&str; 5] = ["nan", "nat", "none", "null", "n/a"];

/// A publish time of unknown shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawTimestamp<'a> {
    Text(&'a str),
    Epoch(f64),
    Instant(DateTime<FixedOffset>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampNormalizer {
    source_offset: FixedOffset,
    target_offset: FixedOffset,
}

impl Default for TimestampNormalizer {
    fn default() -> Self {
        Self::new(utc_offset())
    }
}

impl TimestampNormalizer {
    /// `source_offset` is assumed for any input without zone information.
    pub fn new(source_offset: FixedOffset) -> Self {
        Self {
            source_offset,
            target_offset: jst_offset(),
        }
    }

    pub fn source_offset(&self) -> FixedOffset {
        self.source_offset
    }

    /// `None` means unparseable; callers skip the row.
    pub fn normalize(&self, raw: RawTimestamp<'_>) -> Option<PostTime> {
        let instant = match raw {
            RawTimestamp::Instant(instant) => instant.with_timezone(&Utc),
            RawTimestamp::Epoch(value) => epoch_to_utc(value)?,
            RawTimestamp::Text(text) => self.parse_text(text)?,
        };
        let local = instant.with_timezone(&self.target_offset).naive_local();
        Some(PostTime::from_local(local))
    }

    /// Normalize a CSV cell: purely numeric cells are epochs, the rest text.
    pub fn normalize_cell(&self, cell: &str) -> Option<PostTime> {
        let trimmed = cell.trim();
        match trimmed.parse::<f64>() {
            Ok(value) if !trimmed.is_empty() => self.normalize(RawTimestamp::Epoch(value)),
            _ => self.normalize(RawTimestamp::Text(trimmed)),
        }
    }

    fn parse_text(&self, text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        if is_null_like(text) {
            return None;
        }
        self.parse_flexible(text).or_else(|| self.parse_fallback(text))
    }

    fn parse_flexible(&self, text: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
            return Some(dt.with_timezone(&Utc));
        }
        ZONED_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn parse_fallback(&self, text: &str) -> Option<DateTime<Utc>> {
        let naive = DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
            .or_else(|| parse_calendar_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))?;
        self.source_offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Parse a calendar date (no zone conversion), accepting a trailing time.
pub fn parse_calendar_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if is_null_like(text) {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

fn epoch_to_utc(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() < EPOCH_MILLIS_THRESHOLD {
        value * 1000.0
    } else {
        value
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

fn is_null_like(text: &str) -> bool {
    text.is_empty() || NULL_LIKE.iter().any(|n| text.eq_ignore_ascii_case(n))
}

pub fn jst_offset() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).unwrap_or_else(utc_offset)
}

pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Parse `±HH:MM` (or `Z`/`UTC`) into an offset.
pub fn parse_utc_offset(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("z") || text.eq_ignore_ascii_case("utc") {
        return Some(utc_offset());
    }
    let (sign, rest) = match text.chars().next()? {
        '+' => (1, &text[1..]),
        '-' => (-1, &text[1..]),
        _ => (1, text),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
