//! Timestamp normalization for syndication documents.
//!
//! Producers disagree on how RFC 822 zones are written, so a timestamp is
//! tried against a short ordered list of layouts and the first one that
//! parses wins. New layouts are appended to [`LAYOUTS`].

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use crate::error::DateFormatError;

type LayoutParser = fn(&str) -> Option<DateTime<Utc>>;

/// Accepted layouts, in trial order.
const LAYOUTS: &[(&str, LayoutParser)] = &[
    ("rfc822-zone", parse_rfc822_zone),
    ("rfc822-offset", parse_rfc822_offset),
    ("rfc3339", parse_rfc3339),
];

/// Parses a feed timestamp into an absolute UTC instant.
pub fn parse_date(input: &str) -> Result<DateTime<Utc>, DateFormatError> {
    let value = input.trim();
    for (name, parse) in LAYOUTS {
        if let Some(instant) = parse(value) {
            debug!(layout = *name, %instant, "parsed date");
            return Ok(instant);
        }
    }
    Err(DateFormatError {
        input: input.to_owned(),
    })
}

/// `Mon, 02 Jan 2006 15:04:05 MST`
fn parse_rfc822_zone(value: &str) -> Option<DateTime<Utc>> {
    let (stamp, zone) = value.rsplit_once(' ')?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(strip_weekday(stamp), "%d %b %Y %H:%M:%S").ok()?;
    let offset = FixedOffset::east_opt(zone_offset_hours(zone) * 3600)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `Mon, 02 Jan 2006 15:04:05 -0700`
fn parse_rfc822_offset(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(strip_weekday(value), "%d %b %Y %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `2006-01-02T15:04:05Z`
fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// The day name is informational only; a wrong one must not reject the date.
fn strip_weekday(value: &str) -> &str {
    match value.split_once(',') {
        Some((day, rest)) if day.chars().all(|c| c.is_ascii_alphabetic()) => rest.trim_start(),
        _ => value,
    }
}

/// Offsets for the zone names RFC 822 defines. Anything else is taken as UTC.
fn zone_offset_hours(zone: &str) -> i32 {
    match zone.to_ascii_uppercase().as_str() {
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ => 0,
    }
}
