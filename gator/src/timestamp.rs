//! Publish-date resolution for feed items.
//!
//! Item dates arrive as free text. Each accepted format is a [`DateStrategy`]
//! and [`DATE_STRATEGIES`] is tried in order; the first strategy that parses
//! wins. Adding a format means adding an entry, nothing else changes.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

const DATE_TIME_FORMAT: &str = "%d %b %Y %H:%M:%S";
/// `9` is a digit, `a` a letter, anything else must match exactly.
const DATE_TIME_SHAPE: &str = "99 aaa 9999 99:99:99";
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

pub struct DateStrategy {
    pub name: &'static str,
    pub parse: fn(&str) -> Option<DateTime<Utc>>,
}

pub const DATE_STRATEGIES: &[DateStrategy] = &[
    DateStrategy {
        name: "rfc1123",
        parse: parse_rfc1123_zone_name,
    },
    DateStrategy {
        name: "rfc1123z",
        parse: parse_rfc1123_numeric_offset,
    },
];

/// Resolves a raw `pubDate` value.
///
/// Empty input means "no timestamp". Unparsable input is logged and also
/// yields `None`; it never blocks ingestion of the item.
pub fn resolve(raw: &str) -> Option<DateTime<Utc>> {
    resolve_with(raw, DATE_STRATEGIES)
}

pub fn resolve_with(raw: &str, strategies: &[DateStrategy]) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let resolved = strategies.iter().find_map(|strategy| (strategy.parse)(raw));
    if resolved.is_none() {
        warn!(pub_date = raw, "Failed to parse publish date");
    }
    resolved
}

/// `Mon, 02 Jan 2006 15:04:05 MST`
fn parse_rfc1123_zone_name(raw: &str) -> Option<DateTime<Utc>> {
    let (date_time, zone) = split_date_time(raw)?;
    let offset = zone_abbreviation_offset(zone)?;
    let naive = NaiveDateTime::parse_from_str(date_time, DATE_TIME_FORMAT).ok()?;

    FixedOffset::east_opt(offset)?
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `Mon, 02 Jan 2006 15:04:05 -0700`
fn parse_rfc1123_numeric_offset(raw: &str) -> Option<DateTime<Utc>> {
    let (date_time, zone) = split_date_time(raw)?;
    let zone_shape = zone.len() == 5
        && zone.starts_with(['+', '-'])
        && zone.bytes().skip(1).all(|b| b.is_ascii_digit());
    if !zone_shape {
        return None;
    }

    DateTime::parse_from_str(&format!("{date_time} {zone}"), &format!("{DATE_TIME_FORMAT} %z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Splits off the weekday and the zone, keeping only a fixed-width
/// `02 Jan 2006 15:04:05` part. chrono alone would take one-digit fields.
fn split_date_time(raw: &str) -> Option<(&str, &str)> {
    let (date_time, zone) = strip_weekday(raw)?.rsplit_once(' ')?;
    let fixed_width = date_time.len() == DATE_TIME_SHAPE.len()
        && date_time
            .bytes()
            .zip(DATE_TIME_SHAPE.bytes())
            .all(|(b, shape)| match shape {
                b'9' => b.is_ascii_digit(),
                b'a' => b.is_ascii_alphabetic(),
                _ => b == shape,
            });
    fixed_width.then_some((date_time, zone))
}

/// The weekday must be well formed but is not checked against the date.
fn strip_weekday(raw: &str) -> Option<&str> {
    let (day, rest) = raw.split_once(", ")?;
    WEEKDAYS
        .iter()
        .any(|w| w.eq_ignore_ascii_case(day))
        .then_some(rest.trim_start())
}

/// Offset in seconds east of UTC.
///
/// Abbreviations outside the RFC 822 set carry no usable offset and are read as UTC.
fn zone_abbreviation_offset(zone: &str) -> Option<i32> {
    if !(1..=5).contains(&zone.len()) || !zone.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }

    let hours = match zone.to_ascii_uppercase().as_str() {
        "EDT" => -4,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" => -8,
        _ => 0,
    };
    Some(hours * 3600)
}
