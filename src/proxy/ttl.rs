//! TTL derivation from upstream caching headers.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

/// `Expires` layouts without a zone, tried in order. Two-digit years go first
/// so a four-digit year is never read as a two-digit one.
const NAMED_ZONE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S",
    "%a, %d-%b-%y %H:%M:%S",
    "%A, %d-%b-%y %H:%M:%S",
    "%a, %d-%b-%Y %H:%M:%S",
    "%A, %d-%b-%Y %H:%M:%S",
];

/// RFC 1123 with a numeric offset.
const NUMERIC_ZONE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// TTL advertised by the upstream, if any.
///
/// The first parseable `max-age` directive wins. Otherwise `Expires` is read
/// relative to `now`, which may give a negative TTL for dates in the past.
pub fn derive_ttl(headers: &HeaderMap, now: DateTime<Utc>) -> Option<TimeDelta> {
    max_age(headers).or_else(|| expires(headers).map(|at| at - now))
}

fn max_age(headers: &HeaderMap) -> Option<TimeDelta> {
    let cache_control = headers.get(header::CACHE_CONTROL)?.to_str().ok()?;

    cache_control
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|value| value.parse::<i64>().ok())
        .and_then(TimeDelta::try_seconds)
}

fn expires(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let value = headers.get(header::EXPIRES)?.to_str().ok()?.trim();
    parse_http_date(value)
}

/// Parses an HTTP date in one of the layouts servers actually send.
///
/// Zone names are not resolved; the timestamp is read as UTC.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let (stamp, zone) = value.rsplit_once(' ')?;

    if zone.chars().all(|c| c.is_ascii_alphabetic()) {
        if let Some(parsed) = NAMED_ZONE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(stamp, format).ok())
        {
            return Some(parsed.and_utc());
        }
    }

    DateTime::parse_from_str(value, NUMERIC_ZONE_FORMAT)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
