//! Timestamp parsing for source files.
//!
//! Accepts ISO-8601 variants and the common slash and dash locale layouts.
//! Locale dates are month-first unless day-first is requested; when the
//! preferred order cannot produce a valid date (`12/25/2023` read day-first,
//! `25/12/2023` read month-first) the other order is tried. Results are
//! timezone-naive: an explicit offset is dropped and the wall clock time it
//! qualified is kept.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// ISO date-time layouts, tried in order
const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const MONTH_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
];

const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const MONTH_FIRST_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y"];

const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y"];

/// Parse a timestamp cell, returning `None` when no layout matches.
///
/// `day_first` picks how an ambiguous locale date such as `01/11/2015` is
/// read.
pub fn parse_timestamp(raw: &str, day_first: bool) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
        return Some(with_offset.naive_local());
    }
    if let Some(parsed) = first_datetime(value, ISO_DATETIME_FORMATS) {
        return Some(parsed);
    }

    let (preferred, fallback) = if day_first {
        (DAY_FIRST_DATETIME_FORMATS, MONTH_FIRST_DATETIME_FORMATS)
    } else {
        (MONTH_FIRST_DATETIME_FORMATS, DAY_FIRST_DATETIME_FORMATS)
    };
    let (preferred_dates, fallback_dates) = if day_first {
        (DAY_FIRST_DATE_FORMATS, MONTH_FIRST_DATE_FORMATS)
    } else {
        (MONTH_FIRST_DATE_FORMATS, DAY_FIRST_DATE_FORMATS)
    };

    first_datetime(value, preferred)
        .or_else(|| first_datetime(value, fallback))
        .or_else(|| first_date(value, &["%Y-%m-%d"]))
        .or_else(|| first_date(value, preferred_dates))
        .or_else(|| first_date(value, fallback_dates))
}

fn first_datetime(value: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Date-only layouts are read as midnight
fn first_date(value: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
