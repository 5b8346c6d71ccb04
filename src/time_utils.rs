// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Format the UTC calendar date (`YYYY-MM-DD`).
pub fn format_calendar_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a calendar date, accepting a trailing time part (`2024-01-10T08:00:00+01:00`).
pub fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    let day = s.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

pub fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Nanoseconds since the epoch, as used by nanosecond-resolution APIs.
pub fn to_epoch_nanos(date: DateTime<Utc>) -> i64 {
    date.timestamp_millis().saturating_mul(1_000_000)
}
