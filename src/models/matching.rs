// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rules for locating the remote entry that corresponds to a local
//! measurement when the two systems share no identifier.
//!
//! Each backend picks its own [`MatchWindow`] according to its native time
//! resolution; [`ClearWindow`] bounds the range `clear()` wipes.

use chrono::{DateTime, Days, Duration, Months, NaiveDate, TimeZone, Utc};

/// How close two timestamps must be to denote the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchWindow {
    /// Point-in-time backends: `|a - b| <= tolerance` milliseconds.
    Millis(i64),
    /// Day-granularity backends: same UTC calendar date.
    CalendarDay,
}

impl MatchWindow {
    /// Whether `remote` denotes the same entry as `local`.
    pub fn matches(&self, local: DateTime<Utc>, remote: DateTime<Utc>) -> bool {
        match self {
            MatchWindow::Millis(tolerance) => {
                (local - remote).num_milliseconds().abs() <= *tolerance
            }
            MatchWindow::CalendarDay => local.date_naive() == remote.date_naive(),
        }
    }

    /// Half-open range `[start, end)` covering every remote timestamp that
    /// matches `local`.
    pub fn bounds(&self, local: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            MatchWindow::Millis(tolerance) => {
                let tolerance = (*tolerance).max(0);
                let start = Duration::try_milliseconds(tolerance)
                    .and_then(|d| local.checked_sub_signed(d))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                let end = Duration::try_milliseconds(tolerance.saturating_add(1))
                    .and_then(|d| local.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                (start, end)
            }
            MatchWindow::CalendarDay => {
                let day = local.date_naive();
                (start_of_day(day), start_of_day(day + Days::new(1)))
            }
        }
    }

    /// Find the closest remote entry that matches `local`.
    pub fn find_match<'a, T, F>(
        &self,
        local: DateTime<Utc>,
        entries: &'a [T],
        timestamp_of: F,
    ) -> Option<&'a T>
    where
        F: Fn(&T) -> Option<DateTime<Utc>>,
    {
        entries
            .iter()
            .filter_map(|entry| timestamp_of(entry).map(|ts| (entry, ts)))
            .filter(|(_, ts)| self.matches(local, *ts))
            .min_by_key(|(_, ts)| (local - *ts).num_milliseconds().abs())
            .map(|(entry, _)| entry)
    }
}

/// Historical range wiped by `clear()`, relative to "now".
///
/// Wide enough to cover all plausible history, and reaching a few days into
/// the future to tolerate client/server clock skew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearWindow {
    pub years_back: u32,
    pub days_forward: u32,
}

impl Default for ClearWindow {
    fn default() -> Self {
        Self {
            years_back: 5,
            days_forward: 3,
        }
    }
}

impl ClearWindow {
    /// Half-open range `[start, end)` relative to `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = now
            .checked_sub_months(Months::new(self.years_back.saturating_mul(12)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end = now
            .checked_add_days(Days::new(u64::from(self.days_forward)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (start, end)
    }

    /// Whether `ts` falls inside the window anchored at `now`.
    pub fn contains(&self, now: DateTime<Utc>, ts: DateTime<Utc>) -> bool {
        let (start, end) = self.bounds(now);
        ts >= start && ts < end
    }
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}
