// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-adapter status board.
//!
//! Holds the last human-readable status of every adapter and the last event
//! that failed on it, so a single adapter can be retried without replaying
//! the event on the others.

use crate::error::SyncError;
use crate::models::SyncEvent;
use crate::sync::{AdapterStatus, SyncOutcome};
use crate::time_utils::{format_calendar_date, format_utc_rfc3339};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Last known state of one adapter.
#[derive(Debug, Clone)]
pub struct AdapterState {
    pub ok: bool,
    pub message: String,
    pub updated_at: DateTime<Utc>,
    /// Last time an event was applied successfully
    pub last_sync: Option<DateTime<Utc>>,
    /// Event to replay on retry
    pub pending_retry: Option<SyncEvent>,
}

/// Shared, lock-free status map keyed by adapter name.
#[derive(Clone, Default)]
pub struct StatusBoard {
    entries: Arc<DashMap<String, AdapterState>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of applying `event` on `adapter`.
    pub fn record_event(
        &self,
        adapter: &str,
        event: &SyncEvent,
        result: &Result<SyncOutcome, SyncError>,
    ) {
        match result {
            Ok(outcome) => {
                let message = format!("{}: {}", adapter, describe_success(event, outcome));
                tracing::info!(adapter, message = %message, "Sync succeeded");
                let now = Utc::now();
                let mut entry = self
                    .entries
                    .entry(adapter.to_string())
                    .or_insert_with(|| AdapterState::empty(now));
                entry.ok = true;
                entry.message = message;
                entry.updated_at = now;
                entry.last_sync = Some(now);
                // An unrelated success leaves an earlier failure replayable
                if entry.pending_retry.as_ref() == Some(event) {
                    entry.pending_retry = None;
                }
            }
            Err(err) => {
                tracing::error!(
                    adapter,
                    kind = %event.kind(),
                    error_kind = err.kind(),
                    error = %err,
                    "Sync failed"
                );
                self.record_failure(adapter, err, Some(event.clone()));
            }
        }
    }

    /// Record a failure. Without a replayable event any pending retry is kept.
    pub fn record_failure(&self, adapter: &str, err: &SyncError, retry: Option<SyncEvent>) {
        let mut entry = self
            .entries
            .entry(adapter.to_string())
            .or_insert_with(|| AdapterState::empty(Utc::now()));
        entry.ok = false;
        entry.message = format!("{}: {}", adapter, err);
        entry.updated_at = Utc::now();
        if retry.is_some() {
            entry.pending_retry = retry;
        }
    }

    /// Record the result of a bulk push.
    pub fn record_full_sync(
        &self,
        adapter: &str,
        count: usize,
        result: &Result<SyncOutcome, SyncError>,
    ) {
        match result {
            Ok(_) => {
                let now = Utc::now();
                let mut entry = self
                    .entries
                    .entry(adapter.to_string())
                    .or_insert_with(|| AdapterState::empty(now));
                entry.ok = true;
                entry.message = format!("{}: {} measurements synced", adapter, count);
                entry.updated_at = now;
                entry.last_sync = Some(now);
            }
            Err(err) => {
                tracing::error!(adapter, error = %err, "Full sync failed");
                self.record_failure(adapter, err, None);
            }
        }
    }

    /// Record a remote-to-local import.
    pub fn record_import(&self, adapter: &str, result: &Result<SyncOutcome, SyncError>) {
        match result {
            Ok(outcome) => {
                let count = match outcome {
                    SyncOutcome::Imported(n) => *n,
                    _ => 0,
                };
                let now = Utc::now();
                let mut entry = self
                    .entries
                    .entry(adapter.to_string())
                    .or_insert_with(|| AdapterState::empty(now));
                entry.ok = true;
                entry.message = format!("{}: {} measurements imported", adapter, count);
                entry.updated_at = now;
                entry.last_sync = Some(now);
            }
            Err(err) => {
                tracing::error!(adapter, error = %err, "Import failed");
                self.record_failure(adapter, err, None);
            }
        }
    }

    /// Record a status probe. A successful probe keeps any pending retry.
    pub fn record_check(&self, adapter: &str, status: &AdapterStatus) {
        let now = Utc::now();
        let mut entry = self
            .entries
            .entry(adapter.to_string())
            .or_insert_with(|| AdapterState::empty(now));
        entry.ok = status.ok;
        entry.message = format!("{}: {}", adapter, status.message);
        entry.updated_at = now;
    }

    /// Take the event to replay on `adapter`, leaving none behind.
    pub fn take_retry(&self, adapter: &str) -> Option<SyncEvent> {
        self.entries
            .get_mut(adapter)
            .and_then(|mut entry| entry.pending_retry.take())
    }

    pub fn get(&self, adapter: &str) -> Option<AdapterState> {
        self.entries.get(adapter).map(|entry| entry.clone())
    }
}

impl AdapterState {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            ok: true,
            message: String::new(),
            updated_at: now,
            last_sync: None,
            pending_retry: None,
        }
    }
}

fn describe_success(event: &SyncEvent, outcome: &SyncOutcome) -> String {
    match (event, outcome) {
        (_, SyncOutcome::NoMatch) => match event.date() {
            Some(date) => format!(
                "no remote entry for {}, nothing to {}",
                format_utc_rfc3339(date),
                event.kind()
            ),
            None => format!("nothing to {}", event.kind()),
        },
        (SyncEvent::Insert { measurement, .. }, _) => format!(
            "measurement {:.2} kg on {} inserted",
            measurement.weight,
            format_calendar_date(measurement.date)
        ),
        (SyncEvent::Update { measurement, .. }, _) => format!(
            "measurement {:.2} kg on {} updated",
            measurement.weight,
            format_calendar_date(measurement.date)
        ),
        (SyncEvent::Delete { date, .. }, _) => {
            format!("measurement on {} deleted", format_calendar_date(*date))
        }
        (SyncEvent::Clear { .. }, SyncOutcome::Removed(n)) => {
            format!("all measurements cleared ({} removed)", n)
        }
        (SyncEvent::Clear { .. }, _) => "all measurements cleared".to_string(),
    }
}
