// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local change events sent by the local store whenever a measurement is
//! inserted, updated, deleted, or the user's history is cleared.

use crate::models::Measurement;
use crate::time_utils::from_epoch_millis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Kind of local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Insert,
    Update,
    Delete,
    Clear,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Clear => "clear",
        };
        f.write_str(s)
    }
}

/// A validated local change, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Insert {
        user_id: i32,
        measurement: Measurement,
    },
    Update {
        user_id: i32,
        measurement: Measurement,
    },
    Delete {
        user_id: i32,
        date: DateTime<Utc>,
    },
    Clear {
        user_id: i32,
    },
}

impl SyncEvent {
    /// The local user this change belongs to.
    pub fn user_id(&self) -> i32 {
        match self {
            SyncEvent::Insert { user_id, .. }
            | SyncEvent::Update { user_id, .. }
            | SyncEvent::Delete { user_id, .. }
            | SyncEvent::Clear { user_id } => *user_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::Insert { .. } => EventKind::Insert,
            SyncEvent::Update { .. } => EventKind::Update,
            SyncEvent::Delete { .. } => EventKind::Delete,
            SyncEvent::Clear { .. } => EventKind::Clear,
        }
    }

    /// Timestamp the change refers to, if any.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            SyncEvent::Insert { measurement, .. } | SyncEvent::Update { measurement, .. } => {
                Some(measurement.date)
            }
            SyncEvent::Delete { date, .. } => Some(*date),
            SyncEvent::Clear { .. } => None,
        }
    }
}

/// Wire format of a change notification.
///
/// Flat on purpose: the local store sends the same handful of extras for
/// every mode and leaves the irrelevant ones out.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub mode: EventKind,
    #[validate(range(min = 0))]
    pub user_id: i32,
    /// Epoch milliseconds
    pub date: Option<i64>,
    /// Kilograms
    #[validate(range(exclusive_min = 0.0, max = 1000.0))]
    pub weight: Option<f64>,
}

impl TryFrom<EventPayload> for SyncEvent {
    type Error = String;

    fn try_from(payload: EventPayload) -> Result<Self, Self::Error> {
        payload.validate().map_err(|e| e.to_string())?;

        let date = payload
            .date
            .map(|ms| from_epoch_millis(ms).ok_or_else(|| format!("date {} out of range", ms)))
            .transpose()?;

        let user_id = payload.user_id;
        let require_date = || date.ok_or_else(|| format!("{} requires a date", payload.mode));
        let require_measurement = || -> Result<Measurement, String> {
            let weight = payload
                .weight
                .ok_or_else(|| format!("{} requires a weight", payload.mode))?;
            Ok(Measurement::new(require_date()?, weight))
        };

        match payload.mode {
            EventKind::Insert => Ok(SyncEvent::Insert {
                user_id,
                measurement: require_measurement()?,
            }),
            EventKind::Update => Ok(SyncEvent::Update {
                user_id,
                measurement: require_measurement()?,
            }),
            EventKind::Delete => Ok(SyncEvent::Delete {
                user_id,
                date: require_date()?,
            }),
            EventKind::Clear => Ok(SyncEvent::Clear { user_id }),
        }
    }
}
