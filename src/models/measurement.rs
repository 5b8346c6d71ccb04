// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Canonical measurement and user records moved between the local store and
//! the remote backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single body-weight data point.
///
/// There is no remote identifier: `(date, owner user id)` is the only key,
/// and the owner is implied by the configured active user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// When the measurement was taken (millisecond precision, epoch millis on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    /// Weight in kilograms
    pub weight: f64,
}

impl Measurement {
    /// Create a measurement, rounding the weight to two decimals.
    pub fn new(date: DateTime<Utc>, weight: f64) -> Self {
        Self {
            date,
            weight: round_weight(weight),
        }
    }

    /// Timestamp as epoch milliseconds.
    pub fn timestamp_ms(&self) -> i64 {
        self.date.timestamp_millis()
    }
}

/// Local user as reported by the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleUser {
    pub id: i32,
    pub username: String,
}

/// Round to two decimal places, half away from zero.
pub fn round_weight(weight: f64) -> f64 {
    (weight * 100.0).round() / 100.0
}
