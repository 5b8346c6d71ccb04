// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Measurement synchronization: the adapter contract, the per-backend
//! adapters, and the dispatcher that fans local changes out to them.

pub mod dispatcher;
pub mod google_fit;
pub mod mqtt;
pub mod status;
pub mod wger;

pub use dispatcher::{AdapterReport, DispatchReport, Dispatcher};
pub use google_fit::GoogleFitSync;
pub use mqtt::MqttSync;
pub use status::{AdapterState, StatusBoard};
pub use wger::WgerSync;

use crate::config::Config;
use crate::error::SyncError;
use crate::models::{MatchWindow, Measurement, SyncEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// What a successful adapter call did to the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "count", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The write was sent (and acknowledged where the transport supports it).
    Applied,
    /// No remote entry matched; nothing was changed.
    NoMatch,
    /// This many remote entries were removed.
    Removed(usize),
    /// This many remote entries were copied into the local store.
    Imported(usize),
}

/// Result of a connectivity/credential probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterStatus {
    pub ok: bool,
    pub message: String,
}

impl AdapterStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(err: &SyncError) -> Self {
        Self {
            ok: false,
            message: err.to_string(),
        }
    }
}

/// A remote backend that mirrors the active user's measurements.
///
/// Implementations take their configuration at construction and keep no
/// other state between calls. Every call establishes whatever connection it
/// needs, or fails explicitly.
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    /// Stable identifier used in logs, status and routes.
    fn name(&self) -> &str;

    /// Read from configuration; never does I/O.
    fn is_enabled(&self) -> bool;

    /// Tolerance used to find the remote counterpart of a local timestamp.
    fn match_window(&self) -> MatchWindow;

    async fn insert(&self, measurement: &Measurement) -> Result<SyncOutcome, SyncError>;

    /// Replace the remote entry matching `measurement.date` with the new weight.
    async fn update(&self, measurement: &Measurement) -> Result<SyncOutcome, SyncError>;

    /// Remove the remote entry matching `date`; `NoMatch` when there is none.
    async fn delete(&self, date: DateTime<Utc>) -> Result<SyncOutcome, SyncError>;

    /// Remove every remote entry inside the configured clear window.
    async fn clear(&self) -> Result<SyncOutcome, SyncError>;

    /// Lightweight probe; must not mutate remote state.
    async fn check_status(&self) -> AdapterStatus;

    /// Remote entries inside the clear window, oldest first.
    ///
    /// `None` for write-only backends that cannot be read back.
    async fn list_remote(&self) -> Result<Option<Vec<Measurement>>, SyncError> {
        Ok(None)
    }

    /// Push a whole history, one insert per measurement.
    async fn full_sync(&self, measurements: &[Measurement]) -> Result<SyncOutcome, SyncError> {
        let mut failed = 0usize;
        let mut last_error = None;

        for measurement in measurements {
            if let Err(e) = self.insert(measurement).await {
                tracing::debug!(
                    adapter = %self.name(),
                    timestamp_ms = measurement.timestamp_ms(),
                    error = %e,
                    "Full sync insert failed"
                );
                failed += 1;
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) if failed == measurements.len() => Err(e),
            Some(_) => Err(SyncError::PartialFailure(format!(
                "{} of {} measurements failed to sync",
                failed,
                measurements.len()
            ))),
            None => Ok(SyncOutcome::Applied),
        }
    }
}

/// Invoke the adapter operation matching the event's kind.
pub async fn apply_event(
    adapter: &dyn SyncAdapter,
    event: &SyncEvent,
) -> Result<SyncOutcome, SyncError> {
    match event {
        SyncEvent::Insert { measurement, .. } => adapter.insert(measurement).await,
        SyncEvent::Update { measurement, .. } => adapter.update(measurement).await,
        SyncEvent::Delete { date, .. } => adapter.delete(*date).await,
        SyncEvent::Clear { .. } => adapter.clear().await,
    }
}

/// Build every known adapter from configuration, in a fixed order.
///
/// Disabled adapters are included so that status and retry routes can still
/// name them.
pub fn build_adapters(config: &Config) -> Result<Vec<Arc<dyn SyncAdapter>>, SyncError> {
    Ok(vec![
        Arc::new(GoogleFitSync::new(
            config.google_fit.clone(),
            config.clear_window,
            config.http_timeout,
        )?),
        Arc::new(MqttSync::new(config.mqtt.clone())),
        Arc::new(WgerSync::new(
            config.wger.clone(),
            config.clear_window,
            config.http_timeout,
        )?),
    ])
}
