// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fan-out of local change events to every enabled sync adapter.
//!
//! Handles:
//! - Dropping events that belong to anyone but the active user
//! - Running each adapter on its own task, so one slow or failing backend
//!   never delays or aborts another
//! - Serializing calls to the same adapter instance
//! - Recording per-adapter status and retrying a single adapter
//! - Full history push from the local store
//! - Import of remote entries the local store lacks

use crate::error::{AppError, SyncError};
use crate::gateway::LocalStore;
use crate::models::{EventKind, Measurement, SyncEvent};
use crate::sync::{apply_event, AdapterStatus, StatusBoard, SyncAdapter, SyncOutcome};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;

/// An adapter plus the lock that serializes calls into it.
#[derive(Clone)]
struct AdapterSlot {
    adapter: Arc<dyn SyncAdapter>,
    lock: Arc<Mutex<()>>,
}

/// Outcome of one adapter for one dispatched event.
#[derive(Debug, Clone)]
pub struct AdapterReport {
    pub adapter: String,
    pub result: Result<SyncOutcome, SyncError>,
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub kind: EventKind,
    pub user_id: i32,
    /// False when the event was dropped for targeting a non-active user
    pub accepted: bool,
    pub results: Vec<AdapterReport>,
}

impl DispatchReport {
    /// Number of adapters that were invoked.
    pub fn invoked(&self) -> usize {
        self.results.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &AdapterReport> {
        self.results.iter().filter(|r| r.result.is_err())
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Routes local change events to all enabled adapters.
pub struct Dispatcher {
    active_user_id: i32,
    slots: Vec<AdapterSlot>,
    status: StatusBoard,
}

impl Dispatcher {
    pub fn new(active_user_id: i32, adapters: Vec<Arc<dyn SyncAdapter>>) -> Self {
        let slots = adapters
            .into_iter()
            .map(|adapter| AdapterSlot {
                adapter,
                lock: Arc::new(Mutex::new(())),
            })
            .collect();

        Self {
            active_user_id,
            slots,
            status: StatusBoard::new(),
        }
    }

    pub fn active_user_id(&self) -> i32 {
        self.active_user_id
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// All adapters in configuration order, enabled or not.
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn SyncAdapter>> {
        self.slots.iter().map(|slot| &slot.adapter)
    }

    fn enabled_slots(&self) -> impl Iterator<Item = &AdapterSlot> {
        self.slots.iter().filter(|slot| {
            let enabled = slot.adapter.is_enabled();
            if !enabled {
                tracing::debug!(adapter = %slot.adapter.name(), "Adapter disabled");
            }
            enabled
        })
    }

    fn find_slot(&self, name: &str) -> Result<&AdapterSlot, AppError> {
        self.slots
            .iter()
            .find(|slot| slot.adapter.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| AppError::NotFound(format!("Adapter {}", name)))
    }

    /// Dispatch one event to every enabled adapter and wait for all of them.
    ///
    /// Adapters run concurrently on separate tasks; a failure in one is
    /// recorded and never affects the others.
    pub async fn dispatch(&self, event: SyncEvent) -> DispatchReport {
        let kind = event.kind();
        let user_id = event.user_id();

        if user_id != self.active_user_id {
            tracing::info!(
                user_id,
                active_user_id = self.active_user_id,
                kind = %kind,
                "Dropping event for non-active user"
            );
            return DispatchReport {
                kind,
                user_id,
                accepted: false,
                results: Vec::new(),
            };
        }

        tracing::info!(user_id, kind = %kind, date = ?event.date(), "Dispatching event");

        let event = Arc::new(event);
        let handles: Vec<_> = self
            .enabled_slots()
            .map(|slot| {
                let slot = slot.clone();
                let event = event.clone();
                let status = self.status.clone();
                let name = slot.adapter.name().to_string();
                let handle = tokio::spawn(async move {
                    let _guard = slot.lock.lock().await;
                    let result = apply_event(slot.adapter.as_ref(), &event).await;
                    status.record_event(slot.adapter.name(), &event, &result);
                    result
                });
                (name, handle)
            })
            .collect();

        let results = join_reports(handles).await;

        DispatchReport {
            kind,
            user_id,
            accepted: true,
            results,
        }
    }

    /// Dispatch in the background and return immediately.
    pub fn dispatch_detached(self: &Arc<Self>, event: SyncEvent) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let report = dispatcher.dispatch(event).await;
            if !report.is_complete_success() {
                tracing::warn!(
                    kind = %report.kind,
                    failed = report.failures().count(),
                    invoked = report.invoked(),
                    "Event dispatched with failures"
                );
            }
        });
    }

    /// Replay the last failed event on a single adapter.
    ///
    /// Returns `Ok(None)` when nothing is pending for that adapter.
    pub async fn retry(&self, name: &str) -> Result<Option<AdapterReport>, AppError> {
        let slot = self.find_slot(name)?;
        let adapter_name = slot.adapter.name();

        // Hold the lock before taking the event so an in-flight call on this
        // adapter records its result first.
        let _guard = slot.lock.lock().await;
        let Some(event) = self.status.take_retry(adapter_name) else {
            tracing::debug!(adapter = %adapter_name, "Nothing to retry");
            return Ok(None);
        };

        tracing::info!(adapter = %adapter_name, kind = %event.kind(), "Retrying event");
        let result = apply_event(slot.adapter.as_ref(), &event).await;
        self.status.record_event(adapter_name, &event, &result);

        Ok(Some(AdapterReport {
            adapter: adapter_name.to_string(),
            result,
        }))
    }

    /// Run the connectivity probe of a single adapter.
    pub async fn check(&self, name: &str) -> Result<AdapterStatus, AppError> {
        let slot = self.find_slot(name)?;
        // A probe never overlaps a call on the same adapter
        let _guard = slot.lock.lock().await;
        let status = slot.adapter.check_status().await;
        self.status.record_check(slot.adapter.name(), &status);
        Ok(status)
    }

    /// Push the active user's whole history to every enabled adapter.
    ///
    /// Refuses to read from a local store whose API version is unsupported.
    pub async fn full_sync(&self, store: &dyn LocalStore) -> Result<Vec<AdapterReport>, AppError> {
        store.ensure_supported_version().await?;

        let measurements: Arc<Vec<Measurement>> =
            Arc::new(store.get_measurements(self.active_user_id).await?);

        tracing::info!(
            user_id = self.active_user_id,
            count = measurements.len(),
            "Starting full sync"
        );

        let handles: Vec<_> = self
            .enabled_slots()
            .map(|slot| {
                let slot = slot.clone();
                let measurements = measurements.clone();
                let status = self.status.clone();
                let name = slot.adapter.name().to_string();
                let handle = tokio::spawn(async move {
                    let _guard = slot.lock.lock().await;
                    let result = slot.adapter.full_sync(&measurements).await;
                    status.record_full_sync(slot.adapter.name(), measurements.len(), &result);
                    result
                });
                (name, handle)
            })
            .collect();

        Ok(join_reports(handles).await)
    }

    /// Copy remote entries the local store lacks into it, for the active user.
    ///
    /// Adapters without a read side are skipped. Remote lists are fetched
    /// concurrently; inserts happen one adapter at a time so an entry present
    /// on several backends is imported once.
    pub async fn import(&self, store: &dyn LocalStore) -> Result<Vec<AdapterReport>, AppError> {
        store.ensure_supported_version().await?;
        let mut local = store.get_measurements(self.active_user_id).await?;

        let handles: Vec<_> = self
            .enabled_slots()
            .map(|slot| {
                let slot = slot.clone();
                let name = slot.adapter.name().to_string();
                let handle = tokio::spawn(async move {
                    let _guard = slot.lock.lock().await;
                    let remote = slot.adapter.list_remote().await;
                    (slot.adapter.match_window(), remote)
                });
                (name, handle)
            })
            .collect();

        let mut reports = Vec::new();
        for (adapter, handle) in handles {
            let (window, remote) = handle.await.map_err(|e| {
                AppError::Internal(anyhow::anyhow!("import task for {} failed: {}", adapter, e))
            })?;

            let result = match remote {
                Ok(None) => {
                    tracing::debug!(adapter = %adapter, "Adapter cannot be read back");
                    continue;
                }
                Ok(Some(remote)) => {
                    let mut imported = 0usize;
                    for measurement in remote {
                        if window
                            .find_match(measurement.date, &local, |m| Some(m.date))
                            .is_some()
                        {
                            continue;
                        }
                        store
                            .insert_measurement(&measurement, self.active_user_id)
                            .await?;
                        local.push(measurement);
                        imported += 1;
                    }
                    tracing::info!(adapter = %adapter, imported, "Imported remote entries");
                    Ok(SyncOutcome::Imported(imported))
                }
                Err(e) => Err(e),
            };

            self.status.record_import(&adapter, &result);
            reports.push(AdapterReport { adapter, result });
        }

        Ok(reports)
    }
}

async fn join_reports(
    handles: Vec<(String, tokio::task::JoinHandle<Result<SyncOutcome, SyncError>>)>,
) -> Vec<AdapterReport> {
    let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();

    join_all(handles)
        .await
        .into_iter()
        .zip(names)
        .map(|(joined, adapter)| {
            let result = joined.unwrap_or_else(|e| {
                tracing::error!(adapter = %adapter, error = %e, "Adapter task aborted");
                Err(SyncError::Api(format!("adapter task aborted: {}", e)))
            });
            AdapterReport { adapter, result }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchWindow;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adapter that only counts calls.
    struct CountingAdapter {
        name: &'static str,
        enabled: bool,
        calls: AtomicUsize,
    }

    impl CountingAdapter {
        fn new(name: &'static str, enabled: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                enabled,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SyncAdapter for CountingAdapter {
        fn name(&self) -> &str {
            self.name
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        fn match_window(&self) -> MatchWindow {
            MatchWindow::Millis(100)
        }
        async fn insert(&self, _: &Measurement) -> Result<SyncOutcome, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SyncOutcome::Applied)
        }
        async fn update(&self, _: &Measurement) -> Result<SyncOutcome, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SyncOutcome::Applied)
        }
        async fn delete(&self, _: DateTime<Utc>) -> Result<SyncOutcome, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SyncOutcome::NoMatch)
        }
        async fn clear(&self) -> Result<SyncOutcome, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SyncOutcome::Removed(0))
        }
        async fn check_status(&self) -> AdapterStatus {
            AdapterStatus::ok("fine")
        }
    }

    fn event(user_id: i32) -> SyncEvent {
        SyncEvent::Insert {
            user_id,
            measurement: Measurement::new(
                Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap(),
                82.3,
            ),
        }
    }

    #[tokio::test]
    async fn test_disabled_adapter_is_skipped() {
        let on = CountingAdapter::new("On", true);
        let off = CountingAdapter::new("Off", false);
        let dispatcher = Dispatcher::new(7, vec![on.clone(), off.clone()]);

        let report = dispatcher.dispatch(event(7)).await;

        assert!(report.accepted);
        assert_eq!(report.invoked(), 1);
        assert_eq!(on.calls.load(Ordering::SeqCst), 1);
        assert_eq!(off.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_other_user_is_dropped() {
        let on = CountingAdapter::new("On", true);
        let dispatcher = Dispatcher::new(7, vec![on.clone()]);

        let report = dispatcher.dispatch(event(3)).await;

        assert!(!report.accepted);
        assert_eq!(report.invoked(), 0);
        assert_eq!(on.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_adapter_is_not_found() {
        let dispatcher = Dispatcher::new(7, vec![CountingAdapter::new("On", true)]);
        assert!(matches!(
            dispatcher.check("nope").await,
            Err(AppError::NotFound(_))
        ));
        assert!(dispatcher.check("on").await.unwrap().ok);
    }
}
