// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operator routes: adapter status, per-adapter check and retry, full sync,
//! import from remote backends and local user listing.

use crate::error::Result;
use crate::models::ScaleUser;
use crate::routes::events::AdapterResult;
use crate::sync::AdapterStatus;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(get_status))
        .route("/adapters/{name}/check", post(check_adapter))
        .route("/adapters/{name}/retry", post(retry_adapter))
        .route("/sync/full", post(full_sync))
        .route("/sync/import", post(import_remote))
        .route("/users", get(list_users))
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "bindings/"))]
pub struct AdapterStatusEntry {
    pub name: String,
    pub enabled: bool,
    /// None until the adapter has done anything
    pub ok: Option<bool>,
    pub message: Option<String>,
    pub updated_at: Option<String>,
    pub last_sync: Option<String>,
    pub retry_pending: bool,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "bindings/"))]
pub struct StatusResponse {
    pub active_user_id: i32,
    pub adapters: Vec<AdapterStatusEntry>,
}

/// Last known state of every adapter (GET /status).
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let board = state.dispatcher.status();
    let adapters = state
        .dispatcher
        .adapters()
        .map(|adapter| {
            let name = adapter.name().to_string();
            let entry = board.get(&name);
            AdapterStatusEntry {
                enabled: adapter.is_enabled(),
                ok: entry.as_ref().map(|e| e.ok),
                message: entry.as_ref().map(|e| e.message.clone()),
                updated_at: entry.as_ref().map(|e| format_utc_rfc3339(e.updated_at)),
                last_sync: entry
                    .as_ref()
                    .and_then(|e| e.last_sync)
                    .map(format_utc_rfc3339),
                retry_pending: entry.is_some_and(|e| e.pending_retry.is_some()),
                name,
            }
        })
        .collect();

    Json(StatusResponse {
        active_user_id: state.dispatcher.active_user_id(),
        adapters,
    })
}

/// Run one adapter's connectivity probe (POST /adapters/{name}/check).
async fn check_adapter(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<AdapterStatus>> {
    let status = state.dispatcher.check(&name).await?;
    Ok(Json(status))
}

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub retried: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AdapterResult>,
}

/// Replay the last failed event on one adapter (POST /adapters/{name}/retry).
async fn retry_adapter(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RetryResponse>> {
    let report = state.dispatcher.retry(&name).await?;
    Ok(Json(RetryResponse {
        retried: report.is_some(),
        result: report.as_ref().map(AdapterResult::from),
    }))
}

#[derive(Debug, Serialize)]
pub struct BulkSyncResponse {
    pub user_id: i32,
    pub results: Vec<AdapterResult>,
}

/// Push the active user's whole history to every enabled adapter
/// (POST /sync/full).
async fn full_sync(State(state): State<Arc<AppState>>) -> Result<Json<BulkSyncResponse>> {
    let reports = state.dispatcher.full_sync(state.gateway.as_ref()).await?;
    Ok(Json(BulkSyncResponse {
        user_id: state.dispatcher.active_user_id(),
        results: reports.iter().map(AdapterResult::from).collect(),
    }))
}

/// Copy remote entries missing locally into the local store
/// (POST /sync/import).
async fn import_remote(State(state): State<Arc<AppState>>) -> Result<Json<BulkSyncResponse>> {
    let reports = state.dispatcher.import(state.gateway.as_ref()).await?;
    Ok(Json(BulkSyncResponse {
        user_id: state.dispatcher.active_user_id(),
        results: reports.iter().map(AdapterResult::from).collect(),
    }))
}

/// Users known to the local store (GET /users).
async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ScaleUser>>> {
    state.gateway.ensure_supported_version().await?;
    let users = state.gateway.get_users().await?;
    Ok(Json(users))
}
