// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Change notifications from the local store.
//!
//! The store posts one event per local change. The handler validates it and
//! answers `202 Accepted` right away; adapters run in the background. With
//! `?wait=true` the handler instead waits and returns every adapter's result.

use crate::error::{AppError, Result};
use crate::models::{EventKind, EventPayload, SyncEvent};
use crate::sync::{AdapterReport, DispatchReport, SyncOutcome};
use crate::AppState;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Event routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/events", post(handle_event))
}

#[derive(Debug, Deserialize, Default)]
pub struct EventQuery {
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub kind: EventKind,
    /// False when the event targets a user other than the active one
    pub accepted: bool,
}

/// One adapter's outcome in a JSON response.
#[derive(Debug, Serialize)]
pub struct AdapterResult {
    pub adapter: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&AdapterReport> for AdapterResult {
    fn from(report: &AdapterReport) -> Self {
        match &report.result {
            Ok(outcome) => Self {
                adapter: report.adapter.clone(),
                ok: true,
                outcome: Some(*outcome),
                error_kind: None,
                message: None,
            },
            Err(e) => Self {
                adapter: report.adapter.clone(),
                ok: false,
                outcome: None,
                error_kind: Some(e.kind()),
                message: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub kind: EventKind,
    pub user_id: i32,
    pub accepted: bool,
    pub results: Vec<AdapterResult>,
}

impl From<&DispatchReport> for DispatchResponse {
    fn from(report: &DispatchReport) -> Self {
        Self {
            kind: report.kind,
            user_id: report.user_id,
            accepted: report.accepted,
            results: report.results.iter().map(AdapterResult::from).collect(),
        }
    }
}

/// Receive one local change (POST /events).
async fn handle_event(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventQuery>,
    Json(payload): Json<EventPayload>,
) -> Result<Response> {
    let event = SyncEvent::try_from(payload).map_err(|e| {
        tracing::warn!(error = %e, "Rejected malformed event");
        AppError::BadRequest(e)
    })?;

    let kind = event.kind();
    tracing::info!(
        kind = %kind,
        user_id = event.user_id(),
        wait = query.wait,
        "Event received"
    );

    if query.wait {
        let report = state.dispatcher.dispatch(event).await;
        return Ok(Json(DispatchResponse::from(&report)).into_response());
    }

    let accepted = event.user_id() == state.dispatcher.active_user_id();
    state.dispatcher.dispatch_detached(event);

    Ok((StatusCode::ACCEPTED, Json(EventAccepted { kind, accepted })).into_response())
}
