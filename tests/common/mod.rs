// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use openscale_sync::config::Config;
use openscale_sync::error::SyncError;
use openscale_sync::gateway::{LocalStore, MemoryLocalStore};
use openscale_sync::models::{MatchWindow, Measurement};
use openscale_sync::routes::create_router;
use openscale_sync::sync::{AdapterStatus, Dispatcher, SyncAdapter, SyncOutcome};
use openscale_sync::AppState;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Token the fake REST servers accept.
#[allow(dead_code)]
pub const FAKE_TOKEN: &str = "fake-token";

/// Create a test app around the given adapters and an in-memory local store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(
    adapters: Vec<Arc<dyn SyncAdapter>>,
    store: Arc<MemoryLocalStore>,
) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let dispatcher = Arc::new(Dispatcher::new(config.active_user_id, adapters));
    let gateway: Arc<dyn LocalStore> = store;

    let state = Arc::new(AppState {
        config,
        dispatcher,
        gateway,
    });

    (create_router(state.clone()), state)
}

/// Wait until `cond` holds, polling every few milliseconds.
#[allow(dead_code)]
pub async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordingAdapter - in-process adapter that logs every call
// ─────────────────────────────────────────────────────────────────────────────

#[allow(dead_code)]
pub struct RecordingAdapter {
    name: &'static str,
    enabled: bool,
    calls: Mutex<Vec<String>>,
    fail: AtomicBool,
    /// When set, every call waits for a permit before doing anything
    gate: Option<Arc<Notify>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingAdapter {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self::build(name, true, None, Duration::ZERO))
    }

    pub fn disabled(name: &'static str) -> Arc<Self> {
        Arc::new(Self::build(name, false, None, Duration::ZERO))
    }

    pub fn gated(name: &'static str, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self::build(name, true, Some(gate), Duration::ZERO))
    }

    pub fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(name, true, None, delay))
    }

    fn build(name: &'static str, enabled: bool, gate: Option<Arc<Notify>>, delay: Duration) -> Self {
        Self {
            name,
            enabled,
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            gate,
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record(&self, call: String, outcome: SyncOutcome) -> Result<SyncOutcome, SyncError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().unwrap().push(call);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            Err(SyncError::Transport(format!("{} unreachable", self.name)))
        } else {
            Ok(outcome)
        }
    }
}

#[async_trait]
impl SyncAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn match_window(&self) -> MatchWindow {
        MatchWindow::Millis(100)
    }

    async fn insert(&self, m: &Measurement) -> Result<SyncOutcome, SyncError> {
        self.record(format!("insert:{}", m.timestamp_ms()), SyncOutcome::Applied)
            .await
    }

    async fn update(&self, m: &Measurement) -> Result<SyncOutcome, SyncError> {
        self.record(format!("update:{}", m.timestamp_ms()), SyncOutcome::Applied)
            .await
    }

    async fn delete(&self, date: DateTime<Utc>) -> Result<SyncOutcome, SyncError> {
        self.record(format!("delete:{}", date.timestamp_millis()), SyncOutcome::Applied)
            .await
    }

    async fn clear(&self) -> Result<SyncOutcome, SyncError> {
        self.record("clear".to_string(), SyncOutcome::Removed(0)).await
    }

    async fn check_status(&self) -> AdapterStatus {
        if self.fail.load(Ordering::SeqCst) {
            AdapterStatus::failed(&SyncError::Transport("down".into()))
        } else {
            AdapterStatus::ok("reachable")
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FakeWger - in-process Wger REST server
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
#[allow(dead_code)]
pub struct FakeEntry {
    pub date: String,
    pub weight: f64,
}

#[derive(Clone)]
#[allow(dead_code)]
pub struct FakeWger {
    /// API root including trailing slash
    pub base_url: String,
    entries: Arc<Mutex<BTreeMap<u64, FakeEntry>>>,
    calls: Arc<Mutex<Vec<String>>>,
    next_id: Arc<AtomicUsize>,
    page_size: usize,
}

#[allow(dead_code)]
impl FakeWger {
    /// Start a server on an ephemeral port.
    pub async fn start() -> Self {
        Self::start_with_page_size(2).await
    }

    pub async fn start_with_page_size(page_size: usize) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let fake = Self {
            base_url: format!("http://{}/api/v2/", addr),
            entries: Arc::new(Mutex::new(BTreeMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
            page_size,
        };

        let app = Router::new()
            .route(
                "/api/v2/weightentry/",
                get(wger_list).post(wger_create),
            )
            .route(
                "/api/v2/weightentry/{id}/",
                axum::routing::patch(wger_update).delete(wger_delete),
            )
            .with_state(fake.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        fake
    }

    /// Seed an entry without logging a call.
    pub fn seed(&self, date: &str, weight: f64) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u64;
        self.entries.lock().unwrap().insert(
            id,
            FakeEntry {
                date: date.to_string(),
                weight,
            },
        );
        id
    }

    pub fn entries(&self) -> Vec<FakeEntry> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    pub fn entries_on(&self, date: &str) -> Vec<FakeEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.date == date)
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with_method(&self, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(&format!("{} ", method)))
            .count()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn token_ok(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| h == format!("Token {}", FAKE_TOKEN))
}

#[derive(Deserialize)]
struct ListQuery {
    date: Option<String>,
    #[serde(default)]
    offset: usize,
}

async fn wger_list(
    State(fake): State<FakeWger>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    fake.log(format!(
        "GET weightentry/ date={} offset={}",
        query.date.as_deref().unwrap_or("-"),
        query.offset
    ));
    if !token_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let matching: Vec<(u64, FakeEntry)> = fake
        .entries
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, e)| query.date.as_ref().map_or(true, |d| &e.date == d))
        .map(|(id, e)| (*id, e.clone()))
        .collect();

    let page: Vec<_> = matching
        .iter()
        .skip(query.offset)
        .take(fake.page_size)
        .map(|(id, e)| {
            serde_json::json!({
                "id": id,
                "date": e.date,
                "weight": format!("{:.2}", e.weight),
            })
        })
        .collect();

    let next_offset = query.offset + fake.page_size;
    let next = (next_offset < matching.len()).then(|| match &query.date {
        Some(d) => format!("{}weightentry/?date={}&offset={}", fake.base_url, d, next_offset),
        None => format!("{}weightentry/?offset={}", fake.base_url, next_offset),
    });

    Json(serde_json::json!({
        "count": matching.len(),
        "next": next,
        "previous": null,
        "results": page,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct CreateForm {
    date: String,
    weight: String,
}

async fn wger_create(
    State(fake): State<FakeWger>,
    headers: HeaderMap,
    Form(form): Form<CreateForm>,
) -> Response {
    fake.log(format!("POST weightentry/ date={} weight={}", form.date, form.weight));
    if !token_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Ok(weight) = form.weight.parse::<f64>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if !fake.entries_on(&form.date).is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"non_field_errors": ["unique date"]})),
        )
            .into_response();
    }

    let id = fake.seed(&form.date, weight);
    (
        StatusCode::CREATED,
        Json(serde_json::json!({"id": id, "date": form.date, "weight": form.weight})),
    )
        .into_response()
}

#[derive(Deserialize)]
struct UpdateForm {
    weight: String,
}

async fn wger_update(
    State(fake): State<FakeWger>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Form(form): Form<UpdateForm>,
) -> Response {
    fake.log(format!("PATCH weightentry/{}/ weight={}", id, form.weight));
    if !token_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Ok(weight) = form.weight.parse::<f64>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match fake.entries.lock().unwrap().get_mut(&id) {
        Some(entry) => {
            entry.weight = weight;
            StatusCode::OK.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn wger_delete(
    State(fake): State<FakeWger>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    fake.log(format!("DELETE weightentry/{}/", id));
    if !token_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match fake.entries.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FakeGoogleFit - in-process Google Fit dataset server
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
#[allow(dead_code)]
pub struct FakeGoogleFit {
    /// Base URL equivalent to `.../fitness/v1/users/me`
    pub base_url: String,
    /// Points keyed by start time in nanoseconds
    points: Arc<Mutex<BTreeMap<i64, f64>>>,
    fail_patch: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl FakeGoogleFit {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let fake = Self {
            base_url: format!("http://{}/fitness/v1/users/me", addr),
            points: Arc::new(Mutex::new(BTreeMap::new())),
            fail_patch: Arc::new(AtomicBool::new(false)),
        };

        let app = Router::new()
            .route(
                "/fitness/v1/users/me/dataSources/{source}",
                get(fit_source),
            )
            .route(
                "/fitness/v1/users/me/dataSources/{source}/datasets/{range}",
                get(fit_get).patch(fit_patch).delete(fit_delete),
            )
            .with_state(fake.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        fake
    }

    pub fn seed(&self, date: DateTime<Utc>, weight: f64) {
        self.points
            .lock()
            .unwrap()
            .insert(date.timestamp_millis() * 1_000_000, weight);
    }

    /// All points as (epoch millis, weight).
    pub fn points(&self) -> Vec<(i64, f64)> {
        self.points
            .lock()
            .unwrap()
            .iter()
            .map(|(ns, w)| (ns / 1_000_000, *w))
            .collect()
    }

    pub fn set_fail_patch(&self, fail: bool) {
        self.fail_patch.store(fail, Ordering::SeqCst);
    }
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| h == format!("Bearer {}", FAKE_TOKEN))
}

fn parse_range(range: &str) -> Option<(i64, i64)> {
    let (start, end) = range.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn fit_source(headers: HeaderMap, Path(source): Path<String>) -> Response {
    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(serde_json::json!({"dataStreamId": source, "dataStreamName": "openScaleSync"}))
        .into_response()
}

async fn fit_get(
    State(fake): State<FakeGoogleFit>,
    headers: HeaderMap,
    Path((_source, range)): Path<(String, String)>,
) -> Response {
    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some((start, end)) = parse_range(&range) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let points: Vec<_> = fake
        .points
        .lock()
        .unwrap()
        .range(start..=end)
        .map(|(ns, w)| {
            serde_json::json!({
                "dataTypeName": "com.google.weight",
                "startTimeNanos": ns.to_string(),
                "endTimeNanos": ns.to_string(),
                "value": [{"fpVal": w}],
            })
        })
        .collect();

    Json(serde_json::json!({
        "minStartTimeNs": start.to_string(),
        "maxEndTimeNs": end.to_string(),
        "point": points,
    }))
    .into_response()
}

async fn fit_patch(
    State(fake): State<FakeGoogleFit>,
    headers: HeaderMap,
    Path((_source, _range)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if fake.fail_patch.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let points = body["point"].as_array().cloned().unwrap_or_default();
    let mut stored = fake.points.lock().unwrap();
    for point in points {
        let ns = point["startTimeNanos"].as_str().and_then(|s| s.parse::<i64>().ok());
        let weight = point["value"][0]["fpVal"].as_f64();
        if let (Some(ns), Some(weight)) = (ns, weight) {
            stored.insert(ns, weight);
        }
    }
    Json(body).into_response()
}

async fn fit_delete(
    State(fake): State<FakeGoogleFit>,
    headers: HeaderMap,
    Path((_source, range)): Path<(String, String)>,
) -> Response {
    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some((start, end)) = parse_range(&range) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    fake.points
        .lock()
        .unwrap()
        .retain(|ns, _| *ns < start || *ns > end);
    StatusCode::OK.into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// FakeBroker - minimal MQTT 3.1.1 broker speaking just enough of the protocol
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
#[allow(dead_code)]
pub struct Published {
    pub topic: String,
    pub qos: u8,
    pub payload: Vec<u8>,
}

#[allow(dead_code)]
impl Published {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

#[derive(Clone)]
#[allow(dead_code)]
pub struct FakeBroker {
    pub port: u16,
    /// CONNACK return code sent to every client
    connack_code: u8,
    published: Arc<Mutex<Vec<Published>>>,
    client_ids: Arc<Mutex<Vec<String>>>,
    sessions_closed: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FakeBroker {
    pub async fn start() -> Self {
        Self::start_with_connack(0).await
    }

    /// Broker that refuses every CONNECT with `code`.
    pub async fn refusing(code: u8) -> Self {
        Self::start_with_connack(code).await
    }

    async fn start_with_connack(connack_code: u8) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let broker = Self {
            port: listener.local_addr().unwrap().port(),
            connack_code,
            published: Arc::new(Mutex::new(Vec::new())),
            client_ids: Arc::new(Mutex::new(Vec::new())),
            sessions_closed: Arc::new(AtomicUsize::new(0)),
        };

        let accepting = broker.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let session = accepting.clone();
                tokio::spawn(async move { session.serve(socket).await });
            }
        });

        broker
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    /// Client id of every CONNECT, in arrival order.
    pub fn client_ids(&self) -> Vec<String> {
        self.client_ids.lock().unwrap().clone()
    }

    pub fn sessions_closed(&self) -> usize {
        self.sessions_closed.load(Ordering::SeqCst)
    }

    async fn serve(&self, mut socket: tokio::net::TcpStream) {
        use tokio::io::AsyncWriteExt;

        while let Some((header, body)) = read_packet(&mut socket).await {
            let reply = match header >> 4 {
                // CONNECT
                1 => {
                    let id_len = usize::from(u16::from_be_bytes([body[10], body[11]]));
                    let id = String::from_utf8_lossy(&body[12..12 + id_len]).into_owned();
                    self.client_ids.lock().unwrap().push(id);
                    Some(vec![0x20, 0x02, 0x00, self.connack_code])
                }
                // PUBLISH
                3 => {
                    let qos = (header >> 1) & 0x03;
                    let topic_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
                    let topic = String::from_utf8_lossy(&body[2..2 + topic_len]).into_owned();
                    let mut offset = 2 + topic_len;
                    let pkid = (qos > 0).then(|| [body[offset], body[offset + 1]]);
                    if pkid.is_some() {
                        offset += 2;
                    }
                    self.published.lock().unwrap().push(Published {
                        topic,
                        qos,
                        payload: body[offset..].to_vec(),
                    });
                    match (qos, pkid) {
                        (1, Some([hi, lo])) => Some(vec![0x40, 0x02, hi, lo]),
                        (2, Some([hi, lo])) => Some(vec![0x50, 0x02, hi, lo]),
                        _ => None,
                    }
                }
                // PUBREL
                6 => Some(vec![0x70, 0x02, body[0], body[1]]),
                // PINGREQ
                12 => Some(vec![0xD0, 0x00]),
                // DISCONNECT
                14 => break,
                _ => None,
            };

            if let Some(reply) = reply {
                if socket.write_all(&reply).await.is_err() {
                    break;
                }
            }
            if header >> 4 == 1 && self.connack_code != 0 {
                break;
            }
        }

        self.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Read one control packet: fixed header byte plus body.
async fn read_packet(socket: &mut tokio::net::TcpStream) -> Option<(u8, Vec<u8>)> {
    use tokio::io::AsyncReadExt;

    let header = socket.read_u8().await.ok()?;
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = socket.read_u8().await.ok()?;
        len |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 21 {
            return None;
        }
    }

    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).await.ok()?;
    Some((header, body))
}
