// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Fit backend.
//!
//! Weights are written as `com.google.weight` points on a single data
//! source. Points are addressed by time range only, so every mutation first
//! reads the dataset around the local timestamp.

use crate::config::GoogleFitConfig;
use crate::error::SyncError;
use crate::models::{ClearWindow, MatchWindow, Measurement};
use crate::sync::{AdapterStatus, SyncAdapter, SyncOutcome};
use crate::time_utils::to_epoch_nanos;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const WEIGHT_DATA_TYPE: &str = "com.google.weight";

/// Low-level Google Fit REST client for one data source.
#[derive(Clone)]
pub struct GoogleFitClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    data_source_id: String,
}

impl GoogleFitClient {
    pub fn new(
        base_url: &str,
        access_token: String,
        data_source_id: String,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            data_source_id,
        })
    }

    fn data_source_url(&self) -> String {
        format!(
            "{}/dataSources/{}",
            self.base_url,
            urlencoding::encode(&self.data_source_id)
        )
    }

    /// Dataset URL for the half-open range `[start, end)`.
    fn dataset_url(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "{}/datasets/{}",
            self.data_source_url(),
            dataset_id(start, end)
        )
    }

    pub async fn get_data_source(&self) -> Result<DataSource, SyncError> {
        let response = self
            .http
            .get(self.data_source_url())
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(SyncError::from_reqwest)?;
        check_response_json(response).await
    }

    pub async fn get_points(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, SyncError> {
        let response = self
            .http
            .get(self.dataset_url(start, end))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(SyncError::from_reqwest)?;
        let dataset: Dataset = check_response_json(response).await?;
        Ok(dataset.point)
    }

    pub async fn insert_point(&self, measurement: &Measurement) -> Result<(), SyncError> {
        let ns = to_epoch_nanos(measurement.date);
        let dataset = Dataset {
            data_source_id: Some(self.data_source_id.clone()),
            min_start_time_ns: Some(ns.to_string()),
            max_end_time_ns: Some(ns.to_string()),
            point: vec![DataPoint {
                data_type_name: Some(WEIGHT_DATA_TYPE.to_string()),
                start_time_nanos: ns.to_string(),
                end_time_nanos: ns.to_string(),
                value: vec![PointValue {
                    fp_val: Some(measurement.weight),
                }],
            }],
        };

        let response = self
            .http
            .patch(format!(
                "{}/datasets/{}-{}",
                self.data_source_url(),
                ns,
                ns
            ))
            .bearer_auth(&self.access_token)
            .json(&dataset)
            .send()
            .await
            .map_err(SyncError::from_reqwest)?;
        check_response(response).await
    }

    pub async fn delete_points(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let response = self
            .http
            .delete(self.dataset_url(start, end))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(SyncError::from_reqwest)?;
        check_response(response).await
    }
}

/// Dataset id `<startNanos>-<endNanos>`; the API treats both ends as inclusive.
pub fn dataset_id(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("{}-{}", to_epoch_nanos(start), to_epoch_nanos(end) - 1)
}

async fn check_response(response: reqwest::Response) -> Result<(), SyncError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(status_error(response).await)
}

async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, SyncError> {
    if !response.status().is_success() {
        return Err(status_error(response).await);
    }
    response.json().await.map_err(SyncError::from_reqwest)
}

async fn status_error(response: reqwest::Response) -> SyncError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        401 | 403 => SyncError::Auth(format!("Google Fit rejected access token (HTTP {})", status)),
        _ => SyncError::Api(format!("HTTP {}: {}", status, body)),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub data_stream_id: String,
    #[serde(default)]
    pub data_stream_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_start_time_ns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_end_time_ns: Option<String>,
    #[serde(default)]
    pub point: Vec<DataPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type_name: Option<String>,
    /// Int64 values travel as JSON strings
    pub start_time_nanos: String,
    pub end_time_nanos: String,
    #[serde(default)]
    pub value: Vec<PointValue>,
}

impl DataPoint {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start_time_nanos
            .parse::<i64>()
            .ok()
            .map(DateTime::from_timestamp_nanos)
    }

    pub fn weight(&self) -> Option<f64> {
        self.value.first().and_then(|v| v.fp_val)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fp_val: Option<f64>,
}

/// Sync adapter for Google Fit.
pub struct GoogleFitSync {
    config: GoogleFitConfig,
    clear_window: ClearWindow,
    client: GoogleFitClient,
}

impl GoogleFitSync {
    pub fn new(
        config: GoogleFitConfig,
        clear_window: ClearWindow,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = GoogleFitClient::new(
            &config.base_url,
            config.access_token.clone(),
            config.data_source_id.clone(),
            timeout,
        )?;
        Ok(Self {
            config,
            clear_window,
            client,
        })
    }

    fn ensure_configured(&self) -> Result<(), SyncError> {
        if self.config.access_token.is_empty() {
            return Err(SyncError::Config("Google Fit access token not set".to_string()));
        }
        if self.config.data_source_id.is_empty() {
            return Err(SyncError::Config("Google Fit data source not set".to_string()));
        }
        Ok(())
    }

    /// Whether any point matches `date`.
    async fn has_match(&self, date: DateTime<Utc>) -> Result<bool, SyncError> {
        let window = self.match_window();
        let (start, end) = window.bounds(date);
        let points = self.client.get_points(start, end).await?;
        Ok(window.find_match(date, &points, DataPoint::start).is_some())
    }
}

#[async_trait]
impl SyncAdapter for GoogleFitSync {
    fn name(&self) -> &str {
        "GoogleFit"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn match_window(&self) -> MatchWindow {
        MatchWindow::Millis(self.config.match_window_ms)
    }

    async fn insert(&self, measurement: &Measurement) -> Result<SyncOutcome, SyncError> {
        self.ensure_configured()?;
        self.client.insert_point(measurement).await?;
        Ok(SyncOutcome::Applied)
    }

    /// No in-place update exists: delete the matching point, then insert.
    async fn update(&self, measurement: &Measurement) -> Result<SyncOutcome, SyncError> {
        self.ensure_configured()?;
        if !self.has_match(measurement.date).await? {
            return Ok(SyncOutcome::NoMatch);
        }

        let (start, end) = self.match_window().bounds(measurement.date);
        self.client.delete_points(start, end).await?;

        if let Err(e) = self.client.insert_point(measurement).await {
            tracing::error!(
                timestamp_ms = measurement.timestamp_ms(),
                error = %e,
                "Google Fit update lost the old point: delete succeeded, insert failed"
            );
            return Err(SyncError::PartialFailure(format!(
                "old point deleted but insert failed: {}",
                e
            )));
        }
        Ok(SyncOutcome::Applied)
    }

    async fn delete(&self, date: DateTime<Utc>) -> Result<SyncOutcome, SyncError> {
        self.ensure_configured()?;
        if !self.has_match(date).await? {
            return Ok(SyncOutcome::NoMatch);
        }

        let (start, end) = self.match_window().bounds(date);
        self.client.delete_points(start, end).await?;
        Ok(SyncOutcome::Applied)
    }

    async fn clear(&self) -> Result<SyncOutcome, SyncError> {
        self.ensure_configured()?;
        let (start, end) = self.clear_window.bounds(Utc::now());

        let count = self.client.get_points(start, end).await?.len();
        self.client.delete_points(start, end).await?;
        Ok(SyncOutcome::Removed(count))
    }

    async fn list_remote(&self) -> Result<Option<Vec<Measurement>>, SyncError> {
        self.ensure_configured()?;
        let (start, end) = self.clear_window.bounds(Utc::now());

        let mut measurements: Vec<Measurement> = self
            .client
            .get_points(start, end)
            .await?
            .iter()
            .filter_map(|point| Some(Measurement::new(point.start()?, point.weight()?)))
            .collect();
        measurements.sort_by_key(|m| m.date);
        Ok(Some(measurements))
    }

    async fn check_status(&self) -> AdapterStatus {
        if let Err(e) = self.ensure_configured() {
            return AdapterStatus::failed(&e);
        }
        match self.client.get_data_source().await {
            Ok(source) => AdapterStatus::ok(format!(
                "connected to data source {}",
                source.data_stream_name.unwrap_or(source.data_stream_id)
            )),
            Err(e) => AdapterStatus::failed(&e),
        }
    }
}
