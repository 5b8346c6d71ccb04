// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP client for a local store that exposes the openScale provider
//! tables as JSON.
//!
//! Resources:
//! - `GET meta` → `{"apiVersion": n, "versionCode": n}`
//! - `GET users` → `[{"_ID": id, "username": name}]`
//! - `GET measurements/{userId}` → `[{"datetime": millis, "weight": kg, ...}]`
//! - `POST measurements` ← `{"datetime": millis, "weight": kg, "userId": id}`

use crate::error::GatewayError;
use crate::gateway::{LocalStore, StoreMeta};
use crate::models::{Measurement, ScaleUser};
use crate::time_utils::from_epoch_millis;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct HttpLocalStore {
    http: reqwest::Client,
    base_url: String,
    min_api_version: i64,
}

impl HttpLocalStore {
    pub fn new(base_url: &str, min_api_version: i64, timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            min_api_version,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, GatewayError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(GatewayError::Unavailable(format!("GET {}: HTTP {}", path, status)));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(format!("{}: {}", path, e)))
    }
}

#[derive(Debug, Deserialize)]
struct UserRow {
    #[serde(rename = "_ID")]
    id: Option<i32>,
    username: Option<String>,
}

/// Measurement row; the store may add more columns than we read.
#[derive(Debug, Deserialize)]
struct MeasurementRow {
    datetime: Option<i64>,
    weight: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRow {
    datetime: i64,
    weight: f64,
    user_id: i32,
}

#[async_trait]
impl LocalStore for HttpLocalStore {
    async fn meta(&self) -> Result<StoreMeta, GatewayError> {
        self.get_json("meta").await
    }

    fn min_api_version(&self) -> i64 {
        self.min_api_version
    }

    async fn get_users(&self) -> Result<Vec<ScaleUser>, GatewayError> {
        let rows: Vec<UserRow> = self.get_json("users").await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match (row.id, row.username) {
                (Some(id), Some(username)) => Some(ScaleUser { id, username }),
                _ => None,
            })
            .collect())
    }

    async fn get_measurements(&self, user_id: i32) -> Result<Vec<Measurement>, GatewayError> {
        let rows: Vec<MeasurementRow> = self
            .get_json(&format!("measurements/{}", user_id))
            .await?;
        let total = rows.len();

        let mut measurements: Vec<Measurement> = rows
            .into_iter()
            .filter_map(|row| {
                let date = from_epoch_millis(row.datetime?)?;
                Some(Measurement::new(date, row.weight?))
            })
            .collect();
        measurements.sort_by_key(|m| m.date);

        if measurements.len() < total {
            tracing::debug!(
                user_id,
                skipped = total - measurements.len(),
                "Skipped incomplete measurement rows"
            );
        }
        tracing::debug!(user_id, count = measurements.len(), "Loaded measurements");
        Ok(measurements)
    }

    async fn insert_measurement(
        &self,
        measurement: &Measurement,
        user_id: i32,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/measurements", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&InsertRow {
                datetime: measurement.timestamp_ms(),
                weight: measurement.weight,
                user_id,
            })
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "POST measurements: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}
