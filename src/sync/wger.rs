// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wger workout manager backend.
//!
//! Wger stores one weight entry per calendar day, so local measurements are
//! matched to remote entries by UTC date. Entries carry a server-assigned id
//! which is looked up by date before every update or delete.

use crate::config::WgerConfig;
use crate::error::SyncError;
use crate::models::{ClearWindow, MatchWindow, Measurement};
use crate::sync::{AdapterStatus, SyncAdapter, SyncOutcome};
use crate::time_utils::{format_calendar_date, parse_calendar_date};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Upper bound on pages followed for a single listing.
const MAX_PAGES: usize = 100;

/// Upper bound on list-then-delete passes in `clear()`.
const MAX_CLEAR_PASSES: usize = 10;

/// Low-level Wger REST client.
#[derive(Clone)]
pub struct WgerClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl WgerClient {
    pub fn new(server: &str, api_token: String, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("HTTP client: {}", e)))?;

        let mut base_url = server.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            http,
            base_url,
            api_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.api_token)
    }

    /// List weight entries, optionally restricted to one day, following
    /// pagination links.
    pub async fn list_entries(&self, day: Option<NaiveDate>) -> Result<Vec<WgerWeightEntry>, SyncError> {
        let mut request = self
            .http
            .get(self.url("weightentry/"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header());
        if let Some(day) = day {
            request = request.query(&[("date", day.format("%Y-%m-%d").to_string())]);
        }

        let response = request.send().await.map_err(SyncError::from_reqwest)?;
        let mut page: WgerEntryPage = check_response_json(response).await?;
        let mut entries = std::mem::take(&mut page.results);

        let mut pages = 1;
        while let Some(next) = page.next.take() {
            if pages >= MAX_PAGES {
                tracing::warn!(pages, "Wger listing truncated");
                break;
            }
            let response = self
                .http
                .get(&next)
                .header(reqwest::header::AUTHORIZATION, self.auth_header())
                .send()
                .await
                .map_err(SyncError::from_reqwest)?;
            page = check_response_json(response).await?;
            entries.append(&mut page.results);
            pages += 1;
        }

        Ok(entries)
    }

    /// Fetch only the first page; used as a cheap reachability probe.
    pub async fn count_entries(&self) -> Result<u64, SyncError> {
        let response = self
            .http
            .get(self.url("weightentry/"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(SyncError::from_reqwest)?;
        let page: WgerEntryPage = check_response_json(response).await?;
        Ok(page.count)
    }

    pub async fn create_entry(&self, day: NaiveDate, weight: f64) -> Result<(), SyncError> {
        let response = self
            .http
            .post(self.url("weightentry/"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .form(&[
                ("date", day.format("%Y-%m-%d").to_string()),
                ("weight", format!("{:.2}", weight)),
            ])
            .send()
            .await
            .map_err(SyncError::from_reqwest)?;
        check_response(response).await
    }

    pub async fn update_entry(&self, id: u64, weight: f64) -> Result<(), SyncError> {
        let response = self
            .http
            .patch(self.url(&format!("weightentry/{}/", id)))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .form(&[("weight", format!("{:.2}", weight))])
            .send()
            .await
            .map_err(SyncError::from_reqwest)?;
        check_response(response).await
    }

    pub async fn delete_entry(&self, id: u64) -> Result<(), SyncError> {
        let response = self
            .http
            .delete(self.url(&format!("weightentry/{}/", id)))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(SyncError::from_reqwest)?;
        check_response(response).await
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<(), SyncError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(status_error(response).await)
}

/// Check response and parse JSON body.
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
        401 | 403 => SyncError::Auth(format!("Wger rejected API token (HTTP {})", status)),
        _ => SyncError::Api(format!("HTTP {}: {}", status, body)),
    }
}

/// One page of `GET weightentry/`.
#[derive(Debug, Clone, Deserialize)]
pub struct WgerEntryPage {
    pub count: u64,
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<WgerWeightEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WgerWeightEntry {
    pub id: u64,
    /// `YYYY-MM-DD`, newer servers append a time part
    pub date: String,
    /// Sent as a decimal string by the server
    #[serde(deserialize_with = "string_or_number")]
    pub weight: f64,
}

impl WgerWeightEntry {
    /// Start of the entry's UTC day.
    pub fn day_start(&self) -> Option<DateTime<Utc>> {
        parse_calendar_date(&self.date)
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Sync adapter for a Wger server.
pub struct WgerSync {
    config: WgerConfig,
    clear_window: ClearWindow,
    client: WgerClient,
}

impl WgerSync {
    pub fn new(
        config: WgerConfig,
        clear_window: ClearWindow,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = WgerClient::new(&config.server, config.api_token.clone(), timeout)?;
        Ok(Self {
            config,
            clear_window,
            client,
        })
    }

    fn ensure_configured(&self) -> Result<(), SyncError> {
        if self.config.api_token.is_empty() {
            return Err(SyncError::Config("Wger API token not set".to_string()));
        }
        Ok(())
    }

    /// Remote entry for the day of `date`, if any.
    async fn find_entry(&self, date: DateTime<Utc>) -> Result<Option<WgerWeightEntry>, SyncError> {
        let entries = self.client.list_entries(Some(date.date_naive())).await?;
        Ok(self
            .match_window()
            .find_match(date, &entries, WgerWeightEntry::day_start)
            .cloned())
    }
}

#[async_trait]
impl SyncAdapter for WgerSync {
    fn name(&self) -> &str {
        "Wger"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn match_window(&self) -> MatchWindow {
        MatchWindow::CalendarDay
    }

    async fn insert(&self, measurement: &Measurement) -> Result<SyncOutcome, SyncError> {
        self.ensure_configured()?;
        self.client
            .create_entry(measurement.date.date_naive(), measurement.weight)
            .await?;
        tracing::debug!(
            date = %format_calendar_date(measurement.date),
            weight = measurement.weight,
            "Wger entry created"
        );
        Ok(SyncOutcome::Applied)
    }

    async fn update(&self, measurement: &Measurement) -> Result<SyncOutcome, SyncError> {
        self.ensure_configured()?;
        let Some(entry) = self.find_entry(measurement.date).await? else {
            return Ok(SyncOutcome::NoMatch);
        };
        self.client.update_entry(entry.id, measurement.weight).await?;
        tracing::debug!(id = entry.id, weight = measurement.weight, "Wger entry updated");
        Ok(SyncOutcome::Applied)
    }

    async fn delete(&self, date: DateTime<Utc>) -> Result<SyncOutcome, SyncError> {
        self.ensure_configured()?;
        let Some(entry) = self.find_entry(date).await? else {
            return Ok(SyncOutcome::NoMatch);
        };
        self.client.delete_entry(entry.id).await?;
        tracing::debug!(id = entry.id, date = %entry.date, "Wger entry deleted");
        Ok(SyncOutcome::Applied)
    }

    async fn clear(&self) -> Result<SyncOutcome, SyncError> {
        self.ensure_configured()?;
        let now = Utc::now();
        let mut removed = 0usize;

        for _ in 0..MAX_CLEAR_PASSES {
            let targets: Vec<WgerWeightEntry> = self
                .client
                .list_entries(None)
                .await?
                .into_iter()
                .filter(|entry| {
                    entry
                        .day_start()
                        .is_some_and(|ts| self.clear_window.contains(now, ts))
                })
                .collect();

            if targets.is_empty() {
                return Ok(SyncOutcome::Removed(removed));
            }

            for entry in &targets {
                self.client.delete_entry(entry.id).await?;
                removed += 1;
            }
        }

        Err(SyncError::PartialFailure(format!(
            "{} entries removed but entries remain after {} passes",
            removed, MAX_CLEAR_PASSES
        )))
    }

    async fn list_remote(&self) -> Result<Option<Vec<Measurement>>, SyncError> {
        self.ensure_configured()?;
        let now = Utc::now();

        let mut measurements: Vec<Measurement> = self
            .client
            .list_entries(None)
            .await?
            .into_iter()
            .filter_map(|entry| {
                let day = entry.day_start()?;
                self.clear_window
                    .contains(now, day)
                    .then(|| Measurement::new(day, entry.weight))
            })
            .collect();
        measurements.sort_by_key(|m| m.date);
        Ok(Some(measurements))
    }

    async fn check_status(&self) -> AdapterStatus {
        if let Err(e) = self.ensure_configured() {
            return AdapterStatus::failed(&e);
        }
        match self.client.count_entries().await {
            Ok(count) => AdapterStatus::ok(format!("connected, {} weight entries", count)),
            Err(e) => AdapterStatus::failed(&e),
        }
    }
}
