// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Every adapter receives its own section of this struct at construction;
//! nothing reads the environment after startup.

use crate::models::ClearWindow;
use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

/// Default Wger API root.
pub const DEFAULT_WGER_SERVER: &str = "https://wger.de/api/v2/";

/// Default Google Fit REST root.
pub const DEFAULT_GOOGLE_FIT_URL: &str = "https://www.googleapis.com/fitness/v1/users/me";

/// Oldest local store API version whose schema we understand.
pub const DEFAULT_MIN_STORE_VERSION: i64 = 43;

/// Default MQTT topic namespace (`<namespace>/measurements/<operation>`).
pub const DEFAULT_MQTT_NAMESPACE: &str = "openScaleSync";

/// Widest accepted Google Fit match tolerance: one day.
pub const MAX_MATCH_WINDOW_MS: i64 = 86_400_000;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Shared secret the local store sends with change notifications
    pub event_token: String,
    /// The single local user whose measurements are mirrored
    pub active_user_id: i32,
    /// Default timeout for outgoing HTTP requests
    pub http_timeout: Duration,
    /// Window `clear()` operates on
    pub clear_window: ClearWindow,
    pub local_store: LocalStoreConfig,
    pub wger: WgerConfig,
    pub mqtt: MqttConfig,
    pub google_fit: GoogleFitConfig,
}

/// `LOCAL_STORE_URL` value selecting the in-process store.
pub const MEMORY_LOCAL_STORE: &str = "memory";

/// Local health-data store connection.
#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    /// Base URL, or `memory` for an in-process store
    pub url: String,
    pub min_api_version: i64,
}

/// Wger REST backend.
#[derive(Debug, Clone)]
pub struct WgerConfig {
    pub enabled: bool,
    pub server: String,
    pub api_token: String,
}

/// MQTT broker backend.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub topic_namespace: String,
    pub client_id: String,
    /// Upper bound for one connect/publish/disconnect cycle
    pub timeout: Duration,
}

/// Google Fit REST backend.
#[derive(Debug, Clone)]
pub struct GoogleFitConfig {
    pub enabled: bool,
    pub base_url: String,
    pub access_token: String,
    pub data_source_id: String,
    /// Tolerance (ms) when matching a remote point to a local timestamp
    pub match_window_ms: i64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let event_token = get("EVENT_TOKEN")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("EVENT_TOKEN"))?;
        let active_user_id = parse_required(&get, "ACTIVE_USER_ID")?;

        let defaults = ClearWindow::default();

        Ok(Self {
            port: parse_or(&get, "PORT", 8080)?,
            event_token,
            active_user_id,
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 30)?),
            clear_window: ClearWindow {
                years_back: parse_or(&get, "CLEAR_WINDOW_YEARS_BACK", defaults.years_back)?,
                days_forward: parse_or(&get, "CLEAR_WINDOW_DAYS_FORWARD", defaults.days_forward)?,
            },
            local_store: LocalStoreConfig {
                url: get("LOCAL_STORE_URL").unwrap_or_else(|| "http://127.0.0.1:8085".to_string()),
                min_api_version: parse_or(
                    &get,
                    "LOCAL_STORE_MIN_API_VERSION",
                    DEFAULT_MIN_STORE_VERSION,
                )?,
            },
            wger: WgerConfig {
                enabled: parse_bool(&get, "WGER_ENABLED")?,
                server: get("WGER_SERVER").unwrap_or_else(|| DEFAULT_WGER_SERVER.to_string()),
                api_token: get("WGER_API_TOKEN").unwrap_or_default(),
            },
            mqtt: MqttConfig {
                enabled: parse_bool(&get, "MQTT_ENABLED")?,
                host: get("MQTT_HOST").unwrap_or_default(),
                port: parse_or(&get, "MQTT_PORT", 1883)?,
                username: get("MQTT_USERNAME").unwrap_or_default(),
                password: get("MQTT_PASSWORD").unwrap_or_default(),
                use_tls: parse_bool(&get, "MQTT_USE_TLS")?,
                topic_namespace: get("MQTT_TOPIC_NAMESPACE")
                    .unwrap_or_else(|| DEFAULT_MQTT_NAMESPACE.to_string()),
                client_id: get("MQTT_CLIENT_ID").unwrap_or_else(|| "openScaleSync".to_string()),
                timeout: Duration::from_secs(parse_or(&get, "MQTT_TIMEOUT_SECS", 10)?),
            },
            google_fit: GoogleFitConfig {
                enabled: parse_bool(&get, "GOOGLE_FIT_ENABLED")?,
                base_url: get("GOOGLE_FIT_URL")
                    .unwrap_or_else(|| DEFAULT_GOOGLE_FIT_URL.to_string()),
                access_token: get("GOOGLE_FIT_ACCESS_TOKEN").unwrap_or_default(),
                data_source_id: get("GOOGLE_FIT_DATA_SOURCE_ID").unwrap_or_default(),
                match_window_ms: parse_in_range(
                    &get,
                    "GOOGLE_FIT_MATCH_WINDOW_MS",
                    100,
                    0..=MAX_MATCH_WINDOW_MS,
                )?,
            },
        })
    }

    /// Config for tests: every backend disabled, active user 7.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            event_token: "test_event_token".to_string(),
            active_user_id: 7,
            http_timeout: Duration::from_secs(5),
            clear_window: ClearWindow::default(),
            local_store: LocalStoreConfig {
                url: "http://127.0.0.1:8085".to_string(),
                min_api_version: DEFAULT_MIN_STORE_VERSION,
            },
            wger: WgerConfig {
                enabled: false,
                server: DEFAULT_WGER_SERVER.to_string(),
                api_token: String::new(),
            },
            mqtt: MqttConfig {
                enabled: false,
                host: "127.0.0.1".to_string(),
                port: 1883,
                username: String::new(),
                password: String::new(),
                use_tls: false,
                topic_namespace: DEFAULT_MQTT_NAMESPACE.to_string(),
                client_id: "openScaleSync-test".to_string(),
                timeout: Duration::from_secs(2),
            },
            google_fit: GoogleFitConfig {
                enabled: false,
                base_url: DEFAULT_GOOGLE_FIT_URL.to_string(),
                access_token: String::new(),
                data_source_id: String::new(),
                match_window_ms: 100,
            },
        }
    }
}

fn parse_required<T, G>(get: &G, key: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).ok_or(ConfigError::Missing(key))?;
    raw.parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        _ => Ok(default),
    }
}

fn parse_in_range<T, G>(
    get: &G,
    key: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + ToString,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn parse_bool<G>(get: &G, key: &'static str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("false") | Some("0") | Some("no") => Ok(false),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            key,
            value: other.to_string(),
        }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
