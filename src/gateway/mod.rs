// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local Source Gateway: read and write access to the local health-data
//! store that owns the measurements.
//!
//! The store exposes a versioned interface; callers must confirm its
//! reported version before trusting the shape of anything it returns.

pub mod http;
pub mod memory;

pub use http::HttpLocalStore;
pub use memory::MemoryLocalStore;

use crate::config::{LocalStoreConfig, MEMORY_LOCAL_STORE};
use crate::error::GatewayError;
use crate::models::{Measurement, ScaleUser};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Version information reported by the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMeta {
    pub api_version: i64,
    pub version_code: i64,
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn meta(&self) -> Result<StoreMeta, GatewayError>;

    /// Oldest version this gateway accepts.
    fn min_api_version(&self) -> i64;

    /// Whether the store reports a supported version.
    async fn check_version(&self) -> Result<bool, GatewayError> {
        let meta = self.meta().await?;
        Ok(meta.version_code >= self.min_api_version())
    }

    /// Like [`check_version`](Self::check_version) but fails with
    /// [`GatewayError::UnsupportedVersion`].
    async fn ensure_supported_version(&self) -> Result<StoreMeta, GatewayError> {
        let meta = self.meta().await?;
        let minimum = self.min_api_version();
        if meta.version_code < minimum {
            tracing::warn!(
                version_code = meta.version_code,
                api_version = meta.api_version,
                minimum,
                "Local store version unsupported"
            );
            return Err(GatewayError::UnsupportedVersion {
                found: meta.version_code,
                minimum,
            });
        }
        Ok(meta)
    }

    async fn get_users(&self) -> Result<Vec<ScaleUser>, GatewayError>;

    /// All measurements of `user_id`, oldest first.
    async fn get_measurements(&self, user_id: i32) -> Result<Vec<Measurement>, GatewayError>;

    async fn insert_measurement(
        &self,
        measurement: &Measurement,
        user_id: i32,
    ) -> Result<(), GatewayError>;
}

/// Open the configured local store.
///
/// `memory` selects an empty in-process store, useful for running without
/// the local app and filling it through import.
pub fn connect(
    config: &LocalStoreConfig,
    timeout: Duration,
) -> Result<Arc<dyn LocalStore>, GatewayError> {
    if config.url.eq_ignore_ascii_case(MEMORY_LOCAL_STORE) {
        tracing::info!("Using in-process local store");
        return Ok(Arc::new(MemoryLocalStore::new(
            config.min_api_version,
            config.min_api_version,
        )));
    }
    Ok(Arc::new(HttpLocalStore::new(
        &config.url,
        config.min_api_version,
        timeout,
    )?))
}
