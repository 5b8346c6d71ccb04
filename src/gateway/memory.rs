// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process local store backed by concurrent maps.

use crate::error::GatewayError;
use crate::gateway::{LocalStore, StoreMeta};
use crate::models::{Measurement, ScaleUser};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct MemoryLocalStore {
    version_code: AtomicI64,
    min_api_version: i64,
    users: DashMap<i32, ScaleUser>,
    measurements: DashMap<i32, Vec<Measurement>>,
}

impl MemoryLocalStore {
    pub fn new(version_code: i64, min_api_version: i64) -> Self {
        Self {
            version_code: AtomicI64::new(version_code),
            min_api_version,
            users: DashMap::new(),
            measurements: DashMap::new(),
        }
    }

    pub fn add_user(&self, id: i32, username: &str) {
        self.users.insert(
            id,
            ScaleUser {
                id,
                username: username.to_string(),
            },
        );
    }

    pub fn set_version_code(&self, version_code: i64) {
        self.version_code.store(version_code, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn meta(&self) -> Result<StoreMeta, GatewayError> {
        let version_code = self.version_code.load(Ordering::SeqCst);
        Ok(StoreMeta {
            api_version: version_code,
            version_code,
        })
    }

    fn min_api_version(&self) -> i64 {
        self.min_api_version
    }

    async fn get_users(&self) -> Result<Vec<ScaleUser>, GatewayError> {
        let mut users: Vec<ScaleUser> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn get_measurements(&self, user_id: i32) -> Result<Vec<Measurement>, GatewayError> {
        Ok(self
            .measurements
            .get(&user_id)
            .map(|m| m.value().clone())
            .unwrap_or_default())
    }

    async fn insert_measurement(
        &self,
        measurement: &Measurement,
        user_id: i32,
    ) -> Result<(), GatewayError> {
        let mut entry = self.measurements.entry(user_id).or_default();
        let pos = entry.partition_point(|m| m.date <= measurement.date);
        entry.insert(pos, Measurement::new(measurement.date, measurement.weight));
        Ok(())
    }
}
