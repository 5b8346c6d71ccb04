// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! openScale sync: mirrors body-weight measurements from a local health-data
//! store to external services (Wger, an MQTT broker, Google Fit).
//!
//! The local store notifies this service of every insert, update, delete
//! and clear; the dispatcher forwards each change to all enabled adapters.

pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod sync;
pub mod time_utils;

use config::Config;
use gateway::LocalStore;
use std::sync::Arc;
use sync::Dispatcher;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub dispatcher: Arc<Dispatcher>,
    pub gateway: Arc<dyn LocalStore>,
}
