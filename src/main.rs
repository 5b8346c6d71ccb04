// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! openScale sync server
//!
//! Receives change notifications from the local health-data store and
//! mirrors every measurement change to the configured remote backends.

use openscale_sync::{
    config::Config,
    gateway::{self, LocalStore},
    sync::{build_adapters, Dispatcher},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        active_user_id = config.active_user_id,
        "Starting openScale sync"
    );

    let adapters = build_adapters(&config)?;
    for adapter in &adapters {
        tracing::info!(
            adapter = %adapter.name(),
            enabled = adapter.is_enabled(),
            "Adapter configured"
        );
    }
    let dispatcher = Arc::new(Dispatcher::new(config.active_user_id, adapters));

    let gateway = gateway::connect(&config.local_store, config.http_timeout)?;

    // The store may start after us; only warn here, routes re-check.
    match gateway.ensure_supported_version().await {
        Ok(meta) => tracing::info!(
            api_version = meta.api_version,
            version_code = meta.version_code,
            "Local store reachable"
        ),
        Err(e) => tracing::warn!(error = %e, url = %config.local_store.url, "Local store not ready"),
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        dispatcher,
        gateway,
    });

    // Build router
    let app = openscale_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("openscale_sync=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
