// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! MQTT broker backend.
//!
//! Every operation opens its own session, publishes one message at QoS 2,
//! waits for the broker's PUBCOMP and disconnects. No session is shared
//! between operations, so a broker restart never leaves stale state behind.
//!
//! Topics are `<namespace>/measurements/<operation>`; consumers on the other
//! side of the broker do their own matching, so `update` and `delete` always
//! report `Applied`.

use crate::config::MqttConfig;
use crate::error::SyncError;
use crate::models::{EventKind, MatchWindow, Measurement};
use crate::sync::{AdapterStatus, SyncAdapter, SyncOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, Transport,
};
use std::time::Duration;

/// Keep-alive for the short-lived sessions.
const KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Publishes every change to an MQTT broker.
pub struct MqttSync {
    config: MqttConfig,
}

impl MqttSync {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    /// Topic an operation is published on.
    pub fn topic(&self, kind: EventKind) -> String {
        format!("{}/measurements/{}", self.config.topic_namespace, kind)
    }

    fn options(&self) -> Result<MqttOptions, SyncError> {
        if self.config.host.is_empty() {
            return Err(SyncError::Config("MQTT broker host not set".to_string()));
        }

        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        if !self.config.username.is_empty() {
            options.set_credentials(self.config.username.clone(), self.config.password.clone());
        }
        if self.config.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        Ok(options)
    }

    /// Connect, publish one message, wait for delivery, disconnect.
    async fn publish(&self, kind: EventKind, payload: Vec<u8>) -> Result<SyncOutcome, SyncError> {
        let options = self.options()?;
        let topic = self.topic(kind);
        let timeout = self.config.timeout;

        let cycle = async {
            let (client, mut eventloop) = AsyncClient::new(options, 10);
            client
                .publish(topic.clone(), QoS::ExactlyOnce, false, payload)
                .await
                .map_err(|e| SyncError::Transport(format!("MQTT client: {}", e)))?;

            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::PubComp(_))) => break,
                    Ok(_) => {}
                    Err(e) => return Err(connection_error(e)),
                }
            }

            disconnect(&client, &mut eventloop).await;
            Ok(SyncOutcome::Applied)
        };

        let outcome = tokio::time::timeout(timeout, cycle)
            .await
            .map_err(|_| timeout_error(timeout))??;

        tracing::debug!(topic = %topic, "MQTT message delivered");
        Ok(outcome)
    }
}

async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if client.disconnect().await.is_err() {
        return;
    }
    // Drive the loop until the DISCONNECT packet is flushed.
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

fn connection_error(err: ConnectionError) -> SyncError {
    match err {
        ConnectionError::ConnectionRefused(
            code @ (ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized),
        ) => SyncError::Auth(format!("MQTT broker refused credentials: {:?}", code)),
        other => SyncError::Transport(format!("MQTT connection: {}", other)),
    }
}

fn timeout_error(timeout: Duration) -> SyncError {
    SyncError::Transport(format!("MQTT broker did not respond within {:?}", timeout))
}

/// JSON body for insert/update.
pub fn measurement_payload(measurement: &Measurement) -> Result<Vec<u8>, SyncError> {
    serde_json::to_vec(measurement).map_err(|e| SyncError::Api(format!("encode: {}", e)))
}

/// JSON body for delete: `{"date": <epoch-millis>}`.
pub fn delete_payload(date: DateTime<Utc>) -> Vec<u8> {
    serde_json::json!({ "date": date.timestamp_millis() })
        .to_string()
        .into_bytes()
}

/// Body for clear.
pub fn clear_payload() -> Vec<u8> {
    b"true".to_vec()
}

#[async_trait]
impl SyncAdapter for MqttSync {
    fn name(&self) -> &str {
        "MQTT"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn match_window(&self) -> MatchWindow {
        MatchWindow::Millis(0)
    }

    async fn insert(&self, measurement: &Measurement) -> Result<SyncOutcome, SyncError> {
        self.publish(EventKind::Insert, measurement_payload(measurement)?)
            .await
    }

    async fn update(&self, measurement: &Measurement) -> Result<SyncOutcome, SyncError> {
        self.publish(EventKind::Update, measurement_payload(measurement)?)
            .await
    }

    async fn delete(&self, date: DateTime<Utc>) -> Result<SyncOutcome, SyncError> {
        self.publish(EventKind::Delete, delete_payload(date)).await
    }

    async fn clear(&self) -> Result<SyncOutcome, SyncError> {
        self.publish(EventKind::Clear, clear_payload()).await
    }

    async fn check_status(&self) -> AdapterStatus {
        let options = match self.options() {
            Ok(options) => options,
            Err(e) => return AdapterStatus::failed(&e),
        };
        let timeout = self.config.timeout;

        let probe = async {
            let (client, mut eventloop) = AsyncClient::new(options, 10);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                    Ok(_) => {}
                    Err(e) => return Err(connection_error(e)),
                }
            }
            disconnect(&client, &mut eventloop).await;
            Ok(())
        };

        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(())) => AdapterStatus::ok(format!(
                "connected to {}:{}",
                self.config.host, self.config.port
            )),
            Ok(Err(e)) => AdapterStatus::failed(&e),
            Err(_) => AdapterStatus::failed(&timeout_error(timeout)),
        }
    }
}
