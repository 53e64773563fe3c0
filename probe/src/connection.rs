//! Connection Supervisor (spec §4.J): owns the single outbound channel to
//! the control plane, the only shared mutable resource on the hot path
//! (spec §5 "shared-resource policy"). Reconnects with error-class-specific
//! backoff and serializes every outbound frame through one
//! `UnboundedSender`.
//!
//! The teacher only has the server side of a websocket transport
//! (`axum::extract::ws`); here `tokio-tungstenite` is used symmetrically as
//! the client. The control plane's actual transport is a socket.io-style
//! event/ack channel; since no socket.io-compatible crate is attested in
//! the pack, acks are modeled explicitly with a small `ackId` envelope
//! convention (see [`Envelope`]) rather than invented machinery hidden
//! inside a fake socket.io shim.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;

const ACK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(rename = "ackId", skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
}

/// Owns the outbound side of the channel; cloned freely by every component
/// that needs to emit (status manager, logs transport, alt-ip client,
/// dispatcher, stats).
pub struct ConnectionHandle {
    outbound: mpsc::UnboundedSender<Message>,
    next_ack_id: AtomicU64,
    pending_acks: Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
}

impl ConnectionHandle {
    fn new(outbound: mpsc::UnboundedSender<Message>) -> Arc<Self> {
        Arc::new(Self {
            outbound,
            next_ack_id: AtomicU64::new(1),
            pending_acks: Mutex::new(HashMap::new()),
        })
    }

    /// Fire-and-forget emission (spec's `probe:status:update`,
    /// `probe:measurement:progress`/`result`, `probe:stats:report`).
    pub fn emit(&self, event: &str, data: serde_json::Value) {
        let envelope = Envelope {
            event: event.to_string(),
            data,
            ack_id: None,
        };
        if let Ok(text) = serde_json::to_string(&envelope) {
            let _ = self.outbound.send(Message::Text(text));
        }
    }

    /// Emits an event and awaits the matching ack, timing out after
    /// [`ACK_TIMEOUT`] (spec's `probe:logs`/`probe:alt-ips` ack flows).
    pub async fn emit_with_ack(
        &self,
        event: &str,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, AckError> {
        let ack_id = self.next_ack_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending_acks.lock().await.insert(ack_id, tx);

        let envelope = Envelope {
            event: event.to_string(),
            data,
            ack_id: Some(ack_id),
        };
        let text = serde_json::to_string(&envelope).map_err(|_| AckError::Timeout)?;
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| AckError::ChannelClosed)?;

        match tokio::time::timeout(ACK_TIMEOUT, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(AckError::ChannelClosed),
            Err(_) => {
                self.pending_acks.lock().await.remove(&ack_id);
                Err(AckError::Timeout)
            }
        }
    }

    async fn resolve_ack(&self, ack_id: u64, data: serde_json::Value) {
        if let Some(tx) = self.pending_acks.lock().await.remove(&ack_id) {
            let _ = tx.send(data);
        }
    }
}

#[derive(Debug)]
pub enum AckError {
    Timeout,
    ChannelClosed,
}

/// Connect-error classification (spec §4.J): drives the reconnection delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidVersion,
    ProbeClass,
    ApiClass,
    Default,
}

pub fn classify_connect_error(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if lower.contains("invalid probe version") {
        ErrorClass::InvalidVersion
    } else if lower.contains("ip limit") || lower.contains("vpn detected") || lower.contains("unresolvable geoip") {
        ErrorClass::ProbeClass
    } else if lower.contains("failed to collect probe metadata") {
        ErrorClass::ApiClass
    } else {
        ErrorClass::Default
    }
}

pub fn reconnect_delay(class: ErrorClass) -> Option<Duration> {
    match class {
        ErrorClass::InvalidVersion => None, // exit(0); supervisor restarts with updated code
        ErrorClass::ProbeClass => Some(Duration::from_secs(60 * 60)),
        ErrorClass::ApiClass => Some(Duration::from_secs(60)),
        ErrorClass::Default => Some(Duration::from_millis(1500)),
    }
}

/// Incoming events the supervisor dispatches to. Unrecognized events are
/// ignored rather than erroring — forward compatibility with server-side
/// additions the probe doesn't yet understand.
pub enum Incoming {
    Connect,
    Disconnect { reason: String },
    ConnectError { message: String },
    Location(serde_json::Value),
    Adoption(serde_json::Value),
    AltIpsToken(serde_json::Value),
    MeasurementRequest(serde_json::Value),
    Sigkill,
    AdoptionCode(serde_json::Value),
    Ack { ack_id: u64, data: serde_json::Value },
    Unknown,
}

fn classify_incoming(envelope: Envelope) -> Incoming {
    if let Some(ack_id) = envelope.ack_id {
        if envelope.event == "ack" {
            return Incoming::Ack { ack_id, data: envelope.data };
        }
    }
    match envelope.event.as_str() {
        "api:connect:location" => Incoming::Location(envelope.data),
        "api:connect:adoption" => Incoming::Adoption(envelope.data),
        "api:connect:alt-ips-token" => Incoming::AltIpsToken(envelope.data),
        "probe:measurement:request" => Incoming::MeasurementRequest(envelope.data),
        "probe:sigkill" => Incoming::Sigkill,
        "probe:adoption:code" => Incoming::AdoptionCode(envelope.data),
        _ => Incoming::Unknown,
    }
}

/// Opens one websocket connection, reads `handshake_query` into the
/// connect URL as JSON-encoded query parameters, and returns the shared
/// handle plus a stream of dispatched [`Incoming`] events. Runs until the
/// socket closes (cleanly or in error).
pub async fn connect_once(
    ws_url: &str,
    handshake_query: &common::HandshakeQuery,
) -> Result<(Arc<ConnectionHandle>, mpsc::UnboundedReceiver<Incoming>), String> {
    let query = serde_urlencoded::to_string(handshake_query).map_err(|e| e.to_string())?;
    let full_url = format!("{}/probes?{}", ws_url.trim_end_matches('/'), query);

    let (ws_stream, _) = tokio_tungstenite::connect_async(&full_url)
        .await
        .map_err(|e| e.to_string())?;
    let (mut write, mut read) = ws_stream.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let handle = ConnectionHandle::new(outbound_tx);
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if write.send(msg).await.is_err() {
                break;
            }
        }
    });

    let handle_for_reader = handle.clone();
    tokio::spawn(async move {
        let _ = incoming_tx.send(Incoming::Connect);
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(envelope) = serde_json::from_str::<Envelope>(&text) {
                        match classify_incoming(envelope) {
                            Incoming::Ack { ack_id, data } => {
                                handle_for_reader.resolve_ack(ack_id, data).await;
                            }
                            other => {
                                if incoming_tx.send(other).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                    let _ = incoming_tx.send(Incoming::Disconnect { reason });
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = incoming_tx.send(Incoming::ConnectError { message: e.to_string() });
                    break;
                }
            }
        }
    });

    Ok((handle, incoming_rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_picks_expected_buckets() {
        assert_eq!(classify_connect_error("Invalid probe version"), ErrorClass::InvalidVersion);
        assert_eq!(classify_connect_error("VPN detected on this IP"), ErrorClass::ProbeClass);
        assert_eq!(
            classify_connect_error("failed to collect probe metadata"),
            ErrorClass::ApiClass
        );
        assert_eq!(classify_connect_error("connection reset"), ErrorClass::Default);
    }

    #[test]
    fn reconnect_delay_matches_classification() {
        assert_eq!(reconnect_delay(ErrorClass::InvalidVersion), None);
        assert_eq!(reconnect_delay(ErrorClass::ProbeClass), Some(Duration::from_secs(3600)));
        assert_eq!(reconnect_delay(ErrorClass::ApiClass), Some(Duration::from_secs(60)));
        assert_eq!(reconnect_delay(ErrorClass::Default), Some(Duration::from_millis(1500)));
    }
}
