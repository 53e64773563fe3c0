//! Wire contract between the probe and the control plane (spec §3, §6).
//!
//! These types are deliberately kept free of any transport concern
//! (`tokio-tungstenite`, socket.io-style event names, etc. live in the
//! `probe` crate's `connection` module) so they can be reused verbatim by a
//! hypothetical control-plane implementation.

use crate::options::Measurement;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `{ measurementId, testId, measurement }` (spec §3 "Measurement Request").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRequest {
    pub measurement_id: String,
    pub test_id: String,
    pub measurement: Measurement,
}

/// `probe:measurement:progress` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressFrame {
    pub test_id: String,
    pub measurement_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    pub result: serde_json::Value,
}

/// `probe:measurement:result` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFrame {
    pub test_id: String,
    pub measurement_id: String,
    pub result: serde_json::Value,
}

/// Probe status state machine (spec §3 "Status", §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Initializing,
    Ready,
    UnbufferMissing,
    PingTestFailed,
    Sigterm,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::UnbufferMissing | Status::Sigterm)
    }

    pub fn is_ready(self) -> bool {
        matches!(self, Status::Ready)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self).unwrap_or_default();
        write!(f, "{}", s.as_str().unwrap_or("unknown"))
    }
}

/// Handshake query sent on every connect attempt (spec §3 "Probe identity",
/// §6 handshake payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeQuery {
    pub version: String,
    pub node_version: String,
    pub total_memory: u64,
    pub total_disk_size: u64,
    pub available_disk_space: u64,
    pub uuid: String,
    pub is_hardware: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_device_firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fake_ip: Option<String>,
}

/// `probe:stats:report` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    pub cpu: CpuStats,
    pub jobs: JobStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuStats {
    pub load: Vec<CpuLoad>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuLoad {
    pub usage: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStats {
    pub count: usize,
}

/// One entry in the in-memory log ring buffer (spec §4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub message: String,
    pub timestamp: String,
    pub level: String,
    pub scope: String,
}

/// `probe:logs` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsPayload {
    pub logs: Vec<LogRecord>,
    pub skipped: u64,
}

/// `probe:alt-ips` payload: ordered `[ip, token]` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AltIpEntry(pub String, pub String);

/// Server's ack to `probe:alt-ips`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AltIpsAck {
    #[serde(default)]
    pub added_alt_ips: Vec<String>,
    #[serde(default)]
    pub rejected_ips_to_reasons: BTreeMap<String, String>,
}
