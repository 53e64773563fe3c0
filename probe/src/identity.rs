//! Probe identity (spec §3 "Probe identity", §6 environment variables).
//!
//! The UUID is read from `PROBE_UUID` if set, otherwise generated once at
//! startup (it is not meant to be stable across restarts unless the
//! deployment pins it via the environment — the control plane treats a
//! fresh UUID as a new probe).

use common::HandshakeQuery;
use sysinfo::{Disks, System};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Identity {
    pub uuid: String,
}

impl Identity {
    pub fn load() -> Self {
        let uuid = std::env::var("PROBE_UUID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());
        Self { uuid }
    }

    /// Snapshots current host facts into a handshake query. Called once per
    /// connect attempt (spec §3 supplement: a point-in-time snapshot per
    /// attempt is sufficient).
    pub fn handshake_query(&self) -> HandshakeQuery {
        let mut sys = System::new();
        sys.refresh_memory();
        let disks = Disks::new_with_refreshed_list();

        let total_disk_size: u64 = disks.iter().map(|d| d.total_space()).sum();
        let available_disk_space: u64 = disks.iter().map(|d| d.available_space()).sum();

        HandshakeQuery {
            version: VERSION.to_string(),
            node_version: format!("rustc-{}", rustc_marker()),
            total_memory: sys.total_memory(),
            total_disk_size,
            available_disk_space,
            uuid: self.uuid.clone(),
            is_hardware: std::env::var("HOST_HW")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            hardware_device: std::env::var("HOST_DEVICE").ok(),
            hardware_device_firmware: std::env::var("HOST_FIRMWARE").ok(),
            fake_ip: std::env::var("FAKE_PROBE_IP").ok(),
        }
    }
}

fn rustc_marker() -> &'static str {
    "stable"
}
