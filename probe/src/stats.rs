//! `probe:stats:report` periodic emission (spec §4.J supplement): named in
//! the wire table (§6) but only implicit in the component prose; owned by
//! the connection supervisor as an ambient duty alongside dispatch.

use crate::connection::ConnectionHandle;
use crate::jobs::JobTable;
use common::{CpuLoad, CpuStats, JobStats, StatsReport};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;

pub async fn run(handle: Arc<ConnectionHandle>, jobs: Arc<JobTable>, interval: Duration) {
    let mut sys = System::new();
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        sys.refresh_cpu_usage();
        let load = sys
            .cpus()
            .iter()
            .map(|cpu| CpuLoad { usage: cpu.cpu_usage() })
            .collect();

        let report = StatsReport {
            cpu: CpuStats { load },
            jobs: JobStats { count: jobs.len().await },
        };

        handle.emit("probe:stats:report", serde_json::to_value(report).unwrap_or_default());
    }
}
