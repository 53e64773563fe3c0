//! TCP-ping executor (spec §4.D "TCP-ping"): not a parser, a synthesiser.
//! Routed through here when `PingOptions::protocol == TCP`.

use crate::private_ip;
use crate::progress_buffer::ProgressBuffer;
use crate::resolver;
use common::{IpVersion, PingOptions};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Serialize, Default)]
struct TcpPingTiming {
    rtt: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
struct TcpPingStats {
    min: f64,
    avg: f64,
    max: f64,
    mdev: f64,
    rcv: u32,
    drop: u32,
    loss: f64,
    total: u32,
    time: f64,
}

pub async fn run(opts: &PingOptions, progress: Arc<ProgressBuffer>) -> serde_json::Value {
    if let Err(msg) = opts.validate() {
        progress.cancel_pending();
        return json!({"status": "failed", "rawOutput": msg});
    }
    let port = opts.port.expect("validated: port required for tcp ping");
    let ip_version = opts.ip_version.unwrap_or(IpVersion::V4);

    let address = match resolver::resolve(&opts.target, ip_version).await {
        Ok(addr) => addr,
        Err(e) => {
            progress.cancel_pending();
            return json!({"status": "failed", "rawOutput": e.to_string()});
        }
    };

    if private_ip::is_private(address) {
        progress.cancel_pending();
        return json!({"status": "failed", "rawOutput": "Private IP ranges are not allowed"});
    }

    let socket_addr = SocketAddr::new(address, port);
    let mut timings: Vec<Option<f64>> = Vec::with_capacity(opts.packets as usize);
    let started = Instant::now();

    for seq in 0..opts.packets {
        let attempt_start = Instant::now();
        let rtt = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(socket_addr)).await
        {
            Ok(Ok(_stream)) => Some(attempt_start.elapsed().as_secs_f64() * 1000.0),
            _ => None,
        };
        timings.push(rtt);

        if opts.in_progress_updates {
            let line = match rtt {
                Some(ms) => format!("seq={} time={:.3} ms\n", seq, ms),
                None => format!("seq={} timeout\n", seq),
            };
            progress.push_progress(vec![("rawOutput", line)]);
        }

        if seq + 1 < opts.packets {
            tokio::time::sleep(INTERVAL).await;
        }
    }

    progress.cancel_pending();

    let received: Vec<f64> = timings.iter().filter_map(|t| *t).collect();
    let total = timings.len() as u32;
    let rcv = received.len() as u32;
    let drop = total - rcv;
    let loss = if total == 0 {
        0.0
    } else {
        100.0 * drop as f64 / total as f64
    };
    let (min, avg, max, mdev) = if received.is_empty() {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        let sum: f64 = received.iter().sum();
        let avg = sum / received.len() as f64;
        let min = received.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = received.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let variance =
            received.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / received.len() as f64;
        (min, avg, max, variance.sqrt())
    };

    let stats = TcpPingStats {
        min,
        avg,
        max,
        mdev,
        rcv,
        drop,
        loss,
        total,
        time: started.elapsed().as_secs_f64() * 1000.0,
    };
    let timing_entries: Vec<TcpPingTiming> = timings
        .into_iter()
        .filter_map(|t| t.map(|rtt| TcpPingTiming { rtt }))
        .collect();

    json!({
        "status": "finished",
        "resolvedAddress": address.to_string(),
        "timings": timing_entries,
        "stats": stats,
    })
}
