//! Status Manager (spec §4.F): `unbuffer`-on-PATH startup check, periodic
//! anchor-host health ping, state machine.

use crate::progress_buffer::{Mode, ProgressBuffer};
use common::{IpVersion, PingOptions, Status};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10 * 60);
const ANCHOR_HOSTS: [&str; 3] = ["ns1.registry.in", "k.root-servers.net", "ns1.dns.nl"];

fn status_to_code(s: Status) -> u8 {
    match s {
        Status::Initializing => 0,
        Status::Ready => 1,
        Status::UnbufferMissing => 2,
        Status::PingTestFailed => 3,
        Status::Sigterm => 4,
    }
}

fn code_to_status(c: u8) -> Status {
    match c {
        1 => Status::Ready,
        2 => Status::UnbufferMissing,
        3 => Status::PingTestFailed,
        4 => Status::Sigterm,
        _ => Status::Initializing,
    }
}

pub struct StatusManager {
    current: AtomicU8,
    updates: mpsc::UnboundedSender<Status>,
}

impl StatusManager {
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<Status>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(Self {
                current: AtomicU8::new(status_to_code(Status::Initializing)),
                updates: tx,
            }),
            rx,
        )
    }

    pub fn current(&self) -> Status {
        code_to_status(self.current.load(Ordering::SeqCst))
    }

    fn set(&self, status: Status) {
        let prev = code_to_status(self.current.swap(status_to_code(status), Ordering::SeqCst));
        if prev != status {
            let _ = self.updates.send(status);
        }
    }

    /// Runs the state machine to completion. Returns when `sigterm` fires
    /// (via `stop()`) or the `unbuffer`-missing terminal state is reached.
    pub async fn run(self: std::sync::Arc<Self>) {
        if which::which("unbuffer").is_err() {
            self.set(Status::UnbufferMissing);
            return;
        }

        self.run_health_check().await;
        let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        ticker.tick().await; // first tick fires immediately; already ran above
        loop {
            ticker.tick().await;
            if self.current().is_terminal() {
                return;
            }
            self.run_health_check().await;
        }
    }

    async fn run_health_check(&self) {
        let mut successes = 0usize;
        let checks = ANCHOR_HOSTS.iter().map(|host| async move {
            let opts = PingOptions {
                target: host.to_string(),
                packets: 6,
                ip_version: Some(IpVersion::V4),
                in_progress_updates: false,
                protocol: None,
                port: None,
            };
            let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
            let progress = ProgressBuffer::new(String::new(), String::new(), Mode::Append, tx);
            crate::executors::ping::run(&opts, progress).await
        });

        let results = futures::future::join_all(checks).await;
        for (host, result) in ANCHOR_HOSTS.iter().zip(results.iter()) {
            let loss = result
                .get("stats")
                .and_then(|s| s.get("loss"))
                .and_then(|v| v.as_f64());
            match loss {
                Some(loss) if loss == 0.0 => successes += 1,
                Some(loss) => tracing::info!(%host, loss, "anchor ping resolved but lossy"),
                None => tracing::warn!(%host, "anchor ping rejected or unparseable"),
            }
        }

        if successes >= 2 {
            self.set(Status::Ready);
        } else {
            self.set(Status::PingTestFailed);
        }
    }

    pub fn stop_sigterm(&self) {
        self.set(Status::Sigterm);
    }
}
