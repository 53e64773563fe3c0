//! Uptime restart loop (spec §4.I): after `uptime.interval + jitter`,
//! compares process uptime to `uptime.maxUptime` and requests a restart.

use rand::Rng;
use std::time::{Duration, Instant};

pub async fn run(interval: Duration, max_deviation: Duration, max_uptime: Duration, development: bool) {
    if development {
        return;
    }
    let started_at = Instant::now();
    loop {
        let extra = rand::thread_rng().gen_range(0..=max_deviation.as_millis().max(1) as u64);
        tokio::time::sleep(interval + Duration::from_millis(extra)).await;

        if started_at.elapsed() >= max_uptime {
            tracing::info!(uptime_secs = started_at.elapsed().as_secs(), "max uptime exceeded, restarting");
            terminate_for_restart();
            return;
        }
    }
}

/// Sends `SIGTERM` to the current process so a supervisor restarts it
/// (spec: "the supervisor (container runtime) is expected to restart the
/// process").
pub fn terminate_for_restart() {
    #[cfg(unix)]
    unsafe {
        libc::kill(libc::getpid(), libc::SIGTERM);
    }
    #[cfg(not(unix))]
    std::process::exit(0);
}
