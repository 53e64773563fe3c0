//! Self-update loop (spec §4.I): polls a release URL and requests a
//! restart when a newer tag is published. Jitter calculation grounded on
//! the teacher pack's `cloud-ping` `calculate_sleep_duration` pattern.

use crate::identity::VERSION;
use rand::Rng;
use std::time::Duration;

const UPDATE_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(serde::Deserialize)]
struct Release {
    tag_name: String,
}

fn jittered_sleep(interval: Duration, max_deviation: Duration) -> Duration {
    let extra = rand::thread_rng().gen_range(0..=max_deviation.as_millis().max(1) as u64);
    interval + Duration::from_millis(extra)
}

/// Compares two `vN.N.N`-ish tags numerically component-by-component,
/// falling back to lexicographic ordering for anything that doesn't parse.
fn is_newer(candidate: &str, current: &str) -> bool {
    let candidate = candidate.trim_start_matches('v');
    let current = current.trim_start_matches('v');

    let parse = |s: &str| -> Option<Vec<u64>> {
        s.split('.').map(|p| p.parse::<u64>().ok()).collect()
    };

    match (parse(candidate), parse(current)) {
        (Some(a), Some(b)) => a > b,
        _ => candidate > current,
    }
}

pub async fn run(release_url: String, interval: Duration, max_deviation: Duration, development: bool) {
    if development {
        return;
    }
    let client = reqwest::Client::new();
    loop {
        tokio::time::sleep(jittered_sleep(interval, max_deviation)).await;

        let response = client
            .get(&release_url)
            .timeout(UPDATE_REQUEST_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(resp) => match resp.json::<Release>().await {
                Ok(release) if is_newer(&release.tag_name, VERSION) => {
                    tracing::info!(tag = %release.tag_name, current = %VERSION, "newer release available, restarting");
                    crate::restart::terminate_for_restart();
                    return;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "failed to parse release document"),
            },
            Err(e) => tracing::warn!(error = %e, "release check request failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_version_comparison() {
        assert!(is_newer("v1.2.0", "1.1.9"));
        assert!(!is_newer("v1.1.0", "1.2.0"));
        assert!(!is_newer("1.2.0", "1.2.0"));
    }
}
