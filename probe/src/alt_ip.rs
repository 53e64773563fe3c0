//! Alt-IP Client (spec §4.G): enumerates local network interfaces, attests
//! each via the HTTP side-channel, and reports accepted/rejected sets.

use common::AltIpsAck;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

const TICK_INTERVAL: Duration = Duration::from_secs(10 * 60);
const ATTEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AltIpReport {
    pub current_ips: Vec<String>,
    pub current_rejected_ips: BTreeMap<String, String>,
    pub current_failed_ips: BTreeMap<String, String>,
}

pub struct AltIpClient {
    http_host: String,
    primary_ip: String,
    client: reqwest::Client,
}

impl AltIpClient {
    pub fn new(http_host: String, primary_ip: String) -> Self {
        Self {
            http_host,
            primary_ip,
            client: reqwest::Client::new(),
        }
    }

    fn local_addresses(&self) -> Vec<IpAddr> {
        let mut addrs: Vec<IpAddr> = if_addrs::get_if_addrs()
            .unwrap_or_default()
            .into_iter()
            .map(|iface| iface.ip())
            .filter(|ip| !is_internal_or_link_local(ip))
            .collect();
        addrs.sort();
        addrs.dedup();
        addrs
    }

    /// Attests every non-internal local interface via the HTTP side-channel
    /// and returns the accepted `(ip, token)` pairs plus per-ip local
    /// failures. The caller (the connection supervisor) still has to emit
    /// `probe:alt-ips` and fold in the server's ack via
    /// [`Self::reconcile`].
    pub async fn attest_all(&self) -> (Vec<(String, String)>, BTreeMap<String, String>) {
        let mut accepted = Vec::new();
        let mut failed = BTreeMap::new();

        for addr in self.local_addresses() {
            match self.attest_one(addr).await {
                Ok((ip, token)) => accepted.push((ip, token)),
                Err(reason) => {
                    failed.insert(addr.to_string(), reason);
                }
            }
        }
        (accepted, failed)
    }

    async fn attest_one(&self, addr: IpAddr) -> Result<(String, String), String> {
        let url = format!("{}/alternative-ip", self.http_host);
        let client = reqwest::Client::builder()
            .local_address(addr)
            .timeout(ATTEST_TIMEOUT)
            .build()
            .map_err(|e| e.to_string())?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            let response = client.post(&url).send().await;
            match response {
                Ok(resp) if resp.status() == reqwest::StatusCode::GATEWAY_TIMEOUT && attempts < 2 => {
                    continue;
                }
                Ok(resp) if resp.status().is_success() => {
                    #[derive(serde::Deserialize)]
                    struct Ack {
                        ip: String,
                        token: String,
                    }
                    let ack: Ack = resp.json().await.map_err(|e| e.to_string())?;
                    return Ok((ack.ip, ack.token));
                }
                Ok(resp) => return Err(format!("http {}", resp.status())),
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    /// Folds the server's `probe:alt-ips` ack plus local attestation failures
    /// into the final report (spec §4.G).
    pub fn reconcile(
        &self,
        locally_accepted: &[(String, String)],
        locally_failed: BTreeMap<String, String>,
        ack: AltIpsAck,
    ) -> AltIpReport {
        let rejected_ip_set: std::collections::BTreeSet<String> =
            ack.rejected_ips_to_reasons.keys().cloned().collect();

        let mut current_ips: Vec<String> = std::iter::once(self.primary_ip.clone())
            .chain(
                locally_accepted
                    .iter()
                    .map(|(ip, _)| ip.clone())
                    .filter(|ip| !rejected_ip_set.contains(ip)),
            )
            .collect();
        current_ips.sort();
        current_ips.dedup();

        AltIpReport {
            current_ips,
            current_rejected_ips: ack.rejected_ips_to_reasons,
            current_failed_ips: locally_failed,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        TICK_INTERVAL
    }
}

fn is_internal_or_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.octets()[0] == 169 && v4.octets()[1] == 254,
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_ips_sorted_and_deduped_excludes_rejected() {
        let client = AltIpClient::new("https://example.test".into(), "1.1.1.1".into());
        let accepted = vec![("2.2.2.2".to_string(), "tok".to_string())];
        let mut rejected = BTreeMap::new();
        rejected.insert("3.3.3.3".to_string(), "vpn detected".to_string());
        let ack = AltIpsAck {
            added_alt_ips: vec!["2.2.2.2".to_string()],
            rejected_ips_to_reasons: rejected.clone(),
        };
        let report = client.reconcile(&accepted, BTreeMap::new(), ack);
        assert_eq!(report.current_ips, vec!["1.1.1.1".to_string(), "2.2.2.2".to_string()]);
        assert_eq!(report.current_rejected_ips, rejected);
    }

    #[test]
    fn link_local_and_loopback_are_filtered() {
        assert!(is_internal_or_link_local(&"127.0.0.1".parse().unwrap()));
        assert!(is_internal_or_link_local(&"169.254.1.1".parse().unwrap()));
        assert!(!is_internal_or_link_local(&"192.168.1.1".parse().unwrap()));
    }
}
