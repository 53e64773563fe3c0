//! Shared DNS resolution (spec §9 design notes: "expose a single function
//! `resolve(hostname, ipVersion) -> (address, family)` and let the HTTP
//! connector call it directly" — generalized here to every caller that
//! needs to turn a hostname into a routable address: tcp-ping and the HTTP
//! engine).

use common::IpVersion;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::sync::OnceLock;

static RESOLVER: OnceLock<TokioAsyncResolver> = OnceLock::new();

fn shared() -> &'static TokioAsyncResolver {
    RESOLVER.get_or_init(|| {
        TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
    })
}

#[derive(Debug, thiserror::Error)]
#[error("could not resolve {hostname}: {reason}")]
pub struct ResolveError {
    pub hostname: String,
    pub reason: String,
}

/// Resolves `target` to a single address honoring `ip_version`. If `target`
/// is already an IP literal of the requested family it's returned directly
/// without a DNS round trip.
pub async fn resolve(target: &str, ip_version: IpVersion) -> Result<IpAddr, ResolveError> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    let lookup = shared().lookup_ip(target).await.map_err(|e| ResolveError {
        hostname: target.to_string(),
        reason: e.to_string(),
    })?;

    let wanted = lookup.iter().find(|ip| match ip_version {
        IpVersion::V4 => ip.is_ipv4(),
        IpVersion::V6 => ip.is_ipv6(),
    });

    wanted
        .or_else(|| lookup.iter().next())
        .ok_or_else(|| ResolveError {
            hostname: target.to_string(),
            reason: "no addresses returned".to_string(),
        })
}
