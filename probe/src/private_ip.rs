//! Private/reserved address classification (spec §4.B).
//!
//! Pure, no I/O. The teacher doesn't pull in an IP-range crate anywhere in
//! the pack for this kind of fixed, small range table, so this stays
//! hand-rolled `Ipv4Addr`/`Ipv6Addr` matching rather than adding a
//! dependency for five ranges.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// `isPrivate(addrLiteral) -> bool` (spec §4.B).
///
/// Returns `false` for strings that don't parse as an IP literal at all —
/// callers that need "is this a private *target*" must resolve a hostname
/// first.
pub fn is_private_literal(addr: &str) -> bool {
    match addr.trim().parse::<IpAddr>() {
        Ok(ip) => is_private(ip),
        Err(_) => false,
    }
}

pub fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    // 10.0.0.0/8
    if o[0] == 10 {
        return true;
    }
    // 172.16.0.0/12
    if o[0] == 172 && (16..=31).contains(&o[1]) {
        return true;
    }
    // 192.168.0.0/16
    if o[0] == 192 && o[1] == 168 {
        return true;
    }
    // 127.0.0.0/8 (loopback)
    if o[0] == 127 {
        return true;
    }
    // 169.254.0.0/16 (link-local)
    if o[0] == 169 && o[1] == 254 {
        return true;
    }
    // 0.0.0.0/8
    if o[0] == 0 {
        return true;
    }
    // 100.64.0.0/10 (carrier-grade NAT)
    if o[0] == 100 && (64..=127).contains(&o[1]) {
        return true;
    }
    false
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    // ::ffff:a.b.c.d and other embedded-v4 forms expose their low 32 bits.
    let segments = ip.segments();
    if segments[0..6] == [0, 0, 0, 0, 0, 0xffff] {
        let v4 = Ipv4Addr::new(
            (segments[6] >> 8) as u8,
            (segments[6] & 0xff) as u8,
            (segments[7] >> 8) as u8,
            (segments[7] & 0xff) as u8,
        );
        return is_private_v4(v4);
    }
    // fc00::/7 (unique local)
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    // fe80::/10 (link-local)
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    false
}

/// Strips a trailing port suffix from a DNS-server-list entry: `addr:port`
/// for IPv4, `[addr]:port` for IPv6. Leaves bare addresses untouched.
fn strip_port(entry: &str) -> &str {
    let entry = entry.trim();
    if let Some(stripped) = entry.strip_prefix('[') {
        if let Some(end) = stripped.find(']') {
            return &stripped[..end];
        }
        return entry;
    }
    // Bare IPv4:port has exactly one colon; a bare IPv6 literal has more
    // than one, so only strip when there's a single colon present.
    if entry.matches(':').count() == 1 {
        if let Some((addr, _port)) = entry.rsplit_once(':') {
            return addr;
        }
    }
    entry
}

/// `maskDnsServersList(list) -> list` (spec §4.B): replaces any private
/// entry with the literal string `"private"`, preserving order and the
/// non-private entries verbatim (including their port suffix).
pub fn mask_dns_servers_list<I, S>(list: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    list.into_iter()
        .map(|entry| {
            let entry = entry.as_ref();
            if is_private_literal(strip_port(entry)) {
                "private".to_string()
            } else {
                entry.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rfc1918() {
        assert!(is_private_literal("10.1.2.3"));
        assert!(is_private_literal("172.16.0.1"));
        assert!(is_private_literal("172.31.255.255"));
        assert!(!is_private_literal("172.32.0.1"));
        assert!(is_private_literal("192.168.1.1"));
        assert!(!is_private_literal("8.8.8.8"));
    }

    #[test]
    fn classifies_loopback_and_linklocal() {
        assert!(is_private_literal("127.0.0.1"));
        assert!(is_private_literal("169.254.1.1"));
        assert!(is_private_literal("100.64.0.1"));
        assert!(!is_private_literal("100.128.0.1"));
    }

    #[test]
    fn classifies_ipv6() {
        assert!(is_private_literal("::1"));
        assert!(is_private_literal("fc00::1"));
        assert!(is_private_literal("fe80::1"));
        assert!(is_private_literal("::ffff:10.0.0.1"));
        assert!(!is_private_literal("2001:4860:4860::8888"));
    }

    #[test]
    fn masks_dns_servers_preserving_order_and_ports() {
        let masked = mask_dns_servers_list(["10.0.0.1:53", "8.8.8.8", "[fc00::1]:53"]);
        assert_eq!(masked, vec!["private", "8.8.8.8", "private"]);
    }

    #[test]
    fn non_ip_strings_are_not_private() {
        assert!(!is_private_literal("not-an-ip"));
        assert!(!is_private_literal(""));
    }
}
