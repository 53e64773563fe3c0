//! Per-kind measurement option schemas (spec §6 "options schemas").
//!
//! Each `*Options` struct is what the control plane sends inside a
//! `MeasurementRequest::measurement` union member. Defaulting rules live
//! here as `#[serde(default = ...)]` so a request missing an optional field
//! gets the documented default rather than failing to deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IpVersion {
    #[serde(rename = "4")]
    V4,
    #[serde(rename = "6")]
    V6,
}

impl Default for IpVersion {
    fn default() -> Self {
        IpVersion::V4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Icmp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpProtocol {
    Http,
    Https,
    Http2,
}

impl Default for HttpProtocol {
    fn default() -> Self {
        HttpProtocol::Https
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Options,
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Head
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    A,
    Aaaa,
    Any,
    Cname,
    Dnskey,
    Ds,
    Mx,
    Ns,
    Nsec,
    Ptr,
    Rrsig,
    Soa,
    Txt,
    Srv,
}

impl Default for DnsRecordType {
    fn default() -> Self {
        DnsRecordType::A
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingOptions {
    pub target: String,
    #[serde(default = "default_packets")]
    pub packets: u16,
    #[serde(default)]
    pub ip_version: Option<IpVersion>,
    #[serde(default)]
    pub in_progress_updates: bool,
    /// Defaults to plain ICMP ping; `TCP` routes through the tcp-ping
    /// executor (spec §4.D "TCP-ping"), `port` is then required.
    #[serde(default)]
    pub protocol: Option<TransportProtocol>,
    #[serde(default)]
    pub port: Option<u16>,
}

fn default_packets() -> u16 {
    3
}

impl PingOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.target.trim().is_empty() {
            return Err("target must not be empty".into());
        }
        if !(1..=16).contains(&self.packets) {
            return Err("packets must be between 1 and 16".into());
        }
        if matches!(self.protocol, Some(TransportProtocol::Tcp)) && self.port.is_none() {
            return Err("port is required when protocol is TCP".into());
        }
        Ok(())
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self.protocol, Some(TransportProtocol::Tcp))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsQuery {
    #[serde(default)]
    pub r#type: DnsRecordType,
    #[serde(default)]
    pub resolver: Option<String>,
    #[serde(default = "default_dns_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: DnsProtocol,
    #[serde(default)]
    pub trace: bool,
}

fn default_dns_port() -> u16 {
    53
}

impl Default for DnsQuery {
    fn default() -> Self {
        Self {
            r#type: DnsRecordType::default(),
            resolver: None,
            port: default_dns_port(),
            protocol: DnsProtocol::default(),
            trace: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsProtocol {
    Udp,
    Tcp,
}

impl Default for DnsProtocol {
    fn default() -> Self {
        DnsProtocol::Udp
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsOptions {
    pub target: String,
    #[serde(default)]
    pub query: DnsQuery,
    #[serde(default)]
    pub ip_version: Option<IpVersion>,
    #[serde(default)]
    pub in_progress_updates: bool,
}

impl DnsOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.target.trim().is_empty() {
            return Err("target must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerouteOptions {
    pub target: String,
    pub protocol: TransportProtocol,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub ip_version: Option<IpVersion>,
    #[serde(default)]
    pub in_progress_updates: bool,
}

impl TracerouteOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.target.trim().is_empty() {
            return Err("target must not be empty".into());
        }
        if matches!(self.protocol, TransportProtocol::Tcp) && self.port.is_none() {
            return Err("port is required when protocol is TCP".into());
        }
        Ok(())
    }

    /// ipVersion defaulting rule: 4, unless the target is itself a literal v6 address.
    pub fn resolved_ip_version(&self) -> IpVersion {
        resolve_ip_version(&self.target, self.ip_version)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MtrOptions {
    pub target: String,
    pub protocol: TransportProtocol,
    #[serde(default = "default_packets")]
    pub packets: u16,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub ip_version: Option<IpVersion>,
    #[serde(default)]
    pub in_progress_updates: bool,
}

impl MtrOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.target.trim().is_empty() {
            return Err("target must not be empty".into());
        }
        if !(1..=16).contains(&self.packets) {
            return Err("packets must be between 1 and 16".into());
        }
        Ok(())
    }

    pub fn resolved_ip_version(&self) -> IpVersion {
        resolve_ip_version(&self.target, self.ip_version)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestOptions {
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
}

fn default_path() -> String {
    "/".to_string()
}

impl Default for HttpRequestOptions {
    fn default() -> Self {
        Self {
            method: HttpMethod::default(),
            path: default_path(),
            query: String::new(),
            host: None,
            headers: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpOptions {
    pub target: String,
    #[serde(default)]
    pub protocol: HttpProtocol,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub resolver: Option<String>,
    #[serde(default)]
    pub ip_version: Option<IpVersion>,
    #[serde(default)]
    pub request: HttpRequestOptions,
    #[serde(default)]
    pub in_progress_updates: bool,
}

impl HttpOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.target.trim().is_empty() {
            return Err("target must not be empty".into());
        }
        Ok(())
    }

    pub fn resolved_port(&self) -> u16 {
        self.port.unwrap_or(match self.protocol {
            HttpProtocol::Http => 80,
            HttpProtocol::Https | HttpProtocol::Http2 => 443,
        })
    }
}

fn resolve_ip_version(target: &str, explicit: Option<IpVersion>) -> IpVersion {
    if let Some(v) = explicit {
        return v;
    }
    if target.parse::<std::net::Ipv6Addr>().is_ok() {
        IpVersion::V6
    } else {
        IpVersion::V4
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Measurement {
    Ping(PingOptions),
    Dns(DnsOptions),
    Traceroute(TracerouteOptions),
    Mtr(MtrOptions),
    Http(HttpOptions),
}

impl Measurement {
    pub fn target(&self) -> &str {
        match self {
            Measurement::Ping(o) => &o.target,
            Measurement::Dns(o) => &o.target,
            Measurement::Traceroute(o) => &o.target,
            Measurement::Mtr(o) => &o.target,
            Measurement::Http(o) => &o.target,
        }
    }

    pub fn in_progress_updates(&self) -> bool {
        match self {
            Measurement::Ping(o) => o.in_progress_updates,
            Measurement::Dns(o) => o.in_progress_updates,
            Measurement::Traceroute(o) => o.in_progress_updates,
            Measurement::Mtr(o) => o.in_progress_updates,
            Measurement::Http(o) => o.in_progress_updates,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Measurement::Ping(_) => "ping",
            Measurement::Dns(_) => "dns",
            Measurement::Traceroute(_) => "traceroute",
            Measurement::Mtr(_) => "mtr",
            Measurement::Http(_) => "http",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Measurement::Ping(o) => o.validate(),
            Measurement::Dns(o) => o.validate(),
            Measurement::Traceroute(o) => o.validate(),
            Measurement::Mtr(o) => o.validate(),
            Measurement::Http(o) => o.validate(),
        }
    }
}
