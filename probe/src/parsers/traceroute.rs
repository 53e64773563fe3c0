//! Linux `traceroute` output parser (spec §4.A).
//!
//! ```text
//! traceroute to google.com (142.250.75.14), 30 hops max, 60 byte packets
//!  1  _gateway (192.168.1.1)  0.456 ms  0.398 ms  0.376 ms
//!  2  * * *
//!  3  10.0.0.1 (10.0.0.1)  5.123 ms  5.001 ms *
//! ```
//!
//! Missing fields render as the `"*"` sentinel in raw output; this parser
//! normalises them to `None` (serialised as JSON `null`).

use super::ParseError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HopTiming {
    pub rtt: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TracerouteHop {
    pub resolved_address: Option<String>,
    pub resolved_hostname: Option<String>,
    pub timings: Vec<HopTiming>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TracerouteResult {
    pub resolved_address: Option<String>,
    pub hops: Vec<TracerouteHop>,
}

pub fn parse(output: &str) -> Result<TracerouteResult, ParseError> {
    let mut lines = output.lines();
    let header = lines
        .find(|l| l.starts_with("traceroute to"))
        .ok_or_else(|| ParseError::new("missing traceroute header line"))?;

    let resolved_address = header
        .find('(')
        .and_then(|start| header[start..].find(')').map(|end| (start, end)))
        .map(|(start, end)| header[start + 1..start + end].to_string());

    let mut hops = Vec::new();
    for line in output.lines() {
        if let Some(hop) = parse_hop_line(line) {
            hops.push(hop);
        }
    }

    Ok(TracerouteResult {
        resolved_address,
        hops,
    })
}

fn parse_hop_line(line: &str) -> Option<TracerouteHop> {
    let trimmed = line.trim_start();
    let mut tokens = trimmed.split_whitespace().peekable();
    let first = tokens.next()?;
    if first.parse::<u32>().is_err() {
        return None;
    }

    let mut hop = TracerouteHop::default();

    if let Some(&next) = tokens.peek() {
        if next != "*" {
            let hostname = tokens.next()?;
            hop.resolved_hostname = Some(hostname.to_string());
            if let Some(addr_token) = tokens.next() {
                hop.resolved_address = addr_token
                    .strip_prefix('(')
                    .and_then(|s| s.strip_suffix(')'))
                    .map(|s| s.to_string());
            }
        }
    }

    while let Some(tok) = tokens.next() {
        if tok == "*" {
            hop.timings.push(HopTiming { rtt: None });
        } else if let Ok(rtt) = tok.parse::<f64>() {
            // consume the trailing "ms" unit token, if present
            if tokens.peek() == Some(&"ms") {
                tokens.next();
            }
            hop.timings.push(HopTiming { rtt: Some(rtt) });
        }
    }

    Some(hop)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "traceroute to google.com (142.250.75.14), 30 hops max, 60 byte packets\n\
 1  _gateway (192.168.1.1)  0.456 ms  0.398 ms  0.376 ms\n\
 2  * * *\n\
 3  10.0.0.1 (10.0.0.1)  5.123 ms  5.001 ms *\n";

    #[test]
    fn parses_header_and_hops() {
        let result = parse(FIXTURE).unwrap();
        assert_eq!(result.resolved_address.as_deref(), Some("142.250.75.14"));
        assert_eq!(result.hops.len(), 3);
        assert_eq!(result.hops[0].resolved_hostname.as_deref(), Some("_gateway"));
        assert_eq!(result.hops[0].resolved_address.as_deref(), Some("192.168.1.1"));
        assert_eq!(result.hops[0].timings.len(), 3);

        assert!(result.hops[1].resolved_hostname.is_none());
        assert!(result.hops[1].timings.iter().all(|t| t.rtt.is_none()));

        assert_eq!(result.hops[2].timings[2].rtt, None);
    }
}
