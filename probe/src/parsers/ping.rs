//! Ping parser (spec §4.A). Assumes `iputils`-style `ping` output:
//!
//! ```text
//! PING example.com (93.184.216.34) 56(84) bytes of data.
//! 64 bytes from 93.184.216.34: icmp_seq=1 ttl=56 time=11.3 ms
//! ...
//! --- example.com ping statistics ---
//! 3 packets transmitted, 3 received, 0% packet loss, time 2003ms
//! rtt min/avg/max/mdev = 11.234/11.876/12.501/0.456 ms
//! ```

use super::ParseError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PingTiming {
    pub ttl: Option<u32>,
    pub rtt: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PingStats {
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
    pub packets_transmitted: u32,
    pub packets_received: u32,
    pub loss: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub resolved_address: Option<String>,
    pub timings: Vec<PingTiming>,
    pub stats: PingStats,
}

pub fn parse(output: &str) -> Result<PingResult, ParseError> {
    let mut lines = output.lines();
    let header = lines
        .find(|l| l.starts_with("PING "))
        .ok_or_else(|| ParseError::new("missing PING header line"))?;

    let resolved_address = header
        .split('(')
        .nth(1)
        .and_then(|rest| rest.split(')').next())
        .map(|s| s.to_string());

    let mut result = PingResult {
        resolved_address,
        ..Default::default()
    };

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix(' ').or(Some(line)) {
            if rest.contains("bytes from") && rest.contains("icmp_seq=") {
                let ttl = extract_field(rest, "ttl=").and_then(|v| v.parse::<u32>().ok());
                let rtt = extract_field(rest, "time=").and_then(|v| v.parse::<f64>().ok());
                if let Some(rtt) = rtt {
                    result.timings.push(PingTiming { ttl, rtt });
                }
            }
        }
        if line.contains("packets transmitted") {
            parse_transmit_line(line, &mut result.stats);
        }
        if line.trim_start().starts_with("rtt ") || line.trim_start().starts_with("round-trip") {
            parse_rtt_line(line, &mut result.stats);
        }
    }

    Ok(result)
}

fn extract_field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let idx = line.find(key)? + key.len();
    let rest = &line[idx..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some(&rest[..end])
}

fn parse_transmit_line(line: &str, stats: &mut PingStats) {
    // "3 packets transmitted, 3 received, 0% packet loss, time 2003ms"
    let parts: Vec<&str> = line.split(',').collect();
    for part in &parts {
        let part = part.trim();
        if part.ends_with("packets transmitted") || part.ends_with("packet transmitted") {
            stats.packets_transmitted = part
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
        } else if part.contains("received") {
            stats.packets_received = part
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
        } else if part.contains("packet loss") {
            let pct = part
                .split_whitespace()
                .next()
                .and_then(|s| s.trim_end_matches('%').parse::<f64>().ok());
            stats.loss = pct.unwrap_or_else(|| {
                if stats.packets_transmitted == 0 {
                    0.0
                } else {
                    100.0 * (1.0
                        - stats.packets_received as f64 / stats.packets_transmitted as f64)
                }
            });
        }
    }
    if stats.packets_transmitted == 0 {
        stats.loss = 0.0;
    }
}

fn parse_rtt_line(line: &str, stats: &mut PingStats) {
    // "rtt min/avg/max/mdev = 11.234/11.876/12.501/0.456 ms"
    if let Some(eq) = line.find('=') {
        let values = line[eq + 1..].trim();
        let values = values.split_whitespace().next().unwrap_or("");
        let parts: Vec<&str> = values.split('/').collect();
        if parts.len() >= 3 {
            stats.min = parts[0].parse().ok();
            stats.avg = parts[1].parse().ok();
            stats.max = parts[2].parse().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "PING example.com (93.184.216.34) 56(84) bytes of data.\n\
64 bytes from 93.184.216.34: icmp_seq=1 ttl=56 time=11.3 ms\n\
64 bytes from 93.184.216.34: icmp_seq=2 ttl=56 time=12.1 ms\n\
64 bytes from 93.184.216.34: icmp_seq=3 ttl=56 time=11.8 ms\n\
\n\
--- example.com ping statistics ---\n\
3 packets transmitted, 3 received, 0% packet loss, time 2003ms\n\
rtt min/avg/max/mdev = 11.300/11.733/12.100/0.332 ms\n";

    #[test]
    fn parses_successful_run() {
        let result = parse(FIXTURE).unwrap();
        assert_eq!(result.resolved_address.as_deref(), Some("93.184.216.34"));
        assert_eq!(result.timings.len(), 3);
        assert_eq!(result.timings[0].ttl, Some(56));
        assert_eq!(result.stats.packets_transmitted, 3);
        assert_eq!(result.stats.packets_received, 3);
        assert_eq!(result.stats.loss, 0.0);
        assert!(result.stats.avg.unwrap() > 11.0);
    }

    #[test]
    fn zero_replies_has_no_divide_by_zero() {
        let fixture = "PING example.com (93.184.216.34) 56(84) bytes of data.\n\
\n\
--- example.com ping statistics ---\n\
3 packets transmitted, 0 received, 100% packet loss, time 2003ms\n";
        let result = parse(fixture).unwrap();
        assert!(result.timings.is_empty());
        assert_eq!(result.stats.loss, 100.0);
    }

    #[test]
    fn missing_header_is_a_parse_error() {
        assert!(parse("garbage\noutput\n").is_err());
    }
}
