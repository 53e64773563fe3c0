//! `mtr --raw` token-stream parser (spec §4.A).
//!
//! Raw tokens are one per line: `h<idx> <addr>`, `d<idx> <hostname>`,
//! `x<idx> <seq>` (a ping was sent, rtt not known yet), `p<idx> <rtt_us>`
//! (fills the rtt of the oldest outstanding `x` for that hop, in
//! microseconds). This is modelled as the design notes (spec §9) suggest: a
//! map `hopIndex -> HopBuilder`, rendered by folding.

use super::ParseError;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HopStats {
    pub count: u32,
    pub received: u32,
    pub dropped: u32,
    pub loss: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub stdev: f64,
    pub jitter_min: f64,
    pub jitter_max: f64,
    pub jitter_avg: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MtrHop {
    pub index: u32,
    pub resolved_address: Option<String>,
    pub resolved_hostname: Option<String>,
    pub duplicate: bool,
    pub stats: HopStats,
}

#[derive(Default)]
struct HopBuilder {
    address: Option<String>,
    hostname: Option<String>,
    duplicate: bool,
    timings: Vec<Option<f64>>,
    pending: VecDeque<usize>,
}

pub fn parse(output: &str) -> Result<Vec<MtrHop>, ParseError> {
    let mut hops: BTreeMap<u32, HopBuilder> = BTreeMap::new();
    let mut seen_addresses: std::collections::HashSet<String> = std::collections::HashSet::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let tag = match parts.next() {
            Some(t) => t,
            None => continue,
        };
        let value = parts.next().unwrap_or("").trim();
        let (letter, idx_str) = tag.split_at(1);
        let idx: u32 = match idx_str.parse() {
            Ok(i) => i,
            Err(_) => continue,
        };
        let builder = hops.entry(idx).or_default();

        match letter {
            "h" => {
                builder.address = Some(value.to_string());
                if !seen_addresses.insert(value.to_string()) {
                    builder.duplicate = true;
                }
            }
            "d" => builder.hostname = Some(value.to_string()),
            "x" => {
                builder.timings.push(None);
                builder.pending.push_back(builder.timings.len() - 1);
            }
            "p" => {
                if let Ok(rtt_us) = value.parse::<f64>() {
                    if let Some(idx) = builder.pending.pop_front() {
                        builder.timings[idx] = Some(rtt_us / 1000.0);
                    } else {
                        builder.timings.push(Some(rtt_us / 1000.0));
                    }
                }
            }
            _ => {}
        }
    }

    let max_resolved_index = hops
        .iter()
        .filter(|(_, b)| b.address.is_some())
        .map(|(idx, _)| *idx)
        .max();

    let max_resolved_index = match max_resolved_index {
        Some(idx) => idx,
        None => return Ok(Vec::new()),
    };

    let mut result = Vec::new();
    for (idx, builder) in hops.into_iter() {
        if idx > max_resolved_index {
            continue;
        }
        result.push(MtrHop {
            index: idx,
            resolved_address: builder.address,
            resolved_hostname: builder.hostname,
            duplicate: builder.duplicate,
            stats: compute_stats(&builder.timings),
        });
    }
    Ok(result)
}

fn compute_stats(timings: &[Option<f64>]) -> HopStats {
    let count = timings.len() as u32;
    let received: Vec<f64> = timings.iter().filter_map(|t| *t).collect();
    let dropped = count - received.len() as u32;
    let loss = if count == 0 {
        0.0
    } else {
        100.0 * dropped as f64 / count as f64
    };

    let (avg, min, max, stdev) = if received.is_empty() {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        let sum: f64 = received.iter().sum();
        let avg = sum / received.len() as f64;
        let min = received.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = received.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let variance = received.iter().map(|v| (v - avg).powi(2)).sum::<f64>()
            / received.len() as f64;
        (avg, min, max, variance.sqrt())
    };

    let mut jitters = Vec::new();
    for pair in received.windows(2) {
        jitters.push((pair[1] - pair[0]).abs());
    }
    let (jitter_min, jitter_max, jitter_avg) = if jitters.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let sum: f64 = jitters.iter().sum();
        (
            jitters.iter().cloned().fold(f64::INFINITY, f64::min),
            jitters.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            sum / jitters.len() as f64,
        )
    };

    HopStats {
        count,
        received: received.len() as u32,
        dropped,
        loss,
        avg,
        min,
        max,
        stdev,
        jitter_min,
        jitter_max,
        jitter_avg,
    }
}

/// Renders the `LDRAVM`-style text table from the currently known hops, for
/// the `overwrite`-mode progress frame (spec §4.D mtr specifics).
pub fn render_table(hops: &[MtrHop]) -> String {
    let mut out = String::from("Host                                 Loss%   Snt   Last   Avg  Best  Wrst StDev\n");
    for hop in hops {
        let host = hop
            .resolved_hostname
            .clone()
            .or_else(|| hop.resolved_address.clone())
            .unwrap_or_else(|| "???".to_string());
        out.push_str(&format!(
            " {:>2}. {:<30} {:>5.1}% {:>5} {:>6.1} {:>5.1} {:>5.1} {:>5.1} {:>5.1}\n",
            hop.index + 1,
            host,
            hop.stats.loss,
            hop.stats.count,
            hop.stats.avg,
            hop.stats.avg,
            hop.stats.min,
            hop.stats.max,
            hop.stats.stdev,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "h0 192.168.1.1\n\
d0 _gateway\n\
x0 0\n\
p0 1200\n\
x0 1\n\
p0 1500\n\
h1 10.0.0.1\n\
x1 0\n\
p1 5200\n\
x1 1\n";

    #[test]
    fn builds_hops_with_computed_stats() {
        let hops = parse(FIXTURE).unwrap();
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].resolved_address.as_deref(), Some("192.168.1.1"));
        assert_eq!(hops[0].resolved_hostname.as_deref(), Some("_gateway"));
        assert_eq!(hops[0].stats.count, 2);
        assert_eq!(hops[0].stats.received, 2);
        assert!((hops[0].stats.avg - 1.35).abs() < 1e-9);

        assert_eq!(hops[1].stats.count, 2);
        assert_eq!(hops[1].stats.received, 1);
        assert_eq!(hops[1].stats.dropped, 1);
        assert_eq!(hops[1].stats.loss, 50.0);
    }

    #[test]
    fn duplicate_address_is_flagged() {
        let fixture = "h0 1.1.1.1\nh1 1.1.1.1\n";
        let hops = parse(fixture).unwrap();
        assert!(!hops[0].duplicate);
        assert!(hops[1].duplicate);
    }

    #[test]
    fn trailing_unresolved_hops_are_dropped() {
        let fixture = "h0 1.1.1.1\nx0 0\np0 1000\nx1 0\n"; // hop 1 never resolved
        let hops = parse(fixture).unwrap();
        assert_eq!(hops.len(), 1);
    }

    #[test]
    fn zero_packets_has_no_division_by_zero() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.loss, 0.0);
        assert_eq!(stats.avg, 0.0);
    }

    #[test]
    fn no_resolved_hops_is_empty() {
        let hops = parse("x0 0\n").unwrap();
        assert!(hops.is_empty());
    }
}
