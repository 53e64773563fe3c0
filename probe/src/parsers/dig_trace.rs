//! `dig +trace` output parser (spec §4.A): a list of hops, each a group of
//! answer rows terminated by a `;; Received ... from <server> in N ms`
//! footer line that this parser treats as the hop's header (resolver +
//! `timings.total`), per spec wording.

use super::dig_classic::DnsAnswer;
use super::ParseError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TraceHop {
    pub resolver: Option<String>,
    pub timings_total: i64,
    pub answers: Vec<DnsAnswer>,
}

pub fn parse(output: &str) -> Result<Vec<TraceHop>, ParseError> {
    let mut hops = Vec::new();
    let mut block_answers: Vec<DnsAnswer> = Vec::new();
    let mut block_footer: Option<&str> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if block_footer.is_some() {
                hops.push(finish_hop(block_footer.take(), std::mem::take(&mut block_answers)));
            } else {
                block_answers.clear();
            }
            continue;
        }
        if trimmed.starts_with(";;") {
            if trimmed.contains("Received") && trimmed.contains(" from ") {
                block_footer = Some(trimmed);
            }
            continue;
        }
        if trimmed.starts_with(';') {
            continue;
        }
        if let Some(answer) = parse_row(trimmed) {
            block_answers.push(answer);
        }
    }
    if block_footer.is_some() {
        hops.push(finish_hop(block_footer.take(), block_answers));
    }

    if hops.is_empty() {
        return Err(ParseError::new("no resolvable hops in trace output"));
    }
    Ok(hops)
}

fn finish_hop(footer: Option<&str>, answers: Vec<DnsAnswer>) -> TraceHop {
    let mut hop = TraceHop {
        answers,
        ..Default::default()
    };
    if let Some(footer) = footer {
        if let Some(from_idx) = footer.find(" from ") {
            let rest = &footer[from_idx + " from ".len()..];
            if let Some(paren_start) = rest.find('(') {
                if let Some(paren_end) = rest[paren_start..].find(')') {
                    hop.resolver =
                        Some(rest[paren_start + 1..paren_start + paren_end].to_string());
                }
            }
            if let Some(in_idx) = rest.find(" in ") {
                let ms_part = &rest[in_idx + " in ".len()..];
                hop.timings_total = ms_part
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
            }
        }
    }
    hop
}

fn parse_row(row: &str) -> Option<DnsAnswer> {
    let fields: Vec<&str> = row.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }
    // Glue records from +trace omit the CLASS column sometimes; handle both
    // `name ttl class type value...` and `name ttl type value...`.
    let (class, r#type, value_start) = if fields[2].chars().all(|c| c.is_ascii_uppercase())
        && fields[2].len() <= 2
    {
        (fields[2].to_string(), fields[3].to_string(), 4)
    } else {
        ("IN".to_string(), fields[2].to_string(), 3)
    };
    if value_start > fields.len() {
        return None;
    }
    Some(DnsAnswer {
        name: fields[0].to_string(),
        ttl: fields[1].parse().unwrap_or(0),
        class,
        r#type,
        value: fields[value_start..].join(" "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = ".\t\t\t518400\tIN\tNS\ta.root-servers.net.\n\
;; Received 239 bytes from 1.1.1.1#53(1.1.1.1) in 10 ms\n\
\n\
com.\t\t\t172800\tIN\tNS\ta.gtld-servers.net.\n\
;; Received 827 bytes from 192.5.6.30#53(192.5.6.30) in 20 ms\n\
\n\
google.com.\t\t300\tIN\tA\t142.250.75.14\n\
;; Received 55 bytes from 216.239.34.10#53(216.239.34.10) in 15 ms\n";

    #[test]
    fn parses_three_hops() {
        let hops = parse(FIXTURE).unwrap();
        assert_eq!(hops.len(), 3);
        assert_eq!(hops[2].resolver.as_deref(), Some("216.239.34.10"));
        assert_eq!(hops[2].timings_total, 15);
        assert_eq!(hops[2].answers[0].value, "142.250.75.14");
    }
}
