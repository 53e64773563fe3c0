//! Classic (non-`+trace`) `dig` output parser (spec §4.A). Assumes BIND
//! `dig` output shape:
//!
//! ```text
//! ;; ANSWER SECTION:
//! google.com.		300	IN	TXT	"v=spf1 -all"
//!
//! ;; Query time: 23 msec
//! ;; SERVER: 127.0.0.53#53(127.0.0.53)
//! ```

use super::ParseError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DnsAnswer {
    pub name: String,
    pub r#type: String,
    pub ttl: i64,
    pub class: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DnsTimings {
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DigResult {
    pub answers: Vec<DnsAnswer>,
    pub timings: DnsTimings,
    pub resolver: Option<String>,
}

pub fn parse(output: &str) -> Result<DigResult, ParseError> {
    let non_empty: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    if non_empty.len() < 6 {
        let last = non_empty.last().copied().unwrap_or("");
        return Err(ParseError::new(last.to_string()));
    }

    let mut result = DigResult::default();
    let mut in_answer_section = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with(";; ") && trimmed.ends_with("SECTION:") {
            in_answer_section = trimmed.contains("ANSWER SECTION:");
            continue;
        }
        if trimmed.starts_with(";;") {
            in_answer_section = false;
            if let Some(idx) = trimmed.find("Query time:") {
                let rest = &trimmed[idx + "Query time:".len()..];
                result.timings.total = rest
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
            }
            if let Some(idx) = trimmed.find("SERVER:") {
                let rest = trimmed[idx + "SERVER:".len()..].trim();
                // "127.0.0.53#53(127.0.0.53)" -> prefer the parenthesised ip.
                if let Some(start) = rest.find('(') {
                    if let Some(end) = rest[start..].find(')') {
                        result.resolver = Some(rest[start + 1..start + end].to_string());
                    }
                } else {
                    result.resolver = Some(rest.to_string());
                }
            }
            continue;
        }
        if in_answer_section && trimmed.starts_with(';') {
            // commented-out answer row, skip
            continue;
        }
        if in_answer_section {
            if let Some(answer) = parse_answer_row(trimmed) {
                result.answers.push(answer);
            }
        }
    }

    Ok(result)
}

fn parse_answer_row(row: &str) -> Option<DnsAnswer> {
    let fields: Vec<&str> = row.split_whitespace().collect();
    if fields.len() < 5 {
        return None;
    }
    let name = fields[0].to_string();
    let ttl = fields[1].parse().unwrap_or(0);
    let class = fields[2].to_string();
    let r#type = fields[3].to_string();
    let value = fields[4..].join(" ");
    Some(DnsAnswer {
        name,
        r#type,
        ttl,
        class,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = ";; global options: +cmd\n\
;; Got answer:\n\
;; ->>HEADER<<- opcode: QUERY, status: NOERROR, id: 1234\n\
;; flags: qr rd ra; QUERY: 1, ANSWER: 1, AUTHORITY: 0, ADDITIONAL: 1\n\
\n\
;; QUESTION SECTION:\n\
;google.com.\t\t\tIN\tTXT\n\
\n\
;; ANSWER SECTION:\n\
google.com.\t\t300\tIN\tTXT\t\"v=spf1 -all\"\n\
\n\
;; Query time: 23 msec\n\
;; SERVER: 127.0.0.53#53(127.0.0.53)\n\
;; WHEN: Thu Jul 31 00:00:00 UTC 2026\n\
;; MSG SIZE  rcvd: 55\n";

    #[test]
    fn parses_txt_answer() {
        let result = parse(FIXTURE).unwrap();
        assert_eq!(result.answers.len(), 1);
        assert_eq!(result.answers[0].value, "\"v=spf1 -all\"");
        assert_eq!(result.timings.total, 23);
        assert_eq!(result.resolver.as_deref(), Some("127.0.0.53"));
    }

    #[test]
    fn too_short_is_a_parse_error_with_last_line() {
        let err = parse("no\nanswer\nhere\n").unwrap_err();
        assert_eq!(err.0, "here");
    }
}
