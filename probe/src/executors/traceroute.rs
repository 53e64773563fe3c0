//! Traceroute executor (spec §4.D "Per-kind specifics: traceroute").

use super::command::{self, DEFAULT_COMMAND_TIMEOUT};
use crate::error::JobError;
use crate::parsers::traceroute as traceroute_parser;
use crate::private_ip;
use crate::progress_buffer::ProgressBuffer;
use common::{IpVersion, TracerouteOptions, TransportProtocol};
use serde_json::json;
use std::sync::Arc;

pub fn build_args(opts: &TracerouteOptions) -> Vec<String> {
    let mut args = Vec::new();
    match opts.resolved_ip_version() {
        IpVersion::V4 => args.push("-4".to_string()),
        IpVersion::V6 => args.push("-6".to_string()),
    }
    args.push("-m".to_string());
    args.push("20".to_string());
    args.push("-w".to_string());
    args.push("2".to_string());
    args.push("-q".to_string());
    args.push("2".to_string());
    args.push("-N".to_string());
    args.push("20".to_string());
    args.push(format!("--{}", proto_str(opts.protocol)));
    if matches!(opts.protocol, TransportProtocol::Tcp) {
        if let Some(port) = opts.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
    }
    args.push(opts.target.clone());
    args
}

fn proto_str(p: TransportProtocol) -> &'static str {
    match p {
        TransportProtocol::Tcp => "tcp",
        TransportProtocol::Udp => "udp",
        TransportProtocol::Icmp => "icmp",
    }
}

/// First-hop hostname is rewritten to hide the LAN gateway (spec §4.D).
fn hide_gateway(output: &str) -> String {
    let mut lines = output.lines();
    let header = lines.next().unwrap_or("");
    let mut out = String::from(header);
    out.push('\n');
    let mut first_hop_done = false;
    for line in lines {
        if !first_hop_done && line.trim_start().chars().next().is_some_and(|c| c.is_ascii_digit())
        {
            first_hop_done = true;
            out.push_str(&rewrite_first_hop(line));
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

fn rewrite_first_hop(line: &str) -> String {
    if let Some(paren_idx) = line.find('(') {
        let prefix = &line[..paren_idx];
        let rest = &line[paren_idx..];
        let mut tokens = prefix.split_whitespace();
        let hop_num = tokens.next().unwrap_or("1");
        return format!(" {}  _gateway {}", hop_num, rest);
    }
    line.to_string()
}

pub async fn run(opts: &TracerouteOptions, progress: Arc<ProgressBuffer>) -> serde_json::Value {
    if let Err(msg) = opts.validate() {
        progress.cancel_pending();
        return json!({"status": "failed", "rawOutput": msg});
    }

    let args = build_args(opts);
    let child = match command::spawn_unbuffered("traceroute", &args) {
        Ok(c) => c,
        Err(e) => {
            progress.cancel_pending();
            return json!({"status": "failed", "rawOutput": JobError::Internal(e).user_message()});
        }
    };

    let mut private_hit = false;
    let mut header_checked = false;
    let in_progress = opts.in_progress_updates;
    let mut accumulated = String::new();
    let progress_for_line = progress.clone();

    let outcome = command::drive(child, DEFAULT_COMMAND_TIMEOUT, |line| {
        accumulated.push_str(line);
        accumulated.push('\n');
        if !header_checked && line.starts_with("traceroute to") {
            header_checked = true;
            if let Some(start) = line.find('(') {
                if let Some(end) = line[start..].find(')') {
                    let addr = &line[start + 1..start + end];
                    if private_ip::is_private_literal(addr) {
                        private_hit = true;
                        return true;
                    }
                }
            }
        }
        if in_progress {
            // Diff mode: push the whole rewritten text each time; the
            // progress buffer tracks how much of it has already been
            // emitted and sends only the new suffix.
            progress_for_line.push_progress(vec![("rawOutput", hide_gateway(&accumulated))]);
        }
        false
    })
    .await;

    progress.cancel_pending();

    if private_hit {
        return json!({"status": "failed", "rawOutput": "Private IP ranges are not allowed"});
    }
    if outcome.timed_out {
        return json!({
            "status": "failed",
            "rawOutput": format!("{}\nThe measurement command timed out.", hide_gateway(&outcome.stdout).trim_end())
        });
    }
    if !outcome.exit_success {
        let raw = if !outcome.stderr.trim().is_empty() {
            outcome.stderr.trim().to_string()
        } else if !outcome.stdout.trim().is_empty() {
            hide_gateway(&outcome.stdout).trim().to_string()
        } else {
            "Test failed. Please try again.".to_string()
        };
        return json!({"status": "failed", "rawOutput": raw});
    }

    let rewritten = hide_gateway(&outcome.stdout);
    match traceroute_parser::parse(&rewritten) {
        Ok(result) => json!({
            "status": "finished",
            "resolvedAddress": result.resolved_address,
            "hops": result.hops,
            "rawOutput": rewritten,
        }),
        Err(e) => json!({"status": "failed", "rawOutput": e.0}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hides_first_hop_hostname() {
        let fixture = "traceroute to google.com (142.250.75.14), 30 hops max, 60 byte packets\n 1  router.lan (192.168.1.1)  0.4 ms\n 2  10.0.0.1 (10.0.0.1)  2.0 ms\n";
        let out = hide_gateway(fixture);
        assert!(out.contains("_gateway"));
        assert!(out.contains("router.lan") == false);
        assert!(out.contains("10.0.0.1"));
    }
}
