//! MTR executor (spec §4.D "Per-kind specifics: mtr").
//!
//! Progress buffer mode is `overwrite`: every emission re-renders the whole
//! table from the hops known so far (spec §4.D), rather than diffing text.
//!
//! Private-IP guard: `mtr --raw` never labels which hop is the final
//! destination, so the guard resolves the target up front (same as ping and
//! traceroute) and checks that address rather than any particular hop.

use super::command::{self, DEFAULT_COMMAND_TIMEOUT};
use crate::error::JobError;
use crate::parsers::mtr as mtr_parser;
use crate::private_ip;
use crate::progress_buffer::ProgressBuffer;
use crate::resolver;
use common::{IpVersion, MtrOptions, TransportProtocol};
use serde_json::json;
use std::sync::Arc;

pub fn build_args(opts: &MtrOptions) -> Vec<String> {
    let mut args = Vec::new();
    match opts.resolved_ip_version() {
        IpVersion::V4 => args.push("-4".to_string()),
        IpVersion::V6 => args.push("-6".to_string()),
    }
    args.push("-o".to_string());
    args.push("LDRAVM".to_string());
    args.push("--aslookup".to_string());
    args.push("--show-ips".to_string());
    args.push("--interval".to_string());
    args.push("0.5".to_string());
    args.push("--gracetime".to_string());
    args.push("3".to_string());
    args.push("--max-ttl".to_string());
    args.push("20".to_string());
    args.push("--timeout".to_string());
    args.push("15".to_string());
    args.push(format!("--{}", proto_str(opts.protocol)));
    args.push("-c".to_string());
    args.push(opts.packets.to_string());
    if matches!(opts.protocol, TransportProtocol::Tcp) {
        if let Some(port) = opts.port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
    }
    args.push("--raw".to_string());
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

pub async fn run(opts: &MtrOptions, progress: Arc<ProgressBuffer>) -> serde_json::Value {
    if let Err(msg) = opts.validate() {
        progress.cancel_pending();
        return json!({"status": "failed", "rawOutput": msg});
    }

    let address = match resolver::resolve(&opts.target, opts.resolved_ip_version()).await {
        Ok(addr) => addr,
        Err(e) => {
            progress.cancel_pending();
            return json!({"status": "failed", "rawOutput": e.to_string()});
        }
    };
    if private_ip::is_private(address) {
        progress.cancel_pending();
        return json!({"status": "failed", "rawOutput": "Private IP ranges are not allowed"});
    }

    let args = build_args(opts);
    let child = match command::spawn_unbuffered("mtr", &args) {
        Ok(c) => c,
        Err(e) => {
            progress.cancel_pending();
            return json!({"status": "failed", "rawOutput": JobError::Internal(e).user_message()});
        }
    };

    let in_progress = opts.in_progress_updates;
    let mut accumulated = String::new();
    let progress_for_line = progress.clone();

    let outcome = command::drive(child, DEFAULT_COMMAND_TIMEOUT, |line| {
        accumulated.push_str(line);
        accumulated.push('\n');
        if in_progress {
            if let Ok(hops) = mtr_parser::parse(&accumulated) {
                if !hops.is_empty() {
                    let table = mtr_parser::render_table(&hops);
                    progress_for_line.push_progress(vec![("table", table)]);
                }
            }
        }
        false
    })
    .await;

    progress.cancel_pending();

    if outcome.timed_out {
        return json!({
            "status": "failed",
            "rawOutput": "The measurement command timed out."
        });
    }
    if !outcome.exit_success {
        let raw = if !outcome.stderr.trim().is_empty() {
            outcome.stderr.trim().to_string()
        } else {
            "Test failed. Please try again.".to_string()
        };
        return json!({"status": "failed", "rawOutput": raw});
    }

    match mtr_parser::parse(&outcome.stdout) {
        Ok(hops) => {
            let table = mtr_parser::render_table(&hops);
            json!({
                "status": "finished",
                "hops": hops,
                "rawOutput": table,
            })
        }
        Err(e) => json!({"status": "failed", "rawOutput": e.0}),
    }
}
