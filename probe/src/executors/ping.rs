//! ICMP ping executor (spec §4.D "Per-kind specifics: ping").

use super::command::{self, DEFAULT_COMMAND_TIMEOUT};
use crate::error::JobError;
use crate::parsers::ping as ping_parser;
use crate::private_ip;
use crate::progress_buffer::{Mode, ProgressBuffer};
use common::{IpVersion, PingOptions};
use serde_json::json;
use std::sync::Arc;

pub fn build_args(opts: &PingOptions) -> Vec<String> {
    let mut args = Vec::new();
    match opts.ip_version.unwrap_or_default() {
        IpVersion::V4 => args.push("-4".to_string()),
        IpVersion::V6 => args.push("-6".to_string()),
    }
    args.push("-c".to_string());
    args.push(opts.packets.to_string());
    args.push("-i".to_string());
    args.push("0.2".to_string());
    args.push("-w".to_string());
    args.push("15".to_string());
    args.push(opts.target.clone());
    args
}

pub async fn run(opts: &PingOptions, progress: Arc<ProgressBuffer>) -> serde_json::Value {
    if let Err(msg) = opts.validate() {
        progress.cancel_pending();
        return json!({"status": "failed", "rawOutput": msg});
    }

    let args = build_args(opts);
    let child = match command::spawn_unbuffered("ping", &args) {
        Ok(c) => c,
        Err(e) => {
            progress.cancel_pending();
            return json!({"status": "failed", "rawOutput": JobError::Internal(e).user_message()});
        }
    };

    let mut private_hit = false;
    let mut header_checked = false;
    let in_progress = opts.in_progress_updates;
    let progress_for_line = progress.clone();

    let outcome = command::drive(child, DEFAULT_COMMAND_TIMEOUT, |line| {
        if in_progress {
            progress_for_line.push_progress(vec![("rawOutput", format!("{}\n", line))]);
        }
        if !header_checked && line.starts_with("PING ") {
            header_checked = true;
            if let Some(addr) = line
                .split('(')
                .nth(1)
                .and_then(|rest| rest.split(')').next())
            {
                if private_ip::is_private_literal(addr) {
                    private_hit = true;
                    return true;
                }
            }
        }
        false
    })
    .await;

    progress.cancel_pending();

    if private_hit || outcome.killed && !outcome.timed_out {
        return json!({"status": "failed", "rawOutput": "Private IP ranges are not allowed"});
    }
    if outcome.timed_out {
        return json!({
            "status": "failed",
            "rawOutput": format!("{}\nThe measurement command timed out.", outcome.stdout.trim_end())
        });
    }
    if !outcome.exit_success {
        let raw = if !outcome.stderr.trim().is_empty() {
            outcome.stderr.trim().to_string()
        } else if !outcome.stdout.trim().is_empty() {
            outcome.stdout.trim().to_string()
        } else {
            "Test failed. Please try again.".to_string()
        };
        return json!({"status": "failed", "rawOutput": raw});
    }

    match ping_parser::parse(&outcome.stdout) {
        Ok(result) => json!({
            "status": "finished",
            "resolvedAddress": result.resolved_address,
            "timings": result.timings,
            "stats": result.stats,
            "rawOutput": outcome.stdout,
        }),
        Err(e) => json!({"status": "failed", "rawOutput": e.0}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_argv() {
        let opts = PingOptions {
            target: "example.com".into(),
            packets: 5,
            ip_version: Some(IpVersion::V6),
            in_progress_updates: false,
            protocol: None,
            port: None,
        };
        let args = build_args(&opts);
        assert_eq!(args, vec!["-6", "-c", "5", "-i", "0.2", "-w", "15", "example.com"]);
    }
}
