//! DNS lookup executor (spec §4.D "Per-kind specifics: dns"), wrapping
//! `dig`. No private-IP short-circuit applies here (the target is a DNS
//! query name, not a routed destination); instead the *resolver* address
//! embedded in dig's `SERVER:` line is masked before emission.

use super::command::{self, DEFAULT_COMMAND_TIMEOUT};
use crate::error::JobError;
use crate::parsers::{dig_classic, dig_trace};
use crate::private_ip;
use crate::progress_buffer::ProgressBuffer;
use common::{DnsOptions, DnsProtocol, DnsRecordType, IpVersion};
use serde_json::json;
use std::sync::Arc;

pub fn build_args(opts: &DnsOptions) -> Vec<String> {
    let mut args = Vec::new();
    match opts.ip_version.unwrap_or_default() {
        IpVersion::V4 => args.push("-4".to_string()),
        IpVersion::V6 => args.push("-6".to_string()),
    }
    if let Some(resolver) = &opts.query.resolver {
        args.push(format!("@{}", resolver));
    }
    if matches!(opts.query.r#type, DnsRecordType::Ptr) {
        args.push("-x".to_string());
        args.push(opts.target.clone());
    } else {
        args.push(opts.target.clone());
        args.push("-t".to_string());
        args.push(record_type_str(opts.query.r#type).to_string());
    }
    args.push("-p".to_string());
    args.push(opts.query.port.to_string());
    args.push("+timeout=3".to_string());
    args.push("+tries=2".to_string());
    args.push("+nocookie".to_string());
    args.push("+nsid".to_string());
    if matches!(opts.query.protocol, DnsProtocol::Tcp) {
        args.push("+tcp".to_string());
    }
    if opts.query.trace {
        args.push("+trace".to_string());
    }
    args
}

fn record_type_str(t: DnsRecordType) -> &'static str {
    match t {
        DnsRecordType::A => "A",
        DnsRecordType::Aaaa => "AAAA",
        DnsRecordType::Any => "ANY",
        DnsRecordType::Cname => "CNAME",
        DnsRecordType::Dnskey => "DNSKEY",
        DnsRecordType::Ds => "DS",
        DnsRecordType::Mx => "MX",
        DnsRecordType::Ns => "NS",
        DnsRecordType::Nsec => "NSEC",
        DnsRecordType::Ptr => "PTR",
        DnsRecordType::Rrsig => "RRSIG",
        DnsRecordType::Soa => "SOA",
        DnsRecordType::Txt => "TXT",
        DnsRecordType::Srv => "SRV",
    }
}

/// Masks any private-looking IP literal appearing in a `SERVER:` line,
/// leaving all other output untouched (spec §4.D: "Output is rewritten
/// before emission to mask private IP resolvers as x.x.x.x").
fn mask_private_resolvers(output: &str) -> String {
    output
        .lines()
        .map(|line| {
            if let Some(idx) = line.find("SERVER:") {
                let (head, tail) = line.split_at(idx + "SERVER:".len());
                if let Some(paren_start) = tail.find('(') {
                    if let Some(paren_end) = tail[paren_start..].find(')') {
                        let addr = &tail[paren_start + 1..paren_start + paren_end];
                        if private_ip::is_private_literal(addr) {
                            return format!(
                                "{}{}x.x.x.x{}",
                                head,
                                &tail[..paren_start + 1],
                                &tail[paren_start + paren_end..]
                            );
                        }
                    }
                }
            }
            line.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn run(opts: &DnsOptions, progress: Arc<ProgressBuffer>) -> serde_json::Value {
    if let Err(msg) = opts.validate() {
        progress.cancel_pending();
        return json!({"status": "failed", "rawOutput": msg});
    }

    let args = build_args(opts);
    let child = match command::spawn_unbuffered("dig", &args) {
        Ok(c) => c,
        Err(e) => {
            progress.cancel_pending();
            return json!({"status": "failed", "rawOutput": JobError::Internal(e).user_message()});
        }
    };

    let in_progress = opts.in_progress_updates;
    let progress_for_line = progress.clone();
    let outcome = command::drive(child, DEFAULT_COMMAND_TIMEOUT, move |line| {
        if in_progress {
            let masked = mask_private_resolvers(line);
            progress_for_line.push_progress(vec![("rawOutput", format!("{}\n", masked))]);
        }
        false
    })
    .await;

    progress.cancel_pending();

    if outcome.timed_out {
        return json!({
            "status": "failed",
            "rawOutput": format!("{}\nThe measurement command timed out.", mask_private_resolvers(outcome.stdout.trim_end()))
        });
    }
    if !outcome.exit_success {
        let raw = if !outcome.stderr.trim().is_empty() {
            mask_private_resolvers(outcome.stderr.trim())
        } else if !outcome.stdout.trim().is_empty() {
            mask_private_resolvers(outcome.stdout.trim())
        } else {
            "Test failed. Please try again.".to_string()
        };
        return json!({"status": "failed", "rawOutput": raw});
    }

    let masked_output = mask_private_resolvers(&outcome.stdout);

    if opts.query.trace {
        match dig_trace::parse(&outcome.stdout) {
            Ok(hops) => json!({
                "status": "finished",
                "hops": hops,
                "rawOutput": masked_output,
            }),
            Err(e) => json!({"status": "failed", "rawOutput": e.0}),
        }
    } else {
        match dig_classic::parse(&masked_output) {
            Ok(result) => json!({
                "status": "finished",
                "answers": result.answers,
                "timings": result.timings,
                "resolver": result.resolver,
                "rawOutput": masked_output,
            }),
            Err(e) => json!({"status": "failed", "rawOutput": e.0}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::DnsQuery;

    #[test]
    fn ptr_uses_dash_x_instead_of_target_arg() {
        let opts = DnsOptions {
            target: "8.8.8.8".into(),
            query: DnsQuery {
                r#type: DnsRecordType::Ptr,
                ..Default::default()
            },
            ip_version: None,
            in_progress_updates: false,
        };
        let args = build_args(&opts);
        assert!(args.contains(&"-x".to_string()));
        assert!(!args.contains(&"-t".to_string()));
    }

    #[test]
    fn masks_private_resolver_ip() {
        let line = ";; SERVER: 127.0.0.53#53(127.0.0.53)";
        assert_eq!(mask_private_resolvers(line), ";; SERVER: 127.0.0.53#53(x.x.x.x)");
        let public = ";; SERVER: 8.8.8.8#53(8.8.8.8)";
        assert_eq!(mask_private_resolvers(public), public);
    }
}
