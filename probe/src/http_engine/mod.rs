//! HTTP Test Engine (spec §4.E): a hand-assembled HTTP/1.1 + HTTP/2 client
//! so each phase boundary (`dns`, `tcp`, `tls`, `firstByte`, `download`,
//! `total`) can be timestamped, the body can be capped mid-stream, and TLS
//! certificate details can be surfaced — none of which an off-the-shelf
//! client makes easy to do all at once.

mod decompress;
mod h1;
mod h2_client;
mod tls;

use crate::error::JobError;
use crate::private_ip;
use crate::progress_buffer::ProgressBuffer;
use crate::resolver;
use common::{HttpMethod, HttpOptions, HttpProtocol, IpVersion};
use http::Request;
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

const DOWNLOAD_LIMIT: usize = 10_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct Timings {
    dns: u64,
    tcp: u64,
    tls: Option<u64>,
    first_byte: u64,
    download: u64,
    total: u64,
}

pub async fn run(opts: &HttpOptions, progress: Arc<ProgressBuffer>) -> serde_json::Value {
    if let Err(msg) = opts.validate() {
        progress.cancel_pending();
        return json!({"status": "failed", "rawOutput": msg});
    }

    match tokio::time::timeout(REQUEST_TIMEOUT, run_inner(opts, progress.clone())).await {
        Ok(value) => value,
        Err(_) => {
            progress.cancel_pending();
            failure_json(&JobError::RequestTimeout)
        }
    }
}

fn failure_json(err: &JobError) -> serde_json::Value {
    json!({
        "status": "failed",
        "rawOutput": err.user_message(),
        "headers": serde_json::Value::Null,
        "rawHeaders": serde_json::Value::Null,
        "rawBody": serde_json::Value::Null,
        "statusCode": serde_json::Value::Null,
    })
}

async fn run_inner(opts: &HttpOptions, progress: Arc<ProgressBuffer>) -> serde_json::Value {
    let start = Instant::now();
    let ip_version = opts.ip_version.unwrap_or(IpVersion::V4);

    let address = match resolver::resolve(&opts.target, ip_version).await {
        Ok(a) => a,
        Err(e) => {
            progress.cancel_pending();
            return failure_json(&JobError::Network(e.to_string()));
        }
    };

    if private_ip::is_private(address) {
        progress.cancel_pending();
        return json!({"status": "failed", "rawOutput": "Private IP ranges are not allowed"});
    }

    let dns_at = start.elapsed().as_millis() as u64;
    let port = opts.resolved_port();
    let socket_addr = SocketAddr::new(address, port);

    let tcp_stream = match TcpStream::connect(socket_addr).await {
        Ok(s) => s,
        Err(e) => {
            progress.cancel_pending();
            return failure_json(&JobError::Network(e.to_string()));
        }
    };
    let tcp_at = start.elapsed().as_millis() as u64;

    let host_header = opts
        .request
        .host
        .clone()
        .unwrap_or_else(|| opts.target.clone());
    let is_literal = opts.target.parse::<std::net::IpAddr>().is_ok();
    let sni = if is_literal { host_header.clone() } else { opts.target.clone() };

    let method = http_method_str(opts.request.method);
    let path = normalize_path_and_query(&opts.request.path, &opts.request.query);
    let mut headers = default_headers(opts, &host_header);
    for (k, v) in &opts.request.headers {
        headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(k));
        headers.push((k.clone(), v.clone()));
    }

    let result = match opts.protocol {
        HttpProtocol::Http => {
            run_h1_over(tcp_stream, &method, &path, &headers, None, start, dns_at, tcp_at, &progress, opts)
                .await
        }
        HttpProtocol::Https => {
            let (tls_stream, tls_at, tls_info) =
                match connect_tls(tcp_stream, &sni, &["http/1.1"], start).await {
                    Ok(v) => v,
                    Err(e) => {
                        progress.cancel_pending();
                        return failure_json(&e);
                    }
                };
            run_h1_over(
                tls_stream,
                &method,
                &path,
                &headers,
                Some((tls_at, tls_info)),
                start,
                dns_at,
                tcp_at,
                &progress,
                opts,
            )
            .await
        }
        HttpProtocol::Http2 => {
            let (tls_stream, tls_at, tls_info, negotiated_h2) =
                match connect_tls_h2(tcp_stream, &sni, start).await {
                    Ok(v) => v,
                    Err(e) => {
                        progress.cancel_pending();
                        return failure_json(&e);
                    }
                };
            if !negotiated_h2 {
                progress.cancel_pending();
                return failure_json(&JobError::Http2Unsupported);
            }
            run_h2_over(
                tls_stream,
                &method,
                &path,
                &headers,
                &host_header,
                tls_at,
                tls_info,
                start,
                dns_at,
                tcp_at,
                &progress,
                opts,
            )
            .await
        }
    };

    progress.cancel_pending();
    let mut result = result;
    if let Some(obj) = result.as_object_mut() {
        obj.insert("resolvedAddress".to_string(), json!(address.to_string()));
    }
    result
}

fn http_method_str(m: HttpMethod) -> String {
    match m {
        HttpMethod::Get => "GET".to_string(),
        HttpMethod::Head => "HEAD".to_string(),
        HttpMethod::Options => "OPTIONS".to_string(),
    }
}

fn normalize_path_and_query(path: &str, query: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let query = query.trim_start_matches('?');
    if query.is_empty() {
        path
    } else {
        format!("{}?{}", path, query)
    }
}

fn default_headers(opts: &HttpOptions, host_header: &str) -> Vec<(String, String)> {
    vec![
        (
            "Accept-Encoding".to_string(),
            "gzip, deflate, br, zstd".to_string(),
        ),
        (
            "User-Agent".to_string(),
            format!("globalping probe ({})", opts.target),
        ),
        ("Host".to_string(), host_header.to_string()),
        ("Connection".to_string(), "close".to_string()),
    ]
}

async fn connect_tls(
    tcp_stream: TcpStream,
    sni: &str,
    alpn: &[&str],
    start: Instant,
) -> Result<(tokio_rustls::client::TlsStream<TcpStream>, u64, tls::TlsInfo), JobError> {
    let config = Arc::new(tls::client_config(alpn));
    let connector = TlsConnector::from(config);
    let server_name = rustls_pki_types::ServerName::try_from(sni.to_string())
        .map_err(|_| JobError::Network(format!("invalid server name: {}", sni)))?;
    let stream = connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| JobError::Network(e.to_string()))?;

    let tls_at = start.elapsed().as_millis() as u64;
    let (_, conn) = stream.get_ref();
    let mut info = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|c| tls::describe_cert(c.as_ref()))
        .unwrap_or_default();
    info.protocol = conn.protocol_version().map(|v| format!("{:?}", v));
    info.cipher_name = conn.negotiated_cipher_suite().map(|c| format!("{:?}", c.suite()));
    Ok((stream, tls_at, info))
}

async fn connect_tls_h2(
    tcp_stream: TcpStream,
    sni: &str,
    start: Instant,
) -> Result<(tokio_rustls::client::TlsStream<TcpStream>, u64, tls::TlsInfo, bool), JobError> {
    let (stream, tls_at, info) = connect_tls(tcp_stream, sni, &["h2"], start).await?;
    let negotiated_h2 = {
        let (_, conn) = stream.get_ref();
        conn.alpn_protocol() == Some(b"h2")
    };
    Ok((stream, tls_at, info, negotiated_h2))
}

#[allow(clippy::too_many_arguments)]
async fn run_h1_over<S>(
    stream: S,
    method: &str,
    path: &str,
    headers: &[(String, String)],
    tls: Option<(u64, tls::TlsInfo)>,
    start: Instant,
    dns_at: u64,
    tcp_at: u64,
    progress: &Arc<ProgressBuffer>,
    opts: &HttpOptions,
) -> serde_json::Value
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let request = h1::build_request(method, path, headers);
    let in_progress = opts.in_progress_updates;
    let is_head = matches!(opts.request.method, HttpMethod::Head);

    let mut first_byte_at = 0u64;
    let mut header_sent = false;
    let progress_for_first = progress.clone();
    let on_first_byte = || {
        first_byte_at = start.elapsed().as_millis() as u64;
    };

    let response = match h1::send(
        stream,
        &request,
        DOWNLOAD_LIMIT,
        on_first_byte,
        |chunk: &[u8]| {
            if in_progress {
                if !header_sent {
                    header_sent = true;
                }
                progress_for_first.push_progress(vec![(
                    "rawBody",
                    String::from_utf8_lossy(chunk).to_string(),
                )]);
            }
        },
    )
    .await
    {
        Ok(r) => r,
        Err(e) => return failure_json(&e),
    };

    let download_at = start.elapsed().as_millis() as u64;
    let body_text = String::from_utf8_lossy(&response.body).to_string();

    let raw_output = build_raw_output(
        "1.1",
        response.status_code,
        &response.status_text,
        &response.raw_headers,
        &body_text,
        is_head,
    );

    let timings = Timings {
        dns: dns_at,
        tcp: tcp_at,
        tls: tls.as_ref().map(|(t, _)| *t),
        first_byte: first_byte_at,
        download: download_at,
        total: start.elapsed().as_millis() as u64,
    };

    json!({
        "status": "finished",
        "headers": response.headers.into_iter().collect::<std::collections::BTreeMap<_,_>>(),
        "rawHeaders": response.raw_headers,
        "rawBody": body_text,
        "rawOutput": raw_output,
        "truncated": response.truncated,
        "statusCode": response.status_code,
        "statusCodeName": response.status_text,
        "timings": timings,
        "tls": tls.map(|(_, info)| info),
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_h2_over<S>(
    stream: S,
    method: &str,
    path: &str,
    headers: &[(String, String)],
    host_header: &str,
    tls_at: u64,
    tls_info: tls::TlsInfo,
    start: Instant,
    dns_at: u64,
    tcp_at: u64,
    progress: &Arc<ProgressBuffer>,
    opts: &HttpOptions,
) -> serde_json::Value
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let mut builder = Request::builder().method(method).uri(path).version(http::Version::HTTP_2);
    for (k, v) in headers {
        if k.eq_ignore_ascii_case("connection") {
            continue; // hop-by-hop header, invalid in h2
        }
        builder = builder.header(k, v);
    }
    builder = builder.header("host", host_header);
    let request = match builder.body(()) {
        Ok(r) => r,
        Err(e) => return failure_json(&JobError::Network(e.to_string())),
    };

    let in_progress = opts.in_progress_updates;
    let is_head = matches!(opts.request.method, HttpMethod::Head);
    let mut first_byte_at = 0u64;
    let on_first_byte = || {
        first_byte_at = start.elapsed().as_millis() as u64;
    };
    let progress_for_chunk = progress.clone();

    let response = match h2_client::send(stream, request, DOWNLOAD_LIMIT, on_first_byte, |chunk| {
        if in_progress {
            progress_for_chunk.push_progress(vec![(
                "rawBody",
                String::from_utf8_lossy(chunk).to_string(),
            )]);
        }
    })
    .await
    {
        Ok(r) => r,
        Err(e) => return failure_json(&e),
    };

    let download_at = start.elapsed().as_millis() as u64;
    let body_text = String::from_utf8_lossy(&response.body).to_string();
    let status_text = http::StatusCode::from_u16(response.status_code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
        .to_string();

    let raw_output = build_raw_output(
        "2.0",
        response.status_code,
        &status_text,
        &response.raw_headers,
        &body_text,
        is_head,
    );

    let timings = Timings {
        dns: dns_at,
        tcp: tcp_at,
        tls: Some(tls_at),
        first_byte: first_byte_at,
        download: download_at,
        total: start.elapsed().as_millis() as u64,
    };

    json!({
        "status": "finished",
        "headers": response.headers.into_iter().collect::<std::collections::BTreeMap<_,_>>(),
        "rawHeaders": response.raw_headers,
        "rawBody": body_text,
        "rawOutput": raw_output,
        "truncated": response.truncated,
        "statusCode": response.status_code,
        "statusCodeName": status_text,
        "timings": timings,
        "tls": tls_info,
    })
}


fn build_raw_output(
    version: &str,
    status: u16,
    _status_text: &str,
    raw_headers: &str,
    body: &str,
    is_head_or_empty_forced: bool,
) -> String {
    let status_line = format!("HTTP/{} {}", version, status);
    let headers_block = format!("{}\n{}", status_line, raw_headers.trim_end());
    if is_head_or_empty_forced || body.is_empty() {
        headers_block
    } else {
        format!("{}\n\n{}", headers_block, body)
    }
}
