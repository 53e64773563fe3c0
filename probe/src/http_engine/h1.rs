//! Hand-rolled HTTP/1.1 request/response handling (spec §4.E): driven by
//! hand rather than through an off-the-shelf client so each phase boundary
//! (`firstByte`, `download`) can be timestamped and the body can be capped
//! mid-stream.

use super::decompress::StreamDecoder;
use crate::error::JobError;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub struct H1Response {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub raw_headers: String,
    pub body: Vec<u8>,
    pub truncated: bool,
}

pub fn build_request(
    method: &str,
    path_and_query: &str,
    headers: &[(String, String)],
) -> Vec<u8> {
    let mut req = format!("{} {} HTTP/1.1\r\n", method, path_and_query);
    for (k, v) in headers {
        req.push_str(&format!("{}: {}\r\n", k, v));
    }
    req.push_str("\r\n");
    req.into_bytes()
}

/// Writes `request`, then reads and parses the response, decoding the body
/// (per its `Content-Encoding`) and capping the *decoded* output at
/// `download_limit` bytes. `on_first_byte` fires once, as soon as the status
/// line is fully read. `on_chunk` fires for every decoded body chunk as it
/// arrives (used to drive progress frames).
pub async fn send<S, FB, FC>(
    mut stream: S,
    request: &[u8],
    download_limit: usize,
    mut on_first_byte: FB,
    mut on_chunk: FC,
) -> Result<H1Response, JobError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    FB: FnMut(),
    FC: FnMut(&[u8]),
{
    stream
        .write_all(request)
        .await
        .map_err(|e| JobError::Network(e.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|e| JobError::Network(e.to_string()))?;

    let mut reader = BufReader::new(stream);

    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(|e| JobError::Network(e.to_string()))?;
    if status_line.is_empty() {
        return Err(JobError::Network("connection closed before response".into()));
    }
    let status_line = status_line.trim_end();
    let mut parts = status_line.splitn(3, ' ');
    let _http_version = parts.next().unwrap_or("HTTP/1.1");
    let status_code: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| JobError::Network("malformed status line".into()))?;
    let status_text = parts.next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    let mut raw_headers = String::new();
    loop {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| JobError::Network(e.to_string()))?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        raw_headers.push_str(trimmed);
        raw_headers.push('\n');
        if let Some((k, v)) = trimmed.split_once(':') {
            headers.push((k.trim().to_lowercase(), v.trim().to_string()));
        }
    }

    on_first_byte();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok());
    let chunked = headers
        .iter()
        .any(|(k, v)| k == "transfer-encoding" && v.to_lowercase().contains("chunked"));
    let content_encoding = headers
        .iter()
        .find(|(k, _)| k == "content-encoding")
        .map(|(_, v)| v.clone());

    let mut decoder = StreamDecoder::new(content_encoding.as_deref());
    let mut body = Vec::new();
    let mut truncated = false;

    if chunked {
        read_chunked(&mut reader, download_limit, &mut body, &mut truncated, &mut decoder, &mut on_chunk).await?;
    } else if let Some(len) = content_length {
        read_fixed(&mut reader, len, download_limit, &mut body, &mut truncated, &mut decoder, &mut on_chunk)
            .await?;
    } else {
        read_to_eof(&mut reader, download_limit, &mut body, &mut truncated, &mut decoder, &mut on_chunk).await?;
    }

    if !truncated {
        let tail = decoder.finish().await;
        cap_and_emit(&mut body, &tail, download_limit, &mut truncated, &mut on_chunk);
    }

    Ok(H1Response {
        status_code,
        status_text,
        headers,
        raw_headers,
        body,
        truncated,
    })
}

async fn read_fixed<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    len: usize,
    limit: usize,
    body: &mut Vec<u8>,
    truncated: &mut bool,
    decoder: &mut StreamDecoder,
    on_chunk: &mut impl FnMut(&[u8]),
) -> Result<(), JobError> {
    let mut remaining = len;
    let mut buf = [0u8; 4096];
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = reader
            .read(&mut buf[..want])
            .await
            .map_err(|e| JobError::Network(e.to_string()))?;
        if n == 0 {
            break;
        }
        remaining -= n;
        push_capped(body, &buf[..n], limit, truncated, decoder, on_chunk).await;
        if *truncated {
            break;
        }
    }
    Ok(())
}

async fn read_to_eof<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    limit: usize,
    body: &mut Vec<u8>,
    truncated: &mut bool,
    decoder: &mut StreamDecoder,
    on_chunk: &mut impl FnMut(&[u8]),
) -> Result<(), JobError> {
    let mut buf = [0u8; 4096];
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| JobError::Network(e.to_string()))?;
        if n == 0 {
            break;
        }
        push_capped(body, &buf[..n], limit, truncated, decoder, on_chunk).await;
        if *truncated {
            break;
        }
    }
    Ok(())
}

async fn read_chunked<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    limit: usize,
    body: &mut Vec<u8>,
    truncated: &mut bool,
    decoder: &mut StreamDecoder,
    on_chunk: &mut impl FnMut(&[u8]),
) -> Result<(), JobError> {
    loop {
        let mut size_line = String::new();
        reader
            .read_line(&mut size_line)
            .await
            .map_err(|e| JobError::Network(e.to_string()))?;
        let size_line = size_line.trim();
        let size_str = size_line.split(';').next().unwrap_or("0");
        let size = usize::from_str_radix(size_str, 16).unwrap_or(0);
        if size == 0 {
            // consume trailing headers until blank line
            loop {
                let mut trailer = String::new();
                reader
                    .read_line(&mut trailer)
                    .await
                    .map_err(|e| JobError::Network(e.to_string()))?;
                if trailer.trim().is_empty() {
                    break;
                }
            }
            break;
        }
        let mut chunk = vec![0u8; size];
        reader
            .read_exact(&mut chunk)
            .await
            .map_err(|e| JobError::Network(e.to_string()))?;
        let mut crlf = [0u8; 2];
        let _ = reader.read_exact(&mut crlf).await;
        push_capped(body, &chunk, limit, truncated, decoder, on_chunk).await;
        if *truncated {
            break;
        }
    }
    Ok(())
}

/// Decodes `raw_chunk` through `decoder` and caps the decoded output against
/// `limit`, so truncation always bounds the bytes the caller actually sees.
async fn push_capped(
    body: &mut Vec<u8>,
    raw_chunk: &[u8],
    limit: usize,
    truncated: &mut bool,
    decoder: &mut StreamDecoder,
    on_chunk: &mut impl FnMut(&[u8]),
) {
    let decoded = decoder.push(raw_chunk).await;
    cap_and_emit(body, &decoded, limit, truncated, on_chunk);
}

fn cap_and_emit(
    body: &mut Vec<u8>,
    decoded: &[u8],
    limit: usize,
    truncated: &mut bool,
    on_chunk: &mut impl FnMut(&[u8]),
) {
    if decoded.is_empty() {
        return;
    }
    let remaining_capacity = limit.saturating_sub(body.len());
    if remaining_capacity == 0 {
        *truncated = true;
        return;
    }
    let take = decoded.len().min(remaining_capacity);
    body.extend_from_slice(&decoded[..take]);
    on_chunk(&decoded[..take]);
    if take < decoded.len() {
        *truncated = true;
    }
}
