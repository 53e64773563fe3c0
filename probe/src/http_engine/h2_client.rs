//! HTTP/2 request/response via the `h2` crate (spec §4.E): used when ALPN
//! negotiates `h2`; the engine fails the test otherwise (spec: "HTTP/2 not
//! supported by the server.").

use super::decompress::StreamDecoder;
use crate::error::JobError;
use bytes::Bytes;
use http::{Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};

pub struct H2Response {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub raw_headers: String,
    pub body: Vec<u8>,
    pub truncated: bool,
}

pub async fn send<S, FB, FC>(
    stream: S,
    request: Request<()>,
    download_limit: usize,
    mut on_first_byte: FB,
    mut on_chunk: FC,
) -> Result<H2Response, JobError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    FB: FnMut(),
    FC: FnMut(&[u8]),
{
    let (mut client, connection) = h2::client::handshake(stream)
        .await
        .map_err(|e| JobError::Network(e.to_string()))?;

    tokio::spawn(async move {
        let _ = connection.await;
    });

    client
        .ready()
        .await
        .map_err(|e| JobError::Network(e.to_string()))?;
    let (response_fut, _send_stream) = client
        .send_request(request, true)
        .map_err(|e| JobError::Network(e.to_string()))?;

    let response: Response<h2::RecvStream> = response_fut
        .await
        .map_err(|e| JobError::Network(e.to_string()))?;

    on_first_byte();

    let status_code = response.status().as_u16();
    let mut headers = Vec::new();
    let mut raw_headers = String::new();
    for (name, value) in response.headers() {
        let v = value.to_str().unwrap_or("").to_string();
        raw_headers.push_str(&format!("{}: {}\n", name.as_str(), v));
        headers.push((name.as_str().to_lowercase(), v));
    }

    let content_encoding = headers
        .iter()
        .find(|(k, _)| k == "content-encoding")
        .map(|(_, v)| v.clone());
    let mut decoder = StreamDecoder::new(content_encoding.as_deref());

    let mut body_stream = response.into_body();
    let mut body = Vec::new();
    let mut truncated = false;
    while let Some(chunk) = body_stream.data().await {
        let chunk: Bytes = chunk.map_err(|e| JobError::Network(e.to_string()))?;
        let _ = body_stream.flow_control().release_capacity(chunk.len());
        let decoded = decoder.push(&chunk).await;
        cap_and_emit(&mut body, &decoded, download_limit, &mut truncated, &mut on_chunk);
        if truncated {
            break;
        }
    }
    if !truncated {
        let tail = decoder.finish().await;
        cap_and_emit(&mut body, &tail, download_limit, &mut truncated, &mut on_chunk);
    }

    Ok(H2Response {
        status_code,
        headers,
        raw_headers,
        body,
        truncated,
    })
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
