//! Body decompression (spec §4.E): `gzip`/`x-gzip`, `br`, `deflate`, `zstd`
//! are decoded incrementally as each wire chunk arrives, so the engine's
//! download cap bounds decoded bytes rather than still-compressed ones and a
//! body truncated mid-stream still yields readable partial text. Anything
//! else passes through untouched.

use async_compression::tokio::write::{BrotliDecoder, GzipDecoder, ZlibDecoder, ZstdDecoder};
use tokio::io::{AsyncWrite, AsyncWriteExt};

enum Inner {
    Passthrough,
    Gzip(GzipDecoder<Vec<u8>>),
    Brotli(BrotliDecoder<Vec<u8>>),
    Zlib(ZlibDecoder<Vec<u8>>),
    Zstd(ZstdDecoder<Vec<u8>>),
}

trait InnerBuf {
    fn buf_mut(&mut self) -> &mut Vec<u8>;
}

impl InnerBuf for GzipDecoder<Vec<u8>> {
    fn buf_mut(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }
}

impl InnerBuf for BrotliDecoder<Vec<u8>> {
    fn buf_mut(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }
}

impl InnerBuf for ZlibDecoder<Vec<u8>> {
    fn buf_mut(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }
}

impl InnerBuf for ZstdDecoder<Vec<u8>> {
    fn buf_mut(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }
}

/// One decompression stream per response body. `push` feeds the next wire
/// chunk in and returns the decoded bytes it produced so far; `finish`
/// flushes whatever the format was still holding back once the body ends.
pub struct StreamDecoder {
    inner: Inner,
}

impl StreamDecoder {
    pub fn new(content_encoding: Option<&str>) -> Self {
        let inner = match content_encoding.map(|s| s.to_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => Inner::Gzip(GzipDecoder::new(Vec::new())),
            Some("br") => Inner::Brotli(BrotliDecoder::new(Vec::new())),
            Some("deflate") => Inner::Zlib(ZlibDecoder::new(Vec::new())),
            Some("zstd") => Inner::Zstd(ZstdDecoder::new(Vec::new())),
            _ => Inner::Passthrough,
        };
        Self { inner }
    }

    /// Feeds the next chunk of wire bytes through and returns the decoded
    /// bytes it produced. A write/flush error (malformed compressed data)
    /// yields no further output for that chunk rather than failing the body.
    pub async fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        match &mut self.inner {
            Inner::Passthrough => chunk.to_vec(),
            Inner::Gzip(w) => drain(w, chunk).await,
            Inner::Brotli(w) => drain(w, chunk).await,
            Inner::Zlib(w) => drain(w, chunk).await,
            Inner::Zstd(w) => drain(w, chunk).await,
        }
    }

    pub async fn finish(&mut self) -> Vec<u8> {
        match &mut self.inner {
            Inner::Passthrough => Vec::new(),
            Inner::Gzip(w) => finish(w).await,
            Inner::Brotli(w) => finish(w).await,
            Inner::Zlib(w) => finish(w).await,
            Inner::Zstd(w) => finish(w).await,
        }
    }
}

async fn drain<W>(writer: &mut W, chunk: &[u8]) -> Vec<u8>
where
    W: AsyncWrite + Unpin + InnerBuf,
{
    if writer.write_all(chunk).await.is_err() || writer.flush().await.is_err() {
        return Vec::new();
    }
    std::mem::take(writer.buf_mut())
}

async fn finish<W>(writer: &mut W) -> Vec<u8>
where
    W: AsyncWrite + Unpin + InnerBuf,
{
    let _ = writer.shutdown().await;
    std::mem::take(writer.buf_mut())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_encoding_is_passthrough() {
        let d = StreamDecoder::new(Some("compress"));
        assert!(matches!(d.inner, Inner::Passthrough));
        let d = StreamDecoder::new(None);
        assert!(matches!(d.inner, Inner::Passthrough));
    }

    #[tokio::test]
    async fn passthrough_returns_chunk_unchanged() {
        let mut d = StreamDecoder::new(None);
        assert_eq!(d.push(b"hello").await, b"hello".to_vec());
    }

    #[tokio::test]
    async fn gzip_round_trips_incrementally() {
        use async_compression::tokio::write::GzipEncoder;

        let mut encoder = GzipEncoder::new(Vec::new());
        encoder.write_all(b"hello decompression world").await.unwrap();
        encoder.shutdown().await.unwrap();
        let compressed = encoder.into_inner();

        let mut decoder = StreamDecoder::new(Some("gzip"));
        let mut decoded = Vec::new();
        for chunk in compressed.chunks(4) {
            decoded.extend(decoder.push(chunk).await);
        }
        decoded.extend(decoder.finish().await);
        assert_eq!(decoded, b"hello decompression world".to_vec());
    }
}
