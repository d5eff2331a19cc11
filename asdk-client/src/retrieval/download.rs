//! Streaming download with percentage progress

use crate::error::{AsdkError, AsdkResult};
use crate::transport::AvatarSdkClient;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, CONTENT_ENCODING, CONTENT_LENGTH};
use tracing::{debug, info};

/// Uncompressed size sent alongside encoded responses
pub const FILE_SIZE_HEADER: &str = "x-file-size";

/// Upper bound for the initial buffer; the header value is not trusted further
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Body delivered piece by piece
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, `None` at end of body
    async fn next_chunk(&mut self) -> AsdkResult<Option<Bytes>>;
}

#[async_trait]
impl ChunkSource for reqwest::Response {
    async fn next_chunk(&mut self) -> AsdkResult<Option<Bytes>> {
        Ok(self.chunk().await?)
    }
}

/// Total size of a download from its response headers
///
/// An encoded body hides its real length, so `x-file-size` is required then.
/// Otherwise `content-length` is used, with `x-file-size` as fallback (the
/// HTTP stack drops `content-length` when it decodes the body itself).
pub fn total_size(headers: &HeaderMap) -> AsdkResult<u64> {
    let file_size = header_u64(headers, FILE_SIZE_HEADER);

    if headers.contains_key(CONTENT_ENCODING) {
        return file_size.ok_or_else(|| AsdkError::MissingHeader(FILE_SIZE_HEADER.to_string()));
    }

    header_u64(headers, CONTENT_LENGTH.as_str())
        .or(file_size)
        .ok_or_else(|| AsdkError::MissingHeader(CONTENT_LENGTH.as_str().to_string()))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// `round(100 * read / total)`, capped at 100
pub fn percent(read: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (100.0 * read as f64 / total as f64).round();
    pct.min(100.0) as u8
}

/// Read `source` to the end, reporting progress after every chunk
///
/// Reported values never decrease and the last one is always 100.
pub async fn read_with_progress<S, P>(
    source: &mut S,
    total: u64,
    mut on_progress: P,
) -> AsdkResult<Bytes>
where
    S: ChunkSource + ?Sized,
    P: FnMut(u8) + Send,
{
    let mut buf = BytesMut::with_capacity(total.min(MAX_PREALLOC) as usize);
    let mut read: u64 = 0;
    let mut last: Option<u8> = None;

    while let Some(chunk) = source.next_chunk().await? {
        read += chunk.len() as u64;
        buf.extend_from_slice(&chunk);

        let pct = percent(read, total).max(last.unwrap_or(0));
        on_progress(pct);
        last = Some(pct);
    }

    if last != Some(100) {
        on_progress(100);
    }

    debug!(read, total, "Download finished");
    Ok(buf.freeze())
}

/// Download `url` through the client with progress reporting
pub async fn download_with_progress<P>(
    client: &AvatarSdkClient,
    url: &str,
    on_progress: P,
) -> AsdkResult<Bytes>
where
    P: FnMut(u8) + Send,
{
    let mut response = client.open_file(url).await?;
    let total = total_size(response.headers())?;

    info!(url = %url, total, "Downloading export file");
    read_with_progress(&mut response, total, on_progress).await
}
