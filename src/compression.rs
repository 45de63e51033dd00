//! Streaming gzip adapter.
//!
//! Vault files optionally carry their payload as a bare gzip stream (no
//! outer framing). The adapter sniffs the two gzip magic bytes to recognize
//! compressed input, so readers never depend on the file extension alone.

use async_compression::tokio::bufread::{GzipDecoder, GzipEncoder};
use async_compression::tokio::write;
use async_compression::Level;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::pool::{BufferPool, PooledBuf};
use crate::error::Result;

/// gzip stream magic bytes.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Effort/size trade-off for the deflate stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    Fastest,
    #[default]
    Optimal,
    SmallestSize,
}

impl CompressionLevel {
    fn to_level(self) -> Level {
        match self {
            CompressionLevel::Fastest => Level::Fastest,
            CompressionLevel::Optimal => Level::Default,
            CompressionLevel::SmallestSize => Level::Best,
        }
    }
}

/// Whether `bytes` starts with the gzip magic.
pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.len() >= GZIP_MAGIC.len() && bytes[..GZIP_MAGIC.len()] == GZIP_MAGIC
}

/// Compress a full buffer.
pub async fn compress(bytes: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut encoder = GzipEncoder::with_quality(bytes, level.to_level());
    let mut out = Vec::with_capacity(bytes.len() / 2 + 64);
    encoder.read_to_end(&mut out).await?;
    Ok(out)
}

/// Decompress a full buffer.
pub async fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzipDecoder::new(bytes);
    decoder.multiple_members(true);
    let mut out = Vec::with_capacity(bytes.len() * 3);
    decoder.read_to_end(&mut out).await?;
    Ok(out)
}

/// Compress a buffer onto a stream, finishing the gzip member.
pub async fn compress_to<W: AsyncWrite + Unpin>(
    bytes: &[u8],
    level: CompressionLevel,
    writer: &mut W,
) -> Result<()> {
    let mut encoder = write::GzipEncoder::with_quality(writer, level.to_level());
    encoder.write_all(bytes).await?;
    encoder.shutdown().await?;
    Ok(())
}

/// Decompress everything remaining on a stream.
pub async fn decompress_from<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut decoder = GzipDecoder::new(reader);
    decoder.multiple_members(true);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).await?;
    Ok(out)
}

/// Decompress into a pooled buffer, growing geometrically from the caller's
/// size estimate. The estimate is a starting point, never a limit.
pub async fn decompress_pooled(bytes: &[u8], estimate: usize) -> Result<PooledBuf> {
    let mut decoder = GzipDecoder::new(bytes);
    decoder.multiple_members(true);

    let mut buf = BufferPool::global().get(estimate.max(1024));
    let vec = buf.vec_mut();
    vec.resize(vec.capacity(), 0);

    let mut filled = 0;
    loop {
        if filled == vec.len() {
            // Exhausted: double.
            let doubled = vec.len() * 2;
            vec.resize(doubled, 0);
        }
        let n = decoder.read(&mut vec[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    vec.truncate(filled);
    Ok(buf)
}
