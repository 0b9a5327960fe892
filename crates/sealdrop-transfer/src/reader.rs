//! Sequential, bounded-memory chunk reader.
//!
//! Slices a large input into plaintext chunks of at most `plain_chunk_size`
//! bytes without ever materializing the whole input. This is the only
//! component in the pipeline that tracks a byte offset into the source.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use sealdrop_core::{SealdropError, SealdropResult, TransferPlan};

/// One plaintext chunk as read from the source.
#[derive(Debug, Clone)]
pub struct PlainChunk {
    pub bytes: Bytes,
    /// Set on the final chunk. The final chunk is short unless the total
    /// size divides evenly by the chunk size.
    pub is_last: bool,
}

pub struct ChunkReader<R> {
    source: R,
    plan: TransferPlan,
    offset: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    pub fn new(source: R, plan: TransferPlan) -> Self {
        Self {
            source,
            plan,
            offset: 0,
        }
    }

    /// Read the next chunk. Returns `None` once `total_size` bytes have been
    /// consumed; never reads past it. A source that ends before delivering
    /// the declared size is a protocol violation.
    pub async fn next(&mut self) -> SealdropResult<Option<PlainChunk>> {
        if self.offset >= self.plan.total_size {
            return Ok(None);
        }

        let remaining = self.plan.total_size - self.offset;
        let want = remaining.min(self.plan.plain_chunk_size as u64) as usize;

        let mut buf = BytesMut::zeroed(want);
        let mut filled = 0usize;
        while filled < want {
            let n = self.source.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(SealdropError::Protocol(format!(
                    "source ended at byte {} but {} bytes were declared",
                    self.offset + filled as u64,
                    self.plan.total_size
                )));
            }
            filled += n;
        }

        self.offset += want as u64;
        Ok(Some(PlainChunk {
            bytes: buf.freeze(),
            is_last: self.offset == self.plan.total_size,
        }))
    }
}
