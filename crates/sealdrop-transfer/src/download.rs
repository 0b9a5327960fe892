//! Download session: metadata validation + ciphertext stream + coalescer.
//!
//! The persisted `plain_chunk_size` is trusted completely — there is no
//! independent verification channel. A wrong value makes every frame fail
//! authentication rather than silently succeed, so the failure mode is loud.

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use sealdrop_core::{ObjectHandle, ObjectMeta, SealdropError, SealdropResult, TransferPlan};
use sealdrop_crypto::SecretKey;

use crate::client::{ByteStream, CiphertextSource};
use crate::coalescer::FrameCoalescer;

/// One reconstruction of a remote object. Owns the coalescer's carry-over
/// buffer; dropped when the stream closes or errors.
pub struct DownloadSession {
    meta: ObjectMeta,
    coalescer: FrameCoalescer<ByteStream>,
}

impl std::fmt::Debug for DownloadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadSession")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl DownloadSession {
    /// Validate metadata and open the ciphertext stream. Protocol violations
    /// (zero chunk size, part count disagreeing with the declared size) are
    /// reported here, before any bytes move.
    pub async fn open<S: CiphertextSource>(
        source: &S,
        handle: &ObjectHandle,
        key: SecretKey,
    ) -> SealdropResult<Self> {
        let meta = source.read_meta(handle).await?;

        if meta.plain_chunk_size == 0 {
            return Err(SealdropError::Protocol(format!(
                "object {handle}: metadata has zero chunk size"
            )));
        }
        let expected = TransferPlan::new(meta.total_size, meta.plain_chunk_size);
        if expected.total_parts != meta.total_parts {
            return Err(SealdropError::Protocol(format!(
                "object {handle}: metadata declares {} parts but {} bytes at {}-byte chunks is {} parts",
                meta.total_parts, meta.total_size, meta.plain_chunk_size, expected.total_parts
            )));
        }

        debug!(
            object = %handle,
            total_size = meta.total_size,
            chunk_size = meta.plain_chunk_size,
            total_parts = meta.total_parts,
            "download session open"
        );

        let ciphertext = source.open(handle).await?;
        let coalescer = FrameCoalescer::new(ciphertext, key, meta.plain_chunk_size);
        Ok(Self { meta, coalescer })
    }

    pub fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    /// Next decrypted chunk, in order. `None` after the final chunk and
    /// after any error; an authentication failure terminates the stream and
    /// whatever was already emitted must be discarded by the consumer.
    pub async fn next_chunk(&mut self) -> Option<SealdropResult<Bytes>> {
        self.coalescer.next_chunk().await
    }

    /// The plaintext as a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = SealdropResult<Bytes>> + Send {
        self.coalescer.into_stream()
    }

    /// Stream the whole plaintext into a writer with constant buffering.
    /// Returns the byte count, which is checked against the declared size so
    /// a short ciphertext stream cannot pass as a complete download.
    pub async fn copy_to<W: AsyncWrite + Unpin>(mut self, writer: &mut W) -> SealdropResult<u64> {
        let mut written: u64 = 0;
        while let Some(chunk) = self.coalescer.next_chunk().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        if written != self.meta.total_size {
            return Err(SealdropError::Protocol(format!(
                "short download: {written} bytes of {}",
                self.meta.total_size
            )));
        }
        info!(bytes = written, "download complete");
        Ok(written)
    }
}
