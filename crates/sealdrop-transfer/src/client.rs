//! Contracts the pipeline consumes: the multipart upload protocol on the
//! sending side and the ciphertext object source on the receiving side.
//!
//! Both are traits so the scheduler and coalescer can be exercised against
//! in-memory fakes; `sealdrop-storage` provides the OpenDAL-backed
//! implementations.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use sealdrop_core::{
    CompletedPart, ContentMeta, ObjectHandle, ObjectMeta, SealdropResult, TransferHandle,
};

/// A stream of ciphertext reads in whatever sizes the network delivers them.
pub type ByteStream = Pin<Box<dyn Stream<Item = SealdropResult<Bytes>> + Send>>;

/// Client-facing contract of the remote multipart upload service.
///
/// Part numbers are 1-based and dense. `finalize` requires a strictly
/// increasing part-number sequence with no gaps and no duplicates; the
/// scheduler sorts completions before calling it.
pub trait MultipartTransferClient: Send + Sync {
    /// Open a session. The service chooses the definitive plaintext chunk
    /// size (it may override the caller's preference to respect service-side
    /// constraints such as a maximum part count); callers must honor the
    /// returned plan.
    fn begin(
        &self,
        total_size: u64,
        meta: &ContentMeta,
    ) -> impl Future<Output = SealdropResult<TransferHandle>> + Send;

    /// Upload one ciphertext frame as the given part. Returns the remote etag.
    fn upload_part(
        &self,
        session_id: &str,
        part_number: u32,
        frame: Bytes,
    ) -> impl Future<Output = SealdropResult<String>> + Send;

    /// Complete the session from its ordered part list.
    fn finalize(
        &self,
        session_id: &str,
        parts: &[CompletedPart],
    ) -> impl Future<Output = SealdropResult<ObjectHandle>> + Send;

    /// Best-effort cleanup. Must be safe to call on a session that was
    /// already finalized or never fully created.
    fn abort(&self, session_id: &str) -> impl Future<Output = SealdropResult<()>> + Send;
}

/// Read access to a finalized ciphertext object and its public metadata.
pub trait CiphertextSource: Send + Sync {
    /// Fetch the metadata persisted alongside the object.
    fn read_meta(
        &self,
        handle: &ObjectHandle,
    ) -> impl Future<Output = SealdropResult<ObjectMeta>> + Send;

    /// Open the object's ciphertext as a byte stream. Read sizes carry no
    /// relation to frame boundaries.
    fn open(
        &self,
        handle: &ObjectHandle,
    ) -> impl Future<Output = SealdropResult<ByteStream>> + Send;
}
