//! Multipart transfer sessions over an OpenDAL operator.
//!
//! `begin` stages a session record, `upload_part` writes one frame per part
//! key, `finalize` validates the part set and promotes the record to public
//! metadata, `abort` clears the staging area. Part etags are BLAKE3 hashes
//! of the frame bytes.

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use opendal::{ErrorKind, Operator};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sealdrop_core::config::TransferConfig;
use sealdrop_core::{
    CompletedPart, ContentMeta, ObjectHandle, ObjectMeta, SealdropError, SealdropResult,
    TransferHandle, TransferPlan,
};
use sealdrop_core::types::FRAME_OVERHEAD;
use sealdrop_transfer::{ByteStream, CiphertextSource, MultipartTransferClient};

/// Read granularity when streaming a finalized object back out.
const READ_PIECE: usize = 64 * 1024;

pub struct StorageTransferClient {
    op: Operator,
    prefix: String,
    preferred_chunk: usize,
    max_parts: u64,
}

impl StorageTransferClient {
    pub fn new(op: Operator, prefix: impl Into<String>, cfg: &TransferConfig) -> Self {
        Self {
            op,
            prefix: prefix.into().trim_end_matches('/').to_string(),
            preferred_chunk: cfg.chunk_size,
            max_parts: cfg.max_parts.max(1),
        }
    }

    fn root(&self, id: &str) -> String {
        format!("{}/drops/{id}", self.prefix)
    }

    fn part_key(&self, id: &str, part_number: u32) -> String {
        format!("{}/parts/{part_number:05}", self.root(id))
    }

    fn session_key(&self, id: &str) -> String {
        format!("{}/session.json", self.root(id))
    }

    fn meta_key(&self, id: &str) -> String {
        format!("{}/meta.json", self.root(id))
    }

    /// The service owns the definitive chunk size: grow the caller's
    /// preference until the part count fits the service limit.
    fn choose_chunk(&self, total_size: u64) -> usize {
        let mut chunk = self.preferred_chunk.max(1);
        while TransferPlan::new(total_size, chunk).total_parts > self.max_parts {
            chunk = chunk.saturating_mul(2);
        }
        chunk
    }

    async fn read_session(&self, session_id: &str) -> SealdropResult<ObjectMeta> {
        let raw = self
            .op
            .read(&self.session_key(session_id))
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    SealdropError::Protocol(format!("unknown session {session_id}"))
                } else {
                    map_storage_err(e)
                }
            })?;
        ObjectMeta::from_bytes(&raw.to_bytes())
            .map_err(|e| SealdropError::Protocol(format!("corrupt session record: {e}")))
    }
}

fn map_storage_err(e: opendal::Error) -> SealdropError {
    if e.kind() == ErrorKind::NotFound {
        SealdropError::Protocol(format!("remote object missing: {e}"))
    } else {
        SealdropError::Transport(e.to_string())
    }
}

impl MultipartTransferClient for StorageTransferClient {
    async fn begin(&self, total_size: u64, meta: &ContentMeta) -> SealdropResult<TransferHandle> {
        let session_id = Uuid::new_v4().to_string();
        let chunk = self.choose_chunk(total_size);
        let plan = TransferPlan::new(total_size, chunk);

        let record = ObjectMeta {
            name: meta.name.clone(),
            total_size,
            plain_chunk_size: plan.plain_chunk_size,
            total_parts: plan.total_parts,
            content_type: meta.content_type.clone(),
            expiry_secs: meta.expiry_secs,
        };
        self.op
            .write(&self.session_key(&session_id), record.to_bytes()?)
            .await
            .map_err(map_storage_err)?;

        debug!(
            session = %session_id,
            total_size,
            chunk_size = chunk,
            total_parts = plan.total_parts,
            "multipart session staged"
        );
        Ok(TransferHandle { session_id, plan })
    }

    async fn upload_part(
        &self,
        session_id: &str,
        part_number: u32,
        frame: Bytes,
    ) -> SealdropResult<String> {
        if part_number == 0 {
            return Err(SealdropError::Protocol(
                "part numbers are 1-based; got 0".into(),
            ));
        }

        let etag = blake3::hash(&frame).to_hex().to_string();
        self.op
            .write(&self.part_key(session_id, part_number), frame)
            .await
            .map_err(map_storage_err)?;
        Ok(etag)
    }

    async fn finalize(
        &self,
        session_id: &str,
        parts: &[CompletedPart],
    ) -> SealdropResult<ObjectHandle> {
        let record = self.read_session(session_id).await?;
        let plan = record.plan();

        if parts.len() as u64 != plan.total_parts {
            return Err(SealdropError::Protocol(format!(
                "finalize with {} parts, session expects {}",
                parts.len(),
                plan.total_parts
            )));
        }
        for (i, part) in parts.iter().enumerate() {
            if u64::from(part.part_number) != i as u64 + 1 {
                return Err(SealdropError::Protocol(format!(
                    "part list must be dense ascending; position {i} holds #{}",
                    part.part_number
                )));
            }
        }

        // Frames are validated by size only; content integrity is the
        // cipher's job on the way back out.
        for part in parts {
            let stat = self
                .op
                .stat(&self.part_key(session_id, part.part_number))
                .await
                .map_err(|e| {
                    if e.kind() == ErrorKind::NotFound {
                        SealdropError::Protocol(format!(
                            "part #{} was never uploaded",
                            part.part_number
                        ))
                    } else {
                        map_storage_err(e)
                    }
                })?;
            let expected = plan.part_plain_len(part.part_number) + FRAME_OVERHEAD;
            if stat.content_length() != expected as u64 {
                return Err(SealdropError::Protocol(format!(
                    "part #{} is {} bytes on the wire, expected {expected}",
                    part.part_number,
                    stat.content_length()
                )));
            }
        }

        self.op
            .write(&self.meta_key(session_id), record.to_bytes()?)
            .await
            .map_err(map_storage_err)?;
        self.op
            .delete(&self.session_key(session_id))
            .await
            .map_err(map_storage_err)?;

        info!(object = %session_id, parts = parts.len(), "multipart session finalized");
        Ok(ObjectHandle(session_id.to_string()))
    }

    async fn abort(&self, session_id: &str) -> SealdropResult<()> {
        // Never touch a finalized object; abort is cleanup for sessions that
        // didn't make it.
        match self.op.exists(&self.meta_key(session_id)).await {
            Ok(true) => {
                warn!(session = %session_id, "abort on a finalized session ignored");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => return Err(map_storage_err(e)),
        }

        self.op
            .remove_all(&self.root(session_id))
            .await
            .map_err(map_storage_err)?;
        debug!(session = %session_id, "multipart session aborted");
        Ok(())
    }
}

impl CiphertextSource for StorageTransferClient {
    async fn read_meta(&self, handle: &ObjectHandle) -> SealdropResult<ObjectMeta> {
        let raw = self.op.read(&self.meta_key(&handle.0)).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                SealdropError::Protocol(format!("no such object: {handle}"))
            } else {
                map_storage_err(e)
            }
        })?;
        ObjectMeta::from_bytes(&raw.to_bytes())
            .map_err(|e| SealdropError::Protocol(format!("corrupt object metadata: {e}")))
    }

    async fn open(&self, handle: &ObjectHandle) -> SealdropResult<ByteStream> {
        let meta = self.read_meta(handle).await?;
        let op = self.op.clone();
        let prefix = self.prefix.clone();
        let id = handle.0.clone();

        // One part is resident at a time; each is re-emitted in small pieces
        // so downstream consumers see network-sized reads.
        let pieces = stream::iter(1..=meta.total_parts)
            .then(move |part_number| {
                let op = op.clone();
                let key = format!("{prefix}/drops/{id}/parts/{part_number:05}");
                async move {
                    op.read(&key)
                        .await
                        .map(|buf| buf.to_bytes())
                        .map_err(map_storage_err)
                }
            })
            .map_ok(|bytes| {
                let mut chunks = Vec::with_capacity(bytes.len().div_ceil(READ_PIECE).max(1));
                let mut rest = bytes;
                while rest.len() > READ_PIECE {
                    chunks.push(Ok(rest.split_to(READ_PIECE)));
                }
                if !rest.is_empty() {
                    chunks.push(Ok(rest));
                }
                stream::iter(chunks)
            })
            .try_flatten();

        Ok(Box::pin(pieces))
    }
}
