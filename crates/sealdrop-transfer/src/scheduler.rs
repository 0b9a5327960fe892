//! Bounded-concurrency upload scheduler.
//!
//! Maintains a pool of at most `concurrent_parts` outstanding part uploads.
//! Before admitting a new part the pool must have a free slot, so reading and
//! sealing chunk n+1 overlaps the uploads of chunks n, n-1, ... within the
//! bound. Parts complete in arbitrary order; completions are keyed by part
//! number and sorted before finalize, which requires a dense ascending
//! sequence.
//!
//! The pool is a `FuturesUnordered` polled from this task only. Settlements
//! happen one at a time, so the completed-part list and progress tracker need
//! no locks.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sealdrop_core::config::TransferConfig;
use sealdrop_core::{
    CompletedPart, ContentMeta, ObjectHandle, SealdropError, SealdropResult, TransferHandle,
    TransferPlan,
};
use sealdrop_crypto::{seal_frame, SecretKey};

use crate::client::MultipartTransferClient;
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::reader::ChunkReader;

/// Tuning knobs for one upload session.
#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    /// Maximum part uploads in flight at once.
    pub concurrent_parts: usize,
    /// Attempts per part, first try included. Only transient transport
    /// errors consume attempts; anything else fails the session outright.
    pub max_attempts: u32,
    /// Attempt n backs off for `n * retry_base_delay` before retrying.
    pub retry_base_delay: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrent_parts: 3,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl From<&TransferConfig> for UploadOptions {
    fn from(cfg: &TransferConfig) -> Self {
        Self {
            concurrent_parts: cfg.concurrent_parts.max(1),
            max_attempts: cfg.max_attempts.max(1),
            retry_base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
        }
    }
}

/// A finalized upload.
#[derive(Debug)]
pub struct UploadOutcome {
    pub handle: ObjectHandle,
    pub plan: TransferPlan,
    pub parts: Vec<CompletedPart>,
}

struct Settlement {
    part_number: u32,
    plain_len: u64,
    result: SealdropResult<String>,
}

/// One upload session: owns the part-task production order, the completion
/// list, and the read cursor (via its `ChunkReader`). Created at transfer
/// start, destroyed on finalize or abort.
pub struct UploadSession<'c, C> {
    client: &'c C,
    key: SecretKey,
    handle: TransferHandle,
    options: UploadOptions,
    cancel: CancellationToken,
    tracker: ProgressTracker,
    progress_rx: watch::Receiver<ProgressSnapshot>,
}

impl<'c, C> std::fmt::Debug for UploadSession<'c, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<'c, C: MultipartTransferClient> UploadSession<'c, C> {
    /// Open a remote session. The storage side picks the definitive chunk
    /// size; whatever it returns is honored for the rest of the session.
    pub async fn begin(
        client: &'c C,
        key: SecretKey,
        total_size: u64,
        meta: &ContentMeta,
        options: UploadOptions,
    ) -> SealdropResult<Self> {
        let handle = client.begin(total_size, meta).await?;
        if handle.plan.plain_chunk_size == 0 {
            return Err(SealdropError::Protocol(
                "storage service returned a zero chunk size".into(),
            ));
        }
        if handle.plan.total_size != total_size {
            return Err(SealdropError::Protocol(format!(
                "storage service echoed size {} for a {total_size}-byte transfer",
                handle.plan.total_size
            )));
        }

        info!(
            session = %handle.session_id,
            total_size,
            chunk_size = handle.plan.plain_chunk_size,
            total_parts = handle.plan.total_parts,
            "upload session open"
        );

        let (tracker, progress_rx) = ProgressTracker::new();
        Ok(Self {
            client,
            key,
            handle,
            options,
            cancel: CancellationToken::new(),
            tracker,
            progress_rx,
        })
    }

    /// Partial-upload resume across process restarts is not supported: part
    /// state lives only in the session that produced it. Callers get a
    /// definite refusal rather than a guessed reconstruction.
    pub fn resume(_client: &'c C, session_id: &str) -> SealdropResult<Self> {
        Err(SealdropError::Protocol(format!(
            "session {session_id}: partial-upload resume is not supported, start a new transfer"
        )))
    }

    pub fn plan(&self) -> TransferPlan {
        self.handle.plan
    }

    pub fn session_id(&self) -> &str {
        &self.handle.session_id
    }

    /// Watch channel publishing progress snapshots at each part settlement.
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress_rx.clone()
    }

    /// Token for cooperative cancellation. Checked before admitting each new
    /// chunk and before each retry attempt; uploads already on the wire are
    /// left to settle and their results discarded.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the whole transfer: read, seal, upload, finalize. On any
    /// failure (or cancellation) the remote session is aborted best-effort
    /// before the error is returned.
    pub async fn run<R: AsyncRead + Unpin>(mut self, source: R) -> SealdropResult<UploadOutcome> {
        let session_id = self.handle.session_id.clone();
        match self.drive(source).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // The session is already failing; abort problems are logged,
                // never escalated over the original error.
                if let Err(abort_err) = self.client.abort(&session_id).await {
                    warn!(session = %session_id, error = %abort_err, "remote abort failed");
                } else {
                    debug!(session = %session_id, "remote session aborted");
                }
                Err(err)
            }
        }
    }

    async fn drive<R: AsyncRead + Unpin>(
        &mut self,
        source: R,
    ) -> SealdropResult<UploadOutcome> {
        let plan = self.handle.plan;
        let session_id = self.handle.session_id.clone();
        let client = self.client;
        let options = self.options;

        let mut reader = ChunkReader::new(source, plan);
        let mut pool: FuturesUnordered<BoxFuture<'c, Settlement>> = FuturesUnordered::new();
        let mut completed: Vec<CompletedPart> = Vec::with_capacity(plan.total_parts as usize);
        let mut next_part: u32 = 0;
        let mut failure: Option<SealdropError> = None;

        'produce: while u64::from(next_part) < plan.total_parts {
            // Admission requires a free slot: settle at least one in-flight
            // part when the pool is at capacity.
            while pool.len() >= options.concurrent_parts {
                let settlement = match pool.next().await {
                    Some(s) => s,
                    None => break,
                };
                if let Err(err) = self.settle(settlement, &mut completed) {
                    failure = Some(err);
                    break 'produce;
                }
            }

            if self.cancel.is_cancelled() {
                failure = Some(SealdropError::Cancelled);
                break;
            }

            let chunk = match reader.next().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };

            next_part += 1;
            let part_number = next_part;
            let plain_len = chunk.bytes.len() as u64;
            let frame = match seal_frame(&self.key, &chunk.bytes) {
                Ok(frame) => Bytes::from(frame),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };
            debug!(part_number, plain_len, frame_len = frame.len(), "part admitted");

            pool.push(Box::pin(upload_with_retry(
                client,
                session_id.clone(),
                part_number,
                plain_len,
                frame,
                options,
                self.cancel.clone(),
            )));
        }

        if failure.is_some() {
            // Stop in-flight retry loops at their next checkpoint.
            self.cancel.cancel();
        }

        // Let already-dispatched uploads settle. On a failing session their
        // results are discarded.
        while let Some(settlement) = pool.next().await {
            if failure.is_none() {
                if let Err(err) = self.settle(settlement, &mut completed) {
                    failure = Some(err);
                    self.cancel.cancel();
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        completed.sort_by_key(|p| p.part_number);
        if completed.len() as u64 != plan.total_parts {
            return Err(SealdropError::Protocol(format!(
                "completed {} parts of {}",
                completed.len(),
                plan.total_parts
            )));
        }
        for (i, part) in completed.iter().enumerate() {
            if u64::from(part.part_number) != i as u64 + 1 {
                return Err(SealdropError::Protocol(format!(
                    "part sequence has a gap or duplicate at #{}",
                    part.part_number
                )));
            }
        }

        let handle = client.finalize(&session_id, &completed).await?;
        info!(
            session = %session_id,
            object = %handle,
            parts = completed.len(),
            bytes = plan.total_size,
            "upload finalized"
        );

        Ok(UploadOutcome {
            handle,
            plan,
            parts: completed,
        })
    }

    /// The only place completions and progress counters are mutated.
    fn settle(
        &mut self,
        settlement: Settlement,
        completed: &mut Vec<CompletedPart>,
    ) -> SealdropResult<()> {
        let etag = settlement.result?;
        debug!(part_number = settlement.part_number, etag = %etag, "part settled");
        completed.push(CompletedPart {
            part_number: settlement.part_number,
            etag,
        });
        self.tracker.record_part(settlement.plain_len);
        Ok(())
    }
}

async fn upload_with_retry<C: MultipartTransferClient>(
    client: &C,
    session_id: String,
    part_number: u32,
    plain_len: u64,
    frame: Bytes,
    options: UploadOptions,
    cancel: CancellationToken,
) -> Settlement {
    let mut attempt: u32 = 1;
    let result = loop {
        match client.upload_part(&session_id, part_number, frame.clone()).await {
            Ok(etag) => break Ok(etag),
            Err(err) if err.is_transient() && attempt < options.max_attempts => {
                let delay = options.retry_base_delay * attempt;
                warn!(
                    part_number,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "part upload failed, backing off"
                );
                tokio::time::sleep(delay).await;
                if cancel.is_cancelled() {
                    break Err(SealdropError::Cancelled);
                }
                attempt += 1;
            }
            Err(err) => break Err(err),
        }
    };

    Settlement {
        part_number,
        plain_len,
        result,
    }
}
