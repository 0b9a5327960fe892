//! Frame coalescing: network reads arrive in arbitrary sizes, the ciphertext
//! is framed at fixed boundaries of `plain_chunk_size + 28`.
//!
//! Inbound reads are kept as a segment list and frames are spliced out of the
//! front, so a read is never copied just to be buffered. A frame is handed to
//! the cipher only when it is complete; when the source ends, whatever
//! remains is the final (shorter, but complete) frame. One bad frame
//! invalidates the rest of the logical stream: after any error the coalescer
//! is fused and yields nothing further.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use sealdrop_core::types::FRAME_OVERHEAD;
use sealdrop_core::{SealdropError, SealdropResult};
use sealdrop_crypto::{open_frame, SecretKey};

pub struct FrameCoalescer<S> {
    source: S,
    key: SecretKey,
    encrypted_chunk_size: usize,
    segments: VecDeque<Bytes>,
    buffered: usize,
    source_done: bool,
    fused: bool,
}

impl<S> FrameCoalescer<S>
where
    S: Stream<Item = SealdropResult<Bytes>> + Unpin,
{
    pub fn new(source: S, key: SecretKey, plain_chunk_size: usize) -> Self {
        Self {
            source,
            key,
            encrypted_chunk_size: plain_chunk_size + FRAME_OVERHEAD,
            segments: VecDeque::new(),
            buffered: 0,
            source_done: false,
            fused: false,
        }
    }

    /// Decode the oldest complete frame in the buffer, pulling from the
    /// source until one is available. Returns `None` after the final frame,
    /// and after any error.
    pub async fn next_chunk(&mut self) -> Option<SealdropResult<Bytes>> {
        if self.fused {
            return None;
        }

        loop {
            if self.buffered >= self.encrypted_chunk_size {
                let frame = self.take_front(self.encrypted_chunk_size);
                return Some(self.decode(&frame));
            }

            if self.source_done {
                if self.buffered == 0 {
                    self.fused = true;
                    return None;
                }
                // Remainder is the final frame. It is shorter than a full
                // frame but must still be a complete one.
                if self.buffered < FRAME_OVERHEAD {
                    self.fused = true;
                    return Some(Err(SealdropError::Protocol(format!(
                        "stream truncated: {} trailing bytes cannot hold a frame",
                        self.buffered
                    ))));
                }
                let frame = self.take_front(self.buffered);
                let result = self.decode(&frame);
                if result.is_ok() {
                    self.fused = true;
                }
                return Some(result);
            }

            match self.source.next().await {
                Some(Ok(bytes)) => {
                    if !bytes.is_empty() {
                        self.buffered += bytes.len();
                        self.segments.push_back(bytes);
                    }
                }
                Some(Err(err)) => {
                    self.fused = true;
                    return Some(Err(err));
                }
                None => self.source_done = true,
            }
        }
    }

    /// Adapter for consumers that want a `futures::Stream` of plaintext.
    pub fn into_stream(self) -> impl Stream<Item = SealdropResult<Bytes>> + Send
    where
        S: Send,
    {
        futures::stream::unfold(self, |mut coalescer| async move {
            coalescer.next_chunk().await.map(|item| (item, coalescer))
        })
    }

    fn decode(&mut self, frame: &[u8]) -> SealdropResult<Bytes> {
        match open_frame(&self.key, frame) {
            Ok(plain) => Ok(Bytes::from(plain)),
            Err(err) => {
                self.fused = true;
                Err(err)
            }
        }
    }

    /// Splice exactly `len` bytes off the front of the segment list,
    /// crossing segment boundaries as needed. The fast path hands back a
    /// slice of the front segment without copying.
    fn take_front(&mut self, len: usize) -> Bytes {
        debug_assert!(len <= self.buffered);
        self.buffered -= len;

        if let Some(seg) = self.segments.front_mut() {
            if seg.len() >= len {
                let out = seg.split_to(len);
                if seg.is_empty() {
                    self.segments.pop_front();
                }
                return out;
            }
        }

        let mut out = BytesMut::with_capacity(len);
        let mut need = len;
        while need > 0 {
            let seg = self
                .segments
                .front_mut()
                .expect("buffered count out of sync");
            if seg.len() <= need {
                need -= seg.len();
                out.extend_from_slice(seg);
                self.segments.pop_front();
            } else {
                out.extend_from_slice(&seg.split_to(need));
                need = 0;
            }
        }
        out.freeze()
    }
}
