//! sealdrop-transfer: the streaming encrypt/upload and download/decrypt pipeline
//!
//! Upload path: [`reader::ChunkReader`] slices the input into fixed-size
//! plaintext chunks, [`scheduler::UploadSession`] seals each chunk into an
//! AEAD frame and drives a bounded pool of part uploads against a
//! [`client::MultipartTransferClient`].
//!
//! Download path: a [`client::CiphertextSource`] yields network reads of
//! arbitrary size, [`coalescer::FrameCoalescer`] reassembles them into exact
//! frame boundaries and decrypts, [`download::DownloadSession`] glues the two
//! together behind the persisted object metadata.
//!
//! Concurrency model: one logical task. The upload pool is a
//! `FuturesUnordered` polled from the scheduler's own loop, so the
//! completed-part list and progress counters are only ever touched at
//! settlement points, never concurrently.

pub mod client;
pub mod coalescer;
pub mod download;
pub mod progress;
pub mod reader;
pub mod scheduler;

pub use client::{ByteStream, CiphertextSource, MultipartTransferClient};
pub use coalescer::FrameCoalescer;
pub use download::DownloadSession;
pub use progress::ProgressSnapshot;
pub use reader::{ChunkReader, PlainChunk};
pub use scheduler::{UploadOptions, UploadOutcome, UploadSession};
