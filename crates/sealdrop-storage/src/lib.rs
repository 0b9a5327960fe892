//! sealdrop-storage: OpenDAL-backed implementation of the multipart transfer
//! contract.
//!
//! Object layout in the bucket:
//! ```text
//! {prefix}/drops/{id}/session.json   staged session record (removed at finalize)
//! {prefix}/drops/{id}/parts/{n:05}   one ciphertext frame per part, 1-based
//! {prefix}/drops/{id}/meta.json      public metadata, present once finalized
//! ```
//!
//! The intermediary only ever holds ciphertext frames and public metadata;
//! the transfer key never reaches it.

pub mod multipart;
pub mod operator;

pub use multipart::StorageTransferClient;
pub use operator::{build_from_config, build_operator, StorageEndpoint};
