//! sealdrop-core: shared types, config schema, and error taxonomy
//!
//! Everything here is plain data: no I/O, no crypto. The other crates agree
//! on these shapes so that the upload side (`sealdrop-transfer` +
//! `sealdrop-storage`) and the download side (`sealdrop-proxy`) never need a
//! private channel between them beyond what is persisted next to the object.

pub mod config;
pub mod error;
pub mod types;

pub use error::{SealdropError, SealdropResult};
pub use types::{
    CompletedPart, ContentMeta, ObjectHandle, ObjectMeta, TransferHandle, TransferPlan,
};
