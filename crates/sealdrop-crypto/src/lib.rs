//! sealdrop-crypto: AEAD frame codec for the transfer pipeline
//!
//! On-wire frame format (binary):
//! ```text
//! [12 bytes: random IV][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! One frame corresponds to one plaintext chunk. The IV is drawn fresh and
//! random for every frame and prepended to the output, so the receiver needs
//! no out-of-band nonce transport. No associated data is used: the tag binds
//! only ciphertext and IV.

pub mod frame;
pub mod secret;
pub mod token;

pub use frame::{open_frame, seal_frame};
pub use secret::{generate_key, SecretKey};
pub use token::ShareToken;

/// Size of a transfer key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM IV (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
