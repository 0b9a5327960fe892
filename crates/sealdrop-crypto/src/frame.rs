//! Per-chunk AES-256-GCM sealing and opening.
//!
//! The codec is stateless and safe to invoke concurrently for sealing.
//! Opening a corrupted or forged frame fails closed: an error is returned and
//! no partial plaintext escapes.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use sealdrop_core::{SealdropError, SealdropResult};

use crate::secret::SecretKey;
use crate::{IV_SIZE, TAG_SIZE};

/// Encrypt one plaintext chunk.
///
/// Draws a fresh random 96-bit IV and prepends it to the output.
///
/// Returns: `[12-byte IV][ciphertext][16-byte tag]`
pub fn seal_frame(key: &SecretKey, plaintext: &[u8]) -> SealdropResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut iv_bytes = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv_bytes);
    let nonce = Nonce::from_slice(&iv_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| SealdropError::Other(anyhow::anyhow!("frame encryption failed: {e}")))?;

    let mut frame = Vec::with_capacity(IV_SIZE + ciphertext.len());
    frame.extend_from_slice(&iv_bytes);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Decrypt one frame: `[12-byte IV][ciphertext][16-byte tag]`.
///
/// A tag mismatch yields `SealdropError::Authentication`; a frame too short
/// to even hold the IV and tag is a protocol violation.
pub fn open_frame(key: &SecretKey, frame: &[u8]) -> SealdropResult<Vec<u8>> {
    if frame.len() < IV_SIZE + TAG_SIZE {
        return Err(SealdropError::Protocol(format!(
            "frame too short: {} bytes (minimum {})",
            frame.len(),
            IV_SIZE + TAG_SIZE
        )));
    }

    let (iv_bytes, ciphertext) = frame.split_at(IV_SIZE);
    let nonce = Nonce::from_slice(iv_bytes);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| SealdropError::Authentication)
}
