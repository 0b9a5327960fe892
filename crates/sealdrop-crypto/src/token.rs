//! Share-token encoding: `{object_id}#{key}` with the key in URL-safe
//! unpadded base64, mirroring a URL fragment so the secret rides the
//! out-of-band channel and never touches the storage service.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use sealdrop_core::{ObjectHandle, SealdropError, SealdropResult};

use crate::secret::SecretKey;
use crate::KEY_SIZE;

/// The object identifier plus the transfer key, as handed to a receiver.
pub struct ShareToken {
    pub handle: ObjectHandle,
    pub key: SecretKey,
}

impl ShareToken {
    pub fn new(handle: ObjectHandle, key: SecretKey) -> Self {
        Self { handle, key }
    }

    /// Render as `{object_id}#{key_b64url}`.
    pub fn encode(&self) -> String {
        format!(
            "{}#{}",
            self.handle,
            URL_SAFE_NO_PAD.encode(self.key.as_bytes())
        )
    }

    /// Parse a token produced by [`ShareToken::encode`].
    pub fn parse(token: &str) -> SealdropResult<Self> {
        let (id, key_b64) = token
            .split_once('#')
            .ok_or_else(|| SealdropError::Protocol("share token missing '#' separator".into()))?;
        if id.is_empty() {
            return Err(SealdropError::Protocol("share token has empty object id".into()));
        }

        let key_bytes = URL_SAFE_NO_PAD
            .decode(key_b64)
            .map_err(|e| SealdropError::Protocol(format!("share token key is not base64url: {e}")))?;
        let key_arr: [u8; KEY_SIZE] = key_bytes.try_into().map_err(|v: Vec<u8>| {
            SealdropError::Protocol(format!(
                "share token key has wrong length: {} bytes (expected {KEY_SIZE})",
                v.len()
            ))
        })?;

        Ok(Self {
            handle: ObjectHandle(id.to_string()),
            key: SecretKey::from_bytes(key_arr),
        })
    }
}

impl std::fmt::Debug for ShareToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareToken")
            .field("handle", &self.handle)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
