use serde::{Deserialize, Serialize};

/// Per-frame AEAD overhead on the wire: 12-byte IV + 16-byte tag.
pub const FRAME_OVERHEAD: usize = 28;

/// Geometry of one transfer, fixed for its whole lifetime.
///
/// `plain_chunk_size` must be identical on the encode and decode sides; it is
/// public metadata, chosen by the storage side at `begin` and persisted next
/// to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPlan {
    /// Total plaintext size in bytes.
    pub total_size: u64,
    /// Plaintext bytes per chunk (every chunk but possibly the last).
    pub plain_chunk_size: usize,
    /// `ceil(total_size / plain_chunk_size)`.
    pub total_parts: u64,
}

impl TransferPlan {
    pub fn new(total_size: u64, plain_chunk_size: usize) -> Self {
        let chunk = plain_chunk_size as u64;
        let total_parts = if chunk == 0 {
            0
        } else {
            total_size.div_ceil(chunk)
        };
        Self {
            total_size,
            plain_chunk_size,
            total_parts,
        }
    }

    /// Plaintext length of a given 1-based part.
    ///
    /// All parts are `plain_chunk_size` long except the last, which carries
    /// the remainder (or a full chunk when the size divides evenly).
    pub fn part_plain_len(&self, part_number: u32) -> usize {
        let chunk = self.plain_chunk_size as u64;
        if u64::from(part_number) < self.total_parts {
            self.plain_chunk_size
        } else {
            let rem = self.total_size % chunk;
            if rem == 0 {
                self.plain_chunk_size
            } else {
                rem as usize
            }
        }
    }

    /// On-wire length of one full ciphertext frame.
    pub fn encrypted_chunk_size(&self) -> usize {
        self.plain_chunk_size + FRAME_OVERHEAD
    }
}

/// Caller-supplied description of the content being sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentMeta {
    /// Display filename offered to the receiver.
    pub name: String,
    /// MIME type, if known.
    pub content_type: Option<String>,
    /// Requested retention, seconds from upload.
    pub expiry_secs: Option<u64>,
}

/// Opaque identifier of a finalized remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub String);

impl std::fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open multipart session plus the plan the storage side chose for it.
#[derive(Debug, Clone)]
pub struct TransferHandle {
    pub session_id: String,
    pub plan: TransferPlan,
}

/// Settlement record for one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Metadata persisted alongside a finalized object.
///
/// The download side trusts `plain_chunk_size` completely: there is no
/// independent verification channel, and a wrong value makes every frame fail
/// its authentication check rather than silently succeed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub total_size: u64,
    pub plain_chunk_size: usize,
    pub total_parts: u64,
    pub content_type: Option<String>,
    pub expiry_secs: Option<u64>,
}

impl ObjectMeta {
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(bytes).map_err(Into::into)
    }

    pub fn plan(&self) -> TransferPlan {
        TransferPlan {
            total_size: self.total_size,
            plain_chunk_size: self.plain_chunk_size,
            total_parts: self.total_parts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_part_counts() {
        assert_eq!(TransferPlan::new(25, 10).total_parts, 3);
        assert_eq!(TransferPlan::new(30, 10).total_parts, 3);
        assert_eq!(TransferPlan::new(1, 10).total_parts, 1);
        assert_eq!(TransferPlan::new(0, 10).total_parts, 0);
    }

    #[test]
    fn test_plan_part_lengths() {
        let plan = TransferPlan::new(25, 10);
        assert_eq!(plan.part_plain_len(1), 10);
        assert_eq!(plan.part_plain_len(2), 10);
        assert_eq!(plan.part_plain_len(3), 5);

        let even = TransferPlan::new(30, 10);
        assert_eq!(even.part_plain_len(3), 10);
    }

    #[test]
    fn test_encrypted_chunk_size() {
        let plan = TransferPlan::new(100, 10);
        assert_eq!(plan.encrypted_chunk_size(), 38);
    }

    #[test]
    fn test_object_meta_roundtrip() {
        let meta = ObjectMeta {
            name: "report.pdf".into(),
            total_size: 25,
            plain_chunk_size: 10,
            total_parts: 3,
            content_type: Some("application/pdf".into()),
            expiry_secs: Some(86400),
        };
        let bytes = meta.to_bytes().unwrap();
        let parsed = ObjectMeta::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.plan(), meta.plan());
        assert_eq!(parsed.name, "report.pdf");
    }
}
