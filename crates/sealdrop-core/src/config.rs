use serde::{Deserialize, Serialize};

/// Top-level client configuration (loaded from sealdrop.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealdropConfig {
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Key prefix inside the bucket
    pub prefix: String,
    /// Enforce HTTPS for storage connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "sealdrop".into(),
            prefix: "sealdrop".into(),
            enforce_tls: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum part uploads in flight at once
    pub concurrent_parts: usize,
    /// Attempts per part before the session fails (first try included)
    pub max_attempts: u32,
    /// Base retry delay in milliseconds; attempt n waits n * base
    pub retry_base_delay_ms: u64,
    /// Preferred plaintext chunk size in bytes. The storage side may override
    /// it upward to respect `max_parts`.
    pub chunk_size: usize,
    /// Maximum part count the storage service accepts per object
    pub max_parts: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrent_parts: 3,
            max_attempts: 3,
            retry_base_delay_ms: 500,
            chunk_size: 10 * 1024 * 1024,
            max_parts: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listen address for the bridge HTTP front
    pub listen: String,
    /// How long `register` waits for the bridge's ready acknowledgement
    pub handshake_timeout_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8700".into(),
            handshake_timeout_ms: 3000,
        }
    }
}

impl SealdropConfig {
    /// Parse a TOML document. Unknown keys are ignored; missing sections get
    /// their defaults.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SealdropConfig::default();
        assert_eq!(cfg.transfer.concurrent_parts, 3);
        assert_eq!(cfg.transfer.max_attempts, 3);
        assert_eq!(cfg.proxy.handshake_timeout_ms, 3000);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg = SealdropConfig::from_toml(
            r#"
            [storage]
            endpoint = "https://s3.example.com"
            bucket = "drops"

            [transfer]
            concurrent_parts = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage.endpoint, "https://s3.example.com");
        assert_eq!(cfg.storage.bucket, "drops");
        assert_eq!(cfg.storage.region, "us-east-1");
        assert_eq!(cfg.transfer.concurrent_parts, 5);
        assert_eq!(cfg.transfer.max_attempts, 3);
    }

    #[test]
    fn test_empty_toml() {
        let cfg = SealdropConfig::from_toml("").unwrap();
        assert_eq!(cfg.storage.bucket, "sealdrop");
    }
}
