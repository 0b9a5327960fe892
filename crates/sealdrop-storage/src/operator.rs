//! OpenDAL Operator factory for sealdrop storage backends

use anyhow::{Context, Result};
use opendal::Operator;

use sealdrop_core::config::StorageConfig;

/// Minimal connection info needed to build an operator
/// (the full schema lives in sealdrop-core's StorageConfig)
#[derive(Debug, Clone)]
pub struct StorageEndpoint {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for any S3-compatible endpoint.
///
/// Uses path-style addressing (default in opendal 0.55), which is what MinIO
/// and SeaweedFS expect. Do NOT call enable_virtual_host_style() for these.
///
/// No RetryLayer here: part retries belong to the upload scheduler, which
/// owns the attempt budget and backoff.
pub fn build_operator(ep: &StorageEndpoint) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&ep.endpoint)
        .region(&ep.region)
        .bucket(&ep.bucket)
        .access_key_id(&ep.access_key_id)
        .secret_access_key(&ep.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();

    Ok(op)
}

/// Build an operator from config + loaded credentials.
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an
/// error. Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_from_config(
    storage: &StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "storage endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "storage endpoint uses plaintext HTTP — credentials are transmitted unencrypted. \
             Set storage.enforce_tls = true and use HTTPS in production."
        );
    }

    build_operator(&StorageEndpoint {
        endpoint: storage.endpoint.clone(),
        region: storage.region.clone(),
        bucket: storage.bucket.clone(),
        access_key_id: access_key_id.to_string(),
        secret_access_key: secret_access_key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_operator_valid() {
        let ep = StorageEndpoint {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            bucket: "test-bucket".to_string(),
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
        };
        assert!(build_operator(&ep).is_ok());
    }

    #[test]
    fn test_http_with_enforce_tls_fails() {
        let storage = StorageConfig {
            endpoint: "http://insecure:9000".into(),
            enforce_tls: true,
            ..StorageConfig::default()
        };
        let result = build_from_config(&storage, "key", "secret");
        assert!(result.is_err(), "HTTP + enforce_tls must fail");
        assert!(result.unwrap_err().to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_https_with_enforce_tls_ok() {
        let storage = StorageConfig {
            endpoint: "https://s3.example.com".into(),
            enforce_tls: true,
            ..StorageConfig::default()
        };
        assert!(build_from_config(&storage, "key", "secret").is_ok());
    }
}
