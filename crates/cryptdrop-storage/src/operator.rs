//! Opens the bucket that holds encrypted blobs.
//!
//! Download and share links are presigned reads, so a backend that cannot
//! presign is refused here rather than at the first `download_link`.

use anyhow::{bail, Context, Result};
use cryptdrop_core::config::StorageConfig;
use opendal::Operator;
use tracing::warn;

/// Where the encrypted blobs live and how to reach them
#[derive(Debug, Clone)]
pub struct BucketSettings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl BucketSettings {
    /// Check `storage` and pair it with credentials.
    ///
    /// A plaintext `http://` endpoint is an error under `enforce_tls` and a
    /// warning otherwise.
    pub fn from_config(
        storage: &StorageConfig,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<Self> {
        validate_bucket_name(&storage.bucket)?;

        let endpoint = storage.endpoint.trim();
        if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
            bail!("storage.endpoint must be an http(s) URL, got {endpoint:?}");
        }
        if endpoint.starts_with("http://") {
            if storage.enforce_tls {
                bail!(
                    "storage endpoint {endpoint} is plaintext HTTP but storage.enforce_tls is set; \
                     use an HTTPS endpoint or set storage.enforce_tls = false for local development"
                );
            }
            warn!(
                endpoint = %endpoint,
                "storage endpoint is plaintext HTTP; signed links and credentials travel unencrypted"
            );
        }

        Ok(Self {
            endpoint: endpoint.to_string(),
            region: storage.region.clone(),
            bucket: storage.bucket.clone(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
        })
    }
}

/// Bucket names as S3 accepts them: 3 to 63 characters of lowercase
/// letters, digits, dots and hyphens, starting and ending alphanumeric.
pub fn validate_bucket_name(bucket: &str) -> Result<()> {
    if bucket.is_empty() {
        bail!("storage.bucket is empty");
    }
    if !(3..=63).contains(&bucket.len()) {
        bail!("storage.bucket {bucket:?} must be 3 to 63 characters");
    }
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-';
    if !bucket.chars().all(allowed) {
        bail!("storage.bucket {bucket:?} may only hold lowercase letters, digits, '.' and '-'");
    }
    let edge = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge(bucket.chars().next()) || !edge(bucket.chars().last()) {
        bail!("storage.bucket {bucket:?} must start and end with a letter or digit");
    }
    Ok(())
}

/// Build the bucket operator. Only a logging layer is installed; storage
/// calls are never retried.
pub fn open_bucket(settings: &BucketSettings) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&settings.endpoint)
        .region(&settings.region)
        .bucket(&settings.bucket)
        .access_key_id(&settings.access_key_id)
        .secret_access_key(&settings.secret_access_key);

    let op = Operator::new(builder)
        .with_context(|| format!("opening bucket {}", settings.bucket))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();

    ensure_signed_links(&op)?;
    Ok(op)
}

/// Config plus credentials straight to a checked operator.
pub fn open_from_config(
    storage: &StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    open_bucket(&BucketSettings::from_config(
        storage,
        access_key_id,
        secret_access_key,
    )?)
}

/// Fail unless `op` can presign reads.
pub fn ensure_signed_links(op: &Operator) -> Result<()> {
    if !op.info().full_capability().presign_read {
        bail!(
            "storage backend for {:?} cannot presign reads, so download links are unavailable",
            op.info().name()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(endpoint: &str, bucket: &str) -> StorageConfig {
        StorageConfig {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            enforce_tls: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_open_https_bucket() {
        let op = open_from_config(&storage("https://s3.example.com", "encrypted-files"), "k", "s")
            .unwrap();
        assert!(op.info().full_capability().presign_read);
    }

    #[test]
    fn test_plain_http_needs_enforce_tls_off() {
        let mut cfg = storage("http://localhost:9000", "encrypted-files");
        let err = BucketSettings::from_config(&cfg, "k", "s").unwrap_err();
        assert!(err.to_string().contains("enforce_tls"));

        cfg.enforce_tls = false;
        assert!(open_from_config(&cfg, "k", "s").is_ok());
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let err = BucketSettings::from_config(&storage("https://s3.example.com", ""), "k", "s")
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_bucket_name_rules() {
        for bad in ["ab", "Encrypted", "my_bucket", "-files", "files.", "a/b"] {
            assert!(validate_bucket_name(bad).is_err(), "{bad} should be rejected");
        }
        for good in ["abc", "encrypted-files", "files.2024"] {
            assert!(validate_bucket_name(good).is_ok(), "{good} should be accepted");
        }
    }

    #[test]
    fn test_endpoint_needs_scheme() {
        let err = BucketSettings::from_config(&storage("s3.example.com", "encrypted-files"), "k", "s")
            .unwrap_err();
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn test_backend_without_presign_refused() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        let err = ensure_signed_links(&op).unwrap_err();
        assert!(err.to_string().contains("presign"));
    }
}
