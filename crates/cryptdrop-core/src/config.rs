use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from cryptdrop.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptdropConfig {
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub share: ShareConfig,
    pub catalog: CatalogConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding the encrypted blobs
    pub bucket: String,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
}

/// Client-side encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// SHA-256 passes over the password (default: 1, a single digest)
    pub kdf_iterations: u32,
    /// Container layout: 0 = unversioned `nonce || ciphertext`,
    /// 1 = leading version byte
    pub container_version: u8,
    /// Largest plaintext accepted for encryption (default: 50 MiB)
    pub max_file_bytes: u64,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: 1,
            container_version: 0,
            max_file_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Signed-link policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Validity of an authenticated download link in seconds (default: 3600)
    pub download_link_ttl_secs: u64,
    /// Validity of a public share link in seconds (default: 3600)
    pub share_link_ttl_secs: u64,
    /// Allow minting share links by record id without a credential
    /// (default: true). Anyone holding a record id can then fetch the blob.
    pub public_links: bool,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            download_link_ttl_secs: 3600,
            share_link_ttl_secs: 3600,
            public_links: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON file holding object records
    pub path: PathBuf,
    /// JSON file holding cleanup tasks that failed and await reconciliation
    pub reconcile_path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/cryptdrop/catalog.json"),
            reconcile_path: PathBuf::from("~/.local/share/cryptdrop/reconcile.json"),
        }
    }
}

/// Local identity provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JSON file holding accounts and sessions
    pub accounts_path: PathBuf,
    /// Argon2id memory cost in KiB for account passwords (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// Owner that uploads without a credential are filed under.
    /// Unset (the default) means uploads always require a credential.
    pub anonymous_upload_owner: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            accounts_path: PathBuf::from("~/.local/share/cryptdrop/accounts.json"),
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            anonymous_upload_owner: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "encrypted-files".into(),
            enforce_tls: false,
        }
    }
}
