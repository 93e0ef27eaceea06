//! Named file objects and the `.encrypted` naming convention

use std::path::Path;

use cryptdrop_core::config::CryptoConfig;
use cryptdrop_core::{VaultError, VaultResult};
use secrecy::SecretString;

use crate::cipher::{decrypt_with_format, encrypt_with_format, ContainerFormat};
use crate::kdf::{derive_key, KdfParams};
use crate::{DECRYPTED_MIME, ENCRYPTED_MIME, ENCRYPTED_SUFFIX};

/// An in-memory named payload
#[derive(Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub mime: String,
    pub data: Vec<u8>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data,
        }
    }

    /// Read a file from disk. Names ending in `.encrypted` get the
    /// encrypted MIME type, everything else is `application/octet-stream`.
    pub fn read(path: &Path) -> VaultResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| VaultError::Validation(format!("not a file: {}", path.display())))?;
        let data = std::fs::read(path)?;
        let mime = if name.ends_with(ENCRYPTED_SUFFIX) {
            ENCRYPTED_MIME
        } else {
            DECRYPTED_MIME
        };
        Ok(Self::new(name, mime, data))
    }

    /// Whether the name carries the `.encrypted` suffix.
    pub fn is_encrypted(&self) -> bool {
        self.name.ends_with(ENCRYPTED_SUFFIX)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Output name for a decrypted file: strip `.encrypted`, else prefix `decrypted-`.
pub fn decrypted_name(name: &str) -> String {
    match name.strip_suffix(ENCRYPTED_SUFFIX) {
        Some(original) => original.to_string(),
        None => format!("decrypted-{name}"),
    }
}

/// Password-based encryption of whole files
#[derive(Debug, Clone, Default)]
pub struct FileCodec {
    pub kdf: KdfParams,
    pub format: ContainerFormat,
}

impl FileCodec {
    pub fn from_config(config: &CryptoConfig) -> VaultResult<Self> {
        Ok(Self {
            kdf: KdfParams {
                iterations: config.kdf_iterations,
            },
            format: ContainerFormat::from_version(config.container_version)?,
        })
    }

    /// Encrypt `file` into `<name>.encrypted`.
    ///
    /// Refused when the name already ends in `.encrypted`.
    pub fn encrypt_file(&self, file: &LocalFile, password: &SecretString) -> VaultResult<LocalFile> {
        if file.is_encrypted() {
            return Err(VaultError::Validation(format!(
                "file is already encrypted: {}",
                file.name
            )));
        }

        let key = derive_key(password, &self.kdf);
        let container = encrypt_with_format(&file.data, &key, self.format)?;

        tracing::debug!(
            name = %file.name,
            plaintext_bytes = file.data.len(),
            container_bytes = container.len(),
            "encrypted"
        );

        Ok(LocalFile::new(
            format!("{}{ENCRYPTED_SUFFIX}", file.name),
            ENCRYPTED_MIME,
            container,
        ))
    }

    /// Decrypt an `.encrypted` file.
    ///
    /// Refused when the name does not end in `.encrypted`. A wrong password
    /// and a corrupted container both fail with `VaultError::AuthenticationTag`.
    pub fn decrypt_file(&self, file: &LocalFile, password: &SecretString) -> VaultResult<LocalFile> {
        if !file.is_encrypted() {
            return Err(VaultError::Validation(format!(
                "file is not encrypted: {}",
                file.name
            )));
        }

        let key = derive_key(password, &self.kdf);
        let plaintext = decrypt_with_format(&file.data, &key, self.format)?;

        tracing::debug!(name = %file.name, plaintext_bytes = plaintext.len(), "decrypted");

        Ok(LocalFile::new(
            decrypted_name(&file.name),
            DECRYPTED_MIME,
            plaintext,
        ))
    }
}
