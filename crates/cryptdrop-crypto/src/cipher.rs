//! AES-256-GCM container encryption/decryption
//!
//! Container format (binary):
//! ```text
//! Legacy: [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! V1:     [1 byte: 0x01][12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The legacy layout carries no marker at all, so the reader must already
//! know which layout a file uses.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use cryptdrop_core::{VaultError, VaultResult};
use rand::RngCore;

use crate::kdf::EncryptionKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// On-disk layout of an encrypted container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContainerFormat {
    /// `nonce || ciphertext+tag`, no version byte
    #[default]
    Legacy,
    /// `0x01 || nonce || ciphertext+tag`
    V1,
}

impl ContainerFormat {
    /// Map the configured `container_version` onto a layout.
    pub fn from_version(version: u8) -> VaultResult<Self> {
        match version {
            0 => Ok(ContainerFormat::Legacy),
            1 => Ok(ContainerFormat::V1),
            v => Err(VaultError::Validation(format!(
                "unsupported container version: {v}"
            ))),
        }
    }

    fn header_len(self) -> usize {
        match self {
            ContainerFormat::Legacy => 0,
            ContainerFormat::V1 => 1,
        }
    }

    /// Total container size for a plaintext of `plaintext_len` bytes.
    pub fn container_len(self, plaintext_len: usize) -> usize {
        self.header_len() + NONCE_SIZE + plaintext_len + TAG_SIZE
    }
}

/// Encrypt a payload into a legacy-layout container.
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> VaultResult<Vec<u8>> {
    encrypt_with_format(plaintext, key, ContainerFormat::Legacy)
}

/// Decrypt a legacy-layout container.
pub fn decrypt(container: &[u8], key: &EncryptionKey) -> VaultResult<Vec<u8>> {
    decrypt_with_format(container, key, ContainerFormat::Legacy)
}

/// Encrypt with a fresh random nonce, producing a container in `format`.
pub fn encrypt_with_format(
    plaintext: &[u8],
    key: &EncryptionKey,
    format: ContainerFormat,
) -> VaultResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("AES-GCM encryption failed: {e}"))?;

    let mut result = Vec::with_capacity(format.container_len(plaintext.len()));
    if format == ContainerFormat::V1 {
        result.push(1);
    }
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a container in `format`.
///
/// Any integrity failure (wrong key, flipped byte, truncation) yields
/// `VaultError::AuthenticationTag`; no partial plaintext is ever returned.
pub fn decrypt_with_format(
    container: &[u8],
    key: &EncryptionKey,
    format: ContainerFormat,
) -> VaultResult<Vec<u8>> {
    let body = match format {
        ContainerFormat::Legacy => container,
        ContainerFormat::V1 => match container.split_first() {
            Some((1, rest)) => rest,
            Some((v, _)) => {
                return Err(VaultError::Validation(format!(
                    "unsupported container version byte: {v}"
                )))
            }
            None => return Err(VaultError::AuthenticationTag),
        },
    };

    if body.len() < NONCE_SIZE + TAG_SIZE {
        tracing::debug!(len = container.len(), "container shorter than nonce + tag");
        return Err(VaultError::AuthenticationTag);
    }

    let (nonce_bytes, ciphertext) = body.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| VaultError::AuthenticationTag)
}
