//! Key derivation: SHA-256 password digest → AES-256 key
//!
//! The default is a single unsalted SHA-256 pass, which keeps keys
//! reproducible from the password alone but offers no protection against
//! offline guessing of weak passwords. `KdfParams::iterations` re-hashes the
//! digest additional times; files must be decrypted with the same count.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit encryption key derived from a password.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Password KDF parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Number of SHA-256 passes (default: 1). Zero is treated as one.
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self { iterations: 1 }
    }
}

/// Derive a 256-bit key from a password.
///
/// Deterministic: the same password and parameters always give the same key.
/// Empty passwords are accepted here; rejecting them is the caller's policy.
pub fn derive_key(password: &SecretString, params: &KdfParams) -> EncryptionKey {
    let mut digest: [u8; KEY_SIZE] = Sha256::digest(password.expose_secret().as_bytes()).into();
    for _ in 1..params.iterations.max(1) {
        digest = Sha256::digest(digest).into();
    }
    let key = EncryptionKey::from_bytes(digest);
    digest.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_deterministic() {
        let password = SecretString::from("test-password-123");
        let params = KdfParams::default();

        let key1 = derive_key(&password, &params);
        let key2 = derive_key(&password, &params);

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_passwords() {
        let params = KdfParams::default();

        let key1 = derive_key(&SecretString::from("password-a"), &params);
        let key2 = derive_key(&SecretString::from("password-b"), &params);

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different passwords must produce different keys"
        );
    }

    #[test]
    fn test_single_pass_is_plain_sha256() {
        // SHA-256(""): the empty password still yields a valid key
        let key = derive_key(&SecretString::from(""), &KdfParams::default());
        let expected: [u8; 32] = [
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f,
            0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b,
            0x78, 0x52, 0xb8, 0x55,
        ];
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn test_iterations_change_the_key() {
        let password = SecretString::from("same-password");

        let one = derive_key(&password, &KdfParams { iterations: 1 });
        let zero = derive_key(&password, &KdfParams { iterations: 0 });
        let many = derive_key(&password, &KdfParams { iterations: 1000 });

        assert_eq!(one.as_bytes(), zero.as_bytes(), "zero iterations means one pass");
        assert_ne!(one.as_bytes(), many.as_bytes());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = EncryptionKey::from_bytes([7u8; KEY_SIZE]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains('7'));
    }
}
